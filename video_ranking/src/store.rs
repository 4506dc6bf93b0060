//! SQLite-backed persistence for the identity store, the activity registry
//! and the ballot store.
//!
//! One embedded database holds all four logical stores. The connection lives
//! behind a mutex so a `Store` can be shared across concurrent request
//! handlers; every public operation is a single transaction. The
//! `UNIQUE(activity_id, voter_id)` constraint on ballots is the authoritative
//! guard against double voting: even if two submissions interleave between
//! check and insert, the loser gets a constraint violation, which surfaces as
//! `DuplicateVote` rather than a silent overwrite.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::auth::PinCredential;
use crate::model::{
    Activity, ActivityId, ActivityOverview, ActivityStatus, BallotDetail, BallotId,
    BallotReceipt, ImportStats, Video, VideoId, VideoRecord, Voter, VoterId, VoterRecord,
    VotingError,
};

impl From<rusqlite::Error> for VotingError {
    fn from(e: rusqlite::Error) -> Self {
        VotingError::StoreUnavailable(e.to_string())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS voters (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    group_name  TEXT NOT NULL,
    full_name   TEXT NOT NULL,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
    UNIQUE (group_name, full_name)
);
CREATE INDEX IF NOT EXISTS idx_voters_group ON voters(group_name);

CREATE TABLE IF NOT EXISTS activities (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       TEXT NOT NULL,
    description TEXT,
    status      TEXT NOT NULL DEFAULT 'draft',
    pin_salt    TEXT NOT NULL,
    pin_hash    TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
);

CREATE TABLE IF NOT EXISTS videos (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    activity_id INTEGER NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
    group_name  TEXT NOT NULL,
    title       TEXT NOT NULL,
    url         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_videos_activity ON videos(activity_id);

CREATE TABLE IF NOT EXISTS ballots (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    activity_id  INTEGER NOT NULL REFERENCES activities(id) ON DELETE CASCADE,
    voter_id     INTEGER NOT NULL REFERENCES voters(id) ON DELETE CASCADE,
    submitted_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
    UNIQUE (activity_id, voter_id)
);
CREATE INDEX IF NOT EXISTS idx_ballots_activity ON ballots(activity_id);

CREATE TABLE IF NOT EXISTS ballot_entries (
    ballot_id INTEGER NOT NULL REFERENCES ballots(id) ON DELETE CASCADE,
    video_id  INTEGER NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
    position  INTEGER NOT NULL,
    PRIMARY KEY (ballot_id, video_id),
    UNIQUE (ballot_id, position)
);
"#;

fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}

/// Shared handle on the persistent store. `Send + Sync`; clone-free, share it
/// behind an `Arc` when handlers run on several threads.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if needed) the database at `db_path` and applies the
    /// schema. Parent directories are created on demand.
    pub fn open(db_path: &str) -> Result<Store, VotingError> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| VotingError::StoreUnavailable(e.to_string()))?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init(&conn)?;
        info!("store: opened database at {}", db_path);
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, mainly for tests.
    pub fn open_in_memory() -> Result<Store, VotingError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, VotingError> {
        self.conn
            .lock()
            .map_err(|_| VotingError::StoreUnavailable("store lock poisoned".to_string()))
    }

    // ********* Voters (identity store) ***********

    /// Inserts or reactivates whitelist entries. Incomplete records are
    /// skipped and counted, not fatal.
    pub fn upsert_voters(&self, records: &[VoterRecord]) -> Result<ImportStats, VotingError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut stats = ImportStats {
            inserted: 0,
            updated: 0,
            skipped: 0,
        };
        for rec in records {
            if !rec.is_complete() {
                stats.skipped += 1;
                continue;
            }
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM voters WHERE group_name = ?1 AND full_name = ?2",
                    params![rec.group, rec.name],
                    |row| row.get(0),
                )
                .optional()?;
            tx.execute(
                "INSERT INTO voters (group_name, full_name, active) VALUES (?1, ?2, 1)
                 ON CONFLICT (group_name, full_name) DO UPDATE SET active = 1",
                params![rec.group, rec.name],
            )?;
            match existing {
                Some(_) => stats.updated += 1,
                None => stats.inserted += 1,
            }
        }
        tx.commit()?;
        info!(
            "store: voter import: {} inserted, {} reactivated, {} skipped",
            stats.inserted, stats.updated, stats.skipped
        );
        Ok(stats)
    }

    /// Whitelist listing, optionally restricted to one group. Sorted by
    /// (group, name).
    pub fn voters(&self, group: Option<&str>) -> Result<Vec<Voter>, VotingError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, group_name, full_name, active FROM voters
             WHERE (?1 IS NULL OR group_name = ?1)
             ORDER BY group_name, full_name",
        )?;
        let rows = stmt.query_map(params![group], |row| {
            Ok(Voter {
                id: VoterId(row.get(0)?),
                group: row.get(1)?,
                name: row.get(2)?,
                active: row.get::<_, i64>(3)? != 0,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Eligibility lookup: active whitelist membership only.
    pub fn find_active_voter(
        &self,
        group: &str,
        name: &str,
    ) -> Result<Option<Voter>, VotingError> {
        let conn = self.lock()?;
        let voter = conn
            .query_row(
                "SELECT id, group_name, full_name, active FROM voters
                 WHERE group_name = ?1 AND full_name = ?2 AND active = 1",
                params![group, name],
                |row| {
                    Ok(Voter {
                        id: VoterId(row.get(0)?),
                        group: row.get(1)?,
                        name: row.get(2)?,
                        active: true,
                    })
                },
            )
            .optional()?;
        Ok(voter)
    }

    /// Lookup regardless of the active flag, for admin operations on voters
    /// that may have been deactivated.
    pub fn find_voter(&self, group: &str, name: &str) -> Result<Option<Voter>, VotingError> {
        let conn = self.lock()?;
        let voter = conn
            .query_row(
                "SELECT id, group_name, full_name, active FROM voters
                 WHERE group_name = ?1 AND full_name = ?2",
                params![group, name],
                |row| {
                    Ok(Voter {
                        id: VoterId(row.get(0)?),
                        group: row.get(1)?,
                        name: row.get(2)?,
                        active: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(voter)
    }

    /// Flips whitelist membership without losing the row (or its ballots).
    /// Returns false when the voter does not exist.
    pub fn set_voter_active(&self, id: VoterId, active: bool) -> Result<bool, VotingError> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE voters SET active = ?2 WHERE id = ?1",
            params![id.0, active as i64],
        )?;
        Ok(n > 0)
    }

    /// All active voters, for participation accounting. Sorted by (group,
    /// name).
    pub fn active_voters(&self) -> Result<Vec<Voter>, VotingError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, group_name, full_name FROM voters WHERE active = 1
             ORDER BY group_name, full_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Voter {
                id: VoterId(row.get(0)?),
                group: row.get(1)?,
                name: row.get(2)?,
                active: true,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    // ********* Activities ***********

    /// Creates an activity in draft status with its credential and video set
    /// in one transaction. Validation (video count, PIN policy) belongs to
    /// the registry layer.
    pub fn insert_activity(
        &self,
        title: &str,
        description: Option<&str>,
        credential: &PinCredential,
        videos: &[VideoRecord],
    ) -> Result<ActivityId, VotingError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO activities (title, description, status, pin_salt, pin_hash)
             VALUES (?1, ?2, 'draft', ?3, ?4)",
            params![title, description, credential.salt, credential.digest],
        )?;
        let id = ActivityId(tx.last_insert_rowid());
        for v in videos {
            tx.execute(
                "INSERT INTO videos (activity_id, group_name, title, url) VALUES (?1, ?2, ?3, ?4)",
                params![id.0, v.group, v.title, v.url],
            )?;
        }
        tx.commit()?;
        info!(
            "store: created activity {} ({:?}) with {} videos",
            id, title, videos.len()
        );
        Ok(id)
    }

    pub fn activity(&self, id: ActivityId) -> Result<Option<Activity>, VotingError> {
        let conn = self.lock()?;
        let act = conn
            .query_row(
                "SELECT id, title, description, status, created_at FROM activities WHERE id = ?1",
                params![id.0],
                map_activity_row,
            )
            .optional()?;
        Ok(act)
    }

    /// The stored salt + digest for PIN verification. `None` when the
    /// activity does not exist.
    pub fn activity_credential(
        &self,
        id: ActivityId,
    ) -> Result<Option<PinCredential>, VotingError> {
        let conn = self.lock()?;
        let cred = conn
            .query_row(
                "SELECT pin_salt, pin_hash FROM activities WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(PinCredential {
                        salt: row.get(0)?,
                        digest: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(cred)
    }

    /// Newest-first listing with video and ballot counts.
    pub fn list_activities(&self) -> Result<Vec<ActivityOverview>, VotingError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT a.id, a.title, a.description, a.status, a.created_at,
                    (SELECT COUNT(*) FROM videos v WHERE v.activity_id = a.id),
                    (SELECT COUNT(*) FROM ballots b WHERE b.activity_id = a.id)
             FROM activities a
             ORDER BY a.id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ActivityOverview {
                activity: map_activity_row(row)?,
                video_count: row.get::<_, i64>(5)? as u64,
                ballot_count: row.get::<_, i64>(6)? as u64,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Returns false when the activity does not exist.
    pub fn update_activity_status(
        &self,
        id: ActivityId,
        status: ActivityStatus,
    ) -> Result<bool, VotingError> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE activities SET status = ?2 WHERE id = ?1",
            params![id.0, status.as_str()],
        )?;
        Ok(n > 0)
    }

    pub fn update_activity_info(
        &self,
        id: ActivityId,
        title: &str,
        description: Option<&str>,
    ) -> Result<bool, VotingError> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE activities SET title = ?2, description = ?3 WHERE id = ?1",
            params![id.0, title, description],
        )?;
        Ok(n > 0)
    }

    /// Deletes the activity; videos, ballots and their entries go with it in
    /// one statement through the foreign-key cascade.
    pub fn delete_activity(&self, id: ActivityId) -> Result<bool, VotingError> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM activities WHERE id = ?1", params![id.0])?;
        if n > 0 {
            info!("store: deleted activity {} (ballots cascaded)", id);
        }
        Ok(n > 0)
    }

    // ********* Videos ***********

    /// The bound video set in presentation order (group, title, id).
    pub fn videos(&self, activity_id: ActivityId) -> Result<Vec<Video>, VotingError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, activity_id, group_name, title, url FROM videos
             WHERE activity_id = ?1
             ORDER BY group_name, title, id",
        )?;
        let rows = stmt.query_map(params![activity_id.0], |row| {
            Ok(Video {
                id: VideoId(row.get(0)?),
                activity_id: ActivityId(row.get(1)?),
                group: row.get(2)?,
                title: row.get(3)?,
                url: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Replaces the whole video set of an activity. The zero-ballot check
    /// runs inside the same transaction as the rewrite, so a submission
    /// racing this call can never leave ballots pointing at a stale set.
    pub fn replace_videos(
        &self,
        activity_id: ActivityId,
        videos: &[VideoRecord],
    ) -> Result<(), VotingError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let ballots: i64 = tx.query_row(
            "SELECT COUNT(*) FROM ballots WHERE activity_id = ?1",
            params![activity_id.0],
            |row| row.get(0),
        )?;
        if ballots > 0 {
            return Err(VotingError::ActivityLocked);
        }
        tx.execute(
            "DELETE FROM videos WHERE activity_id = ?1",
            params![activity_id.0],
        )?;
        for v in videos {
            tx.execute(
                "INSERT INTO videos (activity_id, group_name, title, url) VALUES (?1, ?2, ?3, ?4)",
                params![activity_id.0, v.group, v.title, v.url],
            )?;
        }
        tx.commit()?;
        debug!(
            "store: rebound {} videos on activity {}",
            videos.len(),
            activity_id
        );
        Ok(())
    }

    // ********* Ballots ***********

    pub fn ballot_count(&self, activity_id: ActivityId) -> Result<u64, VotingError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ballots WHERE activity_id = ?1",
            params![activity_id.0],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    pub fn has_ballot(
        &self,
        activity_id: ActivityId,
        voter_id: VoterId,
    ) -> Result<bool, VotingError> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM ballots WHERE activity_id = ?1 AND voter_id = ?2",
                params![activity_id.0, voter_id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// The insert-or-fail primitive behind ballot submission. The ballot row
    /// and all its entries commit in one transaction; a uniqueness violation
    /// on (activity_id, voter_id) comes back as `DuplicateVote`, so a lost
    /// race is a clean failure, not a double count.
    pub fn insert_ballot(
        &self,
        activity_id: ActivityId,
        voter_id: VoterId,
        ranking: &[VideoId],
    ) -> Result<BallotReceipt, VotingError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT INTO ballots (activity_id, voter_id) VALUES (?1, ?2)",
            params![activity_id.0, voter_id.0],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(fe, _))
                if fe.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(VotingError::DuplicateVote);
            }
            Err(e) => return Err(e.into()),
        }
        let ballot_id = BallotId(tx.last_insert_rowid());
        for (position, video_id) in ranking.iter().enumerate() {
            tx.execute(
                "INSERT INTO ballot_entries (ballot_id, video_id, position) VALUES (?1, ?2, ?3)",
                params![ballot_id.0, video_id.0, position as i64],
            )?;
        }
        let submitted_at: String = tx.query_row(
            "SELECT submitted_at FROM ballots WHERE id = ?1",
            params![ballot_id.0],
            |row| row.get(0),
        )?;
        tx.commit()?;
        debug!(
            "store: ballot {} committed for activity {} voter {}",
            ballot_id, activity_id, voter_id
        );
        Ok(BallotReceipt {
            ballot_id,
            activity_id,
            submitted_at,
        })
    }

    /// Every committed ranking of an activity, each as the ordered video-id
    /// sequence. Ballot order (by ballot id) and entry order (by position)
    /// are both deterministic.
    pub fn rankings(&self, activity_id: ActivityId) -> Result<Vec<Vec<VideoId>>, VotingError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT b.id, e.video_id FROM ballots b
             JOIN ballot_entries e ON e.ballot_id = b.id
             WHERE b.activity_id = ?1
             ORDER BY b.id, e.position",
        )?;
        let rows = stmt.query_map(params![activity_id.0], |row| {
            Ok((row.get::<_, i64>(0)?, VideoId(row.get(1)?)))
        })?;
        let mut out: Vec<Vec<VideoId>> = Vec::new();
        let mut current: Option<i64> = None;
        for r in rows {
            let (ballot_id, video_id) = r?;
            if current != Some(ballot_id) {
                out.push(Vec::new());
                current = Some(ballot_id);
            }
            if let Some(last) = out.last_mut() {
                last.push(video_id);
            }
        }
        Ok(out)
    }

    /// Voter ids that already have a ballot for the activity.
    pub fn voted_voter_ids(&self, activity_id: ActivityId) -> Result<Vec<VoterId>, VotingError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT voter_id FROM ballots WHERE activity_id = ?1 ORDER BY voter_id")?;
        let rows = stmt.query_map(params![activity_id.0], |row| Ok(VoterId(row.get(0)?)))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Per-ballot audit detail, sorted by (voter group, voter name) and
    /// position within each ballot.
    pub fn ballot_details(
        &self,
        activity_id: ActivityId,
    ) -> Result<Vec<BallotDetail>, VotingError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT b.id, s.group_name, s.full_name, b.submitted_at,
                    e.position, v.title, v.group_name
             FROM ballots b
             JOIN voters s ON s.id = b.voter_id
             JOIN ballot_entries e ON e.ballot_id = b.id
             JOIN videos v ON v.id = e.video_id
             WHERE b.activity_id = ?1
             ORDER BY s.group_name, s.full_name, e.position",
        )?;
        let rows = stmt.query_map(params![activity_id.0], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;
        let mut out: Vec<BallotDetail> = Vec::new();
        for r in rows {
            let (ballot_id, group, name, submitted_at, position, video_title, video_group) = r?;
            let entry = (position as u32 + 1, video_title, video_group);
            match out.last_mut() {
                Some(d) if d.ballot_id.0 == ballot_id => d.entries.push(entry),
                _ => out.push(BallotDetail {
                    ballot_id: BallotId(ballot_id),
                    voter_group: group,
                    voter_name: name,
                    submitted_at,
                    entries: vec![entry],
                }),
            }
        }
        Ok(out)
    }

    /// Admin purge of one voter's ballot. Returns false when there was none.
    pub fn purge_ballot(
        &self,
        activity_id: ActivityId,
        voter_id: VoterId,
    ) -> Result<bool, VotingError> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM ballots WHERE activity_id = ?1 AND voter_id = ?2",
            params![activity_id.0, voter_id.0],
        )?;
        Ok(n > 0)
    }

    /// Admin purge of every ballot of an activity; the unlock path before
    /// rebinding videos. Returns the number of ballots removed.
    pub fn purge_ballots(&self, activity_id: ActivityId) -> Result<u64, VotingError> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM ballots WHERE activity_id = ?1",
            params![activity_id.0],
        )?;
        info!("store: purged {} ballots from activity {}", n, activity_id);
        Ok(n as u64)
    }
}

fn map_activity_row(row: &rusqlite::Row<'_>) -> Result<Activity, rusqlite::Error> {
    let status_s: String = row.get(3)?;
    let status = ActivityStatus::parse(&status_s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown activity status {:?}", status_s).into(),
        )
    })?;
    Ok(Activity {
        id: ActivityId(row.get(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        status,
        created_at: row.get(4)?,
    })
}

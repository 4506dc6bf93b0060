// ********* Identifiers ***********

use std::error::Error;
use std::fmt::Display;

/// Row id of an activity (a voting round).
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash)]
pub struct ActivityId(pub i64);

/// Row id of a whitelisted voter.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash)]
pub struct VoterId(pub i64);

/// Row id of a video bound to an activity.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash)]
pub struct VideoId(pub i64);

/// Row id of a committed ballot.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash)]
pub struct BallotId(pub i64);

impl Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for VoterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for BallotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ********* Stored entities ***********

/// Lifecycle of an activity. Only open activities accept ballots, and the
/// voting engine re-checks the status at submit time rather than caching it.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ActivityStatus {
    Draft,
    Open,
    Closed,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Draft => "draft",
            ActivityStatus::Open => "open",
            ActivityStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<ActivityStatus> {
        match s {
            "draft" => Some(ActivityStatus::Draft),
            "open" => Some(ActivityStatus::Open),
            "closed" => Some(ActivityStatus::Closed),
            _ => None,
        }
    }
}

impl Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A whitelisted voter. Voters are membership entries, not accounts:
/// re-importing an existing (group, name) pair reactivates it.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Voter {
    pub id: VoterId,
    pub group: String,
    pub name: String,
    pub active: bool,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Video {
    pub id: VideoId,
    pub activity_id: ActivityId,
    pub group: String,
    pub title: String,
    pub url: String,
}

/// An activity row. PIN credentials are deliberately not part of this value;
/// they stay behind the store/auth boundary.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Activity {
    pub id: ActivityId,
    pub title: String,
    pub description: Option<String>,
    pub status: ActivityStatus,
    pub created_at: String,
}

/// One line of the admin activity listing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ActivityOverview {
    pub activity: Activity,
    pub video_count: u64,
    pub ballot_count: u64,
}

// ********* Import records ***********

/// Collapses runs of whitespace in a person's name to single spaces.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Group labels compare case-insensitively; they are stored trimmed and
/// uppercased.
pub fn normalize_group(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// A whitelist entry as parsed by an import collaborator, already normalized.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VoterRecord {
    pub group: String,
    pub name: String,
}

impl VoterRecord {
    pub fn new(group: &str, name: &str) -> VoterRecord {
        VoterRecord {
            group: normalize_group(group),
            name: normalize_name(name),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.group.is_empty() && !self.name.is_empty()
    }
}

/// A video catalog entry as parsed by an import collaborator.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VideoRecord {
    pub group: String,
    pub title: String,
    pub url: String,
}

impl VideoRecord {
    pub fn new(group: &str, title: &str, url: &str) -> VideoRecord {
        VideoRecord {
            group: normalize_group(group),
            title: title.trim().to_string(),
            url: url.trim().to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.group.is_empty() && !self.title.is_empty() && !self.url.is_empty()
    }
}

/// Outcome of a whitelist import: rows created, rows reactivated or already
/// present, rows skipped as incomplete.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct ImportStats {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
}

// ********* Output data structures *********

/// Proof of a committed ballot, returned to the voter for confirmation.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BallotReceipt {
    pub ballot_id: BallotId,
    pub activity_id: ActivityId,
    pub submitted_at: String,
}

/// One leaderboard line. Recomputed on every request, never stored, so it can
/// never drift from the ballots. `position` is 1-based after the deterministic
/// sort (points descending, then video id ascending as tie-break).
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ScoreRow {
    pub position: u32,
    pub video_id: VideoId,
    pub title: String,
    pub group: String,
    pub points: u64,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ParticipationSummary {
    pub eligible: u64,
    pub ballots_cast: u64,
    /// (group, name) of active voters with no ballot, sorted.
    pub pending: Vec<(String, String)>,
}

impl ParticipationSummary {
    pub fn turnout_percent(&self) -> f64 {
        if self.eligible == 0 {
            0.0
        } else {
            self.ballots_cast as f64 * 100.0 / self.eligible as f64
        }
    }
}

/// Per-video histogram: `counts[p]` is the number of ballots that put the
/// video at position p (0 = best). Always has one slot per bound video.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RankDistribution {
    pub video_id: VideoId,
    pub title: String,
    pub group: String,
    pub counts: Vec<u64>,
}

/// Mean and sample standard deviation of a video's 1-based rank across
/// ballots. The deviation is 0 with fewer than two ballots.
#[derive(PartialEq, Debug, Clone)]
pub struct RankStats {
    pub video_id: VideoId,
    pub title: String,
    pub group: String,
    pub mean: f64,
    pub std_dev: f64,
}

/// One voter's committed ranking, for audit listings and detailed exports.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BallotDetail {
    pub ballot_id: BallotId,
    pub voter_group: String,
    pub voter_name: String,
    pub submitted_at: String,
    /// (1-based position, video title, video group), best first.
    pub entries: Vec<(u32, String, String)>,
}

// ********* Errors ***********

/// Failures of the voting, registry and scoring contracts. All variants are
/// user-recoverable conditions except `StoreUnavailable`, which is a fatal
/// operation failure with no partial commit.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum VotingError {
    /// The activity does not exist or is not open for voting. The two cases
    /// are deliberately indistinguishable to voters.
    ActivityUnavailable,
    /// PIN digest mismatch. Carries no detail about how close the guess was.
    InvalidPin,
    /// (group, name) is not on the active whitelist.
    VoterNotEligible,
    /// A ballot already exists for this (activity, voter) pair.
    DuplicateVote,
    /// The ranking is not a permutation of the activity's video set.
    MalformedRanking(String),
    /// The activity already has ballots; its video set is frozen.
    ActivityLocked,
    /// Fewer than two videos; ranking a single video is meaningless.
    TooFewVideos,
    /// Storage failure. The enclosing transaction has been rolled back.
    StoreUnavailable(String),
}

impl Error for VotingError {}

impl Display for VotingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VotingError::ActivityUnavailable => {
                write!(f, "activity does not exist or is not open for voting")
            }
            VotingError::InvalidPin => write!(f, "invalid PIN for this activity"),
            VotingError::VoterNotEligible => {
                write!(f, "voter is not on the whitelist for this activity")
            }
            VotingError::DuplicateVote => {
                write!(f, "a ballot was already submitted by this voter")
            }
            VotingError::MalformedRanking(reason) => {
                write!(f, "malformed ranking: {}", reason)
            }
            VotingError::ActivityLocked => {
                write!(f, "activity already has ballots; videos are locked")
            }
            VotingError::TooFewVideos => {
                write!(f, "an activity needs at least two videos to rank")
            }
            VotingError::StoreUnavailable(msg) => write!(f, "store unavailable: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Ana   María  Ruiz "), "Ana María Ruiz");
        assert_eq!(normalize_name("Bob"), "Bob");
        assert_eq!(normalize_name("   "), "");
    }

    #[test]
    fn test_normalize_group() {
        assert_eq!(normalize_group(" 4ºA "), "4ºA".to_uppercase());
        assert_eq!(normalize_group("b1"), "B1");
    }

    #[test]
    fn test_incomplete_records() {
        assert!(!VoterRecord::new("B1", "   ").is_complete());
        assert!(!VoterRecord::new("", "Ana").is_complete());
        assert!(VoterRecord::new(" b1 ", " Ana  Ruiz ").is_complete());
        assert!(!VideoRecord::new("B1", "Title", "").is_complete());
    }

    #[test]
    fn test_turnout_percent() {
        let s = ParticipationSummary {
            eligible: 5,
            ballots_cast: 3,
            pending: vec![],
        };
        assert!((s.turnout_percent() - 60.0).abs() < f64::EPSILON);
        let empty = ParticipationSummary {
            eligible: 0,
            ballots_cast: 0,
            pending: vec![],
        };
        assert_eq!(empty.turnout_percent(), 0.0);
    }

    #[test]
    fn test_status_round_trip() {
        for st in [
            ActivityStatus::Draft,
            ActivityStatus::Open,
            ActivityStatus::Closed,
        ] {
            assert_eq!(ActivityStatus::parse(st.as_str()), Some(st));
        }
        assert_eq!(ActivityStatus::parse("archived"), None);
    }
}

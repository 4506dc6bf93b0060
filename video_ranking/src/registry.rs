//! Activity lifecycle: creation, status flips, video binding, duplication,
//! deletion and admin ballot purges.
//!
//! These operations trust their caller to be an administrator; gating sits in
//! the presentation layer. What they do enforce are the structural rules:
//! at least two complete videos, a non-empty PIN, and a frozen video set once
//! the first ballot lands.

use log::{info, warn};

use crate::auth::PinCredential;
use crate::model::{
    Activity, ActivityId, ActivityOverview, ActivityStatus, VideoRecord, VotingError,
};
use crate::store::Store;

/// Drops incomplete records, then insists on at least two left to rank.
fn usable_videos(videos: &[VideoRecord]) -> Result<Vec<VideoRecord>, VotingError> {
    let kept: Vec<VideoRecord> = videos.iter().filter(|v| v.is_complete()).cloned().collect();
    let dropped = videos.len() - kept.len();
    if dropped > 0 {
        warn!("registry: dropped {} incomplete video records", dropped);
    }
    if kept.len() < 2 {
        return Err(VotingError::TooFewVideos);
    }
    Ok(kept)
}

/// Creates a draft activity with a freshly salted PIN and the given video
/// set.
pub fn create_activity(
    store: &Store,
    title: &str,
    description: Option<&str>,
    pin: &str,
    videos: &[VideoRecord],
) -> Result<ActivityId, VotingError> {
    if pin.trim().is_empty() {
        return Err(VotingError::InvalidPin);
    }
    let kept = usable_videos(videos)?;
    let credential = PinCredential::issue(pin.trim());
    let id = store.insert_activity(title.trim(), description, &credential, &kept)?;
    info!("registry: activity {} created ({:?})", id, title.trim());
    Ok(id)
}

/// Flips the lifecycle status. Reopening a closed activity is allowed; prior
/// ballots remain valid and new ones are accepted while open.
pub fn set_status(
    store: &Store,
    id: ActivityId,
    status: ActivityStatus,
) -> Result<(), VotingError> {
    if !store.update_activity_status(id, status)? {
        return Err(VotingError::ActivityUnavailable);
    }
    info!("registry: activity {} status -> {}", id, status);
    Ok(())
}

/// Edits title/description only; videos, PIN and ballots are untouched.
pub fn update_info(
    store: &Store,
    id: ActivityId,
    title: &str,
    description: Option<&str>,
) -> Result<(), VotingError> {
    if !store.update_activity_info(id, title.trim(), description)? {
        return Err(VotingError::ActivityUnavailable);
    }
    Ok(())
}

/// Replaces the bound video set. Only possible while no ballot exists;
/// otherwise the scores of already-cast ballots would stop being comparable.
pub fn bind_videos(
    store: &Store,
    id: ActivityId,
    videos: &[VideoRecord],
) -> Result<(), VotingError> {
    if store.activity(id)?.is_none() {
        return Err(VotingError::ActivityUnavailable);
    }
    let kept = usable_videos(videos)?;
    store.replace_videos(id, &kept)
}

/// Copies an activity: videos yes, ballots never. With `new_pin` the copy
/// gets a fresh salt + digest; without it the original credential is reused
/// so the same PIN keeps working.
pub fn duplicate_activity(
    store: &Store,
    id: ActivityId,
    new_pin: Option<&str>,
) -> Result<ActivityId, VotingError> {
    let src = store
        .activity(id)?
        .ok_or(VotingError::ActivityUnavailable)?;
    let videos: Vec<VideoRecord> = store
        .videos(id)?
        .iter()
        .map(|v| VideoRecord::new(&v.group, &v.title, &v.url))
        .collect();
    let credential = match new_pin {
        Some(pin) if !pin.trim().is_empty() => PinCredential::issue(pin.trim()),
        Some(_) => return Err(VotingError::InvalidPin),
        None => store
            .activity_credential(id)?
            .ok_or(VotingError::ActivityUnavailable)?,
    };
    let kept = usable_videos(&videos)?;
    let title = format!("{} (copy)", src.title);
    let copy = store.insert_activity(&title, src.description.as_deref(), &credential, &kept)?;
    info!("registry: activity {} duplicated as {}", id, copy);
    Ok(copy)
}

/// Deletes the activity and cascades its videos and ballots atomically.
/// Irreversible; the caller is responsible for confirmation.
pub fn delete_activity(store: &Store, id: ActivityId) -> Result<(), VotingError> {
    if !store.delete_activity(id)? {
        return Err(VotingError::ActivityUnavailable);
    }
    Ok(())
}

/// Admin-only ballot wipe: one voter's ballot, or every ballot of the
/// activity. Returns how many ballots were removed; purging where nothing
/// exists is a no-op, not an error.
pub fn purge_ballots(
    store: &Store,
    id: ActivityId,
    voter: Option<(&str, &str)>,
) -> Result<u64, VotingError> {
    if store.activity(id)?.is_none() {
        return Err(VotingError::ActivityUnavailable);
    }
    match voter {
        Some((group, name)) => {
            let normalized_group = crate::model::normalize_group(group);
            let normalized_name = crate::model::normalize_name(name);
            let voter = store
                .find_voter(&normalized_group, &normalized_name)?
                .ok_or(VotingError::VoterNotEligible)?;
            let purged = store.purge_ballot(id, voter.id)?;
            Ok(purged as u64)
        }
        None => store.purge_ballots(id),
    }
}

pub fn get_activity(store: &Store, id: ActivityId) -> Result<Activity, VotingError> {
    store.activity(id)?.ok_or(VotingError::ActivityUnavailable)
}

pub fn list_activities(store: &Store) -> Result<Vec<ActivityOverview>, VotingError> {
    store.list_activities()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{VideoId, VoterRecord};

    fn mem() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn catalog() -> Vec<VideoRecord> {
        vec![
            VideoRecord::new("B1", "Recycling", "https://example.org/a"),
            VideoRecord::new("B1", "Solar", "https://example.org/b"),
            VideoRecord::new("B2", "Water", "https://example.org/c"),
        ]
    }

    fn vote_once(store: &Store, act: ActivityId) {
        store
            .upsert_voters(&[VoterRecord::new("B1", "Ana Ruiz")])
            .unwrap();
        let voter = store.find_active_voter("B1", "Ana Ruiz").unwrap().unwrap();
        let ranking: Vec<VideoId> = store.videos(act).unwrap().iter().map(|v| v.id).collect();
        store.insert_ballot(act, voter.id, &ranking).unwrap();
    }

    #[test]
    fn test_create_validates_video_set() {
        let store = mem();
        let one = vec![VideoRecord::new("B1", "Solo", "https://example.org/x")];
        assert_eq!(
            create_activity(&store, "A", None, "1234", &one).unwrap_err(),
            VotingError::TooFewVideos
        );
        // Incomplete records do not count towards the minimum.
        let padded = vec![
            VideoRecord::new("B1", "Solo", "https://example.org/x"),
            VideoRecord::new("B1", "", "https://example.org/y"),
            VideoRecord::new("", "Other", "https://example.org/z"),
        ];
        assert_eq!(
            create_activity(&store, "A", None, "1234", &padded).unwrap_err(),
            VotingError::TooFewVideos
        );
        let id = create_activity(&store, "  A  ", Some("desc"), "1234", &catalog()).unwrap();
        let act = get_activity(&store, id).unwrap();
        assert_eq!(act.title, "A");
        assert_eq!(act.status, ActivityStatus::Draft);
    }

    #[test]
    fn test_create_requires_pin() {
        let store = mem();
        assert_eq!(
            create_activity(&store, "A", None, "   ", &catalog()).unwrap_err(),
            VotingError::InvalidPin
        );
    }

    #[test]
    fn test_status_flips_and_reopen() {
        let store = mem();
        let id = create_activity(&store, "A", None, "1234", &catalog()).unwrap();
        set_status(&store, id, ActivityStatus::Open).unwrap();
        set_status(&store, id, ActivityStatus::Closed).unwrap();
        set_status(&store, id, ActivityStatus::Open).unwrap();
        assert_eq!(
            get_activity(&store, id).unwrap().status,
            ActivityStatus::Open
        );
        assert_eq!(
            set_status(&store, ActivityId(99), ActivityStatus::Open).unwrap_err(),
            VotingError::ActivityUnavailable
        );
    }

    #[test]
    fn test_bind_videos_locked_once_voted() {
        let store = mem();
        let id = create_activity(&store, "A", None, "1234", &catalog()).unwrap();
        set_status(&store, id, ActivityStatus::Open).unwrap();
        vote_once(&store, id);

        let next = vec![
            VideoRecord::new("C1", "Wind", "https://example.org/d"),
            VideoRecord::new("C1", "Tides", "https://example.org/e"),
        ];
        assert_eq!(
            bind_videos(&store, id, &next).unwrap_err(),
            VotingError::ActivityLocked
        );

        // Purging the ballots unlocks the set again.
        assert_eq!(purge_ballots(&store, id, None).unwrap(), 1);
        bind_videos(&store, id, &next).unwrap();
        assert_eq!(store.videos(id).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_copies_videos_never_ballots() {
        let store = mem();
        let id = create_activity(&store, "A", None, "1234", &catalog()).unwrap();
        set_status(&store, id, ActivityStatus::Open).unwrap();
        vote_once(&store, id);

        let copy = duplicate_activity(&store, id, None).unwrap();
        let act = get_activity(&store, copy).unwrap();
        assert_eq!(act.title, "A (copy)");
        assert_eq!(act.status, ActivityStatus::Draft);
        assert_eq!(store.videos(copy).unwrap().len(), 3);
        assert_eq!(store.ballot_count(copy).unwrap(), 0);
        // Same PIN keeps working on the copy.
        let cred = store.activity_credential(copy).unwrap().unwrap();
        assert!(cred.verify("1234"));

        let rekeyed = duplicate_activity(&store, id, Some("9999")).unwrap();
        let cred = store.activity_credential(rekeyed).unwrap().unwrap();
        assert!(cred.verify("9999"));
        assert!(!cred.verify("1234"));
    }

    #[test]
    fn test_delete_then_gone() {
        let store = mem();
        let id = create_activity(&store, "A", None, "1234", &catalog()).unwrap();
        delete_activity(&store, id).unwrap();
        assert_eq!(
            delete_activity(&store, id).unwrap_err(),
            VotingError::ActivityUnavailable
        );
        assert_eq!(
            get_activity(&store, id).unwrap_err(),
            VotingError::ActivityUnavailable
        );
    }

    #[test]
    fn test_update_info() {
        let store = mem();
        let id = create_activity(&store, "A", Some("old"), "1234", &catalog()).unwrap();
        update_info(&store, id, "B", Some("new")).unwrap();
        let act = get_activity(&store, id).unwrap();
        assert_eq!(act.title, "B");
        assert_eq!(act.description.as_deref(), Some("new"));
    }

    #[test]
    fn test_purge_single_voter() {
        let store = mem();
        let id = create_activity(&store, "A", None, "1234", &catalog()).unwrap();
        set_status(&store, id, ActivityStatus::Open).unwrap();
        vote_once(&store, id);

        // Unknown voters are reported, absent ballots are not.
        assert_eq!(
            purge_ballots(&store, id, Some(("B9", "Nobody"))).unwrap_err(),
            VotingError::VoterNotEligible
        );
        assert_eq!(purge_ballots(&store, id, Some(("b1", "Ana  Ruiz"))).unwrap(), 1);
        assert_eq!(purge_ballots(&store, id, Some(("B1", "Ana Ruiz"))).unwrap(), 0);
        assert_eq!(store.ballot_count(id).unwrap(), 0);

        let overviews = list_activities(&store).unwrap();
        assert_eq!(overviews.len(), 1);
        assert_eq!(overviews[0].ballot_count, 0);
        assert_eq!(overviews[0].video_count, 3);
    }
}

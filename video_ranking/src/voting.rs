//! The voting engine: the one path by which a ballot enters the store.
//!
//! Checks run in a fixed order and the first failure wins: activity open,
//! PIN, whitelist membership, no prior ballot, ranking is a permutation of
//! the bound video set. The duplicate check here is only a fast path; the
//! store's uniqueness constraint is what actually guarantees one ballot per
//! (activity, voter) when submissions race.

use std::collections::HashSet;

use log::{debug, info};

use crate::model::{
    normalize_group, normalize_name, ActivityId, ActivityStatus, BallotReceipt, Video, VideoId,
    VotingError,
};
use crate::store::Store;

pub fn submit_ballot(
    store: &Store,
    activity_id: ActivityId,
    group: &str,
    name: &str,
    pin: &str,
    ranking: &[VideoId],
) -> Result<BallotReceipt, VotingError> {
    // Whether the id is unknown or the round is just not open is deliberately
    // not distinguishable from the outside.
    match store.activity(activity_id)? {
        Some(a) if a.status == ActivityStatus::Open => a,
        _ => return Err(VotingError::ActivityUnavailable),
    };

    let credential = store
        .activity_credential(activity_id)?
        .ok_or(VotingError::ActivityUnavailable)?;
    if !credential.verify(pin) {
        debug!("vote: PIN rejected for activity {}", activity_id);
        return Err(VotingError::InvalidPin);
    }

    let voter = store
        .find_active_voter(&normalize_group(group), &normalize_name(name))?
        .ok_or(VotingError::VoterNotEligible)?;

    if store.has_ballot(activity_id, voter.id)? {
        return Err(VotingError::DuplicateVote);
    }

    let videos = store.videos(activity_id)?;
    validate_ranking(&videos, ranking)?;

    // The insert re-runs the duplicate check atomically; a lost race comes
    // back as DuplicateVote from the constraint.
    let receipt = store.insert_ballot(activity_id, voter.id, ranking)?;
    info!(
        "vote: ballot {} committed for activity {} by voter {}",
        receipt.ballot_id, activity_id, voter.id
    );
    Ok(receipt)
}

/// A ranking is valid iff it is a permutation of the bound video-id set:
/// same length, every id bound, no id twice.
fn validate_ranking(videos: &[Video], ranking: &[VideoId]) -> Result<(), VotingError> {
    if ranking.len() != videos.len() {
        return Err(VotingError::MalformedRanking(format!(
            "expected {} entries, got {}",
            videos.len(),
            ranking.len()
        )));
    }
    let bound: HashSet<VideoId> = videos.iter().map(|v| v.id).collect();
    let mut seen: HashSet<VideoId> = HashSet::with_capacity(ranking.len());
    for video_id in ranking {
        if !bound.contains(video_id) {
            return Err(VotingError::MalformedRanking(format!(
                "video {} is not part of this activity",
                video_id
            )));
        }
        if !seen.insert(*video_id) {
            return Err(VotingError::MalformedRanking(format!(
                "video {} appears more than once",
                video_id
            )));
        }
    }
    Ok(())
}

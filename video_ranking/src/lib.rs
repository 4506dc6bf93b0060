mod auth;
mod builder;
mod model;
mod registry;
mod store;
mod voting;

pub mod manual;

use std::collections::{HashMap, HashSet};

use log::info;

pub use crate::auth::{generate_salt, hash_pin, AdminAuth, PinCredential};
pub use crate::builder::BallotDraft;
pub use crate::model::*;
pub use crate::registry::{
    bind_videos, create_activity, delete_activity, duplicate_activity, get_activity,
    list_activities, purge_ballots, set_status, update_info,
};
pub use crate::store::Store;
pub use crate::voting::submit_ballot;

// **** Scoring engine ****
//
// Everything here recomputes from the ballots on every call. Derived numbers
// are never stored, so they can never drift from the votes that back them.

/// Borda award for one ballot: with V entries, position p (0 = best) earns
/// V - 1 - p points.
fn award_ballot(tally: &mut HashMap<VideoId, u64>, ranking: &[VideoId]) {
    let v = ranking.len() as u64;
    for (p, video_id) in ranking.iter().enumerate() {
        *tally.entry(*video_id).or_insert(0) += v - 1 - p as u64;
    }
}

/// Pure tally over a fixed video set. Rows come back sorted by points
/// descending, ties broken by ascending video id, positions assigned 1-based
/// after the sort. Identical inputs always produce identical output.
fn tally_rows(videos: &[Video], rankings: &[Vec<VideoId>]) -> Vec<ScoreRow> {
    let mut tally: HashMap<VideoId, u64> = videos.iter().map(|v| (v.id, 0)).collect();
    for ranking in rankings {
        award_ballot(&mut tally, ranking);
    }
    let mut ordered: Vec<&Video> = videos.iter().collect();
    ordered.sort_by(|a, b| {
        let pa = tally.get(&a.id).copied().unwrap_or(0);
        let pb = tally.get(&b.id).copied().unwrap_or(0);
        pb.cmp(&pa).then(a.id.cmp(&b.id))
    });
    ordered
        .iter()
        .enumerate()
        .map(|(i, v)| ScoreRow {
            position: i as u32 + 1,
            video_id: v.id,
            title: v.title.clone(),
            group: v.group.clone(),
            points: tally.get(&v.id).copied().unwrap_or(0),
        })
        .collect()
}

/// The leaderboard plus participation for one activity. Works for any
/// status; an activity with zero ballots reports all-zero scores and a full
/// pending list.
pub fn compute_results(
    store: &Store,
    activity_id: ActivityId,
) -> Result<(Vec<ScoreRow>, ParticipationSummary), VotingError> {
    if store.activity(activity_id)?.is_none() {
        return Err(VotingError::ActivityUnavailable);
    }
    let videos = store.videos(activity_id)?;
    let rankings = store.rankings(activity_id)?;
    info!(
        "scoring: activity {}: {} videos, {} ballots",
        activity_id,
        videos.len(),
        rankings.len()
    );
    let rows = tally_rows(&videos, &rankings);
    // Conservation: B ballots over V videos hand out B * (V-1) * V / 2 points.
    let total: u64 = rows.iter().map(|r| r.points).sum();
    let b = rankings.len() as u64;
    let v = videos.len() as u64;
    debug_assert_eq!(total, b * v.saturating_sub(1) * v / 2);
    let participation = participation(store, activity_id, b)?;
    Ok((rows, participation))
}

/// Participation only, for the admin follow-up view.
pub fn compute_participation(
    store: &Store,
    activity_id: ActivityId,
) -> Result<ParticipationSummary, VotingError> {
    if store.activity(activity_id)?.is_none() {
        return Err(VotingError::ActivityUnavailable);
    }
    let cast = store.ballot_count(activity_id)?;
    participation(store, activity_id, cast)
}

/// Whitelist minus ballot-voter set. The pending list inherits the (group,
/// name) ordering of the whitelist query.
fn participation(
    store: &Store,
    activity_id: ActivityId,
    ballots_cast: u64,
) -> Result<ParticipationSummary, VotingError> {
    let active = store.active_voters()?;
    let voted: HashSet<VoterId> = store.voted_voter_ids(activity_id)?.into_iter().collect();
    let pending: Vec<(String, String)> = active
        .iter()
        .filter(|v| !voted.contains(&v.id))
        .map(|v| (v.group.clone(), v.name.clone()))
        .collect();
    Ok(ParticipationSummary {
        eligible: active.len() as u64,
        ballots_cast,
        pending,
    })
}

/// Per-video position histogram, one row per video in presentation order.
pub fn rank_distribution(
    store: &Store,
    activity_id: ActivityId,
) -> Result<Vec<RankDistribution>, VotingError> {
    if store.activity(activity_id)?.is_none() {
        return Err(VotingError::ActivityUnavailable);
    }
    let videos = store.videos(activity_id)?;
    let rankings = store.rankings(activity_id)?;
    let index: HashMap<VideoId, usize> = videos.iter().enumerate().map(|(i, v)| (v.id, i)).collect();
    let mut rows: Vec<RankDistribution> = videos
        .iter()
        .map(|v| RankDistribution {
            video_id: v.id,
            title: v.title.clone(),
            group: v.group.clone(),
            counts: vec![0; videos.len()],
        })
        .collect();
    for ranking in &rankings {
        for (p, video_id) in ranking.iter().enumerate() {
            if let Some(&i) = index.get(video_id) {
                if let Some(slot) = rows[i].counts.get_mut(p) {
                    *slot += 1;
                }
            }
        }
    }
    Ok(rows)
}

/// Mean 1-based rank and sample standard deviation per video, best mean
/// first; ties and the zero-ballot case fall back to video id order.
pub fn rank_statistics(
    store: &Store,
    activity_id: ActivityId,
) -> Result<Vec<RankStats>, VotingError> {
    if store.activity(activity_id)?.is_none() {
        return Err(VotingError::ActivityUnavailable);
    }
    let videos = store.videos(activity_id)?;
    let rankings = store.rankings(activity_id)?;
    let mut positions: HashMap<VideoId, Vec<f64>> =
        videos.iter().map(|v| (v.id, Vec::new())).collect();
    for ranking in &rankings {
        for (p, video_id) in ranking.iter().enumerate() {
            if let Some(xs) = positions.get_mut(video_id) {
                xs.push((p + 1) as f64);
            }
        }
    }
    let mut rows: Vec<RankStats> = videos
        .iter()
        .map(|v| {
            let xs = positions.get(&v.id).map(|x| x.as_slice()).unwrap_or(&[]);
            let (mean, std_dev) = mean_and_sample_stdev(xs);
            RankStats {
                video_id: v.id,
                title: v.title.clone(),
                group: v.group.clone(),
                mean,
                std_dev,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.mean
            .partial_cmp(&b.mean)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.video_id.cmp(&b.video_id))
    });
    Ok(rows)
}

fn mean_and_sample_stdev(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    if xs.len() < 2 {
        return (mean, 0.0);
    }
    let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIN: &str = "1234";

    fn catalog() -> Vec<VideoRecord> {
        vec![
            VideoRecord::new("B1", "Recycling", "https://example.org/a"),
            VideoRecord::new("B1", "Solar", "https://example.org/b"),
            VideoRecord::new("B2", "Water", "https://example.org/c"),
        ]
    }

    /// Open activity with three videos and five whitelisted voters.
    fn open_activity() -> (Store, ActivityId, Vec<VideoId>) {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_voters(&[
                VoterRecord::new("B1", "Ana Ruiz"),
                VoterRecord::new("B1", "Luis Sol"),
                VoterRecord::new("B2", "Mar Vidal"),
                VoterRecord::new("B2", "Pau Serra"),
                VoterRecord::new("B2", "Rita Soto"),
            ])
            .unwrap();
        let id = create_activity(&store, "Science week", None, PIN, &catalog()).unwrap();
        set_status(&store, id, ActivityStatus::Open).unwrap();
        let videos = store.videos(id).unwrap().iter().map(|v| v.id).collect();
        (store, id, videos)
    }

    fn cast(store: &Store, act: ActivityId, group: &str, name: &str, ranking: &[VideoId]) {
        submit_ballot(store, act, group, name, PIN, ranking).unwrap();
    }

    #[test]
    fn test_award_ballot() {
        let mut tally = HashMap::new();
        award_ballot(&mut tally, &[VideoId(1), VideoId(2), VideoId(3)]);
        assert_eq!(tally.get(&VideoId(1)), Some(&2));
        assert_eq!(tally.get(&VideoId(2)), Some(&1));
        assert_eq!(tally.get(&VideoId(3)), Some(&0));
    }

    #[test]
    fn test_borda_totals_and_tie_break() {
        let (store, act, v) = open_activity();
        // Two ballots: [v1,v2,v3] and [v2,v1,v3].
        cast(&store, act, "B1", "Ana Ruiz", &[v[0], v[1], v[2]]);
        cast(&store, act, "B1", "Luis Sol", &[v[1], v[0], v[2]]);

        let (rows, participation) = compute_results(&store, act).unwrap();
        assert_eq!(rows.len(), 3);
        // v1 and v2 tie at 3 points; the lower video id wins the tie.
        assert_eq!(rows[0].video_id, v[0]);
        assert_eq!(rows[0].points, 3);
        assert_eq!(rows[0].position, 1);
        assert_eq!(rows[1].video_id, v[1]);
        assert_eq!(rows[1].points, 3);
        assert_eq!(rows[1].position, 2);
        assert_eq!(rows[2].video_id, v[2]);
        assert_eq!(rows[2].points, 0);

        let total: u64 = rows.iter().map(|r| r.points).sum();
        assert_eq!(total, 2 * (3 - 1) * 3 / 2);
        assert_eq!(participation.ballots_cast, 2);
    }

    #[test]
    fn test_zero_ballots_report_cleanly() {
        let (store, act, v) = open_activity();
        let (rows, participation) = compute_results(&store, act).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.points == 0));
        // All-zero scores fall back to video id order.
        assert_eq!(rows[0].video_id, v[0]);
        assert_eq!(participation.eligible, 5);
        assert_eq!(participation.ballots_cast, 0);
        assert_eq!(participation.pending.len(), 5);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let (store, act, v) = open_activity();
        cast(&store, act, "B1", "Ana Ruiz", &[v[2], v[0], v[1]]);
        cast(&store, act, "B2", "Mar Vidal", &[v[2], v[1], v[0]]);

        let first = compute_results(&store, act).unwrap();
        let second = compute_results(&store, act).unwrap();
        assert_eq!(first, second);
        assert_eq!(format!("{:?}", first), format!("{:?}", second));
    }

    #[test]
    fn test_participation_pending_list() {
        let (store, act, v) = open_activity();
        cast(&store, act, "B1", "Ana Ruiz", &v);
        cast(&store, act, "B2", "Mar Vidal", &v);
        cast(&store, act, "B2", "Rita Soto", &v);

        let summary = compute_participation(&store, act).unwrap();
        assert_eq!(summary.eligible, 5);
        assert_eq!(summary.ballots_cast, 3);
        assert_eq!(
            summary.pending,
            vec![
                ("B1".to_string(), "Luis Sol".to_string()),
                ("B2".to_string(), "Pau Serra".to_string()),
            ]
        );
        assert!((summary.turnout_percent() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_conservation_on_bigger_activity() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_voters(&[
                VoterRecord::new("B1", "Ana Ruiz"),
                VoterRecord::new("B1", "Luis Sol"),
                VoterRecord::new("B2", "Mar Vidal"),
            ])
            .unwrap();
        let mut videos = catalog();
        videos.push(VideoRecord::new("B2", "Wind", "https://example.org/d"));
        let act = create_activity(&store, "Bigger", None, PIN, &videos).unwrap();
        set_status(&store, act, ActivityStatus::Open).unwrap();
        let v: Vec<VideoId> = store.videos(act).unwrap().iter().map(|x| x.id).collect();

        cast(&store, act, "B1", "Ana Ruiz", &[v[0], v[1], v[2], v[3]]);
        cast(&store, act, "B1", "Luis Sol", &[v[3], v[2], v[1], v[0]]);
        cast(&store, act, "B2", "Mar Vidal", &[v[1], v[3], v[0], v[2]]);

        let (rows, _) = compute_results(&store, act).unwrap();
        let total: u64 = rows.iter().map(|r| r.points).sum();
        assert_eq!(total, 3 * (4 - 1) * 4 / 2);
    }

    #[test]
    fn test_rank_distribution_counts() {
        let (store, act, v) = open_activity();
        cast(&store, act, "B1", "Ana Ruiz", &[v[0], v[1], v[2]]);
        cast(&store, act, "B1", "Luis Sol", &[v[1], v[0], v[2]]);

        let rows = rank_distribution(&store, act).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].counts, vec![1, 1, 0]);
        assert_eq!(rows[1].counts, vec![1, 1, 0]);
        assert_eq!(rows[2].counts, vec![0, 0, 2]);
    }

    #[test]
    fn test_rank_statistics() {
        let (store, act, v) = open_activity();
        cast(&store, act, "B1", "Ana Ruiz", &[v[0], v[1], v[2]]);
        cast(&store, act, "B1", "Luis Sol", &[v[1], v[0], v[2]]);

        let rows = rank_statistics(&store, act).unwrap();
        // v1 and v2 share mean 1.5; id order breaks the tie; v3 is last.
        assert_eq!(rows[0].video_id, v[0]);
        assert!((rows[0].mean - 1.5).abs() < 1e-9);
        assert!((rows[0].std_dev - 0.5f64.sqrt()).abs() < 1e-9);
        assert_eq!(rows[2].video_id, v[2]);
        assert!((rows[2].mean - 3.0).abs() < 1e-9);
        assert!((rows[2].std_dev - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_activity() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(
            compute_results(&store, ActivityId(1)).unwrap_err(),
            VotingError::ActivityUnavailable
        );
        assert_eq!(
            rank_distribution(&store, ActivityId(1)).unwrap_err(),
            VotingError::ActivityUnavailable
        );
    }

    #[test]
    fn test_mean_and_sample_stdev() {
        assert_eq!(mean_and_sample_stdev(&[]), (0.0, 0.0));
        assert_eq!(mean_and_sample_stdev(&[2.0]), (2.0, 0.0));
        let (mean, sd) = mean_and_sample_stdev(&[1.0, 2.0, 3.0]);
        assert!((mean - 2.0).abs() < 1e-9);
        assert!((sd - 1.0).abs() < 1e-9);
    }
}

//! The vidrank subcommands: orchestration over the video_ranking library,
//! tabular imports, CSV exports and the JSON results summary.

pub mod import;

use std::fs;
use std::io;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Value as JSValue;
use snafu::prelude::*;
use text_diff::print_diff;

use video_ranking::{
    Activity, ActivityId, ActivityStatus, AdminAuth, BallotDetail, ParticipationSummary, ScoreRow,
    Store, VideoId, VoterRecord, VotingError,
};

// ********* Errors ***********

#[derive(Debug, Snafu)]
pub enum VidrankError {
    #[snafu(display("Error opening file {path}: {source}"))]
    OpeningCsv { source: csv::Error, path: String },
    #[snafu(display("Error reading file {path}: {source}"))]
    ParsingCsv { source: csv::Error, path: String },
    #[snafu(display("Error opening file {path}: {source}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Workbook {path} has no sheet"))]
    EmptyExcel { path: String },
    #[snafu(display("Could not find {expected} columns in the header of {path}"))]
    ImportHeader { path: String, expected: String },
    #[snafu(display("Error opening file {path}: {source}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error writing file {path}: {source}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}: {source}"))]
    WritingCsv { source: csv::Error, path: String },
    #[snafu(display("{source}"))]
    #[snafu(visibility(pub(crate)))]
    Engine { source: VotingError },
    #[snafu(display(
        "Admin password is not configured: set VIDRANK_ADMIN_PASSWORD or put adminPassword in the config file"
    ))]
    AdminNotConfigured {},
    #[snafu(display("Admin password rejected"))]
    AdminRejected {},
    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

type VidrankResult<T> = Result<T, VidrankError>;

// ********* Configuration and admin gate ***********

pub const ADMIN_PASSWORD_ENV: &str = "VIDRANK_ADMIN_PASSWORD";

/// On-disk application configuration (`--config app.json`).
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "dbPath", default)]
    pub db_path: Option<String>,
    #[serde(rename = "adminPassword", default)]
    pub admin_password: Option<String>,
}

pub fn read_config(path: &str) -> VidrankResult<AppConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: AppConfig = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(config)
}

/// Gate for the mutating subcommands. The stored password is only ever
/// compared through the salted digest.
pub fn require_admin(auth: &Option<AdminAuth>, provided: Option<&str>) -> VidrankResult<()> {
    let auth = match auth {
        Some(a) => a,
        None => return AdminNotConfiguredSnafu {}.fail(),
    };
    match provided {
        Some(p) if auth.verify(p) => Ok(()),
        _ => AdminRejectedSnafu {}.fail(),
    }
}

// ********* Whitelist commands ***********

pub fn import_students(store: &Store, file: &str) -> VidrankResult<()> {
    let records = import::read_students(file)?;
    info!("read {} student rows from {}", records.len(), file);
    let stats = store.upsert_voters(&records).context(EngineSnafu {})?;
    println!(
        "students: {} inserted, {} reactivated, {} skipped",
        stats.inserted, stats.updated, stats.skipped
    );
    Ok(())
}

pub fn list_students(store: &Store, group: Option<&str>) -> VidrankResult<()> {
    let voters = store.voters(group).context(EngineSnafu {})?;
    for v in &voters {
        let marker = if v.active { "" } else { "  (inactive)" };
        println!("{:>5}  {:<10} {}{}", v.id, v.group, v.name, marker);
    }
    println!("{} students", voters.len());
    Ok(())
}

pub fn set_student(store: &Store, group: &str, name: &str, active: bool) -> VidrankResult<()> {
    let rec = VoterRecord::new(group, name);
    let voter = match store.find_voter(&rec.group, &rec.name).context(EngineSnafu {})? {
        Some(v) => v,
        None => whatever!("no student {:?} in group {:?}", rec.name, rec.group),
    };
    store.set_voter_active(voter.id, active).context(EngineSnafu {})?;
    println!(
        "{} / {} is now {}",
        rec.group,
        rec.name,
        if active { "active" } else { "inactive" }
    );
    Ok(())
}

// ********* Activity commands ***********

pub fn create_activity(
    store: &Store,
    title: &str,
    description: Option<&str>,
    pin: &str,
    videos_file: &str,
) -> VidrankResult<()> {
    let records = import::read_videos(videos_file)?;
    let incomplete = records.iter().filter(|r| !r.is_complete()).count();
    if incomplete > 0 {
        warn!("{} incomplete rows in {} will be ignored", incomplete, videos_file);
    }
    let id = video_ranking::create_activity(store, title, description, pin, &records)
        .context(EngineSnafu {})?;
    let bound = store.videos(id).context(EngineSnafu {})?.len();
    println!("activity {} created in draft with {} videos", id, bound);
    println!("open it with: vidrank set-status -a {} -s open", id);
    Ok(())
}

pub fn list_activities(store: &Store) -> VidrankResult<()> {
    let all = video_ranking::list_activities(store).context(EngineSnafu {})?;
    println!(
        "{:>4}  {:<7} {:>7} {:>8}  {:<20} {}",
        "id", "status", "videos", "ballots", "created", "title"
    );
    for o in &all {
        println!(
            "{:>4}  {:<7} {:>7} {:>8}  {:<20} {}",
            o.activity.id,
            o.activity.status,
            o.video_count,
            o.ballot_count,
            o.activity.created_at,
            o.activity.title
        );
    }
    Ok(())
}

pub fn update_activity(
    store: &Store,
    id: i64,
    title: Option<&str>,
    description: Option<&str>,
) -> VidrankResult<()> {
    if title.is_none() && description.is_none() {
        whatever!("nothing to update: pass --title and/or --description");
    }
    let current = video_ranking::get_activity(store, ActivityId(id)).context(EngineSnafu {})?;
    let new_title = title.unwrap_or(current.title.as_str());
    let new_description = description.or(current.description.as_deref());
    video_ranking::update_info(store, current.id, new_title, new_description)
        .context(EngineSnafu {})?;
    println!("activity {} updated", id);
    Ok(())
}

pub fn set_status(store: &Store, id: i64, status_raw: &str) -> VidrankResult<()> {
    let status = match ActivityStatus::parse(status_raw.trim().to_lowercase().as_str()) {
        Some(s) => s,
        None => whatever!("unknown status {:?}: expected draft, open or closed", status_raw),
    };
    video_ranking::set_status(store, ActivityId(id), status).context(EngineSnafu {})?;
    println!("activity {} is now {}", id, status);
    Ok(())
}

pub fn bind_videos(store: &Store, id: i64, file: &str) -> VidrankResult<()> {
    let records = import::read_videos(file)?;
    let incomplete = records.iter().filter(|r| !r.is_complete()).count();
    if incomplete > 0 {
        warn!("{} incomplete rows in {} will be ignored", incomplete, file);
    }
    video_ranking::bind_videos(store, ActivityId(id), &records).context(EngineSnafu {})?;
    let bound = store.videos(ActivityId(id)).context(EngineSnafu {})?.len();
    println!("activity {} now has {} videos", id, bound);
    Ok(())
}

pub fn list_videos(store: &Store, id: i64) -> VidrankResult<()> {
    let activity = video_ranking::get_activity(store, ActivityId(id)).context(EngineSnafu {})?;
    println!("videos of activity {} ({})", activity.id, activity.title);
    let videos = store.videos(activity.id).context(EngineSnafu {})?;
    for v in &videos {
        println!("{:>5}  {:<10} {:<40} {}", v.id, v.group, v.title, v.url);
    }
    Ok(())
}

pub fn duplicate(store: &Store, id: i64, pin: Option<&str>) -> VidrankResult<()> {
    let copy = video_ranking::duplicate_activity(store, ActivityId(id), pin).context(EngineSnafu {})?;
    println!("activity {} duplicated as {} (draft, no ballots)", id, copy);
    Ok(())
}

pub fn delete(store: &Store, id: i64, yes: bool) -> VidrankResult<()> {
    if !yes {
        whatever!("deleting activity {} erases its ballots; pass --yes to confirm", id);
    }
    video_ranking::delete_activity(store, ActivityId(id)).context(EngineSnafu {})?;
    println!("activity {} deleted", id);
    Ok(())
}

pub fn purge(
    store: &Store,
    id: i64,
    group: Option<&str>,
    name: Option<&str>,
) -> VidrankResult<()> {
    let voter = match (group, name) {
        (Some(g), Some(n)) => Some((g, n)),
        (None, None) => None,
        _ => whatever!("--group and --name go together"),
    };
    let purged =
        video_ranking::purge_ballots(store, ActivityId(id), voter).context(EngineSnafu {})?;
    println!("{} ballot(s) removed", purged);
    Ok(())
}

// ********* Voting and results ***********

fn parse_ranking(raw: &str) -> VidrankResult<Vec<VideoId>> {
    let mut out = Vec::new();
    for tok in raw.split(',') {
        let tok = tok.trim();
        if tok.is_empty() {
            whatever!("empty entry in ranking {:?}", raw);
        }
        match tok.parse::<i64>() {
            Ok(n) => out.push(VideoId(n)),
            Err(_) => whatever!("ranking entry {:?} is not a video id", tok),
        }
    }
    Ok(out)
}

pub fn vote(
    store: &Store,
    id: i64,
    group: &str,
    name: &str,
    pin: &str,
    ranking_raw: &str,
) -> VidrankResult<()> {
    let ranking = parse_ranking(ranking_raw)?;
    let receipt = video_ranking::submit_ballot(store, ActivityId(id), group, name, pin, &ranking)
        .context(EngineSnafu {})?;
    println!("ballot {} recorded at {}", receipt.ballot_id, receipt.submitted_at);
    Ok(())
}

fn print_participation(p: &ParticipationSummary) {
    println!(
        "participation: {}/{} ballots ({:.0}%)",
        p.ballots_cast,
        p.eligible,
        p.turnout_percent()
    );
    if !p.pending.is_empty() {
        println!("still pending:");
        for (group, name) in &p.pending {
            println!("  {:<10} {}", group, name);
        }
    }
}

/// Assembles the JSON results summary: activity header, leaderboard and
/// participation. `results --reference` compares this byte for byte.
fn build_summary(
    activity: &Activity,
    video_count: usize,
    rows: &[ScoreRow],
    part: &ParticipationSummary,
) -> JSValue {
    let mut results: Vec<JSValue> = Vec::new();
    for r in rows {
        results.push(json!({
            "position": r.position,
            "videoId": r.video_id.0,
            "title": r.title,
            "group": r.group,
            "points": r.points,
        }));
    }
    let mut pending: Vec<JSValue> = Vec::new();
    for (group, name) in &part.pending {
        pending.push(json!({ "group": group, "name": name }));
    }
    json!({
        "activity": {
            "id": activity.id.0,
            "title": activity.title,
            "description": activity.description,
            "status": activity.status.as_str(),
            "videos": video_count,
            "ballots": part.ballots_cast,
        },
        "results": results,
        "participation": {
            "eligible": part.eligible,
            "cast": part.ballots_cast,
            "percent": part.turnout_percent(),
            "pending": pending,
        },
    })
}

pub fn results_summary(store: &Store, id: ActivityId) -> VidrankResult<JSValue> {
    let activity = video_ranking::get_activity(store, id).context(EngineSnafu {})?;
    let videos = store.videos(id).context(EngineSnafu {})?;
    let (rows, part) = video_ranking::compute_results(store, id).context(EngineSnafu {})?;
    Ok(build_summary(&activity, videos.len(), &rows, &part))
}

pub fn results(
    store: &Store,
    id: i64,
    out: Option<&str>,
    reference: Option<&str>,
) -> VidrankResult<()> {
    let aid = ActivityId(id);
    let activity = video_ranking::get_activity(store, aid).context(EngineSnafu {})?;
    let videos = store.videos(aid).context(EngineSnafu {})?;
    let (rows, part) = video_ranking::compute_results(store, aid).context(EngineSnafu {})?;

    println!("results for activity {} ({}, {})", activity.id, activity.title, activity.status);
    println!(
        "{:>4} {:>6}  {:<10} {:<36} {:>7}",
        "pos", "video", "group", "title", "points"
    );
    for r in &rows {
        println!(
            "{:>4} {:>6}  {:<10} {:<36} {:>7}",
            r.position, r.video_id, r.group, r.title, r.points
        );
    }
    print_participation(&part);

    let dist = video_ranking::rank_distribution(store, aid).context(EngineSnafu {})?;
    println!("times ranked at each position (best first):");
    for d in &dist {
        let counts = d
            .counts
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<String>>()
            .join(" ");
        println!("{:>6}  {:<36} [{}]", d.video_id, d.title, counts);
    }
    let stats = video_ranking::rank_statistics(store, aid).context(EngineSnafu {})?;
    println!("mean rank (lower is better):");
    for s in &stats {
        println!("{:>6}  {:<36} {:.2} +/- {:.2}", s.video_id, s.title, s.mean, s.std_dev);
    }

    let summary = build_summary(&activity, videos.len(), &rows, &part);
    let pretty_js = serde_json::to_string_pretty(&summary).context(ParsingJsonSnafu {})?;
    println!("summary:{}", pretty_js);

    if let Some(path) = out {
        fs::write(path, &pretty_js).context(WritingFileSnafu { path })?;
        println!("summary written to {}", path);
    }
    if let Some(path) = reference {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
        let reference_js: JSValue =
            serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        let pretty_ref = serde_json::to_string_pretty(&reference_js).context(ParsingJsonSnafu {})?;
        if pretty_ref != pretty_js {
            warn!("Found differences with the reference summary");
            print_diff(pretty_ref.as_str(), pretty_js.as_str(), "\n");
            whatever!("Difference detected between calculated summary and reference summary");
        }
        println!("summary matches the reference {}", path);
    }
    Ok(())
}

pub fn participation(store: &Store, id: i64) -> VidrankResult<()> {
    let p = video_ranking::compute_participation(store, ActivityId(id)).context(EngineSnafu {})?;
    print_participation(&p);
    Ok(())
}

// ********* CSV export ***********

fn export_ranking<W: io::Write>(
    wtr: &mut csv::Writer<W>,
    rows: &[ScoreRow],
) -> Result<(), csv::Error> {
    wtr.write_record(["position", "video_id", "title", "group", "points"])?;
    for r in rows {
        wtr.write_record([
            r.position.to_string(),
            r.video_id.to_string(),
            r.title.clone(),
            r.group.clone(),
            r.points.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn export_detailed<W: io::Write>(
    wtr: &mut csv::Writer<W>,
    details: &[BallotDetail],
) -> Result<(), csv::Error> {
    wtr.write_record([
        "ballot_id",
        "voter_group",
        "voter_name",
        "submitted_at",
        "position",
        "video_title",
        "video_group",
    ])?;
    for d in details {
        for (position, title, group) in &d.entries {
            wtr.write_record([
                d.ballot_id.to_string(),
                d.voter_group.clone(),
                d.voter_name.clone(),
                d.submitted_at.clone(),
                position.to_string(),
                title.clone(),
                group.clone(),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

pub fn export(store: &Store, id: i64, out: Option<&str>, detailed: bool) -> VidrankResult<()> {
    let aid = ActivityId(id);
    video_ranking::get_activity(store, aid).context(EngineSnafu {})?;
    if detailed {
        let details = store.ballot_details(aid).context(EngineSnafu {})?;
        match out {
            Some(path) => {
                let mut wtr = csv::Writer::from_path(path).context(WritingCsvSnafu { path })?;
                export_detailed(&mut wtr, &details).context(WritingCsvSnafu { path })?;
                println!("{} ballot rows written to {}", details.len(), path);
            }
            None => {
                let mut wtr = csv::Writer::from_writer(io::stdout());
                export_detailed(&mut wtr, &details).context(WritingCsvSnafu { path: "stdout" })?;
            }
        }
    } else {
        let (rows, _) = video_ranking::compute_results(store, aid).context(EngineSnafu {})?;
        match out {
            Some(path) => {
                let mut wtr = csv::Writer::from_path(path).context(WritingCsvSnafu { path })?;
                export_ranking(&mut wtr, &rows).context(WritingCsvSnafu { path })?;
                println!("{} ranking rows written to {}", rows.len(), path);
            }
            None => {
                let mut wtr = csv::Writer::from_writer(io::stdout());
                export_ranking(&mut wtr, &rows).context(WritingCsvSnafu { path: "stdout" })?;
            }
        }
    }
    Ok(())
}

// ********* Tests ***********

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use video_ranking::{Store, VideoRecord};

    fn temp_path(name: &str) -> String {
        let p: PathBuf = std::env::temp_dir().join(format!(
            "vidrank_cmd_{}_{}",
            std::process::id(),
            name
        ));
        p.to_string_lossy().into_owned()
    }

    fn seeded() -> (Store, ActivityId) {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_voters(&[
                VoterRecord::new("1B", "Ana Diaz"),
                VoterRecord::new("1B", "Luis Rojas"),
                VoterRecord::new("2A", "Sara Gil"),
            ])
            .unwrap();
        let id = video_ranking::create_activity(
            &store,
            "Science fair",
            None,
            "4321",
            &[
                VideoRecord::new("B1", "Recycling", "https://v/1"),
                VideoRecord::new("B1", "Solar", "https://v/2"),
                VideoRecord::new("B2", "Water", "https://v/3"),
            ],
        )
        .unwrap();
        video_ranking::set_status(&store, id, ActivityStatus::Open).unwrap();
        (store, id)
    }

    #[test]
    fn test_parse_ranking() {
        assert_eq!(
            parse_ranking("3, 1,2").unwrap(),
            vec![VideoId(3), VideoId(1), VideoId(2)]
        );
        assert!(parse_ranking("1,,2").is_err());
        assert!(parse_ranking("1,x").is_err());
        assert!(parse_ranking("").is_err());
    }

    #[test]
    fn test_require_admin() {
        let auth = Some(AdminAuth::new("s3cret"));
        assert!(require_admin(&auth, Some("s3cret")).is_ok());
        assert!(matches!(
            require_admin(&auth, Some("wrong")),
            Err(VidrankError::AdminRejected { .. })
        ));
        assert!(matches!(
            require_admin(&auth, None),
            Err(VidrankError::AdminRejected { .. })
        ));
        assert!(matches!(
            require_admin(&None, Some("s3cret")),
            Err(VidrankError::AdminNotConfigured { .. })
        ));
    }

    #[test]
    fn test_read_config() {
        let path = temp_path("app.json");
        fs::write(&path, r#"{"dbPath": "x.db", "adminPassword": "pw", "other": 1}"#).unwrap();
        let config = read_config(&path).unwrap();
        assert_eq!(config.db_path.as_deref(), Some("x.db"));
        assert_eq!(config.admin_password.as_deref(), Some("pw"));
        let empty = temp_path("empty.json");
        fs::write(&empty, "{}").unwrap();
        assert_eq!(read_config(&empty).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_vote_and_summary() {
        let (store, id) = seeded();
        vote(&store, id.0, " 1b ", "Ana  Diaz", "4321", "2,1,3").unwrap();
        let summary = results_summary(&store, id).unwrap();
        assert_eq!(summary["activity"]["ballots"], json!(1));
        assert_eq!(summary["activity"]["videos"], json!(3));
        assert_eq!(summary["results"][0]["videoId"], json!(2));
        assert_eq!(summary["results"][0]["points"], json!(2));
        assert_eq!(summary["results"][0]["position"], json!(1));
        assert_eq!(summary["participation"]["eligible"], json!(3));
        assert_eq!(summary["participation"]["cast"], json!(1));
        let pending = summary["participation"]["pending"].as_array().unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_results_reference_round_trip() {
        let (store, id) = seeded();
        vote(&store, id.0, "1B", "Ana Diaz", "4321", "2,1,3").unwrap();
        let out = temp_path("summary.json");
        results(&store, id.0, Some(out.as_str()), None).unwrap();
        // The freshly written summary must compare clean against itself.
        results(&store, id.0, None, Some(out.as_str())).unwrap();
        let contents = fs::read_to_string(&out).unwrap();
        fs::write(&out, contents.replace("\"points\": 2", "\"points\": 5")).unwrap();
        assert!(results(&store, id.0, None, Some(out.as_str())).is_err());
    }

    #[test]
    fn test_export_ranking_csv() {
        let (store, id) = seeded();
        vote(&store, id.0, "1B", "Ana Diaz", "4321", "2,1,3").unwrap();
        let out = temp_path("ranking.csv");
        export(&store, id.0, Some(out.as_str()), false).unwrap();
        let contents = fs::read_to_string(&out).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "position,video_id,title,group,points"
        );
        assert_eq!(lines.next().unwrap(), "1,2,Solar,B1,2");
        assert_eq!(contents.lines().count(), 4);
    }

    #[test]
    fn test_export_detailed_csv() {
        let (store, id) = seeded();
        vote(&store, id.0, "1B", "Ana Diaz", "4321", "2,1,3").unwrap();
        let out = temp_path("detail.csv");
        export(&store, id.0, Some(out.as_str()), true).unwrap();
        let contents = fs::read_to_string(&out).unwrap();
        // Header plus one row per ballot entry.
        assert_eq!(contents.lines().count(), 4);
        assert!(contents.contains("Ana Diaz"));
        assert!(contents.contains("Solar"));
    }

    #[test]
    fn test_set_status_rejects_unknown() {
        let (store, id) = seeded();
        assert!(set_status(&store, id.0, "paused").is_err());
        set_status(&store, id.0, " Closed ").unwrap();
        assert_eq!(
            video_ranking::get_activity(&store, id).unwrap().status,
            ActivityStatus::Closed
        );
    }

    #[test]
    fn test_delete_needs_confirmation() {
        let (store, id) = seeded();
        assert!(delete(&store, id.0, false).is_err());
        assert!(video_ranking::get_activity(&store, id).is_ok());
        delete(&store, id.0, true).unwrap();
        assert!(video_ranking::get_activity(&store, id).is_err());
    }

    #[test]
    fn test_update_activity_merges_fields() {
        let (store, id) = seeded();
        update_activity(&store, id.0, None, Some("finals week")).unwrap();
        let a = video_ranking::get_activity(&store, id).unwrap();
        assert_eq!(a.title, "Science fair");
        assert_eq!(a.description.as_deref(), Some("finals week"));
        assert!(update_activity(&store, id.0, None, None).is_err());
    }
}

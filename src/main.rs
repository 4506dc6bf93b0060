use clap::Parser;
use log::debug;
use snafu::prelude::*;

use video_ranking::{AdminAuth, Store};

mod args;
mod commands;

use crate::args::{Args, Command};
use crate::commands::{AppConfig, EngineSnafu, VidrankError, ADMIN_PASSWORD_ENV};

fn main() {
    let args = Args::parse();
    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    if let Err(err) = run(args) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), VidrankError> {
    let config = match args.config.as_deref() {
        Some(path) => commands::read_config(path)?,
        None => AppConfig::default(),
    };
    let db_path = args
        .db
        .clone()
        .or_else(|| config.db_path.clone())
        .unwrap_or_else(|| "data/vidrank.db".to_string());
    debug!("using database {}", db_path);
    let store = Store::open(db_path.as_str()).context(EngineSnafu {})?;

    // The environment variable wins over the config file, so a deployment can
    // override the password without editing the file.
    let admin_password = std::env::var(ADMIN_PASSWORD_ENV)
        .ok()
        .or_else(|| config.admin_password.clone());
    let admin = admin_password.map(|p| AdminAuth::new(p.as_str()));
    let provided = args.admin_password.as_deref();

    match args.command {
        Command::Init => {
            println!("database ready at {}", db_path);
            Ok(())
        }
        Command::ImportStudents { file } => {
            commands::require_admin(&admin, provided)?;
            commands::import_students(&store, file.as_str())
        }
        Command::Students { group } => commands::list_students(&store, group.as_deref()),
        Command::SetStudent {
            group,
            name,
            active,
        } => {
            commands::require_admin(&admin, provided)?;
            commands::set_student(&store, group.as_str(), name.as_str(), active)
        }
        Command::CreateActivity {
            title,
            description,
            pin,
            videos,
        } => {
            commands::require_admin(&admin, provided)?;
            commands::create_activity(
                &store,
                title.as_str(),
                description.as_deref(),
                pin.as_str(),
                videos.as_str(),
            )
        }
        Command::Activities => commands::list_activities(&store),
        Command::UpdateActivity {
            activity,
            title,
            description,
        } => {
            commands::require_admin(&admin, provided)?;
            commands::update_activity(&store, activity, title.as_deref(), description.as_deref())
        }
        Command::SetStatus { activity, status } => {
            commands::require_admin(&admin, provided)?;
            commands::set_status(&store, activity, status.as_str())
        }
        Command::BindVideos { activity, file } => {
            commands::require_admin(&admin, provided)?;
            commands::bind_videos(&store, activity, file.as_str())
        }
        Command::Videos { activity } => commands::list_videos(&store, activity),
        Command::Duplicate { activity, pin } => {
            commands::require_admin(&admin, provided)?;
            commands::duplicate(&store, activity, pin.as_deref())
        }
        Command::Delete { activity, yes } => {
            commands::require_admin(&admin, provided)?;
            commands::delete(&store, activity, yes)
        }
        Command::Purge {
            activity,
            group,
            name,
        } => {
            commands::require_admin(&admin, provided)?;
            commands::purge(&store, activity, group.as_deref(), name.as_deref())
        }
        Command::Vote {
            activity,
            group,
            name,
            pin,
            ranking,
        } => commands::vote(
            &store,
            activity,
            group.as_str(),
            name.as_str(),
            pin.as_str(),
            ranking.as_str(),
        ),
        Command::Results {
            activity,
            out,
            reference,
        } => commands::results(&store, activity, out.as_deref(), reference.as_deref()),
        Command::Participation { activity } => commands::participation(&store, activity),
        Command::Export {
            activity,
            out,
            detailed,
        } => commands::export(&store, activity, out.as_deref(), detailed),
    }
}

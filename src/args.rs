use clap::{Parser, Subcommand};

/// Classroom video-ranking elections: PIN-gated activities, one ballot per
/// student, Borda-count results.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) JSON configuration holding the database path and
    /// the admin password. Command-line flags override it.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, optional) The SQLite database to use. Overrides the path
    /// from --config; defaults to data/vidrank.db.
    #[clap(long, value_parser)]
    pub db: Option<String>,

    /// (optional) Admin password, required by mutating subcommands. Checked
    /// against the configured password (VIDRANK_ADMIN_PASSWORD or --config).
    #[clap(long, value_parser)]
    pub admin_password: Option<String>,

    /// If passed as an argument, will turn on verbose logging to the standard
    /// output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Creates the database and its schema.
    Init,

    /// Imports the student whitelist from a CSV or Excel file. [admin]
    ImportStudents {
        /// (file path) Two columns, group and student name, matched by header
        /// keyword (group/grupo, name/nombre/alumno).
        #[clap(short, long, value_parser)]
        file: String,
    },

    /// Lists the student whitelist.
    Students {
        /// (optional) Restrict the listing to one group.
        #[clap(short, long, value_parser)]
        group: Option<String>,
    },

    /// Activates or deactivates one student. [admin]
    SetStudent {
        #[clap(long, value_parser)]
        group: String,
        #[clap(long, value_parser)]
        name: String,
        /// true to reactivate, false to deactivate.
        #[clap(long, value_parser)]
        active: bool,
    },

    /// Creates an activity from a video catalog file. New activities start in
    /// draft. [admin]
    CreateActivity {
        #[clap(short, long, value_parser)]
        title: String,
        #[clap(short, long, value_parser)]
        description: Option<String>,
        /// The voting PIN for this activity. Stored as a salted digest.
        #[clap(short, long, value_parser)]
        pin: String,
        /// (file path) Video catalog: group, title and URL columns.
        #[clap(long, value_parser)]
        videos: String,
    },

    /// Lists activities with status, video count and ballot count.
    Activities,

    /// Edits an activity's title or description. [admin]
    UpdateActivity {
        #[clap(short, long, value_parser)]
        activity: i64,
        #[clap(short, long, value_parser)]
        title: Option<String>,
        #[clap(short, long, value_parser)]
        description: Option<String>,
    },

    /// Moves an activity to draft, open or closed. Reopening keeps the
    /// ballots already cast. [admin]
    SetStatus {
        #[clap(short, long, value_parser)]
        activity: i64,
        /// One of: draft, open, closed.
        #[clap(short, long, value_parser)]
        status: String,
    },

    /// Replaces an activity's video set. Refused once any ballot exists.
    /// [admin]
    BindVideos {
        #[clap(short, long, value_parser)]
        activity: i64,
        /// (file path) Video catalog: group, title and URL columns.
        #[clap(short, long, value_parser)]
        file: String,
    },

    /// Lists the videos of an activity with their ids, in the order voters
    /// see them.
    Videos {
        #[clap(short, long, value_parser)]
        activity: i64,
    },

    /// Copies an activity: videos yes, ballots never. [admin]
    Duplicate {
        #[clap(short, long, value_parser)]
        activity: i64,
        /// (optional) A new PIN for the copy; without it the original PIN
        /// keeps working.
        #[clap(short, long, value_parser)]
        pin: Option<String>,
    },

    /// Deletes an activity and all of its ballots. Irreversible. [admin]
    Delete {
        #[clap(short, long, value_parser)]
        activity: i64,
        /// Required confirmation.
        #[clap(long, takes_value = false)]
        yes: bool,
    },

    /// Removes ballots: one voter's with --group/--name, every ballot of the
    /// activity without. [admin]
    Purge {
        #[clap(short, long, value_parser)]
        activity: i64,
        #[clap(long, value_parser)]
        group: Option<String>,
        #[clap(long, value_parser)]
        name: Option<String>,
    },

    /// Submits a ballot.
    Vote {
        #[clap(short, long, value_parser)]
        activity: i64,
        #[clap(short, long, value_parser)]
        group: String,
        #[clap(short, long, value_parser)]
        name: String,
        #[clap(short, long, value_parser)]
        pin: String,
        /// Comma-separated video ids, best first, covering every video of
        /// the activity exactly once (see the videos subcommand).
        #[clap(short, long, value_parser)]
        ranking: String,
    },

    /// Computes and prints the leaderboard, the rank distribution and the
    /// rank statistics.
    Results {
        #[clap(short, long, value_parser)]
        activity: i64,
        /// (file path, optional) Also write the results summary as JSON.
        #[clap(short, long, value_parser)]
        out: Option<String>,
        /// (file path, optional) A reference summary to compare against; a
        /// difference is an error.
        #[clap(short, long, value_parser)]
        reference: Option<String>,
    },

    /// Prints turnout and the voters who have not voted yet.
    Participation {
        #[clap(short, long, value_parser)]
        activity: i64,
    },

    /// Exports the ranking (or per-ballot detail) as CSV.
    Export {
        #[clap(short, long, value_parser)]
        activity: i64,
        /// (file path, optional) Defaults to the standard output.
        #[clap(short, long, value_parser)]
        out: Option<String>,
        /// One row per ballot entry (voter, position, video) instead of the
        /// ranking.
        #[clap(long, takes_value = false)]
        detailed: bool,
    },
}

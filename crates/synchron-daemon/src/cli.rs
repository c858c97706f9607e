use clap::{Parser, Subcommand};

/// synchron - keep local CSV copies of spreadsheet tabs up to date
#[derive(Debug, Parser)]
#[command(name = "synchron")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to $SYNCHRON_CONFIG, then ~/.synchron/synchron.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Schedule every active configuration and run until Ctrl-C
    Run,

    /// Print configurations as JSON
    List {
        /// Only configurations belonging to this owner
        #[arg(long)]
        owner: Option<String>,
    },

    /// Create a configuration, run it once and schedule it
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        sheet_id: String,
        /// Display name of the spreadsheet
        #[arg(long, default_value = "")]
        sheet_name: String,
        #[arg(long)]
        tab: String,
        /// Destination CSV file
        #[arg(long)]
        path: String,
        /// Minutes between runs (at least 5)
        #[arg(long)]
        interval: u32,
        /// Store the configuration without scheduling it
        #[arg(long)]
        inactive: bool,
    },

    /// Change fields of a configuration and reschedule it
    Update {
        #[arg(value_name = "ID")]
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        sheet_id: Option<String>,
        #[arg(long)]
        sheet_name: Option<String>,
        #[arg(long)]
        tab: Option<String>,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        interval: Option<u32>,
        #[arg(long)]
        active: Option<bool>,
    },

    /// Unschedule and delete a configuration
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Run one sync now without touching the schedule
    Trigger {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Store or replace an owner's access credential
    OwnerSet {
        #[arg(long)]
        id: String,
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },

    /// List spreadsheets visible to an owner
    Sources {
        #[arg(long)]
        owner: String,
    },

    /// List the tabs of a spreadsheet
    Tabs {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        sheet_id: String,
    },

    /// Print the raw rows of a tab without writing anything
    Preview {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        sheet_id: String,
        #[arg(long)]
        tab: String,
    },
}

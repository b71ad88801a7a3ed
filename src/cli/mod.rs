// Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "chapterhouse")]
#[command(about = "Chapterhouse - Serialized fiction publishing", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "HOST")]
        host: Option<String>,
    },

    /// Run database migrations
    Migrate,

    /// Publish every scheduled chapter that is due
    PublishDue,

    /// Rebuild the search index from the database
    Reindex,

    /// Grant the admin role to a user
    Promote {
        /// Username to promote
        username: String,
    },

    /// Show site statistics from a running server
    Stats,

    /// Search stories on a running server
    Search {
        /// Search query
        query: String,

        /// Result page
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
}

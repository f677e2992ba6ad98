use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gator: follow RSS feeds and browse their posts from the terminal
#[derive(Parser, Debug)]
#[command(name = "gator", version)]
#[command(about = "Follow RSS feeds and browse their posts from the terminal", long_about = None)]
pub struct Cli {
    /// Config file (defaults to $GATOR_CONFIG, then ~/.gatorconfig.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },

    /// Switch to an existing user
    Login { name: String },

    /// Delete every user, feed, follow and post
    Reset,

    /// List users
    Users,

    /// Fetch the stalest feed every interval (e.g. 30s, 1m, 1h30m) until Ctrl-C
    Agg {
        #[arg(value_name = "TIME_BETWEEN_REQS")]
        interval: String,
    },

    /// Add a feed and follow it
    Addfeed { name: String, url: String },

    /// List all feeds and who added them
    Feeds,

    /// Follow an existing feed by URL
    Follow { url: String },

    /// List feeds the current user follows
    Following,

    /// Stop following a feed by URL
    Unfollow { url: String },

    /// Show the newest posts from followed feeds
    Browse {
        #[arg(default_value_t = 2, value_parser = clap::value_parser!(i64).range(1..))]
        limit: i64,
    },
}

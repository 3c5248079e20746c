use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "adwatch")]
#[command(about = "Multi-subscriber classified listing watcher with Notebrook notifications")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read chat commands from stdin and watch listings until EOF or Ctrl-C
    Run {
        /// Chat id that unprefixed commands act on (`@<id> /cmd` addresses another)
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        chat: i64,

        /// Dry run - print new listings instead of sending them to Notebrook
        #[arg(long)]
        dry_run: bool,
    },

    /// Fetch a search URL once and print its listings
    Check {
        /// Listing API search URL
        url: String,
    },
}

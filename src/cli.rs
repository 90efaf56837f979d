use clap::Parser;

/// Command-line options for mailbot.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Run a single sync pass over all active accounts, then exit.
    #[arg(long)]
    pub sync_once: bool,

    /// Process the pending job queue once, then exit.
    #[arg(long)]
    pub drain_jobs: bool,
}

// src/cli.rs
use std::path::PathBuf;

use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "gymdesk", about = "Keeps a gym console's notification feed in sync")]
pub struct Cli {
    /// Settings file; layered defaults and GYMDESK__* variables when omitted
    #[structopt(short, long, parse(from_os_str))]
    pub config: Option<PathBuf>,

    /// Identity the notification cache is keyed by
    #[structopt(short, long, default_value = "default")]
    pub principal: String,

    /// Poll once, print the feed and exit
    #[structopt(long)]
    pub once: bool,

    /// Mark every notification read after the first poll
    #[structopt(long)]
    pub mark_all_read: bool,
}

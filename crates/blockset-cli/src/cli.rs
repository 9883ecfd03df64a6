use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blockset",
    about = "BlockSet: inspect and maintain a content-addressed record store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store root directory
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the store layout and a default blockset.toml
    Init,
    /// List live records
    Ls(LsArgs),
    /// Show the commit history of a record
    Log(LogArgs),
    /// Write an object's bytes to stdout
    Cat(HashArgs),
    /// Store a file as an attachment and print its hash
    Put(PutArgs),
    /// Print the on-disk path of an object
    Path(HashArgs),
    /// Collect unreferenced objects
    Gc,
    /// Re-hash every object and check record histories
    Fsck,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(long)]
    pub kind: Option<String>,
}

#[derive(Args)]
pub struct LogArgs {
    pub record_id: String,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct HashArgs {
    pub hash: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub file: PathBuf,
}

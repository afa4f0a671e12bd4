use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "canopy",
    about = "Canopy — a content-addressed, branch-and-commit versioned store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Endpoint URI: tcp://host:port or unix://path.
    #[arg(long, global = true, default_value = "tcp://127.0.0.1:8888")]
    pub uri: String,

    /// Require TLS on the client connection (terminated externally).
    #[arg(long, global = true)]
    pub tls: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start a repository server
    Serve(ServeArgs),
    /// Check connectivity
    Ping,
    /// Read the contents at a path on the current branch
    Get(GetArgs),
    /// Bind contents at a path, creating a commit
    Set(SetArgs),
    /// Remove the binding at a path, creating a commit
    Remove(RemoveArgs),
    /// List branches
    Branches,
    /// Show the head commit of a branch
    Head(HeadArgs),
    /// Export the reachable object graph to a file
    Export(ExportArgs),
    /// Import a previously exported slice from a file
    Import(ImportArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// TLS certificate for a fronting terminator.
    #[arg(long, requires = "key")]
    pub cert: Option<PathBuf>,
    /// TLS private key for a fronting terminator.
    #[arg(long, requires = "cert")]
    pub key: Option<PathBuf>,
    /// Backend-specific: expose a lower storage layer.
    #[arg(long)]
    pub with_lower_layer: bool,
    /// Port for the auxiliary GraphQL interface.
    #[arg(long)]
    pub graphql_port: Option<u16>,
    /// The branch new sessions start on.
    #[arg(long, default_value = "main")]
    pub default_branch: String,
}

#[derive(Args)]
pub struct GetArgs {
    /// Path, e.g. "a/b".
    pub path: String,
    /// Branch to read from (defaults to the session branch).
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct SetArgs {
    pub path: String,
    pub value: String,
    #[arg(short, long, default_value = "update")]
    pub message: String,
    #[arg(long, default_value = "canopy")]
    pub author: String,
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub path: String,
    #[arg(short, long, default_value = "remove")]
    pub message: String,
    #[arg(long, default_value = "canopy")]
    pub author: String,
    #[arg(short, long)]
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct HeadArgs {
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Output file.
    pub output: PathBuf,
    /// Bound on commit-ancestry depth (1 = heads only).
    #[arg(long)]
    pub depth: Option<u32>,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Input file produced by `canopy export`.
    pub input: PathBuf,
}

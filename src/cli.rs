use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gitlapse")]
#[command(about = "Longitudinal repository snapshot and metric extractor", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract yearly snapshots and metrics for a repository list
    Extract {
        /// CSV file listing repositories (requires a repo_name column)
        #[arg(long = "repos-csv")]
        repos_csv: PathBuf,

        /// Directory for clones, per-repository results, and output tables
        #[arg(short, long, default_value = "gitlapse_out")]
        output_dir: PathBuf,

        /// Optional name,url side file overriding clone URLs
        #[arg(long = "urls-file")]
        urls_file: Option<PathBuf>,

        /// Optional name,owner map for repositories listed without a usable URL
        #[arg(long = "owner-map")]
        owner_map: Option<PathBuf>,

        /// GitHub API token; without it the collaboration pass is skipped
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Path to the code-smell detector jar; without it the technical
        /// pass is skipped
        #[arg(long = "detector-jar")]
        detector_jar: Option<PathBuf>,

        /// Maximum project-years to extract per repository
        #[arg(long = "max-years", default_value = "5")]
        max_years: u32,

        /// Resume from this index in the repository list
        #[arg(long = "start-from", default_value = "0")]
        start_from: usize,

        /// Configuration file (TOML) overriding built-in defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Clone and resolve snapshots but collect local metrics only
        #[arg(long = "dry-run")]
        dry_run: bool,

        /// Skip the technical pass even when a detector jar is given
        #[arg(long = "skip-smells")]
        skip_smells: bool,

        /// Increase verbosity (can be repeated: -v, -vv)
        #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
        verbosity: u8,
    },

    /// Merge a social metrics table with a technical metrics table
    Merge {
        /// CSV table holding the social and indicator columns
        #[arg(long)]
        social: PathBuf,

        /// CSV table holding the technical smell columns
        #[arg(long)]
        technical: PathBuf,

        /// Merged output table
        #[arg(short, long)]
        output: PathBuf,

        /// Increase verbosity (can be repeated: -v, -vv)
        #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
        verbosity: u8,
    },
}

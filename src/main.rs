use anyhow::Result;
use clap::Parser;
use gitlapse::cli::{Cli, Commands};
use gitlapse::commands::{extract, merge};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            repos_csv,
            output_dir,
            urls_file,
            owner_map,
            token,
            detector_jar,
            max_years,
            start_from,
            config,
            dry_run,
            skip_smells,
            verbosity,
        } => {
            init_logging(verbosity);
            let summary = extract::run(extract::ExtractOptions {
                repos_csv,
                output_dir,
                urls_file,
                owner_map,
                token,
                detector_jar,
                max_years,
                start_from,
                config,
                dry_run,
                skip_smells,
            })?;
            println!(
                "{} repositories processed, {} failed, {} snapshots, {} API calls",
                summary.repos_processed,
                summary.repos_failed,
                summary.snapshots,
                summary.api_calls
            );
            if summary.interrupted {
                std::process::exit(130);
            }
            Ok(())
        }
        Commands::Merge {
            social,
            technical,
            output,
            verbosity,
        } => {
            init_logging(verbosity);
            let summary = merge::run(&social, &technical, &output)?;
            println!(
                "{} rows merged into {} ({} matched)",
                summary.rows,
                output.display(),
                summary.matched
            );
            Ok(())
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

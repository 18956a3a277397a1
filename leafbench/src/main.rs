use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use leafbench::{GenerateArgs, GenerateConfig, RunArgs, RunConfig};

#[derive(Parser)]
#[command(name = "leafbench")]
#[command(about = "Bulk-load and partitioned-insert benchmark for leaftree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Bulk load one partition, insert the rest, export leaf models")]
    Run(RunArgs),

    #[command(about = "Write synthetic partition files")]
    Generate(GenerateArgs),
}

fn init_logging(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Run(args) => {
            let config = RunConfig::try_from(args).context("invalid run options")?;
            let report = leafbench::run(&config).context("benchmark run failed")?;
            report.print_summary();

            let degraded = report.degraded_phases().count();
            if degraded > 0 {
                tracing::warn!(degraded, "some phases did not insert or export their whole partition");
            }
        }
        Commands::Generate(args) => {
            let config = GenerateConfig::from(args);
            leafbench::generate(&config).with_context(|| {
                format!("cannot generate partitions in {}", config.source.root().display())
            })?;
        }
    }
    Ok(())
}

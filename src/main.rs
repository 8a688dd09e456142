use anyhow::Result;
use clap::{Parser, Subcommand};
use crosstab::presentation::cli_summary::{print_backup_summary, print_restore_summary};
use crosstab::AppConfig;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Debug)]
#[command(
    name = "crosstab",
    about = "crosstab — schema-aware logical database backup and restore."
)]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reflect the source database and write a backup script to stdout.
    Backup {
        /// Print the reflected table plan without connecting for data or writing any file.
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply a previously generated backup script against the configured target.
    Restore {
        /// Path to the backup script to execute.
        script: String,
        /// Validate the script's structure without executing any statement.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crosstab=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::load(Some(&cli.config))?;

    match cli.command {
        Command::Backup { dry_run } => {
            if dry_run {
                let tables = crosstab::reflect_schema(&cfg).await?;
                println!("Backup plan for {}:", cfg.source.dbname);
                for table in &tables {
                    println!(
                        "  {} ({} column(s), {} index(es), {} constraint(s), {} trigger(s))",
                        table.name,
                        table.columns.len(),
                        table.indexes.len(),
                        table.constraints.len(),
                        table.triggers.len(),
                    );
                }
                return Ok(());
            }

            let output = crosstab::backup(&cfg).await?;
            print_backup_summary(&output.status);
            print!("{}", output.script);
        }
        Command::Restore { script, dry_run } => {
            let contents = std::fs::read_to_string(&script)?;

            if dry_run {
                crosstab::validate_backup_script(&contents)?;
                println!("{script} looks like a well-formed backup script.");
                return Ok(());
            }

            let status = crosstab::restore(&cfg, &contents).await?;
            print_restore_summary(&status);
            if !status.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fw_config::WatcherConfig;
use fw_observe::{DirectoryObserver, ObserveError};

#[derive(Parser)]
#[command(name = "fw")]
#[command(about = "Run-file watcher operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Persisted watermarks
    State {
        #[command(subcommand)]
        cmd: StateCmd,
    },

    /// Recent failed / skipped runs from the audit trail
    Failures {
        #[arg(long)]
        instrument: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Dry-run observation of one instrument (no state, no publish)
    Scan {
        #[arg(long)]
        instrument: String,

        /// Print every candidate path
        #[arg(long, default_value_t = false)]
        files: bool,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations (idempotent).
    Migrate,
}

#[derive(Subcommand)]
enum StateCmd {
    /// Print watermarks.
    Show {
        #[arg(long)]
        instrument: Option<String>,
    },

    /// Overwrite a watermark. Lowering it re-announces every run above the
    /// new value, including runs skipped earlier.
    Set {
        #[arg(long)]
        instrument: String,

        #[arg(long)]
        sequence: i64,

        /// Acknowledge the overwrite.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = connect().await?;
            match cmd {
                DbCmd::Status => {
                    let s = fw_db::status(&pool).await?;
                    println!("db_ok={} has_state_table={}", s.ok, s.has_state_table);
                }
                DbCmd::Migrate => {
                    fw_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::State { cmd } => match cmd {
            StateCmd::Show { instrument } => {
                let pool = connect().await?;
                let states = fw_db::list_states(&pool, instrument.as_deref()).await?;
                if states.is_empty() {
                    println!("no watcher state recorded");
                }
                for s in states {
                    println!(
                        "instrument={} last_published={} updated_at={}",
                        s.instrument_id,
                        s.last_published_sequence,
                        s.updated_at.to_rfc3339()
                    );
                }
            }
            StateCmd::Set {
                instrument,
                sequence,
                yes,
            } => {
                if sequence < 0 {
                    anyhow::bail!("sequence must be >= 0");
                }
                if !yes {
                    anyhow::bail!(
                        "REFUSING STATE SET: overwriting the watermark of {instrument} can re-announce or hide runs. Re-run with: `fw state set --instrument {instrument} --sequence {sequence} --yes`"
                    );
                }
                let pool = connect().await?;
                fw_db::force_set_last_published(&pool, &instrument, sequence).await?;
                println!("state_set=true instrument={instrument} last_published={sequence}");
            }
        },

        Commands::Failures { instrument, limit } => {
            let pool = connect().await?;
            let rows = fw_db::recent_failures(&pool, instrument.as_deref(), limit).await?;
            for r in rows {
                println!(
                    "{} instrument={} sequence={} status={} reason={}",
                    r.recorded_at.to_rfc3339(),
                    r.instrument_id,
                    r.sequence,
                    r.status,
                    r.reason
                );
            }
        }

        Commands::Scan { instrument, files } => {
            let cfg = WatcherConfig::from_env().context("invalid configuration")?;
            let inst = cfg
                .instrument(&instrument)
                .with_context(|| format!("unknown instrument {instrument}"))?;
            let observer = DirectoryObserver::new(cfg.scan_depth);

            println!("instrument={} watch_dir={}", inst.id, inst.watch_dir.display());
            let (candidates, control) = match observer.scan(inst) {
                Ok(report) => (report.candidates, report.control_sequence),
                Err(ObserveError::ControlFileCorrupt { path, reason }) => {
                    println!("degraded=true control_file={} reason={reason}", path.display());
                    (observer.list(inst)?, None)
                }
                Err(e) => return Err(e.into()),
            };

            match control {
                Some(seq) => println!("control_sequence={seq}"),
                None => println!("control_sequence=none"),
            }
            println!(
                "candidates={} highest={}",
                candidates.len(),
                candidates
                    .last()
                    .map(|r| r.sequence.to_string())
                    .unwrap_or_else(|| "none".to_string())
            );
            if files {
                for r in &candidates {
                    println!("{} {}", r.sequence, r.path.display());
                }
            }
        }
    }

    Ok(())
}

async fn connect() -> Result<fw_db::PgPool> {
    let settings = fw_config::database_from_env().context("invalid database configuration")?;
    fw_db::connect(&settings).await
}

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::error;

use odin_etl::config::{DatabaseConfig, SourceConfig};
use odin_etl::db::Store;
use odin_etl::error::Result;
use odin_etl::logging;
use odin_etl::pipeline::{Deadline, Pipeline};

#[derive(Parser)]
#[command(name = "odin_etl")]
#[command(about = "ODiN mobility star-schema ETL")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the star-schema DDL (the provisioning step)
    Migrate,
    /// Run the full ETL pipeline against a provisioned store
    Run {
        /// Overall timeout budget in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Rows per fact upsert transaction
        #[arg(long, default_value_t = 500)]
        batch_size: usize,
    },
}

fn main() {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("Pipeline failed: {e}");
        eprintln!("❌ Pipeline failed: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Migrate => {
            let db = DatabaseConfig::from_env()?;
            let store = Store::open(&db.path)?;
            store.run_migrations()?;
            println!("✅ Star schema provisioned at {}", db.path.display());
        }
        Commands::Run {
            timeout_secs,
            batch_size,
        } => {
            let source = SourceConfig::from_env()?;
            let db = DatabaseConfig::from_env()?;
            let mut store = Store::open(&db.path)?;

            let deadline = match timeout_secs {
                Some(secs) => Deadline::after(Duration::from_secs(secs)),
                None => Deadline::none(),
            };

            let summary = Pipeline::new(source)
                .with_batch_size(batch_size)
                .run(&mut store, &deadline)?;

            println!("\n📊 Pipeline results:");
            println!("   Rows read:     {}", summary.rows_read);
            println!("   Rows rejected: {}", summary.rows_rejected);
            println!("   Rows dropped:  {}", summary.rows_dropped_empty);
            println!("   Rows loaded:   {}", summary.rows_loaded);
            for (table, rows) in &summary.dimensions_loaded {
                println!("   {table}: {rows} rows");
            }
        }
    }
    Ok(())
}

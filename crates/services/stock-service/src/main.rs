//! Stock Service - listings and portfolios behind a scoped container.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stock_service_lib::config::StockServiceConfig;
use stock_service_lib::App;

#[derive(Parser)]
#[command(name = "stock-service")]
#[command(about = "Stock listing and portfolio service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the container and resolve every registration
    Verify,
    /// Run sample operations and print the resulting read models
    Demo {
        /// Print the audit log as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (reads .env)
    let config = StockServiceConfig::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.service.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let app = App::bootstrap(config).await?;

    match cli.command {
        Commands::Verify => {
            let report = app.verify().await?;
            for (key, lifetime) in &report.services {
                println!("{:<10} {}", lifetime.to_string(), key);
            }
            println!("{} services verified", report.len());
        }
        Commands::Demo { json } => {
            for step in app.run_demo().await? {
                match step.outcome {
                    Ok(summary) => println!("[ok]     {}: {}", step.name, summary),
                    Err(error) => println!("[failed] {}: {}", step.name, error),
                }
            }

            let cache = app.listing_cache()?;
            println!("\nListing cache:");
            for symbol in cache.symbols() {
                if let Some(entry) = cache.get(&symbol) {
                    println!("  {:<6} {} ({})", symbol, entry.name, entry.sector);
                }
            }

            let audit = app.audit_log()?;
            println!("\nAudit log:");
            if json {
                println!("{}", serde_json::to_string_pretty(&audit.entries())?);
            } else {
                for entry in audit.entries() {
                    println!(
                        "  #{:<4} {:<24} {}",
                        entry.sequence, entry.event_type, entry.aggregate_id
                    );
                }
            }
        }
    }

    Ok(())
}

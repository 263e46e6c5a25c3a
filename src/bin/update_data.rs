use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use market_drivers::{init_logging, log_app_start, AppConfig};

#[derive(Parser, Debug)]
#[command(
    name = "update_data",
    about = "Build the market-drivers table once and write it to disk",
    version
)]
struct Args {
    /// Write here instead of MDRV_DATA_FILE.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Purge cached news before building.
    #[arg(long)]
    clear_news_cache: bool,

    /// Print the written table as CSV on stdout.
    #[arg(long)]
    print: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let cfg = AppConfig::from_env()?;
    init_logging(&cfg.logging)?;
    log_app_start("update_data", &cfg.logging);

    let builder = cfg.dashboard_builder()?;
    if args.clear_news_cache {
        builder.news().cache().clear()?;
    }

    let output = args.output.unwrap_or_else(|| cfg.data_file.clone());
    let table = builder
        .build_and_persist(&output)
        .map_err(|err| format!("could not write {}: {err}", output.display()))?;

    if args.print {
        std::io::stdout().write_all(&table.to_csv_bytes()?)?;
    } else {
        println!(
            "wrote {} rows to {} (last updated {})",
            table.rows.len(),
            output.display(),
            table.last_updated().unwrap_or("unknown")
        );
    }

    Ok(())
}

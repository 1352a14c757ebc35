use std::fs;
use std::path::Path;

use anyhow::Result;
use clap::Parser;

mod countdown;
mod local_store;
mod models;
mod repositories;
mod services;
mod settings;
mod validation;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "portal.toml")]
    config: String,
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log4rs)?;
    let settings = settings::Settings::new(&args.config)
        .map_err(|e| anyhow::anyhow!("Could not load settings from {}: {}", args.config, e))?;

    log::info!("Starting package portal.");
    services::start_services(settings, args.listen).await
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}

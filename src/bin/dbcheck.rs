use dblayer::config::{default_config_path, load_config, Config};
use dblayer::{ConnectionManager, SqliteDriver};
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    // Initialize the logging system using tracing subscriber
    tracing_subscriber::fmt::init();

    // Parse CLI arguments
    let path = std::env::args()
        .nth(1)
        .map(Into::into)
        .or_else(default_config_path);

    let config = match path {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            match load_config(&path) {
                Ok(config) => config,
                Err(e) => {
                    error!("Failed to load {}: {}", path.display(), e);
                    return ExitCode::FAILURE;
                }
            }
        }
        _ => {
            info!("No configuration file found, using defaults");
            Config::default()
        }
    };

    let mut db = ConnectionManager::from_config(SqliteDriver, &config.retry);
    if let Err(e) = db.connect(&config.database) {
        eprintln!("Failed to connect to database: {}", e);
        return ExitCode::FAILURE;
    }

    match db.store_query("SELECT 1 AS ok") {
        Ok(Some(result)) if result.get_int("ok") == 1 => {
            println!(
                "Connected ({}); max packet size {} bytes",
                db.driver_name(),
                db.max_packet_size()
            );
            ExitCode::SUCCESS
        }
        Ok(_) => {
            eprintln!("Connected, but the test query returned nothing");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Test query failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

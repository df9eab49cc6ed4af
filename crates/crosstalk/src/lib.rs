//! # Crosstalk - Peer Simulator
//!
//! Opens several peers on one broadcast channel through the crosstalk event
//! bus, has the first peer send a batch of events, and checks that every
//! other peer receives them.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! crosstalk
//!
//! # Four peers exchanging ten "order" events
//! crosstalk --peers 4 --event order --payload '{"id": 7}' --count 10
//!
//! # Carry the payload as base64 bytes, with JSON logs
//! crosstalk --binary --json-logs
//! ```
//!
//! ## Configuration
//!
//! Settings are loaded from a TOML file (default: `crosstalk.toml`). If the
//! file doesn't exist, a default configuration is written. Command-line
//! options override file values, and `RUST_LOG` overrides the log level.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for the crosstalk binary.
///
/// # Exit Codes
///
/// * **0**: Every expected delivery arrived
/// * **1**: Error during startup, configuration, or an incomplete session
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use app::SessionSummary;
pub use config::{LoggingSettings, SessionSettings};

//! ovpn-scout CLI application entry point.
//!
//! # Startup Flow
//!
//! ```text
//!   ┌──────────────────┐
//!   │  Parse CLI Args  │ ◄── clap parses command-line arguments
//!   └────────┬─────────┘
//!            │
//!            ▼
//!   ┌──────────────────┐       ┌─────────────────┐
//!   │ --generate-config│──────▶│ Write default   │────▶ Exit
//!   │    specified?    │       │ config & exit   │
//!   └────────┬─────────┘       └─────────────────┘
//!            │ No
//!            ▼
//!   ┌──────────────────┐
//!   │  Load Config     │ ◄── Defaults → File → CLI
//!   └────────┬─────────┘
//!            │
//!            ▼
//!   ┌──────────────────┐
//!   │ Initialize       │ ◄── Set up tracing subscriber
//!   │   Logging        │
//!   └────────┬─────────┘
//!            │
//!            ▼
//!   ┌──────────────────┐
//!   │ Run Command      │ ◄── control::run_main()
//!   └────────┬─────────┘
//!            │
//!            ▼
//!   ┌──────────────────┐
//!   │  Exit with       │
//!   │  status code     │
//!   └──────────────────┘
//! ```
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success, or a supervised connection held for its window |
//! | 1 | Error, or a supervised attempt failed |
//! | 130 | Interrupted by CTRL+C |

use clap::Parser;
use std::process::ExitCode;

use ovpn_scout::{config, control, logger, plog_fmt, CliArgs, Completion, Config, LogLevel};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(Completion::Interrupted) => ExitCode::from(130),
        Ok(completion) if completion.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ovpn_scout::Result<Completion> {
    let args = CliArgs::parse();

    if let Some(ref output_path) = args.generate_config {
        let config = Config::default();
        let toml = config.to_toml()?;
        std::fs::write(output_path, toml)?;
        println!("Wrote default config to {}", output_path.display());
        return Ok(Completion::Done);
    }

    let Some(command) = args.command.clone() else {
        return Err(ovpn_scout::Error::Config(
            "no command given (try --help)".to_string(),
        ));
    };

    let config = config::load_config(&args)?;

    logger::init(config.loglevel, config.logfile.as_deref())?;

    plog_fmt!(LogLevel::Debug, "ovpn-scout {} starting", control::VERSION);
    plog_fmt!(LogLevel::Debug, "Listing: {}", config.listing_url);
    plog_fmt!(LogLevel::Debug, "Config root: {}", config.config_root.display());
    plog_fmt!(LogLevel::Debug, "Blacklist: {}", config.blacklist_file.display());

    control::run_main(config, command).await
}

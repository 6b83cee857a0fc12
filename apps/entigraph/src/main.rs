//! # Entigraph
//!
//! The command-line binary for the versioned entity graph store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            apps/entigraph (THE BINARY)       │
//! │                                              │
//! │   ┌──────────────┐      ┌────────────────┐   │
//! │   │   CLI        │      │  TOML config   │   │
//! │   │  (clap)      │      │  (--config)    │   │
//! │   └──────┬───────┘      └───────┬────────┘   │
//! │          └──────────┬───────────┘            │
//! │                     ▼                        │
//! │             ┌────────────────┐               │
//! │             │ entigraph-core │               │
//! │             │  (THE STORE)   │               │
//! │             └────────────────┘               │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! entigraph init
//! entigraph create -a <account> -t Page -p '{"title":"Home"}' --versioned
//! entigraph update -a <account> -e <entity> -p '{"title":"Start"}' -t Page
//! entigraph aggregate -a <account> -t Page -o '{"itemsPerPage":5}'
//! ```

use clap::Parser;
use entigraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // ENTIGRAPH_LOG_FORMAT=json enables machine-parseable logs. Logs go to
    // stderr; stdout carries only command output.
    let log_format = std::env::var("ENTIGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "entigraph=info,entigraph_core=warn".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();
    let json_mode = cli.json_mode;

    if !cli.quiet && !json_mode {
        print_banner();
    }

    match cli::execute(cli) {
        Ok(output) => {
            let rendered = if json_mode {
                serde_json::to_string(&output)
            } else {
                serde_json::to_string_pretty(&output)
            };
            println!("{}", rendered.unwrap_or_default());
        }
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the startup banner.
fn print_banner() {
    eprintln!(
        "entigraph v{} - versioned entity graph store",
        env!("CARGO_PKG_VERSION")
    );
}

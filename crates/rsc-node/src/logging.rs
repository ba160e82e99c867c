use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty", "compact" or "json"
    pub format: String,
    pub file_output: Option<PathBuf>,
    /// Per-target levels, e.g. `rsc_storage = "warn"`.
    pub module_filters: BTreeMap<String, String>,
    pub show_boot_banner: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            module_filters: BTreeMap::new(),
            show_boot_banner: true,
        }
    }
}

pub fn display_boot_banner(version: &str) {
    println!();
    println!("  ╔══════════════════════════════════════╗");
    println!("  ║   RSC Ledger Node  v{:<17}║", version);
    println!("  ║   balances · bounties · staking      ║");
    println!("  ╚══════════════════════════════════════╝");
    println!();
}

/// Resolve the filter directive: `-v` flags beat the configured level.
pub fn log_level(config: &LoggingConfig, cli_verbose: u8) -> &str {
    match cli_verbose {
        0 => &config.level,
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize the logging system based on configuration
pub fn init_logging(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<()> {
    let level = log_level(config, cli_verbose);

    let mut filter = EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("rsc={}", level)),
    );
    for (module, module_level) in &config.module_filters {
        filter = filter.add_directive(format!("{}={}", module, module_level).parse()?);
    }

    let file = match &config.file_output {
        Some(path) => Some(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        ),
        None => None,
    };
    let file_layer = file.map(|f| fmt::layer().json().with_writer(Arc::new(f)).with_ansi(false));

    let subscriber = tracing_subscriber::registry().with(filter).with(file_layer);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_thread_ids(true)
                        .with_line_number(true)
                        .with_file(true),
                )
                .try_init()?;
        }
        "compact" => {
            subscriber
                .with(fmt::layer().compact().with_target(false))
                .try_init()?;
        }
        _ => {
            let show_location = matches!(level, "debug" | "trace");
            subscriber
                .with(
                    fmt::layer()
                        .with_target(show_location)
                        .with_line_number(show_location)
                        .with_file(show_location),
                )
                .try_init()?;
        }
    }
    Ok(())
}

//! Command-line interface for greetwatch
//!
//! Provides argument parsing and subcommand handling for the greetwatch binary.

use clap::{Parser, Subcommand};

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Greeting service with Prometheus handler instrumentation
#[derive(Parser)]
#[command(name = "greetwatch")]
#[command(version)]
#[command(about = "Greeting service with Prometheus handler instrumentation")]
#[command(
    long_about = "greetwatch serves a few greeting endpoints, each instrumented with \
    request counters, in-progress gauges or latency histograms, and exposes the \
    metrics at /metrics for Prometheus to scrape."
)]
pub struct Cli {
    /// Path to configuration file (built-in defaults are used if the default file is absent)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Config path to load, and whether it was given explicitly
    pub fn config_path(&self) -> (&str, bool) {
        match &self.config {
            Some(path) => (path.as_str(), true),
            None => (DEFAULT_CONFIG_PATH, false),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# greetwatch configuration
#
# Every setting is optional; the values below are the defaults.

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"
port = 8000

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides it)
log_level = "info"

# Metric names are <namespace>_<subsystem>_<name>, e.g. greetwatch_api_request_latency
namespace = "greetwatch"
subsystem = "api"

# Expose process_* metrics (CPU, memory, open fds). Linux only.
process_metrics = true

# Latency histogram buckets in seconds. Prometheus defaults when omitted.
# latency_buckets = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]

[greetings]
# Simulated work before each greeting is returned
birthday_delay_ms = 20000
greeting_delay_ms = 5000
"#
}

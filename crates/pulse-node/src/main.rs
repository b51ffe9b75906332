use std::path::PathBuf;

use clap::Parser;
use pulse_node::{Validator, ValidatorConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Pulse validator daemon.
#[derive(Parser, Debug)]
#[command(
    name = "pulse-node",
    version,
    about = "Pulse micro-batch validator node",
    long_about = "Runs a Pulse validator that accepts transactions, seals them \
                  into merkle-committed micro-batches at a fixed cadence, tracks \
                  validator acknowledgments for instant finality, and commits \
                  finalised batches as blocks."
)]
struct Cli {
    /// Directory for the ledger store.
    #[arg(short, long, default_value = "./pulse-data", env = "PULSE_DATA_DIR")]
    data_dir: PathBuf,

    /// Identifier this node acks and produces blocks under (random if omitted).
    #[arg(long, env = "PULSE_VALIDATOR_ID")]
    validator_id: Option<String>,

    /// Micro-batch cadence in milliseconds.
    #[arg(long, default_value_t = 10, env = "PULSE_BATCH_INTERVAL_MS")]
    batch_interval_ms: u64,

    /// Maximum transactions per micro-batch.
    #[arg(long, default_value_t = 1000, env = "PULSE_MAX_BATCH_SIZE")]
    max_batch_size: usize,

    /// Size of the validator set acknowledgments are measured against.
    #[arg(long, default_value_t = 1, env = "PULSE_TOTAL_VALIDATORS")]
    total_validators: usize,

    /// Fraction of validators whose acks grant instant finality.
    #[arg(long, default_value_t = 0.20, env = "PULSE_INSTANT_THRESHOLD")]
    instant_threshold: f64,

    /// Batch finality timeout in milliseconds.
    #[arg(long, default_value_t = 10, env = "PULSE_TIMEOUT_WINDOW_MS")]
    timeout_window_ms: i64,

    /// Suppress log output to stderr (run silently).
    #[arg(short, long, default_value_t = false, env = "PULSE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_filter = if cli.quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::from_default_env().add_directive("info".parse()?)
    };
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let mut config = ValidatorConfig::on_dir(cli.data_dir);
    if let Some(validator_id) = cli.validator_id {
        config.validator_id = validator_id;
    }
    config.batch_interval_ms = cli.batch_interval_ms;
    config.max_batch_size = cli.max_batch_size;
    config.total_validators = cli.total_validators;
    config.instant_threshold = cli.instant_threshold;
    config.timeout_window_ms = cli.timeout_window_ms;

    info!(
        validator = %config.validator_id,
        batch_interval_ms = config.batch_interval_ms,
        max_batch_size = config.max_batch_size,
        total_validators = config.total_validators,
        "Starting Pulse validator"
    );

    let (mut validator, mut events) = Validator::new(config)?;
    validator.start();

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!("ValidatorEvent: {event:?}");
        }
    });

    // Runs the periodic batch pipeline until cancelled (e.g. via Ctrl-C).
    validator.run().await;

    Ok(())
}

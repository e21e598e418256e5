use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use mailstack::config::load_or_default;
use mailstack::lifecycle::{CommandOutcome, ControlError, StackController};
use mailstack::observability::init_logging;
use mailstack::process::SystemProcesses;
use mailstack::queue::RedisBackend;

/// Exit status when the command reached its intended state.
const EXIT_OK: u8 = 0;
/// The stack did not reach the intended state.
const EXIT_MISMATCH: u8 = 1;
/// Configuration or unexpected failure.
const EXIT_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "mailstack")]
#[command(about = "Start, stop and inspect the mail processing stack", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        env = "MAILSTACK_CONFIG",
        default_value = "/etc/mailstack/mailstack.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Start brokers and workers, then wait until healthy
    Start,
    /// Drain failed queues and stop everything
    Stop,
    /// Stop, then start
    Restart,
    /// Report whether the stack is running
    Status,
    /// Relaunch only the components that are down
    Recover,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mailstack: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };
    init_logging(&config.observability);
    tracing::info!(config = %cli.config.display(), "mailstack v0.1.0");

    let procs = Arc::new(SystemProcesses::new(Duration::from_millis(
        config.timing.terminate_grace_ms,
    )));
    let queues = Arc::new(RedisBackend::new(Duration::from_millis(
        config.timing.probe_timeout_ms,
    )));
    let mut controller = StackController::new(config, procs, queues);

    match run(&mut controller, cli.command).await {
        Ok(outcome) => {
            println!("{}", outcome.message);
            tracing::info!(command = %outcome.command, success = outcome.success, "Done");
            ExitCode::from(if outcome.success { EXIT_OK } else { EXIT_MISMATCH })
        }
        Err(e) => {
            tracing::error!(error = %e, "Command aborted");
            println!("mailstack: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn run(
    controller: &mut StackController,
    command: Commands,
) -> Result<CommandOutcome, ControlError> {
    match command {
        Commands::Start => controller.start().await,
        Commands::Stop => controller.stop().await,
        Commands::Restart => controller.restart().await,
        Commands::Status => Ok(controller.status().await),
        Commands::Recover => controller.recover().await,
    }
}

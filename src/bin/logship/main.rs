// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::metadata::LevelFilter;
use tracing::{error, info};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use logship::init::args::UploaderRun;
use logship::init::{providers, wait};
use logship::pipeline::{Pipeline, PipelineConfig, PipelineOutcome};

use tower::BoxError;

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Run the uploader
    Start(Box<UploaderRun>),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "logship")]
#[command(bin_name = "logship")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "LOGSHIP_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    match opt.command {
        Some(Commands::Version) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Start(args)) => {
            let _guard = match setup_logging(&opt.log_format) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("ERROR: failed to setup logging: {}", e);
                    return ExitCode::from(1);
                }
            };

            match run_uploader(args) {
                Ok(PipelineOutcome::Finished { last_file }) => {
                    info!(
                        last_file = ?last_file,
                        "Log rotation has ceased, all files shipped"
                    );
                }
                Ok(PipelineOutcome::Stopped) => {
                    info!("Uploader stopped");
                }
                Err(e) => {
                    error!(error = e, "Failed to run uploader.");
                    return ExitCode::from(1);
                }
            }
        }
        _ => {
            // it shouldn't be possible to get here since we mark a subcommand as
            // required
            error!("Must specify a command");
            return ExitCode::from(2);
        }
    }

    ExitCode::SUCCESS
}

#[tokio::main]
async fn run_uploader(args: Box<UploaderRun>) -> Result<PipelineOutcome, BoxError> {
    let registry = Arc::new(providers::build_registry(&args));
    let config = PipelineConfig::from(args.as_ref());

    let mut join_set = JoinSet::new();
    let cancel_token = CancellationToken::new();
    {
        let token = cancel_token.clone();
        let pipeline = Pipeline::new(config, registry);
        join_set.spawn(async move { pipeline.run(token).await });
    }

    select! {
        _ = signal_wait() => {
            info!("Shutdown signal received.");
            cancel_token.cancel();
        },
        res = wait::wait_for_any_task(&mut join_set) => {
            return match res? {
                Some(outcome) => Ok(outcome),
                None => Err("unexpected early exit of pipeline task".into()),
            };
        },
    }

    // the pipeline drains in-flight uploads on cancellation, give it a
    // bounded window to do so
    match wait::wait_for_tasks_with_timeout(&mut join_set, Duration::from_secs(10)).await? {
        Some(outcome) => Ok(outcome),
        None => Ok(PipelineOutcome::Stopped),
    }
}

async fn signal_wait() {
    let mut sig_term = sig(SignalKind::terminate());
    let mut sig_int = sig(SignalKind::interrupt());

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
}

fn sig(kind: SignalKind) -> tokio::signal::unix::Signal {
    signal(kind).expect("failed to install signal handler")
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, Box<dyn Error + Send + Sync>> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stdout().is_terminal();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(file_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

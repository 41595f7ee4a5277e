//! AI news pipeline binary entrypoint.
//! `run-once` for a single run, `schedule` (default) for the twice-daily loop
//! plus the status server, `healthcheck` to validate configuration.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use ai_news_writer::config::AppConfig;
use ai_news_writer::history::RunHistory;
use ai_news_writer::metrics::Metrics;
use ai_news_writer::orchestrator::Pipeline;
use ai_news_writer::scheduler::{self, DailySchedule};
use ai_news_writer::{api, PipelineError};

#[derive(Debug, Parser)]
#[command(name = "ai-news-writer", version, about = "RSS → AI post + image → Google Sheets")]
struct Cli {
    #[command(subcommand)]
    mode: Option<Mode>,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Mode {
    /// Execute one pipeline run and exit.
    RunOnce,
    /// Run on schedule and serve /health, /status, /metrics, POST /run.
    Schedule,
    /// Validate configuration and exit.
    Healthcheck,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into())))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Compact => fmt().compact().with_env_filter(env_filter).init(),
        LogFormat::Json => fmt().json().with_env_filter(env_filter).init(),
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    // Load .env before clap reads env-backed flags.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let result = match cli.mode.unwrap_or(Mode::Schedule) {
        Mode::RunOnce => run_once().await,
        Mode::Schedule => schedule().await,
        Mode::Healthcheck => healthcheck(),
    };
    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = ?e, "fatal");
            eprintln!("error: {e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn healthcheck() -> anyhow::Result<()> {
    AppConfig::from_env()?;
    println!("ok");
    Ok(())
}

async fn run_once() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    let pipeline = Pipeline::from_config(&cfg)?;
    match pipeline.run().await {
        Ok(record) => {
            println!("{}", record.summary_line());
            for f in &record.failures {
                println!("  failed [{}] {}: {}", f.stage.as_str(), f.source_id, f.reason);
            }
            Ok(())
        }
        Err(PipelineError::AlreadyRunning) => {
            warn!("run already in progress");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn schedule() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    let metrics = Metrics::init()?;
    let pipeline = Arc::new(Pipeline::from_config(&cfg)?);
    let history = Arc::new(RunHistory::with_capacity(50));

    let state = api::AppState {
        pipeline: pipeline.clone(),
        history: history.clone(),
    };
    let app = api::router(state, Some(metrics.handle.clone()));
    let listener = tokio::net::TcpListener::bind(&cfg.status_addr)
        .await
        .with_context(|| format!("binding status server on {}", cfg.status_addr))?;
    info!(addr = %cfg.status_addr, "status server listening");
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "status server stopped");
        }
    });

    let schedule = DailySchedule::new(cfg.scheduler.timezone, &cfg.scheduler.run_hours);
    info!(
        tz = %cfg.scheduler.timezone,
        hours = ?schedule.hours,
        run_on_start = cfg.scheduler.run_once_on_start,
        "scheduler started"
    );
    scheduler::run_forever(
        pipeline,
        schedule,
        cfg.scheduler.run_once_on_start,
        history,
        async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )
    .await;

    server.abort();
    info!("shutdown complete");
    Ok(())
}

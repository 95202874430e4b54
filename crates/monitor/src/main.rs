mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use smartcam_actuator::{open_link, run_probe, ActuatorLink, DryRunLink};
use smartcam_core::config::load_dotenv;
use smartcam_core::{Config, FileEventLog, LogReport};
use smartcam_monitor::{AlarmController, ControllerSettings, Monitor, MonitorSettings};
use smartcam_notify::{build_channels, Dispatcher, DispatcherOptions, NotificationEvent, TemplateRenderer};
use smartcam_vision::{
    DisabledRecognizer, FaceClassifier, FaceRecognizer, FrameSource, HttpRecognizer, MotionGate,
    RawFrameReader,
};

use crate::cli::{CliArgs, Command};

const CONFIG_HEADER: &str = "\
# SmartCam configuration.
#
# Every key is optional; missing keys take the defaults shown here.
# SMARTCAM_* environment variables override file values, and credential
# fields may reference the environment as ${VAR}.

";

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    match args.command {
        Command::Run { dry_run } => run(&args.config, dry_run).await,
        Command::Probe { hold_secs, dry_run } => probe(&args.config, hold_secs, dry_run).await,
        Command::TestNotify => test_notify(&args.config).await,
        Command::Report { dir, output } => report(&args.config, dir, output),
        Command::InitConfig { path, force } => init_config(&path, force),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load_or_default(path)
        .with_context(|| format!("failed to load config from '{}'", path.display()))
}

async fn connect_actuator(config: &Config, dry_run: bool) -> Result<Box<dyn ActuatorLink>> {
    if dry_run {
        info!("dry run: actuator commands are simulated");
        return Ok(Box::new(DryRunLink::new()));
    }
    open_link(&config.actuator)
        .await
        .with_context(|| format!("failed to open actuator port '{}'", config.actuator.port))
}

fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    let renderer = Arc::new(TemplateRenderer::new());
    let channels = build_channels(&config.notify, renderer)
        .context("failed to build notification channels")?;
    Ok(Dispatcher::start(channels, DispatcherOptions::from_config(&config.notify)))
}

// ── run ───────────────────────────────────────────────────────

async fn run(config_path: &Path, dry_run: bool) -> Result<()> {
    let config = load_config(config_path)?;
    config.log_summary();

    let recognition_timeout = Duration::from_millis(config.recognition.timeout_ms);
    let recognizer: Arc<dyn FaceRecognizer> = match &config.recognition.endpoint {
        Some(endpoint) => Arc::new(
            HttpRecognizer::new(endpoint.clone(), recognition_timeout)
                .context("failed to build recognition client")?,
        ),
        None => {
            warn!("no recognition endpoint configured, faces will not be classified");
            Arc::new(DisabledRecognizer)
        }
    };
    let classifier = FaceClassifier::new(
        recognizer,
        config.recognition.unknown_distance,
        recognition_timeout,
    );
    let gate = MotionGate::new(config.motion.learning_rate, config.motion.pixel_threshold);

    let link = connect_actuator(&config, dry_run).await?;
    let controller = AlarmController::new(link, ControllerSettings::from_config(&config));

    let log = FileEventLog::open(&config.logging.dir).with_context(|| {
        format!("failed to open event log in '{}'", config.logging.dir.display())
    })?;
    let csv_path = log.csv_path().to_path_buf();
    let session_path = log.session_path().to_path_buf();

    let mut source = open_frames(&config).await?;
    let dispatcher = build_dispatcher(&config)?;

    let monitor = Monitor::new(
        gate,
        classifier,
        controller,
        dispatcher,
        log,
        MonitorSettings::from_config(&config),
    );
    let (summary, log) = monitor.run(source.as_mut(), shutdown_signal()).await;

    println!();
    print!("{}", summary.stats);
    println!(
        "Notifications: {} queued, {} delivered, {} failed, {} suppressed, {} dropped",
        summary.notifications.enqueued,
        summary.notifications.delivered,
        summary.notifications.failed,
        summary.notifications.suppressed,
        summary.notifications.dropped,
    );
    if log.write_failures() > 0 {
        println!("Event log write failures: {}", log.write_failures());
    }
    println!("Event log: {}", csv_path.display());
    println!("Session summary: {}", session_path.display());

    if let Some(e) = summary.frame_error {
        return Err(e).context("frame source failed");
    }
    Ok(())
}

async fn open_frames(config: &Config) -> Result<Box<dyn FrameSource>> {
    let camera = &config.camera;
    let timeout = Duration::from_millis(camera.frame_timeout_ms);
    let source: Box<dyn FrameSource> = if camera.source == "-" {
        info!(width = camera.width, height = camera.height, "reading frames from stdin");
        Box::new(RawFrameReader::new(tokio::io::stdin(), camera.width, camera.height, timeout))
    } else {
        let file = tokio::fs::File::open(&camera.source)
            .await
            .with_context(|| format!("failed to open camera source '{}'", camera.source))?;
        info!(
            source = %camera.source,
            width = camera.width,
            height = camera.height,
            "reading frames"
        );
        Box::new(RawFrameReader::new(file, camera.width, camera.height, timeout))
    };
    Ok(source)
}

// ── probe ─────────────────────────────────────────────────────

async fn probe(config_path: &Path, hold_secs: u64, dry_run: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let mut link = connect_actuator(&config, dry_run).await?;
    println!("Probing actuator at {}", link.endpoint());

    let steps = run_probe(link.as_mut(), Duration::from_secs(hold_secs)).await;
    let mut failures = 0;
    for step in &steps {
        match &step.result {
            Ok(reply) => println!("  {:<12} {}", step.command.wire(), reply),
            Err(e) => {
                failures += 1;
                println!("  {:<12} FAILED: {}", step.command.wire(), e);
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} probe steps failed", steps.len());
    }
    println!("All {} probe steps acknowledged", steps.len());
    Ok(())
}

// ── test-notify ───────────────────────────────────────────────

async fn test_notify(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let dispatcher = build_dispatcher(&config)?;
    if dispatcher.channel_names().is_empty() {
        bail!("no notification channels are enabled");
    }

    let event = NotificationEvent::test(&config.notify.location);
    let results = dispatcher.deliver_now(&event).await;
    let mut failures = 0;
    for result in &results {
        if result.success {
            println!("  {:<10} ok ({} ms)", result.channel, result.duration_ms);
        } else {
            failures += 1;
            println!(
                "  {:<10} FAILED ({} ms): {}",
                result.channel,
                result.duration_ms,
                result.error.as_deref().unwrap_or("unknown error"),
            );
        }
    }
    dispatcher.shutdown(Duration::from_secs(1)).await;

    if failures > 0 {
        bail!("{failures} of {} channels failed", results.len());
    }
    Ok(())
}

// ── report ────────────────────────────────────────────────────

fn report(config_path: &Path, dir: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => load_config(config_path)?.logging.dir,
    };
    let report = LogReport::from_dir(&dir)
        .with_context(|| format!("failed to analyze logs in '{}'", dir.display()))?;
    let text = report.to_string();
    print!("{text}");

    if let Some(output) = output {
        std::fs::write(&output, &text)
            .with_context(|| format!("failed to write report to '{}'", output.display()))?;
        println!("\nReport saved to {}", output.display());
    }
    Ok(())
}

// ── init-config ───────────────────────────────────────────────

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("'{}' already exists (use --force to overwrite)", path.display());
    }
    let template = Config::template().context("failed to render default config")?;
    std::fs::write(path, format!("{CONFIG_HEADER}{template}"))
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}

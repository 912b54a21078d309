//! Tarjim - Batch Subtitle Translation
//!
//! Main entry point. Wires the external tool adapters, the hardware
//! allocator and the library store into the batch orchestrator and
//! dispatches the chosen subcommand.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tarjim::cli::{Args, Commands};
use tarjim::config::Config;
use tarjim::gpu::{recommend, GpuProbe};
use tarjim::media::FfmpegTranscoder;
use tarjim::orchestrator::BatchOrchestrator;
use tarjim::pipeline::{FilePipeline, PipelineOutcome, TranslationPipeline};
use tarjim::status::{JobLease, StatusStore};
use tarjim::stop::StopToken;
use tarjim::transcribe::WhisperTranscriber;
use tarjim::translate::OllamaTranslator;
use tarjim::worklist::{read_blacklist, scan_directory, OutcomeSink, SqliteLibrary, WorklistSource};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    setup_logging(args.verbose, &config.job.work_dir)?;

    match args.command {
        Commands::Process { input } => {
            let pipeline = build_pipeline(&config).await?;
            pipeline.check_capabilities().await?;

            let stop = StopToken::new();
            spawn_interrupt_handler(stop.clone());

            match pipeline.process_file(&input, &stop).await? {
                PipelineOutcome::Completed(report) => {
                    if report.is_degraded() {
                        println!(
                            "Done with degraded output: {}/{} chunks kept the source text",
                            report.chunks_degraded, report.chunks_total
                        );
                    } else {
                        println!("Done: {} chunk(s) translated", report.chunks_total);
                    }
                }
                PipelineOutcome::Skipped => {
                    println!("Translated subtitle already exists, nothing to do");
                }
            }
        }
        Commands::Batch => {
            let pipeline = build_pipeline(&config).await?;
            pipeline.check_capabilities().await?;

            let library = Arc::new(SqliteLibrary::open(config.library_path())?);
            let blacklist = read_blacklist(&config.blacklist_path());
            info!("Blacklist holds {} file(s)", blacklist.len());

            let orchestrator = BatchOrchestrator::new(
                Arc::new(pipeline),
                Arc::clone(&library) as Arc<dyn WorklistSource>,
                library as Arc<dyn OutcomeSink>,
                StatusStore::new(config.status_path()),
                JobLease::new(config.lease_path(), JobLease::DEFAULT_TTL),
                blacklist,
                config.translate.target_language.clone(),
            );
            spawn_interrupt_handler(orchestrator.stop_token());

            let summary = orchestrator.run_batch().await?;
            println!(
                "Batch finished: {} succeeded, {} failed, {} skipped, {} ignored (of {})",
                summary.succeeded, summary.failed, summary.skipped, summary.ignored, summary.total
            );
        }
        Commands::Scan { dir } => {
            let library = SqliteLibrary::open(config.library_path())?;
            let seen = scan_directory(
                &library,
                &dir,
                &config.translate.target_language,
                &config.job.legacy_suffixes,
            )?;
            println!("Scanned {} video file(s) into the library", seen);
        }
        Commands::Gpus => {
            let probe = GpuProbe::new(config.gpu.clone());
            let devices = probe.list_devices().await;

            if devices.is_empty() {
                println!("No GPUs detected; both workloads run on CPU");
            } else {
                println!(
                    "{:<6} {:<30} {:>10} {:>6} {:>6} {:>6}",
                    "Index", "Name", "Memory", "Util", "Temp", "Score"
                );
                for device in &devices {
                    println!(
                        "{:<6} {:<30} {:>7} MB {:>5}% {:>5}C {:>6}",
                        device.index,
                        device.name,
                        device.memory_total,
                        device.utilization,
                        device.temperature,
                        device.score
                    );
                }
            }

            let allocation = recommend(&devices);
            println!("Transcription: {}", allocation.transcription);
            println!("Translation:   {}", allocation.translation);
        }
        Commands::Status { watch } => {
            let store = StatusStore::new(config.status_path());
            if watch {
                watch_status(&store).await?;
            } else {
                match store.read() {
                    Ok(status) => println!(
                        "{}% ({}/{}) {}",
                        status.progress, status.files_done, status.total_files, status.task
                    ),
                    Err(_) => println!("No batch status recorded yet"),
                }
            }
        }
    }

    Ok(())
}

/// Probe the hardware and assemble the per-file pipeline from the configured
/// adapters. Every component is handed in here, nothing is constructed
/// deeper down.
async fn build_pipeline(config: &Config) -> Result<TranslationPipeline> {
    let probe = GpuProbe::new(config.gpu.clone());
    let allocation = recommend(&probe.list_devices().await);
    info!(
        "Workload placement: transcription on {}, translation on {}",
        allocation.transcription, allocation.translation
    );

    Ok(TranslationPipeline::new(
        Arc::new(FfmpegTranscoder::new(config.transcoder.clone())),
        Arc::new(WhisperTranscriber::new(config.transcriber.clone())),
        Arc::new(OllamaTranslator::new(config.translate.clone())?),
        config.translate.clone(),
        allocation,
    ))
}

/// First Ctrl-C requests a graceful stop; the process then winds down after
/// the in-flight step is killed.
fn spawn_interrupt_handler(stop: StopToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Stop requested, finishing current step...");
            stop.stop();
        }
    });
}

/// Poll the status file and render a progress bar until the batch reports
/// completion.
async fn watch_status(store: &StatusStore) -> Result<()> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .expect("static progress template"),
    );

    loop {
        if let Ok(status) = store.read() {
            bar.set_position(status.progress as u64);
            bar.set_message(status.task.clone());
            if status.progress >= 100 {
                bar.finish_with_message(status.task);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Ok(())
}

fn setup_logging(verbose: bool, work_dir: &Path) -> Result<()> {
    let log_dir = work_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation; the guard must outlive main for the writer to flush
    let file_appender = rolling::daily(&log_dir, "tarjim.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging to {}", log_dir.join("tarjim.log").display());
    Ok(())
}

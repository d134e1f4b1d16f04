use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use tracksync_engine::config::parser;
use tracksync_engine::config::validator;
use tracksync_engine::metrics::install_prometheus_exporter;
use tracksync_engine::{build_syncer, CycleOutcome, CycleReport, RunnerOptions, SyncerRunner};
use tracksync_types::AssetState;

use crate::shutdown::install_signal_handler;

/// Execute the `run` command: parse, validate, and run a syncer.
pub async fn execute(syncer_path: &Path, once: bool, max_cycles: Option<u64>) -> Result<()> {
    let config = parser::parse_syncer(syncer_path)
        .with_context(|| format!("Failed to parse syncer: {}", syncer_path.display()))?;
    validator::validate_syncer(&config)?;

    tracing::info!(
        integration_id = config.integration_id,
        syncer_instance_id = config.syncer_instance_id,
        adapter = config.adapter.use_ref,
        batch_size = config.sync.batch_size,
        interval_seconds = config.sync.interval_seconds,
        "Syncer validated"
    );

    if let Some(listen) = &config.metrics.listen {
        let addr: SocketAddr = listen
            .parse()
            .with_context(|| format!("Invalid metrics.listen address: {listen}"))?;
        install_prometheus_exporter(addr)?;
    }

    let syncer = build_syncer(&config)?;
    let max_cycles = if once { Some(1) } else { max_cycles };
    let options = RunnerOptions::from_settings(&config.sync).with_max_cycles(max_cycles);
    let runner = SyncerRunner::new(syncer, options);

    if once {
        let report = runner.run_once().await??;
        print_report(&report);
        if !report.is_committed() {
            anyhow::bail!("Sync cycle aborted, nothing committed");
        }
        return Ok(());
    }

    install_signal_handler(runner.cancellation_token());
    let summary = runner.run().await?;

    println!("Syncer '{}' stopped.", config.key());
    println!("  Cycles:    {}", summary.cycles);
    println!("  Committed: {}", summary.committed);
    println!("  Aborted:   {}", summary.aborted);
    println!("  Errors:    {}", summary.errors);
    Ok(())
}

fn print_report(report: &CycleReport) {
    match &report.outcome {
        CycleOutcome::Committed { cursor, label } => {
            println!("Cycle committed at cursor {cursor} ({label})");
        }
        CycleOutcome::Aborted { stage, message } => {
            println!("Cycle aborted during {stage}: {message}");
        }
    }
    println!("  Assets fetched:  {}", report.assets.len());
    println!("    Finished:      {}", report.count(AssetState::Finished));
    println!("    Active:        {}", report.count(AssetState::Active));
    println!("    Failed:        {}", report.count(AssetState::FailedRequest));
    if report.exhausted > 0 {
        println!("  Over retry budget: {}", report.exhausted);
    }
    if report.skipped_records > 0 {
        println!("  Skipped records: {}", report.skipped_records);
    }
    if let Some(err) = &report.page_error {
        println!("  Discovery error: {err}");
    }
    println!("  Payloads sent:   {}", report.payloads_sent);
    println!("  Bytes sent:      {}", format_bytes(report.bytes_sent));
    println!("  Duration:        {:.2}s", report.duration.as_secs_f64());
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

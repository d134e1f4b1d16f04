use std::path::Path;

use anyhow::{Context, Result};
use tracksync_engine::config::parser;
use tracksync_engine::create_tracking_service;
use tracksync_state::{StateError, TrackingService};
use tracksync_types::CycleRecord;

/// Execute the `status` command: print the checkpoint, recent cycles and,
/// with `--active`, every asset still being tracked.
pub fn execute(syncer_path: &Path, active: bool, cycles: usize) -> Result<()> {
    let config = parser::parse_syncer(syncer_path)
        .with_context(|| format!("Failed to parse syncer: {}", syncer_path.display()))?;
    let key = config.key();
    let store = create_tracking_service(&config.state)?;

    println!("Syncer {key}");
    match store.get_last_cursor_and_state(&key)? {
        Some(checkpoint) => println!(
            "  Cursor:  {} ({}, updated {})",
            checkpoint.cursor, checkpoint.label, checkpoint.updated_at
        ),
        None => println!("  Cursor:  none (next cycle starts from the adapter's initial cursor)"),
    }

    match store.recent_cycles(&key, cycles) {
        Ok(records) if records.is_empty() => println!("  No cycles recorded."),
        Ok(records) => {
            println!("  Recent cycles:");
            for record in &records {
                print_cycle(record);
            }
        }
        Err(StateError::Unsupported(_)) => {}
        Err(e) => return Err(e).context("Failed to load cycle history"),
    }

    if active {
        let assets = store
            .asset_states(&key, false)
            .context("Failed to load asset states")?;
        println!("  Tracked assets ({}):", assets.len());
        for asset in &assets {
            println!(
                "    {:40} {:15} retries={}",
                asset.asset_id().as_str(),
                asset.state().as_str(),
                asset.retry_count()
            );
        }
    }

    Ok(())
}

fn print_cycle(record: &CycleRecord) {
    println!(
        "    {:25} {:9} assets={} finished={} active={} failed={} bytes={} {}ms{}",
        record.finished_at.as_deref().unwrap_or("-"),
        record.status.as_str(),
        record.assets_total,
        record.assets_finished,
        record.assets_active,
        record.assets_failed,
        record.bytes_sent,
        record.duration_ms,
        record
            .error_message
            .as_deref()
            .map(|m| format!("  error: {m}"))
            .unwrap_or_default()
    );
}

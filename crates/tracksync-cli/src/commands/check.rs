use std::path::Path;

use anyhow::{Context, Result};
use tracksync_engine::config::parser;
use tracksync_engine::config::validator;
use tracksync_engine::{check_tracking_service, resolve_adapter};

/// Execute the `check` command: validate syncer config, adapter and tracking store.
pub async fn execute(syncer_path: &Path) -> Result<()> {
    // 1. Parse syncer YAML
    let config = parser::parse_syncer(syncer_path)
        .with_context(|| format!("Failed to parse syncer: {}", syncer_path.display()))?;

    // 2. Validate syncer structure
    validator::validate_syncer(&config)?;
    println!("Syncer structure:  OK");

    // 3. Adapter config and reachability
    let adapter_ok = match resolve_adapter(&config) {
        Ok(mut adapter) => {
            println!("Adapter config:    OK");
            let probe = tokio::task::spawn_blocking(move || adapter.init_cursor())
                .await
                .context("Adapter probe task panicked")?;
            match probe {
                Ok(cursor) => {
                    println!("Adapter reachable: OK (initial cursor {cursor})");
                    true
                }
                Err(e) => {
                    println!("Adapter reachable: FAILED\n  {e}");
                    false
                }
            }
        }
        Err(e) => {
            println!("Adapter config:    FAILED\n  {e:#}");
            false
        }
    };

    // 4. Tracking store
    let state = config.state.clone();
    let state_ok = tokio::task::spawn_blocking(move || check_tracking_service(&state))
        .await
        .context("Tracking store check task panicked")?;
    if state_ok {
        println!("Tracking store:    OK");
    } else {
        println!("Tracking store:    FAILED");
    }

    if adapter_ok && state_ok {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}

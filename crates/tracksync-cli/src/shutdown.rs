//! Ctrl+C / SIGTERM handling for `tracksync run`.
//!
//! The first signal cancels the runner's token so the current cycle can
//! finish and commit. A second signal exits immediately.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first SIGINT / SIGTERM; force-exit on the second.
pub(crate) fn install_signal_handler(token: CancellationToken) {
    let count = Arc::new(AtomicU32::new(0));

    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(sigterm) => Some(sigterm),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                    None
                }
            }
        };

        loop {
            #[cfg(unix)]
            {
                let term = async {
                    match sigterm.as_mut() {
                        Some(s) => {
                            s.recv().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    () = term => {}
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
            }

            if count.fetch_add(1, Ordering::SeqCst) == 0 {
                tracing::info!("Received shutdown signal, finishing the current cycle...");
                tracing::info!("Press Ctrl+C again to force exit");
                token.cancel();
            } else {
                tracing::warn!("Force exit requested");
                std::process::exit(130);
            }
        }
    });
}

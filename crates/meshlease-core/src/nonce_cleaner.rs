//! Background sweep that deletes expired nonces.
//!
//! Correctness-irrelevant — every read already filters on `expires_at` — but
//! left unchecked the `nonces` table grows without bound. Failures are
//! logged and the next tick still fires.

use std::sync::Arc;
use std::time::Duration;

use meshlease_storage::AllocationOutcome;
use tokio::sync::watch;

use crate::repository::Repository;

/// Run one sweep immediately, then one every `interval`, until `shutdown`
/// fires.
pub async fn run(repo: Arc<Repository>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        sweep(&repo).await;

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("nonce cleaner stopping on shutdown signal");
                    return;
                }
            }
        }
    }
}

async fn sweep(repo: &Repository) {
    match repo.delete_expired_nonces().await {
        AllocationOutcome::Found(deleted) => {
            if deleted > 0 {
                tracing::info!(deleted, "nonce cleaner swept expired rows");
            }
        }
        AllocationOutcome::Empty => {}
        AllocationOutcome::TransientFault(e) | AllocationOutcome::FatalFault(e) => {
            tracing::warn!(error = %e, "nonce cleaner sweep failed, will retry next tick");
        }
    }
}

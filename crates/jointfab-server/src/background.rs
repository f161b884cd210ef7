//! Background tasks for the joint fabric node.

use std::time::Instant;

use tokio::time::{sleep, Duration};

use crate::AppState;

/// Starts the expiry task.
///
/// Runs indefinitely. Each tick reverts the pending fabric transaction if
/// the fail-safe deadline has passed, and closes a commissioning window
/// whose timeout elapsed.
pub async fn start_expiry_task(state: AppState, interval: Duration) {
    tracing::info!(interval_ms = interval.as_millis() as u64, "starting expiry task");

    loop {
        sleep(interval).await;

        let node = state.node.clone();
        let res = tokio::task::spawn_blocking(move || {
            let mut guard = node.lock().map_err(|_| "node state lock poisoned".to_string())?;
            Ok::<_, String>(expire(&mut guard, Instant::now()))
        })
        .await;

        match res {
            Ok(Ok((fail_safe, window))) => {
                if fail_safe || window {
                    tracing::info!(fail_safe, window, "expired node timers");
                }
            }
            Ok(Err(e)) => tracing::error!("expiry check failed: {}", e),
            Err(e) => tracing::error!("expiry task join error: {}", e),
        }
    }
}

/// Returns which of the fail-safe and the commissioning window expired.
pub fn expire(node: &mut crate::NodeState, now: Instant) -> (bool, bool) {
    let services = &mut node.services;
    let fail_safe = services
        .fail_safe
        .expire_if_elapsed(now, &mut services.fabrics);
    let window = services.commissioning_window.expire_if_elapsed(now);
    (fail_safe, window)
}

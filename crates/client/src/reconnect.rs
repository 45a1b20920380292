//! Exponential-backoff reconnection for the push connection.
//!
//! When the connection drops, [`reconnect_loop`] keeps retrying with
//! increasing delays until it succeeds or the [`CancellationToken`] fires.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::connection::{PushClient, PushConnection};

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Next backoff delay, clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Reconnect with exponential backoff.
///
/// Returns `None` if `cancel` fires before a connection succeeds.
pub async fn reconnect_loop(
    client: &PushClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<PushConnection> {
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        // Wait first: the caller has just seen a failure.
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
        tracing::info!(
            user_id = client.user_id(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting push channel",
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(user_id = client.user_id(), "Reconnect cancelled");
                return None;
            }
            result = client.connect() => match result {
                Ok(conn) => {
                    tracing::info!(user_id = client.user_id(), attempt, "Push channel reconnected");
                    return Some(conn);
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = client.user_id(),
                        error = %e,
                        "Reconnect attempt {attempt} failed",
                    );
                }
            }
        }

        delay = next_delay(delay, config);
    }
}

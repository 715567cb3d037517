//! Inbound liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use groupcast_core::Connection;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Shortest tick a heartbeat or ping timer will use; zero periods are raised
/// to this.
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Nothing was heard from the client within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Watch a connection's inbound activity.
///
/// At each `interval` tick the time since the last inbound frame is compared
/// against `timeout`. Pings are sent by the writer; any frame the client
/// sends (including pongs) resets the clock.
pub async fn run_heartbeat(
    connection: Arc<Connection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval.max(MIN_TICK));
    check_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
            _ = check_interval.tick() => {
                if connection.idle_for() >= timeout {
                    return HeartbeatResult::TimedOut;
                }
            }
        }
    }
}

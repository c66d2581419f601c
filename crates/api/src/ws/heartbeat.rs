use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::WsManager;

/// Interval between heartbeat pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn a background task that pings every open socket each `interval`.
///
/// Pings keep idle observers connected while a long step runs without
/// emitting events. A socket whose queue no longer accepts the ping has
/// already left its handler loop; the handler closes that socket's observer
/// session, which releases its job subscriptions.
///
/// The returned `JoinHandle` is aborted during shutdown.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            let total = ws_manager.connection_count().await;
            let pinged = ws_manager.ping_all().await;
            tracing::debug!(
                total,
                pinged,
                stale = total.saturating_sub(pinged),
                "WebSocket heartbeat ping"
            );
        }
    })
}

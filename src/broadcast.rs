use crate::state::AppState;
use std::sync::Arc;
use std::time::{Duration, Instant};

const REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn a background task that expires dropped seats and disposes abandoned sessions
pub fn spawn_session_reaper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let disposed = state.reap(Instant::now()).await;
            if disposed > 0 {
                tracing::info!(
                    "Reaper disposed {} abandoned session(s), {} remaining",
                    disposed,
                    state.session_count().await
                );
            }
        }
    })
}

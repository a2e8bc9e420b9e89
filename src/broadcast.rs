use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;

/// Spawn the background task that advances every room's phase when its
/// deadline passes or its completion condition is met
pub fn spawn_phase_driver(state: Arc<AppState>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let now = chrono::Utc::now();

            for code in state.session_codes().await {
                // Per-room task: a slow prompt fetch must not hold up other rooms
                let state = state.clone();
                tokio::spawn(async move {
                    match state.tick_session(&code, now).await {
                        Ok(Some(step)) => tracing::debug!("Room {} advanced: {:?}", code, step),
                        Ok(None) => {}
                        Err(e) => tracing::warn!("Phase driver failed for {}: {}", code, e),
                    }
                });
            }
        }
    })
}

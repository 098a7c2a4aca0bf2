use super::AppState;
use crate::types::SessionCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Countdown task owned by a session while a prompt is open
#[derive(Debug, Default)]
pub struct PromptTimer {
    handle: Option<JoinHandle<()>>,
}

impl PromptTimer {
    pub fn start(&mut self, handle: JoinHandle<()>) {
        self.stop();
        self.handle = Some(handle);
    }

    /// Returns false when no timer was running
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PromptTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Outcome of one timer tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Time remains; the countdown was broadcast
    Running,
    /// This tick closed the prompt
    Expired,
    /// The prompt this timer belongs to is no longer open
    Stale,
}

/// Spawn the once-per-second countdown for `prompt_index`
pub(super) fn spawn_prompt_timer(
    state: Arc<AppState>,
    code: SessionCode,
    prompt_index: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + TICK_INTERVAL;
        let mut interval = tokio::time::interval_at(start, TICK_INTERVAL);
        loop {
            interval.tick().await;
            if state.tick(code, prompt_index).await != TickOutcome::Running {
                tracing::debug!("Timer for session {} prompt {} finished", code, prompt_index);
                break;
            }
        }
    })
}

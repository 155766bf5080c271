use crate::profile_store::LocalProfileStore;
use crate::storage::KeyValueStore;
use crate::wellness::credit_meditation;
use crate::models::parse_leading_int;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeditationError {
    #[error("Invalid meditation duration.")]
    InvalidDuration,
}

/// Accepts a positive whole number of minutes, ignoring trailing text.
pub fn parse_minutes(raw: &str) -> Result<u32, MeditationError> {
    parse_leading_int(raw)
        .and_then(|minutes| u32::try_from(minutes).ok())
        .filter(|minutes| *minutes > 0)
        .ok_or(MeditationError::InvalidDuration)
}

/// `m:ss`, minutes unpadded.
pub fn format_time(total_seconds: u64) -> String {
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeditationStatus {
    pub running: bool,
    pub minutes: u32,
    pub remaining: u64,
    pub display: String,
    pub completed: bool,
}

struct ActiveSession {
    minutes: u32,
    cancel: CancellationToken,
    remaining: watch::Receiver<u64>,
    handle: JoinHandle<()>,
}

/// Owns the single meditation countdown. Each second of the session is one
/// `tick`; a finished session credits its minutes to `wellnessStats`.
pub struct MeditationTimer {
    tick: Duration,
    shutdown: CancellationToken,
    session: Option<ActiveSession>,
}

impl MeditationTimer {
    pub fn new(tick: Duration, shutdown: CancellationToken) -> Self {
        Self {
            tick,
            shutdown,
            session: None,
        }
    }

    /// Starts a session, cancelling whatever was running before.
    pub fn start<S>(
        &mut self,
        minutes: u32,
        store: Arc<Mutex<LocalProfileStore<S>>>,
    ) -> MeditationStatus
    where
        S: KeyValueStore + Send + 'static,
    {
        if self.stop() {
            debug!("previous meditation session replaced");
        }

        let total = u64::from(minutes) * 60;
        let cancel = self.shutdown.child_token();
        let (tx, remaining) = watch::channel(total);
        let handle = tokio::spawn(count_down(
            minutes,
            total,
            self.tick,
            cancel.clone(),
            tx,
            store,
        ));
        info!(minutes, "meditation started");

        self.session = Some(ActiveSession {
            minutes,
            cancel,
            remaining,
            handle,
        });
        self.status()
    }

    /// Ends the running session early. No minutes are credited.
    pub fn stop(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let was_running = !session.handle.is_finished();
        session.cancel.cancel();
        if was_running {
            info!(minutes = session.minutes, "meditation stopped early");
        }
        was_running
    }

    pub fn status(&self) -> MeditationStatus {
        match &self.session {
            Some(session) => {
                let remaining = *session.remaining.borrow();
                MeditationStatus {
                    running: remaining > 0 && !session.handle.is_finished(),
                    minutes: session.minutes,
                    remaining,
                    display: format_time(remaining),
                    completed: remaining == 0,
                }
            }
            None => MeditationStatus {
                running: false,
                minutes: 0,
                remaining: 0,
                display: format_time(0),
                completed: false,
            },
        }
    }
}

impl Drop for MeditationTimer {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.cancel.cancel();
        }
    }
}

async fn count_down<S: KeyValueStore>(
    minutes: u32,
    total: u64,
    tick: Duration,
    cancel: CancellationToken,
    remaining_tx: watch::Sender<u64>,
    store: Arc<Mutex<LocalProfileStore<S>>>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.tick().await;

    let mut remaining = total;
    while remaining > 0 {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                remaining -= 1;
                remaining_tx.send_replace(remaining);
            }
        }
    }

    if credit_meditation(&mut *store.lock().await, minutes).await {
        info!(minutes, "meditation completed");
    } else {
        warn!(minutes, "meditation completed but could not be recorded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::time::Instant;

    const FAST_TICK: Duration = Duration::from_millis(2);

    fn shared_store() -> Arc<Mutex<LocalProfileStore<MemoryStore>>> {
        Arc::new(Mutex::new(LocalProfileStore::new(MemoryStore::new())))
    }

    async fn wait_for_completion(timer: &MeditationTimer) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !timer.status().completed {
            assert!(Instant::now() < deadline, "meditation never completed");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn durations_must_be_positive_whole_minutes() {
        assert_eq!(parse_minutes("10"), Ok(10));
        assert_eq!(parse_minutes(" 5 min"), Ok(5));
        for raw in ["0", "-3", "abc", ""] {
            assert_eq!(parse_minutes(raw), Err(MeditationError::InvalidDuration), "{raw:?}");
        }
    }

    #[test]
    fn time_is_shown_as_minutes_and_seconds() {
        assert_eq!(format_time(600), "10:00");
        assert_eq!(format_time(65), "1:05");
        assert_eq!(format_time(0), "0:00");
    }

    #[tokio::test]
    async fn completed_session_credits_minutes() {
        let store = shared_store();
        let mut timer = MeditationTimer::new(FAST_TICK, CancellationToken::new());

        let started = timer.start(1, Arc::clone(&store));
        assert!(started.running);
        assert_eq!(started.display, "1:00");

        wait_for_completion(&timer).await;
        // The credit lands right after the last tick.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.lock().await.wellness_stats().meditation, 1);
        assert!(!timer.status().running);
    }

    #[tokio::test]
    async fn starting_again_cancels_the_previous_session() {
        let store = shared_store();
        let mut timer = MeditationTimer::new(FAST_TICK, CancellationToken::new());

        timer.start(1, Arc::clone(&store));
        let status = timer.start(2, Arc::clone(&store));
        assert_eq!(status.minutes, 2);

        wait_for_completion(&timer).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.lock().await.wellness_stats().meditation, 2);
    }

    #[tokio::test]
    async fn stopping_early_gives_no_credit() {
        let store = shared_store();
        let mut timer = MeditationTimer::new(Duration::from_millis(50), CancellationToken::new());

        timer.start(1, Arc::clone(&store));
        assert!(timer.stop());
        assert!(!timer.stop());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.lock().await.wellness_stats().meditation, 0);
        assert!(!timer.status().running);
    }

    #[tokio::test]
    async fn shutdown_cancels_the_countdown() {
        let store = shared_store();
        let shutdown = CancellationToken::new();
        let mut timer = MeditationTimer::new(FAST_TICK, shutdown.clone());

        timer.start(1, Arc::clone(&store));
        shutdown.cancel();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.lock().await.wellness_stats().meditation, 0);
        assert!(!timer.status().completed);
    }
}

//! Restartable silence timer.

use crate::state::AgentStateCell;
use async_trait::async_trait;
use parley_types::AgentState;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What the watchdog does when the room has been quiet for too long.
#[async_trait]
pub trait Reminder: Send + Sync {
    /// Produces the reminder and resolves once it has finished.
    async fn remind(&self);
}

/// Fires a [`Reminder`] after a full period without [`SilenceWatchdog::arm`].
///
/// Only one deadline is pending at a time; arming moves it. When it passes
/// while the agent is listening, the reminder runs and the watchdog re-arms
/// itself once the reminder completes. When it passes in any other state,
/// it lapses and waits for the next explicit `arm()`.
///
/// A single timer task, started on the first `arm()`, serves every deadline.
pub struct SilenceWatchdog {
    timeout: Duration,
    state: AgentStateCell,
    reminder: Arc<dyn Reminder>,
    deadline: watch::Sender<Option<Instant>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SilenceWatchdog {
    pub fn new(timeout: Duration, state: AgentStateCell, reminder: Arc<dyn Reminder>) -> Arc<Self> {
        let (deadline, _) = watch::channel(None);
        Arc::new(Self {
            timeout,
            state,
            reminder,
            deadline,
            timer: Mutex::new(None),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cancels any pending deadline and starts a fresh full-length one.
    pub fn arm(self: &Arc<Self>) {
        self.deadline.send_replace(Some(Instant::now() + self.timeout));

        let mut timer = self.timer();
        if timer.is_none() {
            *timer = Some(tokio::spawn(run_timer(
                Arc::downgrade(self),
                self.deadline.subscribe(),
            )));
        }
    }

    /// Cancels the pending deadline without starting a new one.
    pub fn disarm(&self) {
        self.deadline.send_replace(None);
    }

    /// Returns `true` while a deadline is waiting to pass.
    pub fn is_armed(&self) -> bool {
        self.deadline.borrow().is_some()
    }

    /// Clears `at` if it is still the pending deadline. Returns `false` when
    /// an `arm()` or `disarm()` got there first.
    fn take_deadline(&self, at: Instant) -> bool {
        self.deadline.send_if_modified(|deadline| {
            if *deadline == Some(at) {
                *deadline = None;
                true
            } else {
                false
            }
        })
    }

    fn expire(self: Arc<Self>) {
        let state = self.state.get();
        if state != AgentState::Listening {
            tracing::debug!(state = %state, "silence timer lapsed while not listening");
            return;
        }

        tracing::info!(
            timeout_secs = self.timeout.as_secs(),
            "no speech detected, sending reminder"
        );

        // Detached so a re-arm while the reminder plays does not cancel it.
        let reminder = Arc::clone(&self.reminder);
        let watchdog: Weak<Self> = Arc::downgrade(&self);
        tokio::spawn(async move {
            reminder.remind().await;
            if let Some(watchdog) = watchdog.upgrade() {
                watchdog.arm();
            }
        });
    }
}

/// Sleeps until the current deadline, resetting the same `Sleep` whenever
/// the deadline moves. Exits once the watchdog is dropped.
async fn run_timer(watchdog: Weak<SilenceWatchdog>, mut deadline: watch::Receiver<Option<Instant>>) {
    let sleep = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(sleep);

    loop {
        let current = *deadline.borrow_and_update();
        let Some(at) = current else {
            if deadline.changed().await.is_err() {
                break;
            }
            continue;
        };

        sleep.as_mut().reset(at);
        tokio::select! {
            () = &mut sleep => {
                let Some(watchdog) = watchdog.upgrade() else {
                    break;
                };
                if watchdog.take_deadline(at) {
                    watchdog.expire();
                }
            }
            changed = deadline.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

impl Drop for SilenceWatchdog {
    fn drop(&mut self) {
        if let Some(timer) = self.timer().take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::Transition;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingReminder {
        count: AtomicUsize,
    }

    #[async_trait]
    impl Reminder for CountingReminder {
        async fn remind(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn watchdog(secs: u64) -> (Arc<SilenceWatchdog>, Arc<CountingReminder>, AgentStateCell) {
        let state = AgentStateCell::new();
        let reminder = Arc::new(CountingReminder::default());
        let watchdog = SilenceWatchdog::new(
            Duration::from_secs(secs),
            state.clone(),
            reminder.clone(),
        );
        (watchdog, reminder, state)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_full_idle_period() {
        let (watchdog, reminder, _) = watchdog(20);
        watchdog.arm();

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(reminder.count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(reminder.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_resets_the_full_duration() {
        let (watchdog, reminder, _) = watchdog(20);
        watchdog.arm();

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(15)).await;
            watchdog.arm();
        }
        assert_eq!(reminder.count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(reminder.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rearms_itself_after_reminder() {
        let (watchdog, reminder, _) = watchdog(20);
        watchdog.arm();

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(reminder.count.load(Ordering::SeqCst), 1);
        assert!(watchdog.is_armed());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(reminder.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn lapses_without_rearming_when_not_listening() {
        let (watchdog, reminder, state) = watchdog(20);
        state.apply(Transition::SpeechStarted).unwrap();
        watchdog.arm();

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(reminder.count.load(Ordering::SeqCst), 0);
        assert!(!watchdog.is_armed());

        state.apply(Transition::Settled).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(reminder.count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_reuses_one_timer_task() {
        let (watchdog, reminder, _) = watchdog(20);
        watchdog.arm();
        tokio::task::yield_now().await;
        let tasks = tokio::runtime::Handle::current().metrics().num_alive_tasks();

        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            watchdog.arm();
        }
        tokio::task::yield_now().await;
        assert_eq!(
            tokio::runtime::Handle::current().metrics().num_alive_tasks(),
            tasks
        );
        assert_eq!(reminder.count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(reminder.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_cancels_pending_timer() {
        let (watchdog, reminder, _) = watchdog(20);
        watchdog.arm();
        watchdog.disarm();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(reminder.count.load(Ordering::SeqCst), 0);
        assert!(!watchdog.is_armed());
    }
}

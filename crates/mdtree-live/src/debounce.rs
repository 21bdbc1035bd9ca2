//! Trailing-edge debounce of change notifications.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default quiet period before a rebuild fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Whether a debounce loop is waiting out a burst of changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    /// No change seen since the last fire.
    Quiet,
    /// At least one change seen; the timer is running.
    Pending,
}

/// Coalesces bursts of triggers into a single call.
///
/// Each trigger restarts the quiet window; the callback runs once the window
/// elapses with no further triggers. Cancelling the token while `Pending`
/// discards the burst. A callback already running is awaited to completion.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    pending: Arc<AtomicBool>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The quiet window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Current state of the loop started by [`Debouncer::spawn`].
    pub fn state(&self) -> DebounceState {
        if self.pending.load(Ordering::Acquire) {
            DebounceState::Pending
        } else {
            DebounceState::Quiet
        }
    }

    /// Run the debounce loop on the current Tokio runtime.
    ///
    /// The loop ends when `cancel` fires or every trigger sender is dropped.
    pub fn spawn<T, F, Fut>(
        &self,
        mut triggers: mpsc::UnboundedReceiver<T>,
        cancel: CancellationToken,
        mut on_fire: F,
    ) -> JoinHandle<()>
    where
        T: Debug + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let pending = Arc::clone(&self.pending);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    trigger = triggers.recv() => match trigger {
                        Some(trigger) => trace!(?trigger, "Change received"),
                        None => break,
                    },
                }

                pending.store(true, Ordering::Release);
                let timer = sleep(window);
                tokio::pin!(timer);

                let fire = loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break false,
                        trigger = triggers.recv() => match trigger {
                            Some(trigger) => {
                                trace!(?trigger, "Change received, restarting window");
                                timer.as_mut().reset(Instant::now() + window);
                            }
                            None => break false,
                        },
                        _ = &mut timer => break true,
                    }
                };
                pending.store(false, Ordering::Release);

                if !fire {
                    break;
                }
                debug!(?window, "Quiet window elapsed, firing");
                on_fire().await;
            }
            pending.store(false, Ordering::Release);
            debug!("Debounce loop stopped");
        })
    }
}

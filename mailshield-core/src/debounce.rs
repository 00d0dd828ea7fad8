// Trailing debounce for scan passes.
//
// `ScanDebouncer` is the pure state machine, driven by whatever clock the caller passes
// in. `spawn_debounced` wraps it in a tokio task fed by a channel of trigger events.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { deadline: Instant },
}

#[derive(Debug, Clone)]
pub struct ScanDebouncer {
    window: Duration,
    state: DebounceState,
}

impl ScanDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Idle => None,
            DebounceState::Pending { deadline } => Some(deadline),
        }
    }

    /// Push the deadline out to `now + window`, replacing any pending one.
    pub fn trigger(&mut self, now: Instant) {
        self.state = DebounceState::Pending {
            deadline: now + self.window,
        };
    }

    /// Returns `true` exactly once per quiet period, when `now` has reached the deadline.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::Pending { deadline } if now >= deadline => {
                self.state = DebounceState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.state = DebounceState::Idle;
    }
}

/// Cheap, cloneable handle that feeds the debounce task.
#[derive(Debug, Clone)]
pub struct ScanTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ScanTrigger {
    /// Request a scan. Returns `false` once the debounce task has stopped.
    pub fn trigger(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

/// Spawn a task that runs `on_fire` once per quiet period of `window` after triggers.
///
/// Each run is spawned separately, so a slow pass never delays the next quiet period.
/// The task ends when every [`ScanTrigger`] has been dropped; a pending deadline is
/// discarded at that point.
pub fn spawn_debounced<F, Fut>(window: Duration, mut on_fire: F) -> (ScanTrigger, JoinHandle<()>)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    let handle = tokio::spawn(async move {
        let mut debouncer = ScanDebouncer::new(window);

        loop {
            match debouncer.deadline() {
                Some(deadline) => {
                    tokio::select! {
                        event = rx.recv() => match event {
                            Some(()) => debouncer.trigger(Instant::now()),
                            None => break,
                        },
                        _ = tokio::time::sleep_until(deadline) => {
                            if debouncer.poll(Instant::now()) {
                                debug!("Quiet period elapsed, starting scan pass");
                                tokio::spawn(on_fire());
                            }
                        }
                    }
                }
                None => match rx.recv().await {
                    Some(()) => debouncer.trigger(Instant::now()),
                    None => break,
                },
            }
        }

        debug!("Debounce task stopped");
    });

    (ScanTrigger { tx }, handle)
}

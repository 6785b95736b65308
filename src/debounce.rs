//! Coalescing of raw device-change signals into settled reconciliations.
//!
//! One physical plug or unplug usually produces a burst of OS notifications,
//! and the OS keeps updating its device tables for a while afterwards. Both
//! schedulers here wait until no new signal has arrived for the settle delay
//! and then fire once.

use crate::error::ActivationError;
use crate::host::ReinitMode;
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Settle delay when the host only offers a global reinit.
pub const GLOBAL_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Settle delay when the host offers targeted reinit; it needs extra time to
/// settle internally after a targeted call.
pub const TARGETED_SETTLE_DELAY: Duration = Duration::from_millis(1500);

pub fn settle_delay(mode: ReinitMode) -> Duration {
    match mode {
        ReinitMode::Global => GLOBAL_SETTLE_DELAY,
        ReinitMode::Targeted => TARGETED_SETTLE_DELAY,
    }
}

#[derive(Debug)]
struct SignalState {
    pending: AtomicBool,
    closed: AtomicBool,
    wake: Option<Sender<()>>,
}

/// Payload-free "recheck now" flag shared between event sources and a
/// scheduler. Raising it repeatedly before it is consumed is the same as
/// raising it once.
#[derive(Debug, Clone)]
pub struct ChangeSignal {
    inner: Arc<SignalState>,
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSignal {
    /// A signal consumed by polling.
    pub fn new() -> Self {
        Self::with_wake(None)
    }

    fn with_wake(wake: Option<Sender<()>>) -> Self {
        Self {
            inner: Arc::new(SignalState {
                pending: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                wake,
            }),
        }
    }

    /// Safe to call from any thread, including OS callback threads.
    pub fn raise(&self) {
        if self.is_closed() {
            return;
        }
        self.inner.pending.store(true, Ordering::Release);
        if let Some(wake) = &self.inner.wake {
            // A full channel already carries a wake-up.
            let _ = wake.try_send(());
        }
    }

    /// Consume the pending flag.
    pub fn take(&self) -> bool {
        self.inner.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Ignore every later `raise`. Used at teardown so notifications already
    /// in flight cannot start another settle window.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.pending.store(false, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Poll-tick debouncer driven by a periodic callback on the embedder's
/// serialized context.
#[derive(Debug)]
pub struct Debouncer {
    signal: ChangeSignal,
    delay: Duration,
    armed_at: Option<Instant>,
}

impl Debouncer {
    pub fn new(signal: ChangeSignal, delay: Duration) -> Self {
        Self {
            signal,
            delay,
            armed_at: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Advance the settle window. Returns `true` exactly once per settled burst.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.signal.is_closed() {
            self.armed_at = None;
            return false;
        }

        if self.signal.take() {
            if self.armed_at.is_some() {
                debug!("device change while settling, restarting window");
            } else {
                debug!(
                    delay_ms = self.delay.as_millis() as u64,
                    "device change, settle window armed"
                );
            }
            self.armed_at = Some(now);
            return false;
        }

        match self.armed_at {
            Some(armed_at) if now.saturating_duration_since(armed_at) >= self.delay => {
                self.armed_at = None;
                true
            }
            _ => false,
        }
    }
}

/// One-shot debouncer: every raw signal (re)schedules a single callback at
/// settle-delay-from-now on a dedicated thread.
pub struct OneShotScheduler {
    signal: ChangeSignal,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OneShotScheduler {
    /// `on_settled` runs on the scheduler thread; embedders typically forward
    /// it to their own main context.
    pub fn spawn<F>(delay: Duration, on_settled: F) -> Result<Self, ActivationError>
    where
        F: Fn() + Send + 'static,
    {
        let (wake_tx, wake_rx) = channel::bounded(1);
        let (stop_tx, stop_rx) = channel::bounded(1);
        let signal = ChangeSignal::with_wake(Some(wake_tx));
        let thread_signal = signal.clone();

        let thread = thread::Builder::new()
            .name("automidireset-settle".into())
            .spawn(move || run_one_shot(thread_signal, delay, wake_rx, stop_rx, on_settled))?;

        Ok(Self {
            signal,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn signal(&self) -> ChangeSignal {
        self.signal.clone()
    }

    /// Cancel any scheduled callback and join the thread.
    pub fn shutdown(&mut self) {
        self.signal.close();
        // Dropping the sender disconnects the stop channel.
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("settle scheduler thread panicked");
            }
        }
    }
}

impl Drop for OneShotScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// What to do when the one-shot deadline passes.
#[derive(Debug, PartialEq, Eq)]
enum Expiry {
    /// A raise arrived alongside the deadline; start a fresh window.
    Rearm,
    Fire,
    /// Nothing is pending.
    Idle,
}

fn on_deadline(signal: &ChangeSignal, wake_rx: &Receiver<()>) -> Expiry {
    if wake_rx.try_recv().is_ok() {
        return Expiry::Rearm;
    }
    if signal.take() {
        Expiry::Fire
    } else {
        Expiry::Idle
    }
}

fn run_one_shot<F: Fn()>(
    signal: ChangeSignal,
    delay: Duration,
    wake_rx: Receiver<()>,
    stop_rx: Receiver<()>,
    on_settled: F,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let timer = match deadline {
            Some(at) => channel::after(at.saturating_duration_since(Instant::now())),
            None => channel::never(),
        };

        channel::select! {
            recv(stop_rx) -> _ => break,
            recv(wake_rx) -> msg => {
                if msg.is_err() {
                    break;
                }
                // The flag stays pending until the window closes.
                deadline = Some(Instant::now() + delay);
            }
            recv(timer) -> _ => {
                if signal.is_closed() {
                    break;
                }
                deadline = match on_deadline(&signal, &wake_rx) {
                    Expiry::Rearm => Some(Instant::now() + delay),
                    Expiry::Fire => {
                        on_settled();
                        None
                    }
                    Expiry::Idle => None,
                };
            }
        }
    }
}

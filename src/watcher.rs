use crate::config::{SchedulerKind, Settings};
use crate::debounce::{settle_delay, ChangeSignal, Debouncer, OneShotScheduler};
use crate::error::ActivationError;
use crate::host::{MidiHost, ReinitMode};
use crate::hotplug::{HotplugSource, Strategy};
use crate::ports::PortSnapshot;
use crate::reconcile::{ReconcileReport, Reconciler};
use std::time::{Duration, Instant};
use tracing::{debug, info};

enum Debounce {
    Tick(Debouncer),
    OneShot(OneShotScheduler),
}

/// One activation of the pipeline: event source, debounce scheduler and
/// port reconciler. Dropping the watcher tears all of it down.
pub struct Watcher {
    signal: ChangeSignal,
    debounce: Debounce,
    reconciler: Reconciler,
    source: Box<dyn HotplugSource>,
    delay: Duration,
}

impl Watcher {
    /// Activate with the poll-tick scheduler; the embedder calls [`Watcher::tick`]
    /// from its periodic callback.
    pub fn polled<H: MidiHost + ?Sized>(
        host: &mut H,
        settings: &Settings,
        source: Box<dyn HotplugSource>,
    ) -> Result<Self, ActivationError> {
        let delay = settle_delay(host.reinit_mode());
        let signal = ChangeSignal::new();
        let debounce = Debounce::Tick(Debouncer::new(signal.clone(), delay));
        Self::start(host, settings, source, signal, debounce, delay)
    }

    /// Activate with the one-shot scheduler. `on_settled` runs on the scheduler
    /// thread once a burst has settled; the embedder then calls
    /// [`Watcher::reconcile`] from its own main context.
    pub fn scheduled<H, F>(
        host: &mut H,
        settings: &Settings,
        source: Box<dyn HotplugSource>,
        on_settled: F,
    ) -> Result<Self, ActivationError>
    where
        H: MidiHost + ?Sized,
        F: Fn() + Send + 'static,
    {
        let delay = settle_delay(host.reinit_mode());
        let scheduler = OneShotScheduler::spawn(delay, on_settled)?;
        let signal = scheduler.signal();
        Self::start(host, settings, source, signal, Debounce::OneShot(scheduler), delay)
    }

    fn start<H: MidiHost + ?Sized>(
        host: &mut H,
        settings: &Settings,
        mut source: Box<dyn HotplugSource>,
        signal: ChangeSignal,
        debounce: Debounce,
        delay: Duration,
    ) -> Result<Self, ActivationError> {
        source.start(signal.clone())?;

        let mode = host.reinit_mode();
        let mut reconciler = Reconciler::new(mode, settings.global_prepass);
        reconciler.initialize(host);

        info!(
            strategy = %source.strategy(),
            ?mode,
            delay_ms = delay.as_millis() as u64,
            global_prepass = settings.global_prepass,
            "watching for MIDI device changes"
        );

        Ok(Self {
            signal,
            debounce,
            reconciler,
            source,
            delay,
        })
    }

    pub fn scheduler(&self) -> SchedulerKind {
        match self.debounce {
            Debounce::Tick(_) => SchedulerKind::PollTick,
            Debounce::OneShot(_) => SchedulerKind::OneShot,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.source.strategy()
    }

    pub fn mode(&self) -> ReinitMode {
        self.reconciler.mode()
    }

    pub fn settle_delay(&self) -> Duration {
        self.delay
    }

    pub fn snapshot(&self) -> &PortSnapshot {
        self.reconciler.snapshot()
    }

    /// Whether a settle window is currently open.
    pub fn is_settling(&self) -> bool {
        match &self.debounce {
            Debounce::Tick(debouncer) => debouncer.is_armed() || self.signal.is_pending(),
            Debounce::OneShot(_) => self.signal.is_pending(),
        }
    }

    /// Periodic callback for the poll-tick scheduler. Returns the report when
    /// a settled burst triggered a reconciliation.
    pub fn tick<H: MidiHost + ?Sized>(
        &mut self,
        host: &mut H,
        now: Instant,
    ) -> Option<ReconcileReport> {
        let Debounce::Tick(debouncer) = &mut self.debounce else {
            return None;
        };
        if debouncer.tick(now) {
            Some(self.reconcile(host))
        } else {
            None
        }
    }

    /// Reconcile immediately.
    pub fn reconcile<H: MidiHost + ?Sized>(&mut self, host: &mut H) -> ReconcileReport {
        if self.signal.is_closed() {
            return ReconcileReport::default();
        }
        let report = self.reconciler.reconcile(host);
        debug!(%report, "reconciliation finished");
        report
    }

    /// Stop observing and release every OS resource. Later notifications and
    /// ticks are ignored.
    pub fn shutdown(&mut self) {
        if self.signal.is_closed() {
            return;
        }
        self.signal.close();
        self.source.stop();
        if let Debounce::OneShot(scheduler) = &mut self.debounce {
            scheduler.shutdown();
        }
        info!("stopped watching for MIDI device changes");
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Events delivered to the monitor's main loop from other threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The one-shot scheduler saw a burst settle; reconcile now
    Settled,
}

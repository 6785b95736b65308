use super::{HotplugSource, Strategy};
use crate::debounce::ChangeSignal;
use crate::error::ActivationError;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Interval between port enumerations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

type Enumerate = Box<dyn Fn() -> Vec<String> + Send>;

/// Enumerates port names on a background thread and raises the signal when
/// the list differs from the previous enumeration.
pub struct PortPollingSource {
    interval: Duration,
    enumerate: Option<Enumerate>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PortPollingSource {
    pub fn new<F>(interval: Duration, enumerate: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + 'static,
    {
        Self {
            interval,
            enumerate: Some(Box::new(enumerate)),
            stop_tx: None,
            thread: None,
        }
    }

    /// Poll the system MIDI ports through `midir`.
    pub fn midi_ports() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, crate::midi::list_port_names)
    }
}

impl HotplugSource for PortPollingSource {
    fn strategy(&self) -> Strategy {
        Strategy::PortPolling
    }

    fn start(&mut self, signal: ChangeSignal) -> Result<(), ActivationError> {
        let Some(enumerate) = self.enumerate.take() else {
            return Err(ActivationError::subscription(
                self.strategy(),
                "source was already started",
            ));
        };
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let interval = self.interval;

        let thread = thread::Builder::new()
            .name("automidireset-poll".into())
            .spawn(move || {
                // The first enumeration only seeds the baseline.
                let mut previous = enumerate();
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }

                    let current = enumerate();
                    if current != previous {
                        debug!(ports = current.len(), "MIDI port list changed");
                        signal.raise();
                        previous = current;
                    }
                }
            })?;

        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("port polling thread panicked");
            }
        }
    }
}

impl Drop for PortPollingSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn scripted(lists: Vec<Vec<&'static str>>) -> impl Fn() -> Vec<String> + Send + 'static {
        let lists = Arc::new(Mutex::new(lists.into_iter()));
        let last = Arc::new(Mutex::new(Vec::new()));
        move || {
            let mut last = last.lock().unwrap();
            if let Some(next) = lists.lock().unwrap().next() {
                *last = next.into_iter().map(String::from).collect();
            }
            last.clone()
        }
    }

    #[test]
    fn test_unchanged_list_stays_quiet() {
        let signal = ChangeSignal::new();
        let mut source =
            PortPollingSource::new(Duration::from_millis(5), scripted(vec![vec!["Keys"]]));
        source.start(signal.clone()).unwrap();
        thread::sleep(Duration::from_millis(60));
        source.stop();
        assert!(!signal.is_pending());
    }

    #[test]
    fn test_changed_list_raises() {
        let signal = ChangeSignal::new();
        let mut source = PortPollingSource::new(
            Duration::from_millis(5),
            scripted(vec![vec!["Keys"], vec!["Keys"], vec!["Keys", "Pads"]]),
        );
        source.start(signal.clone()).unwrap();
        thread::sleep(Duration::from_millis(80));
        source.stop();
        assert!(signal.take());
    }

    #[test]
    fn test_second_start_is_refused() {
        let mut source = PortPollingSource::new(Duration::from_millis(5), Vec::new);
        source.start(ChangeSignal::new()).unwrap();
        assert!(source.start(ChangeSignal::new()).is_err());
        source.stop();
        source.stop();
    }
}

//! Platform listeners that turn OS device notifications into a [`ChangeSignal`].
//!
//! Every backend converges on the same contract: raise the signal whenever
//! the device topology may have changed, carry no payload, and release every
//! OS handle in `stop`.

#[cfg(target_os = "windows")]
pub mod broadcast;
#[cfg(target_os = "linux")]
pub mod bus_scan;
#[cfg(target_os = "macos")]
pub mod client_notify;
pub mod polling;

use crate::debounce::ChangeSignal;
use crate::error::ActivationError;
use std::fmt;

/// Which observation mechanism a source uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Windows device-interface broadcasts to a hidden window.
    BroadcastListener,
    /// CoreMIDI client "setup changed" notifications.
    ClientNotification,
    /// libusb hotplug callbacks filtered to MIDI streaming interfaces.
    BusScan,
    /// Periodic port-name enumeration.
    PortPolling,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::BroadcastListener => "device broadcast",
            Strategy::ClientNotification => "CoreMIDI client",
            Strategy::BusScan => "USB hotplug",
            Strategy::PortPolling => "port polling",
        };
        write!(f, "{}", name)
    }
}

/// A running device-change observer.
pub trait HotplugSource: Send {
    fn strategy(&self) -> Strategy;

    /// Subscribe to OS notifications. On error nothing stays registered.
    fn start(&mut self, signal: ChangeSignal) -> Result<(), ActivationError>;

    /// Unsubscribe and join any owned thread. Safe to call more than once.
    fn stop(&mut self);
}

/// The preferred source for the platform this crate was built for.
pub fn native_source() -> Box<dyn HotplugSource> {
    #[cfg(target_os = "windows")]
    {
        Box::new(broadcast::BroadcastListener::new())
    }

    #[cfg(target_os = "macos")]
    {
        Box::new(client_notify::ClientNotificationSource::new())
    }

    #[cfg(target_os = "linux")]
    {
        Box::new(bus_scan::BusScanSource::new())
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        Box::new(polling::PortPollingSource::midi_ports())
    }
}

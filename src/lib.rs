//! Reinitializes a host application's MIDI devices when hardware is plugged
//! in or removed.
//!
//! A platform [`hotplug`] source raises a [`ChangeSignal`], a [`debounce`]
//! scheduler waits for the OS to settle, and the [`Reconciler`] diffs the
//! host's port slots against its snapshot to decide which reinit calls to
//! make. [`Watcher`] ties the three together for one activation; the
//! [`extension`] module exposes it to the host through its plugin ABI.

pub mod config;
pub mod debounce;
pub mod error;
pub mod extension;
pub mod host;
pub mod hotplug;
pub mod logging;
pub mod midi;
pub mod ports;
pub mod reconcile;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{SchedulerKind, Settings};
pub use debounce::ChangeSignal;
pub use error::{ActivationError, ConfigError};
pub use host::{MidiHost, ReinitMode};
pub use ports::{PortDirection, PortInfo, PortSnapshot};
pub use reconcile::{ReconcileReport, Reconciler};
pub use watcher::Watcher;

use crate::ports::{PortDirection, PortInfo};

/// Reinitialization strategy available from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReinitMode {
    /// Only the global reinit exists; every reconciliation reopens everything.
    Global,
    /// The host can reopen a single port slot.
    Targeted,
}

/// What the reconciliation pipeline needs from the application hosting it.
///
/// Enumeration methods are only consulted in [`ReinitMode::Targeted`].
pub trait MidiHost {
    fn reinit_mode(&self) -> ReinitMode;

    /// Number of slots the host currently enumerates for `direction`.
    fn port_count(&mut self, direction: PortDirection) -> usize;

    /// Describe one slot. Returns an empty name when the slot cannot be queried.
    fn port(&mut self, direction: PortDirection, index: usize) -> PortInfo;

    /// Refresh every MIDI device.
    fn reinit_all(&mut self);

    /// Refresh a single port slot.
    fn reinit_port(&mut self, direction: PortDirection, index: usize);

    /// Advisory text for the host's console.
    fn console(&mut self, _message: &str) {}
}

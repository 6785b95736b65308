use crate::host::MidiHost;
use serde::Serialize;
use std::fmt;

/// Which side of the host's device table a port slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    pub const ALL: [PortDirection; 2] = [PortDirection::Input, PortDirection::Output];
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// State of one port slot as reported by the host.
/// An empty name marks a slot the host could not describe this time around.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub attached: bool,
}

impl PortInfo {
    pub fn new(name: impl Into<String>, attached: bool) -> Self {
        Self {
            name: name.into(),
            attached,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Point-in-time view of which port slots are attached.
///
/// Slots are positional: index `i` is whatever the host enumerated at `i`
/// during the last rebuild or reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSnapshot {
    inputs: Vec<PortInfo>,
    outputs: Vec<PortInfo>,
}

impl PortSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate every slot the host currently knows about.
    pub fn capture<H: MidiHost + ?Sized>(host: &mut H) -> Self {
        let mut snapshot = Self::new();
        for direction in PortDirection::ALL {
            let count = host.port_count(direction);
            let slots = snapshot.slots_mut(direction);
            slots.reserve(count);
            for index in 0..count {
                slots.push(host.port(direction, index));
            }
        }
        snapshot
    }

    pub fn slots(&self, direction: PortDirection) -> &[PortInfo] {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        }
    }

    pub(crate) fn slots_mut(&mut self, direction: PortDirection) -> &mut Vec<PortInfo> {
        match direction {
            PortDirection::Input => &mut self.inputs,
            PortDirection::Output => &mut self.outputs,
        }
    }

    /// Attachment flags in slot order.
    pub fn attached(&self, direction: PortDirection) -> Vec<bool> {
        self.slots(direction).iter().map(|slot| slot.attached).collect()
    }

    pub fn inputs(&self) -> Vec<bool> {
        self.attached(PortDirection::Input)
    }

    pub fn outputs(&self) -> Vec<bool> {
        self.attached(PortDirection::Output)
    }

    pub fn len(&self, direction: PortDirection) -> usize {
        self.slots(direction).len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeHost;

    #[test]
    fn test_capture_reads_every_slot() {
        let mut host = FakeHost::targeted(
            &[("Keys", true), ("Pads", false)],
            &[("Synth", true)],
        );
        let snapshot = PortSnapshot::capture(&mut host);

        assert_eq!(snapshot.inputs(), vec![true, false]);
        assert_eq!(snapshot.outputs(), vec![true]);
        assert_eq!(snapshot.slots(PortDirection::Input)[1].name, "Pads");
        assert!(host.calls.is_empty());
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = PortSnapshot::new();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(PortDirection::Output), 0);
    }
}

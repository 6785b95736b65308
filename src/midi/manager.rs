use crate::host::{MidiHost, ReinitMode};
use crate::ports::{PortDirection, PortInfo};
use midir::{MidiInput, MidiOutput};
use tracing::{debug, info};

const CLIENT_NAME: &str = "amr-list";

/// Lists the names of the system MIDI ports for one direction, in the order
/// the MIDI backend enumerates them.
pub fn list_ports(direction: PortDirection) -> Vec<String> {
    match direction {
        PortDirection::Input => match MidiInput::new(CLIENT_NAME) {
            Ok(midi_in) => midi_in
                .ports()
                .iter()
                .filter_map(|port| midi_in.port_name(port).ok())
                .collect(),
            Err(err) => {
                debug!(%err, "cannot open MIDI input client");
                Vec::new()
            }
        },
        PortDirection::Output => match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|port| midi_out.port_name(port).ok())
                .collect(),
            Err(err) => {
                debug!(%err, "cannot open MIDI output client");
                Vec::new()
            }
        },
    }
}

/// Every port name, tagged with its direction.
pub fn list_port_names() -> Vec<String> {
    PortDirection::ALL
        .iter()
        .flat_map(|direction| {
            list_ports(*direction)
                .into_iter()
                .map(move |name| format!("{}:{}", direction, name))
        })
        .collect()
}

/// Fold a fresh enumeration into a stable slot table. Known slots keep their
/// index and become detached when their device disappears; unseen names get
/// new slots at the end.
pub(crate) fn merge_slots(slots: &mut Vec<PortInfo>, mut present: Vec<String>) {
    for slot in slots.iter_mut() {
        match present.iter().position(|name| *name == slot.name) {
            Some(found) => {
                present.remove(found);
                slot.attached = true;
            }
            None => slot.attached = false,
        }
    }
    slots.extend(present.into_iter().map(|name| PortInfo::new(name, true)));
}

/// Host implementation over the system MIDI ports.
///
/// Like a DAW's device preferences, slots are remembered once seen, so a
/// device that goes away keeps its index and comes back to the same slot.
pub struct MidiManager {
    inputs: Vec<PortInfo>,
    outputs: Vec<PortInfo>,
    lister: fn(PortDirection) -> Vec<String>,
}

impl Default for MidiManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiManager {
    /// Creates a manager over the system MIDI ports
    pub fn new() -> Self {
        Self::with_lister(list_ports)
    }

    pub fn with_lister(lister: fn(PortDirection) -> Vec<String>) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            lister,
        }
    }

    fn slots_mut(&mut self, direction: PortDirection) -> &mut Vec<PortInfo> {
        match direction {
            PortDirection::Input => &mut self.inputs,
            PortDirection::Output => &mut self.outputs,
        }
    }

    /// Known slots, attached or not.
    pub fn slots(&self, direction: PortDirection) -> &[PortInfo] {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        }
    }

    pub fn refresh(&mut self, direction: PortDirection) {
        let present = (self.lister)(direction);
        merge_slots(self.slots_mut(direction), present);
    }

    pub fn refresh_all(&mut self) {
        for direction in PortDirection::ALL {
            self.refresh(direction);
        }
    }
}

impl MidiHost for MidiManager {
    fn reinit_mode(&self) -> ReinitMode {
        ReinitMode::Targeted
    }

    fn port_count(&mut self, direction: PortDirection) -> usize {
        self.refresh(direction);
        self.slots(direction).len()
    }

    fn port(&mut self, direction: PortDirection, index: usize) -> PortInfo {
        self.slots(direction).get(index).cloned().unwrap_or_default()
    }

    fn reinit_all(&mut self) {
        self.refresh_all();
        info!(
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            "re-enumerated MIDI ports"
        );
    }

    fn reinit_port(&mut self, direction: PortDirection, index: usize) {
        if let Some(slot) = self.slots(direction).get(index) {
            let state = if slot.attached { "attached" } else { "detached" };
            info!(%direction, index, name = %slot.name, "slot {}", state);
        }
    }
}

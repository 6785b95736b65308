use crate::host::{MidiHost, ReinitMode};
use crate::ports::{PortDirection, PortInfo, PortSnapshot};
use std::fmt;
use tracing::{debug, info};

/// What a single reconciliation asked of the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub global_reinit: bool,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

impl ReconcileReport {
    pub fn changed(&self, direction: PortDirection) -> &[usize] {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        }
    }

    fn changed_mut(&mut self, direction: PortDirection) -> &mut Vec<usize> {
        match direction {
            PortDirection::Input => &mut self.inputs,
            PortDirection::Output => &mut self.outputs,
        }
    }

    pub fn targeted_calls(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.global_reinit && self.targeted_calls() == 0
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no port changes");
        }
        let mut parts = Vec::new();
        if self.global_reinit {
            parts.push("global reinit".to_string());
        }
        if !self.inputs.is_empty() {
            parts.push(format!("inputs {:?}", self.inputs));
        }
        if !self.outputs.is_empty() {
            parts.push(format!("outputs {:?}", self.outputs));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Owns the port snapshot and decides which reinit calls to issue.
#[derive(Debug)]
pub struct Reconciler {
    mode: ReinitMode,
    global_prepass: bool,
    snapshot: PortSnapshot,
}

impl Reconciler {
    pub fn new(mode: ReinitMode, global_prepass: bool) -> Self {
        Self {
            mode,
            global_prepass,
            snapshot: PortSnapshot::new(),
        }
    }

    pub fn mode(&self) -> ReinitMode {
        self.mode
    }

    pub fn snapshot(&self) -> &PortSnapshot {
        &self.snapshot
    }

    /// Capture the startup snapshot. Issues no reinit calls.
    pub fn initialize<H: MidiHost + ?Sized>(&mut self, host: &mut H) {
        if self.mode == ReinitMode::Global {
            return;
        }
        self.snapshot = PortSnapshot::capture(host);
        debug!(
            inputs = self.snapshot.len(PortDirection::Input),
            outputs = self.snapshot.len(PortDirection::Output),
            "captured startup port snapshot"
        );
    }

    /// Re-query the host and reinitialize whatever changed since the last pass.
    pub fn reconcile<H: MidiHost + ?Sized>(&mut self, host: &mut H) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        if self.mode == ReinitMode::Global {
            info!("reinitializing all MIDI devices");
            host.reinit_all();
            report.global_reinit = true;
            return report;
        }

        if self.global_prepass {
            debug!("global reinit before per-port pass");
            host.reinit_all();
            report.global_reinit = true;
        }

        for direction in PortDirection::ALL {
            let changed = diff_direction(host, self.snapshot.slots_mut(direction), direction);
            *report.changed_mut(direction) = changed;
        }

        report
    }
}

/// A slot counts as changed when attachment flips, or when a previously known
/// name no longer matches (the host renumbered its slots).
fn slot_changed(known: &PortInfo, fresh: &PortInfo) -> bool {
    known.attached != fresh.attached || (known.is_valid() && known.name != fresh.name)
}

fn diff_direction<H: MidiHost + ?Sized>(
    host: &mut H,
    slots: &mut Vec<PortInfo>,
    direction: PortDirection,
) -> Vec<usize> {
    let count = host.port_count(direction);
    let mut changed = Vec::new();

    for index in 0..count {
        let fresh = host.port(direction, index);
        if !fresh.is_valid() {
            debug!(%direction, index, "skipping unnamed slot");
            continue;
        }

        if index >= slots.len() {
            slots.resize_with(index + 1, PortInfo::default);
        }
        let known = &mut slots[index];
        if !slot_changed(known, &fresh) {
            *known = fresh;
            continue;
        }

        info!(
            %direction,
            index,
            name = %fresh.name,
            attached = fresh.attached,
            "reinitializing port slot"
        );
        host.reinit_port(direction, index);
        *known = fresh;
        changed.push(index);
    }

    slots.truncate(count);
    changed
}

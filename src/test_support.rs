//! Scripted collaborators shared by the unit tests.

use crate::debounce::ChangeSignal;
use crate::error::ActivationError;
use crate::host::{MidiHost, ReinitMode};
use crate::hotplug::{HotplugSource, Strategy};
use crate::ports::{PortDirection, PortInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    ReinitAll,
    ReinitPort(PortDirection, usize),
}

/// In-memory host whose port table is rewritten by the test.
#[derive(Debug)]
pub struct FakeHost {
    pub mode: ReinitMode,
    pub inputs: Vec<PortInfo>,
    pub outputs: Vec<PortInfo>,
    pub calls: Vec<HostCall>,
    pub console: Vec<String>,
}

fn to_ports(ports: &[(&str, bool)]) -> Vec<PortInfo> {
    ports
        .iter()
        .map(|(name, attached)| PortInfo::new(*name, *attached))
        .collect()
}

fn to_ports_owned(ports: Vec<(String, bool)>) -> Vec<PortInfo> {
    ports
        .into_iter()
        .map(|(name, attached)| PortInfo::new(name, attached))
        .collect()
}

impl FakeHost {
    pub fn global() -> Self {
        Self {
            mode: ReinitMode::Global,
            inputs: Vec::new(),
            outputs: Vec::new(),
            calls: Vec::new(),
            console: Vec::new(),
        }
    }

    pub fn targeted(inputs: &[(&str, bool)], outputs: &[(&str, bool)]) -> Self {
        Self {
            mode: ReinitMode::Targeted,
            inputs: to_ports(inputs),
            outputs: to_ports(outputs),
            calls: Vec::new(),
            console: Vec::new(),
        }
    }

    pub fn targeted_owned(inputs: Vec<(String, bool)>, outputs: Vec<(String, bool)>) -> Self {
        Self {
            mode: ReinitMode::Targeted,
            inputs: to_ports_owned(inputs),
            outputs: to_ports_owned(outputs),
            calls: Vec::new(),
            console: Vec::new(),
        }
    }

    pub fn set_inputs(&mut self, inputs: &[(&str, bool)]) {
        self.inputs = to_ports(inputs);
    }

    pub fn set_inputs_owned(&mut self, inputs: Vec<(String, bool)>) {
        self.inputs = to_ports_owned(inputs);
    }

    pub fn set_outputs(&mut self, outputs: &[(&str, bool)]) {
        self.outputs = to_ports(outputs);
    }

    fn table(&self, direction: PortDirection) -> &[PortInfo] {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        }
    }
}

impl MidiHost for FakeHost {
    fn reinit_mode(&self) -> ReinitMode {
        self.mode
    }

    fn port_count(&mut self, direction: PortDirection) -> usize {
        self.table(direction).len()
    }

    fn port(&mut self, direction: PortDirection, index: usize) -> PortInfo {
        self.table(direction).get(index).cloned().unwrap_or_default()
    }

    fn reinit_all(&mut self) {
        self.calls.push(HostCall::ReinitAll);
    }

    fn reinit_port(&mut self, direction: PortDirection, index: usize) {
        self.calls.push(HostCall::ReinitPort(direction, index));
    }

    fn console(&mut self, message: &str) {
        self.console.push(message.to_string());
    }
}

/// Lets a test deliver raw device-change notifications by hand.
#[derive(Clone, Default)]
pub struct ManualTrigger {
    signal: Arc<Mutex<Option<ChangeSignal>>>,
    stopped: Arc<AtomicBool>,
}

impl ManualTrigger {
    /// Deliver a notification. Still reaches the signal after `stop`, like a
    /// callback that was already in flight when the OS handle went away.
    pub fn fire(&self) {
        if let Some(signal) = self.signal.lock().unwrap().as_ref() {
            signal.raise();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub struct ManualSource {
    trigger: ManualTrigger,
    fail: bool,
}

impl ManualSource {
    pub fn new() -> (Self, ManualTrigger) {
        let trigger = ManualTrigger::default();
        (
            Self {
                trigger: trigger.clone(),
                fail: false,
            },
            trigger,
        )
    }

    pub fn failing() -> Self {
        Self {
            trigger: ManualTrigger::default(),
            fail: true,
        }
    }
}

impl HotplugSource for ManualSource {
    fn strategy(&self) -> Strategy {
        Strategy::PortPolling
    }

    fn start(&mut self, signal: ChangeSignal) -> Result<(), ActivationError> {
        if self.fail {
            return Err(ActivationError::subscription(self.strategy(), "refused by test"));
        }
        *self.trigger.signal.lock().unwrap() = Some(signal);
        Ok(())
    }

    fn stop(&mut self) {
        self.trigger.stopped.store(true, Ordering::SeqCst);
    }
}

/// Serializes tests that touch the process-wide extension slot.
pub static ENTRY_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

use super::capabilities::{Capabilities, GetMidiPortNameFn};
use crate::host::{MidiHost, ReinitMode};
use crate::ports::{PortDirection, PortInfo};
use std::ffi::{c_char, c_int, CStr, CString};
use std::path::PathBuf;

const NAME_BUFFER_LEN: usize = 256;

/// [`MidiHost`] over the functions imported from the host application.
#[derive(Debug, Clone, Copy)]
pub struct ReaperHost {
    caps: Capabilities,
}

impl ReaperHost {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }

    /// Directory holding the host's settings, if the host exposes it.
    pub fn resource_path(&self) -> Option<PathBuf> {
        let get_resource_path = self.caps.get_resource_path?;
        let path = unsafe { get_resource_path() };
        if path.is_null() {
            return None;
        }
        let path = unsafe { CStr::from_ptr(path) }.to_string_lossy().into_owned();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

fn query_name(get_name: GetMidiPortNameFn, index: usize) -> PortInfo {
    let Ok(dev) = c_int::try_from(index) else {
        return PortInfo::default();
    };
    let mut buffer = [0 as c_char; NAME_BUFFER_LEN];
    let attached = unsafe { get_name(dev, buffer.as_mut_ptr(), NAME_BUFFER_LEN as c_int) };
    // Guarantee termination whatever the host wrote.
    buffer[NAME_BUFFER_LEN - 1] = 0;
    let name = unsafe { CStr::from_ptr(buffer.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    PortInfo { name, attached }
}

impl MidiHost for ReaperHost {
    fn reinit_mode(&self) -> ReinitMode {
        if self.caps.targeted.is_some() {
            ReinitMode::Targeted
        } else {
            ReinitMode::Global
        }
    }

    fn port_count(&mut self, direction: PortDirection) -> usize {
        let Some(api) = self.caps.targeted else {
            return 0;
        };
        let count = unsafe {
            match direction {
                PortDirection::Input => (api.get_num_inputs)(),
                PortDirection::Output => (api.get_num_outputs)(),
            }
        };
        usize::try_from(count).unwrap_or(0)
    }

    fn port(&mut self, direction: PortDirection, index: usize) -> PortInfo {
        let Some(api) = self.caps.targeted else {
            return PortInfo::default();
        };
        match direction {
            PortDirection::Input => query_name(api.get_input_name, index),
            PortDirection::Output => query_name(api.get_output_name, index),
        }
    }

    fn reinit_all(&mut self) {
        unsafe { (self.caps.midi_reinit)() };
    }

    fn reinit_port(&mut self, direction: PortDirection, index: usize) {
        let Some(api) = self.caps.targeted else {
            return;
        };
        let Ok(index) = c_int::try_from(index) else {
            return;
        };
        // -1 leaves the other side alone.
        let (input, output) = match direction {
            PortDirection::Input => (index, -1),
            PortDirection::Output => (-1, index),
        };
        unsafe { (api.midi_init)(input, output) };
    }

    fn console(&mut self, message: &str) {
        if let Ok(message) = CString::new(message) {
            unsafe { (self.caps.show_console_msg)(message.as_ptr()) };
        }
    }
}

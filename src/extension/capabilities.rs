//! Resolution of host API functions by name.

use crate::error::ActivationError;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::mem;
use tracing::debug;

pub type ShowConsoleMsgFn = unsafe extern "C" fn(msg: *const c_char);
pub type MidiReinitFn = unsafe extern "C" fn();
pub type MidiInitFn = unsafe extern "C" fn(force_reinit_input: c_int, force_reinit_output: c_int);
pub type GetNumMidiPortsFn = unsafe extern "C" fn() -> c_int;
pub type GetMidiPortNameFn =
    unsafe extern "C" fn(dev: c_int, nameout: *mut c_char, nameout_sz: c_int) -> bool;
pub type GetResourcePathFn = unsafe extern "C" fn() -> *const c_char;

/// Host side of the function import mechanism: a symbolic name in, an opaque
/// function pointer (or null) out.
pub trait CapabilityLookup {
    fn lookup(&self, name: &CStr) -> *mut c_void;
}

impl<F> CapabilityLookup for F
where
    F: Fn(&CStr) -> *mut c_void,
{
    fn lookup(&self, name: &CStr) -> *mut c_void {
        self(name)
    }
}

/// Functions needed for per-port reinitialization. Only usable as a set.
#[derive(Debug, Clone, Copy)]
pub struct TargetedApi {
    pub midi_init: MidiInitFn,
    pub get_num_inputs: GetNumMidiPortsFn,
    pub get_num_outputs: GetNumMidiPortsFn,
    pub get_input_name: GetMidiPortNameFn,
    pub get_output_name: GetMidiPortNameFn,
}

/// Every host function this extension imports.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub show_console_msg: ShowConsoleMsgFn,
    pub midi_reinit: MidiReinitFn,
    pub targeted: Option<TargetedApi>,
    pub get_resource_path: Option<GetResourcePathFn>,
}

/// # Safety
/// A non-null pointer returned for `name` must be a function of type `F`.
unsafe fn optional<F: Copy>(lookup: &dyn CapabilityLookup, name: &CStr) -> Option<F> {
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*mut c_void>());
    let ptr = lookup.lookup(name);
    if ptr.is_null() {
        debug!(name = %name.to_string_lossy(), "optional host function unavailable");
        return None;
    }
    Some(unsafe { mem::transmute_copy::<*mut c_void, F>(&ptr) })
}

/// # Safety
/// Same contract as [`optional`].
unsafe fn required<F: Copy>(
    lookup: &dyn CapabilityLookup,
    name: &'static CStr,
    label: &'static str,
) -> Result<F, ActivationError> {
    unsafe { optional(lookup, name) }.ok_or(ActivationError::MissingCapability(label))
}

impl Capabilities {
    /// Import every function, failing on the first missing required one.
    ///
    /// # Safety
    /// Each non-null pointer the lookup returns must be a function with the
    /// signature documented by the host for that name.
    pub unsafe fn resolve(lookup: &dyn CapabilityLookup) -> Result<Self, ActivationError> {
        let show_console_msg = unsafe { required(lookup, c"ShowConsoleMsg", "ShowConsoleMsg")? };
        let midi_reinit = unsafe { required(lookup, c"midi_reinit", "midi_reinit")? };

        let targeted = unsafe {
            match (
                optional(lookup, c"midi_init"),
                optional(lookup, c"GetNumMIDIInputs"),
                optional(lookup, c"GetNumMIDIOutputs"),
                optional(lookup, c"GetMIDIInputName"),
                optional(lookup, c"GetMIDIOutputName"),
            ) {
                (
                    Some(midi_init),
                    Some(get_num_inputs),
                    Some(get_num_outputs),
                    Some(get_input_name),
                    Some(get_output_name),
                ) => Some(TargetedApi {
                    midi_init,
                    get_num_inputs,
                    get_num_outputs,
                    get_input_name,
                    get_output_name,
                }),
                _ => None,
            }
        };

        Ok(Self {
            show_console_msg,
            midi_reinit,
            targeted,
            get_resource_path: unsafe { optional(lookup, c"GetResourcePath") },
        })
    }
}

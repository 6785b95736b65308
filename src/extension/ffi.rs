//! C ABI shared with the host's plugin loader.

use std::ffi::{c_char, c_int, c_void};
use std::panic;

/// Registration record version this extension was built against.
pub const PLUGIN_VERSION: c_int = 0x20E;

pub type RegisterFn = unsafe extern "C" fn(name: *const c_char, info: *mut c_void) -> c_int;
pub type GetFuncFn = unsafe extern "C" fn(name: *const c_char) -> *mut c_void;

/// Registration record handed to the entry point.
#[repr(C)]
pub struct PluginInfo {
    pub caller_version: c_int,
    pub hwnd_main: *mut c_void,
    pub register: Option<RegisterFn>,
    pub get_func: Option<GetFuncFn>,
}

/// Entry point called by the host on load (with a record) and unload (with null).
///
/// # Safety
/// `rec` must be null or point to a valid record for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn ReaperPluginEntry(_instance: *mut c_void, rec: *mut PluginInfo) -> c_int {
    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        if rec.is_null() {
            super::deactivate();
            return 0;
        }

        let info = unsafe { &*rec };
        match super::activate(info) {
            Ok(()) => 1,
            Err(err) => {
                eprintln!("[reaper_automidireset] {}", err);
                tracing::error!(%err, "activation refused");
                0
            }
        }
    }));
    result.unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ENTRY_LOCK;
    use std::cell::Cell;
    use std::ffi::CStr;

    thread_local! {
        static REGISTRATIONS: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C" fn register(_name: *const c_char, _info: *mut c_void) -> c_int {
        REGISTRATIONS.with(|count| count.set(count.get() + 1));
        1
    }

    unsafe extern "C" fn get_func_missing_all(_name: *const c_char) -> *mut c_void {
        std::ptr::null_mut()
    }

    unsafe extern "C" fn console(_msg: *const c_char) {}

    unsafe extern "C" fn get_func_console_only(name: *const c_char) -> *mut c_void {
        let name = unsafe { CStr::from_ptr(name) };
        if name == c"ShowConsoleMsg" {
            console as *const () as *mut c_void
        } else {
            std::ptr::null_mut()
        }
    }

    fn record(version: c_int, get_func: Option<GetFuncFn>) -> PluginInfo {
        PluginInfo {
            caller_version: version,
            hwnd_main: std::ptr::null_mut(),
            register: Some(register),
            get_func,
        }
    }

    #[test]
    fn test_null_record_deactivates() {
        let _guard = ENTRY_LOCK.lock();
        let status = unsafe { ReaperPluginEntry(std::ptr::null_mut(), std::ptr::null_mut()) };
        assert_eq!(status, 0);
    }

    #[test]
    fn test_version_mismatch_is_refused() {
        let _guard = ENTRY_LOCK.lock();
        let mut rec = record(0x20D, Some(get_func_missing_all));
        let status = unsafe { ReaperPluginEntry(std::ptr::null_mut(), &mut rec) };
        assert_eq!(status, 0);
        assert_eq!(REGISTRATIONS.with(Cell::get), 0);
    }

    #[test]
    fn test_missing_lookup_is_refused() {
        let _guard = ENTRY_LOCK.lock();
        let mut rec = record(PLUGIN_VERSION, None);
        let status = unsafe { ReaperPluginEntry(std::ptr::null_mut(), &mut rec) };
        assert_eq!(status, 0);
        assert_eq!(REGISTRATIONS.with(Cell::get), 0);
    }

    #[test]
    fn test_missing_required_function_is_refused() {
        let _guard = ENTRY_LOCK.lock();
        for get_func in [get_func_missing_all as GetFuncFn, get_func_console_only] {
            let mut rec = record(PLUGIN_VERSION, Some(get_func));
            let status = unsafe { ReaperPluginEntry(std::ptr::null_mut(), &mut rec) };
            assert_eq!(status, 0);
        }
        assert_eq!(REGISTRATIONS.with(Cell::get), 0);
    }
}

//! The host-loaded extension: capability import, lifecycle entry point and the
//! timer-driven watcher.
//!
//! The host loads one instance per process, so the active watcher lives in a
//! process-wide slot guarded by a mutex. All watcher state is touched from the
//! host's timer callback or from the entry point, both on the host's main
//! thread; OS listener threads only raise the change signal.

pub mod capabilities;
pub mod ffi;
pub mod host;

use crate::config::{SchedulerKind, Settings, SETTINGS_FILE_NAME};
use crate::error::{ActivationError, ConfigError};
use crate::host::MidiHost;
use crate::hotplug::{self, HotplugSource};
use crate::logging;
use crate::reconcile::ReconcileReport;
use crate::watcher::Watcher;
use capabilities::{CapabilityLookup, Capabilities};
use ffi::{GetFuncFn, PluginInfo, RegisterFn, PLUGIN_VERSION};
use host::ReaperHost;
use parking_lot::Mutex;
use std::ffi::{c_void, CStr};
use std::panic;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A watcher bound to the host it reinitializes.
pub struct Extension<H: MidiHost> {
    host: H,
    settings: Settings,
    watcher: Watcher,
}

impl<H: MidiHost> Extension<H> {
    /// Start the source and capture the startup snapshot.
    pub fn start(
        mut host: H,
        settings: Settings,
        source: Box<dyn HotplugSource>,
    ) -> Result<Self, ActivationError> {
        if settings.scheduler != SchedulerKind::PollTick {
            warn!(
                scheduler = %settings.scheduler,
                "the host timer drives debouncing, ignoring scheduler setting"
            );
        }

        let watcher = Watcher::polled(&mut host, &settings, source)?;
        if settings.console_messages {
            host.console(&format!(
                "automidireset: watching for MIDI device changes ({}, {:?} reinit)\n",
                watcher.strategy(),
                watcher.mode()
            ));
        }

        Ok(Self {
            host,
            settings,
            watcher,
        })
    }

    /// Host timer callback.
    pub fn on_timer(&mut self, now: Instant) -> Option<ReconcileReport> {
        let report = self.watcher.tick(&mut self.host, now)?;
        if self.settings.console_messages {
            self.host
                .console(&format!("automidireset: MIDI devices changed, {}\n", report));
        }
        Some(report)
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

struct Active {
    extension: Extension<ReaperHost>,
    register: RegisterFn,
}

static ACTIVE: Mutex<Option<Active>> = Mutex::new(None);

struct HostLookup(GetFuncFn);

impl CapabilityLookup for HostLookup {
    fn lookup(&self, name: &CStr) -> *mut c_void {
        unsafe { (self.0)(name.as_ptr()) }
    }
}

fn timer_callback_ptr() -> *mut c_void {
    on_timer as *const () as *mut c_void
}

extern "C" fn on_timer() {
    let _ = panic::catch_unwind(|| {
        if let Some(active) = ACTIVE.lock().as_mut() {
            active.extension.on_timer(Instant::now());
        }
    });
}

fn load_settings(resource_dir: Option<PathBuf>) -> Result<Settings, ConfigError> {
    match resource_dir {
        Some(dir) => Settings::load_if_present(&dir.join(SETTINGS_FILE_NAME)),
        None => Ok(Settings::default()),
    }
}

pub(crate) fn activate(info: &PluginInfo) -> Result<(), ActivationError> {
    activate_with(info, hotplug::native_source())
}

fn activate_with(
    info: &PluginInfo,
    source: Box<dyn HotplugSource>,
) -> Result<(), ActivationError> {
    if info.caller_version != PLUGIN_VERSION {
        return Err(ActivationError::VersionMismatch {
            found: info.caller_version,
            expected: PLUGIN_VERSION,
        });
    }
    let get_func = info.get_func.ok_or(ActivationError::NoLookup)?;
    let register = info.register.ok_or(ActivationError::NoRegister)?;

    // SAFETY: the host's lookup returns functions matching its published API.
    let caps = unsafe { Capabilities::resolve(&HostLookup(get_func))? };
    let host = ReaperHost::new(caps);

    // The log filter comes from the settings, so a load failure is only
    // reported once the subscriber exists.
    let loaded = load_settings(host.resource_path());
    let settings = loaded.as_ref().cloned().unwrap_or_default();
    logging::init_stderr(&settings.log_filter);
    if let Err(err) = &loaded {
        warn!(%err, "using default settings");
    }
    debug!(mode = ?host.reinit_mode(), "host capabilities resolved");

    // Never carry handles over from an earlier activation.
    deactivate();

    let extension = Extension::start(host, settings, source)?;
    if unsafe { register(c"timer".as_ptr(), timer_callback_ptr()) } == 0 {
        // Dropping the extension tears the source down again.
        return Err(ActivationError::Registration("timer"));
    }

    *ACTIVE.lock() = Some(Active { extension, register });
    info!("extension activated");
    Ok(())
}

pub(crate) fn deactivate() {
    let Some(active) = ACTIVE.lock().take() else {
        return;
    };
    unsafe { (active.register)(c"-timer".as_ptr(), timer_callback_ptr()) };
    drop(active.extension);
    info!("extension deactivated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortDirection;
    use crate::test_support::{FakeHost, HostCall, ManualSource, ENTRY_LOCK};
    use parking_lot::MutexGuard;
    use std::ffi::{c_char, c_int};
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn console_settings() -> Settings {
        Settings {
            console_messages: true,
            ..Settings::default()
        }
    }

    static REGISTER_CALLS: Mutex<Vec<String>> = Mutex::new(Vec::new());
    static REFUSE_TIMER: AtomicBool = AtomicBool::new(false);

    unsafe extern "C" fn register(name: *const c_char, _info: *mut c_void) -> c_int {
        let name = unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned();
        let refused = name == "timer" && REFUSE_TIMER.load(Ordering::SeqCst);
        REGISTER_CALLS.lock().push(name);
        if refused {
            0
        } else {
            1
        }
    }

    unsafe extern "C" fn console(_msg: *const c_char) {}
    unsafe extern "C" fn midi_reinit() {}

    unsafe extern "C" fn get_func(name: *const c_char) -> *mut c_void {
        let name = unsafe { CStr::from_ptr(name) };
        if name == c"ShowConsoleMsg" {
            console as *const () as *mut c_void
        } else if name == c"midi_reinit" {
            midi_reinit as *const () as *mut c_void
        } else {
            std::ptr::null_mut()
        }
    }

    fn record() -> PluginInfo {
        PluginInfo {
            caller_version: PLUGIN_VERSION,
            hwnd_main: std::ptr::null_mut(),
            register: Some(register),
            get_func: Some(get_func),
        }
    }

    /// Exclusive access to the extension slot, starting from a clean state.
    fn fresh_slot() -> MutexGuard<'static, ()> {
        let guard = ENTRY_LOCK.lock();
        deactivate();
        REGISTER_CALLS.lock().clear();
        REFUSE_TIMER.store(false, Ordering::SeqCst);
        guard
    }

    fn register_calls() -> Vec<String> {
        REGISTER_CALLS.lock().clone()
    }

    #[test]
    fn test_start_reports_to_console() {
        let host = FakeHost::targeted(&[("Keys", true)], &[]);
        let (source, _trigger) = ManualSource::new();
        let extension = Extension::start(host, console_settings(), Box::new(source)).unwrap();

        assert_eq!(extension.host().console.len(), 1);
        assert!(extension.host().console[0].contains("watching"));
        assert!(extension.host().calls.is_empty());
        assert_eq!(extension.watcher().snapshot().inputs(), vec![true]);
    }

    #[test]
    fn test_timer_reconciles_after_settling() {
        let host = FakeHost::targeted(&[("Keys", true), ("Pads", false)], &[]);
        let (source, trigger) = ManualSource::new();
        let mut extension = Extension::start(host, console_settings(), Box::new(source)).unwrap();
        let t0 = Instant::now();

        extension.host.set_inputs(&[("Keys", true), ("Pads", true)]);
        trigger.fire();
        assert!(extension.on_timer(t0).is_none());
        assert!(extension.on_timer(t0 + Duration::from_millis(1000)).is_none());
        let report = extension.on_timer(t0 + Duration::from_millis(1600)).unwrap();

        assert_eq!(report.inputs, vec![1]);
        assert_eq!(
            extension.host().calls,
            vec![HostCall::ReinitPort(PortDirection::Input, 1)]
        );
        assert!(extension.host().console[1].contains("inputs [1]"));
    }

    #[test]
    fn test_degraded_host_uses_global_reinit() {
        let (source, trigger) = ManualSource::new();
        let mut extension =
            Extension::start(FakeHost::global(), Settings::default(), Box::new(source)).unwrap();
        let t0 = Instant::now();

        trigger.fire();
        extension.on_timer(t0);
        let report = extension.on_timer(t0 + Duration::from_millis(500)).unwrap();

        assert!(report.global_reinit);
        assert_eq!(extension.host().calls, vec![HostCall::ReinitAll]);
        assert!(extension.host().console.is_empty());
    }

    #[test]
    fn test_dropping_extension_stops_source() {
        let (source, trigger) = ManualSource::new();
        let extension =
            Extension::start(FakeHost::global(), Settings::default(), Box::new(source)).unwrap();
        drop(extension);
        assert!(trigger.is_stopped());
    }

    #[test]
    fn test_activation_registers_timer() {
        let _guard = fresh_slot();
        let (source, trigger) = ManualSource::new();

        activate_with(&record(), Box::new(source)).unwrap();
        assert_eq!(register_calls(), vec!["timer"]);
        assert!(ACTIVE.lock().is_some());
        assert!(!trigger.is_stopped());

        deactivate();
        assert_eq!(register_calls(), vec!["timer", "-timer"]);
        assert!(ACTIVE.lock().is_none());
        assert!(trigger.is_stopped());
    }

    #[test]
    fn test_reactivation_replaces_previous_watcher() {
        let _guard = fresh_slot();
        let (first, first_trigger) = ManualSource::new();
        let (second, second_trigger) = ManualSource::new();

        activate_with(&record(), Box::new(first)).unwrap();
        activate_with(&record(), Box::new(second)).unwrap();

        assert!(first_trigger.is_stopped());
        assert!(!second_trigger.is_stopped());
        assert_eq!(register_calls(), vec!["timer", "-timer", "timer"]);
        deactivate();
    }

    #[test]
    fn test_refused_timer_stops_source() {
        let _guard = fresh_slot();
        REFUSE_TIMER.store(true, Ordering::SeqCst);
        let (source, trigger) = ManualSource::new();

        let err = activate_with(&record(), Box::new(source)).unwrap_err();
        assert!(matches!(err, ActivationError::Registration("timer")));
        assert!(trigger.is_stopped());
        assert!(ACTIVE.lock().is_none());
        assert_eq!(register_calls(), vec!["timer"]);
    }

    #[test]
    fn test_null_record_unregisters_timer() {
        let _guard = fresh_slot();
        let (source, trigger) = ManualSource::new();
        activate_with(&record(), Box::new(source)).unwrap();

        let status = unsafe { ffi::ReaperPluginEntry(std::ptr::null_mut(), std::ptr::null_mut()) };
        assert_eq!(status, 0);
        assert_eq!(register_calls(), vec!["timer", "-timer"]);
        assert!(ACTIVE.lock().is_none());
        assert!(trigger.is_stopped());
    }

    #[test]
    fn test_missing_register_function_is_reported() {
        let _guard = fresh_slot();
        let (source, trigger) = ManualSource::new();
        let rec = PluginInfo {
            register: None,
            ..record()
        };

        let err = activate_with(&rec, Box::new(source)).unwrap_err();
        assert!(matches!(err, ActivationError::NoRegister));
        assert!(!trigger.is_stopped());
        assert!(register_calls().is_empty());
    }

    #[test]
    fn test_invalid_settings_file_is_surfaced() {
        let dir = std::env::temp_dir().join(format!("amr-ext-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SETTINGS_FILE_NAME), "scheduler = 3\n").unwrap();

        let result = load_settings(Some(dir.clone()));
        fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
        assert_eq!(load_settings(None).unwrap(), Settings::default());
    }
}

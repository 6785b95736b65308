use super::{HotplugSource, Strategy};
use crate::debounce::ChangeSignal;
use crate::error::ActivationError;
use crossbeam::channel::{self, Sender};
use std::ffi::c_void;
use std::mem;
use std::ptr;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};
use windows_sys::core::GUID;
use windows_sys::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
    GetWindowLongPtrW, PostMessageW, PostQuitMessage, RegisterClassW, RegisterDeviceNotificationW,
    SetWindowLongPtrW, TranslateMessage, UnregisterClassW, UnregisterDeviceNotification,
    DBT_DEVICEARRIVAL, DBT_DEVICEREMOVECOMPLETE, DBT_DEVTYP_DEVICEINTERFACE,
    DEVICE_NOTIFY_WINDOW_HANDLE, DEV_BROADCAST_DEVICEINTERFACE_W, DEV_BROADCAST_HDR,
    GWLP_USERDATA, HWND_MESSAGE, MSG, WM_CLOSE, WM_DESTROY, WM_DEVICECHANGE, WNDCLASSW,
};

/// Device interface class for kernel-streaming audio devices (`KSCATEGORY_AUDIO`).
const KSCATEGORY_AUDIO: GUID = GUID::from_u128(0x6994ad04_93ef_11d0_a3cc_00a0c9223196);

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

fn same_guid(a: &GUID, b: &GUID) -> bool {
    a.data1 == b.data1 && a.data2 == b.data2 && a.data3 == b.data3 && a.data4 == b.data4
}

/// Whether a `WM_DEVICECHANGE` should trigger a recheck: arrival or removal
/// of an audio-class device interface. Message-only windows never receive
/// `DBT_DEVNODES_CHANGED`, so only the interface broadcasts are considered.
///
/// # Safety
/// `lparam` must be the pointer delivered with the message.
unsafe fn is_audio_topology_change(wparam: WPARAM, lparam: LPARAM) -> bool {
    match wparam as u32 {
        DBT_DEVICEARRIVAL | DBT_DEVICEREMOVECOMPLETE => {
            let header = lparam as *const DEV_BROADCAST_HDR;
            if header.is_null() {
                return false;
            }
            if unsafe { (*header).dbch_devicetype } != DBT_DEVTYP_DEVICEINTERFACE {
                return false;
            }
            let interface = lparam as *const DEV_BROADCAST_DEVICEINTERFACE_W;
            same_guid(unsafe { &(*interface).dbcc_classguid }, &KSCATEGORY_AUDIO)
        }
        _ => false,
    }
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_DEVICECHANGE => {
            let signal = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *const ChangeSignal;
            if !signal.is_null() && unsafe { is_audio_topology_change(wparam, lparam) } {
                debug!(event = wparam, "audio device interface changed");
                unsafe { (*signal).raise() };
            }
            1
        }
        WM_CLOSE => {
            unsafe { DestroyWindow(hwnd) };
            0
        }
        WM_DESTROY => {
            unsafe {
                SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0);
                PostQuitMessage(0);
            }
            0
        }
        _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    }
}

/// Hidden message-only window, owned by its thread, that receives
/// device-interface broadcasts for the audio class.
pub struct BroadcastListener {
    // HWND is not Send; kept as an address and only used with PostMessageW.
    window: Option<isize>,
    thread: Option<JoinHandle<()>>,
}

impl Default for BroadcastListener {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastListener {
    pub fn new() -> Self {
        Self {
            window: None,
            thread: None,
        }
    }
}

fn run_message_loop(signal: ChangeSignal, ready: Sender<Result<isize, String>>) {
    let class_name = wide("automidireset_devnotify");
    let instance = unsafe { GetModuleHandleW(ptr::null()) };

    let class = WNDCLASSW {
        style: 0,
        lpfnWndProc: Some(window_proc),
        cbClsExtra: 0,
        cbWndExtra: 0,
        hInstance: instance,
        hIcon: ptr::null_mut(),
        hCursor: ptr::null_mut(),
        hbrBackground: ptr::null_mut(),
        lpszMenuName: ptr::null(),
        lpszClassName: class_name.as_ptr(),
    };
    if unsafe { RegisterClassW(&class) } == 0 {
        let _ = ready.send(Err("RegisterClassW failed".into()));
        return;
    }

    let hwnd = unsafe {
        CreateWindowExW(
            0,
            class_name.as_ptr(),
            class_name.as_ptr(),
            0,
            0,
            0,
            0,
            0,
            HWND_MESSAGE,
            ptr::null_mut(),
            instance,
            ptr::null(),
        )
    };
    if hwnd.is_null() {
        unsafe { UnregisterClassW(class_name.as_ptr(), instance) };
        let _ = ready.send(Err("CreateWindowExW failed".into()));
        return;
    }

    let signal = Box::into_raw(Box::new(signal));
    unsafe { SetWindowLongPtrW(hwnd, GWLP_USERDATA, signal as isize) };

    let mut filter: DEV_BROADCAST_DEVICEINTERFACE_W = unsafe { mem::zeroed() };
    filter.dbcc_size = mem::size_of::<DEV_BROADCAST_DEVICEINTERFACE_W>() as u32;
    filter.dbcc_devicetype = DBT_DEVTYP_DEVICEINTERFACE;
    filter.dbcc_classguid = KSCATEGORY_AUDIO;

    let notification = unsafe {
        RegisterDeviceNotificationW(
            hwnd,
            &filter as *const DEV_BROADCAST_DEVICEINTERFACE_W as *const c_void,
            DEVICE_NOTIFY_WINDOW_HANDLE,
        )
    };
    if notification.is_null() {
        unsafe {
            DestroyWindow(hwnd);
            UnregisterClassW(class_name.as_ptr(), instance);
            drop(Box::from_raw(signal));
        }
        let _ = ready.send(Err("RegisterDeviceNotificationW failed".into()));
        return;
    }

    let _ = ready.send(Ok(hwnd as isize));

    let mut msg: MSG = unsafe { mem::zeroed() };
    loop {
        let status = unsafe { GetMessageW(&mut msg, ptr::null_mut(), 0, 0) };
        if status == 0 || status == -1 {
            break;
        }
        unsafe {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    unsafe {
        if UnregisterDeviceNotification(notification) == 0 {
            warn!("UnregisterDeviceNotification failed");
            debug_assert!(false, "UnregisterDeviceNotification failed");
        }
        UnregisterClassW(class_name.as_ptr(), instance);
        drop(Box::from_raw(signal));
    }
    debug!("device broadcast thread finished");
}

impl HotplugSource for BroadcastListener {
    fn strategy(&self) -> Strategy {
        Strategy::BroadcastListener
    }

    fn start(&mut self, signal: ChangeSignal) -> Result<(), ActivationError> {
        if self.thread.is_some() {
            return Err(ActivationError::subscription(self.strategy(), "already running"));
        }

        let (ready_tx, ready_rx) = channel::bounded(1);
        let thread = thread::Builder::new()
            .name("automidireset-devnotify".into())
            .spawn(move || run_message_loop(signal, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(window)) => {
                info!("listening for audio device broadcasts");
                self.window = Some(window);
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(reason)) => {
                let _ = thread.join();
                Err(ActivationError::subscription(self.strategy(), reason))
            }
            Err(_) => {
                let _ = thread.join();
                Err(ActivationError::subscription(
                    self.strategy(),
                    "notification thread exited during setup",
                ))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(window) = self.window.take() {
            if unsafe { PostMessageW(window as HWND, WM_CLOSE, 0, 0) } == 0 {
                warn!("failed to post close to device broadcast window");
            }
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("device broadcast thread panicked");
            }
        }
    }
}

impl Drop for BroadcastListener {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows_sys::Win32::UI::WindowsAndMessaging::DBT_DEVNODES_CHANGED;

    fn interface_event(class: GUID) -> DEV_BROADCAST_DEVICEINTERFACE_W {
        let mut event: DEV_BROADCAST_DEVICEINTERFACE_W = unsafe { mem::zeroed() };
        event.dbcc_size = mem::size_of::<DEV_BROADCAST_DEVICEINTERFACE_W>() as u32;
        event.dbcc_devicetype = DBT_DEVTYP_DEVICEINTERFACE;
        event.dbcc_classguid = class;
        event
    }

    #[test]
    fn test_audio_interface_arrival_and_removal() {
        let event = interface_event(KSCATEGORY_AUDIO);
        let lparam = &event as *const DEV_BROADCAST_DEVICEINTERFACE_W as LPARAM;
        for wparam in [DBT_DEVICEARRIVAL, DBT_DEVICEREMOVECOMPLETE] {
            assert!(unsafe { is_audio_topology_change(wparam as WPARAM, lparam) });
        }
    }

    #[test]
    fn test_other_events_are_ignored() {
        let event = interface_event(GUID::from_u128(0x4d1e55b2_f16f_11cf_88cb_001111000030));
        let lparam = &event as *const DEV_BROADCAST_DEVICEINTERFACE_W as LPARAM;
        assert!(!unsafe { is_audio_topology_change(DBT_DEVICEARRIVAL as WPARAM, lparam) });
        assert!(!unsafe { is_audio_topology_change(DBT_DEVNODES_CHANGED as WPARAM, 0) });
        assert!(!unsafe { is_audio_topology_change(DBT_DEVICEARRIVAL as WPARAM, 0) });
    }
}

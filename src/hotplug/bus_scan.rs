use super::{HotplugSource, Strategy};
use crate::debounce::ChangeSignal;
use crate::error::ActivationError;
use crossbeam::channel::{self, Sender};
use rusb::{Context, Device, Hotplug, HotplugBuilder, UsbContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// USB interface class for audio devices.
pub const USB_CLASS_AUDIO: u8 = 0x01;
/// Audio subclass for MIDI streaming interfaces.
pub const USB_SUBCLASS_MIDISTREAMING: u8 = 0x03;

/// Upper bound on a single wait for libusb events.
const EVENT_WAIT: Duration = Duration::from_millis(100);
/// Pause between event-loop iterations.
const LOOP_YIELD: Duration = Duration::from_millis(10);

pub fn is_midi_streaming_interface(class: u8, subclass: u8) -> bool {
    class == USB_CLASS_AUDIO && subclass == USB_SUBCLASS_MIDISTREAMING
}

/// Walk configurations, interfaces and alternate settings looking for a MIDI
/// streaming interface.
pub fn is_midi_device<T: UsbContext>(device: &Device<T>) -> bool {
    let Ok(descriptor) = device.device_descriptor() else {
        return false;
    };

    (0..descriptor.num_configurations())
        .filter_map(|index| device.config_descriptor(index).ok())
        .any(|config| {
            config.interfaces().any(|interface| {
                interface
                    .descriptors()
                    .any(|alt| is_midi_streaming_interface(alt.class_code(), alt.sub_class_code()))
            })
        })
}

struct MidiDeviceFilter {
    signal: ChangeSignal,
}

impl<T: UsbContext> Hotplug<T> for MidiDeviceFilter {
    fn device_arrived(&mut self, device: Device<T>) {
        if is_midi_device(&device) {
            debug!(bus = device.bus_number(), address = device.address(), "MIDI device arrived");
            self.signal.raise();
        }
    }

    fn device_left(&mut self, device: Device<T>) {
        if is_midi_device(&device) {
            debug!(bus = device.bus_number(), address = device.address(), "MIDI device left");
            self.signal.raise();
        }
    }
}

/// Services a libusb hotplug registration on a dedicated thread.
pub struct BusScanSource {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Default for BusScanSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BusScanSource {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

fn service_events(
    signal: ChangeSignal,
    running: Arc<AtomicBool>,
    ready: Sender<Result<(), String>>,
) {
    let context = match Context::new() {
        Ok(context) => context,
        Err(err) => {
            let _ = ready.send(Err(format!("libusb init failed: {}", err)));
            return;
        }
    };

    let filter: Box<dyn Hotplug<Context>> = Box::new(MidiDeviceFilter { signal });
    // Registration must be dropped before the context it belongs to.
    let registration = match HotplugBuilder::new().enumerate(false).register(&context, filter) {
        Ok(registration) => registration,
        Err(err) => {
            let _ = ready.send(Err(format!("hotplug registration failed: {}", err)));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    while running.load(Ordering::Acquire) {
        if let Err(err) = context.handle_events(Some(EVENT_WAIT)) {
            warn!(%err, "libusb event handling failed");
        }
        thread::sleep(LOOP_YIELD);
    }

    drop(registration);
    debug!("USB hotplug thread finished");
}

impl HotplugSource for BusScanSource {
    fn strategy(&self) -> Strategy {
        Strategy::BusScan
    }

    fn start(&mut self, signal: ChangeSignal) -> Result<(), ActivationError> {
        if !rusb::has_hotplug() {
            return Err(ActivationError::subscription(
                self.strategy(),
                "libusb has no hotplug support on this system",
            ));
        }
        if self.thread.is_some() {
            return Err(ActivationError::subscription(self.strategy(), "already running"));
        }

        let (ready_tx, ready_rx) = channel::bounded(1);
        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);

        let thread = thread::Builder::new()
            .name("automidireset-usb".into())
            .spawn(move || service_events(signal, running, ready_tx));
        let thread = match thread {
            Ok(thread) => thread,
            Err(err) => {
                self.running.store(false, Ordering::Release);
                return Err(err.into());
            }
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("watching USB bus for MIDI devices");
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(reason)) => {
                self.running.store(false, Ordering::Release);
                let _ = thread.join();
                Err(ActivationError::subscription(self.strategy(), reason))
            }
            Err(_) => {
                self.running.store(false, Ordering::Release);
                let _ = thread.join();
                Err(ActivationError::subscription(
                    self.strategy(),
                    "hotplug thread exited during setup",
                ))
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("USB hotplug thread panicked");
            }
        }
    }
}

impl Drop for BusScanSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_filter() {
        assert!(is_midi_streaming_interface(0x01, 0x03));
        // Audio control and audio streaming are not MIDI.
        assert!(!is_midi_streaming_interface(0x01, 0x01));
        assert!(!is_midi_streaming_interface(0x01, 0x02));
        // Vendor specific and HID devices.
        assert!(!is_midi_streaming_interface(0xFF, 0x03));
        assert!(!is_midi_streaming_interface(0x03, 0x00));
    }

    #[test]
    fn test_stop_without_start() {
        let mut source = BusScanSource::new();
        source.stop();
        assert_eq!(source.strategy(), Strategy::BusScan);
    }
}

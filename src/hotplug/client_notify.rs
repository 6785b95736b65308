use super::{HotplugSource, Strategy};
use crate::debounce::ChangeSignal;
use crate::error::ActivationError;
use coremidi::{Client, Notification};
use tracing::{debug, info};

const CLIENT_NAME: &str = "reaper_automidireset";

/// Listens for CoreMIDI "setup changed" notifications through a single client.
#[derive(Default)]
pub struct ClientNotificationSource {
    client: Option<Client>,
}

// SAFETY: a MIDIClientRef may be disposed from any thread, and the boxed
// notification callback only touches the thread-safe `ChangeSignal`.
unsafe impl Send for ClientNotificationSource {}

impl ClientNotificationSource {
    pub fn new() -> Self {
        Self { client: None }
    }
}

impl HotplugSource for ClientNotificationSource {
    fn strategy(&self) -> Strategy {
        Strategy::ClientNotification
    }

    fn start(&mut self, signal: ChangeSignal) -> Result<(), ActivationError> {
        if self.client.is_some() {
            return Err(ActivationError::subscription(self.strategy(), "already running"));
        }

        let on_notification = move |notification: &Notification| {
            if let Notification::SetupChanged = notification {
                debug!("CoreMIDI setup changed");
                signal.raise();
            }
        };
        let client = Client::new_with_notifications(CLIENT_NAME, on_notification).map_err(|status| {
            ActivationError::subscription(
                Strategy::ClientNotification,
                format!("MIDIClientCreate failed with status {}", status),
            )
        })?;

        info!("listening for CoreMIDI setup changes");
        self.client = Some(client);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the client disposes it.
        self.client.take();
    }
}

use crate::events::AppEvent;
use automidireset::hotplug::polling::PortPollingSource;
use automidireset::hotplug::{self, HotplugSource};
use automidireset::midi::MidiManager;
use automidireset::{
    ActivationError, PortDirection, PortInfo, ReconcileReport, SchedulerKind, Settings, Watcher,
};
use crossbeam::channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::time::Instant;

const MAX_LOG_MESSAGES: usize = 100;

/// Where device-change signals come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceChoice {
    Native,
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneFocus {
    Inputs,
    Outputs,
}

#[derive(Debug, Clone)]
pub struct UiState {
    pub focus: PaneFocus,
    pub selected_input_idx: usize,
    pub selected_output_idx: usize,
}

pub struct App {
    pub settings: Settings,
    pub ui_state: UiState,
    pub show_help: bool,
    pub log_messages: VecDeque<String>,
    pub reconciliations: usize,
    pub should_quit: bool,

    manager: MidiManager,
    watcher: Option<Watcher>,
    event_tx: Sender<AppEvent>,
    event_rx: Receiver<AppEvent>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let (event_tx, event_rx) = crossbeam::channel::unbounded();

        Self {
            settings,
            ui_state: UiState {
                focus: PaneFocus::Inputs,
                selected_input_idx: 0,
                selected_output_idx: 0,
            },
            show_help: false,
            log_messages: VecDeque::new(),
            reconciliations: 0,
            should_quit: false,
            manager: MidiManager::new(),
            watcher: None,
            event_tx,
            event_rx,
        }
    }

    fn build_source(choice: SourceChoice) -> Box<dyn HotplugSource> {
        match choice {
            SourceChoice::Native => hotplug::native_source(),
            SourceChoice::Poll => Box::new(PortPollingSource::midi_ports()),
        }
    }

    fn activate(&mut self, source: Box<dyn HotplugSource>) -> Result<Watcher, ActivationError> {
        match self.settings.scheduler {
            SchedulerKind::PollTick => Watcher::polled(&mut self.manager, &self.settings, source),
            SchedulerKind::OneShot => {
                let event_tx = self.event_tx.clone();
                Watcher::scheduled(&mut self.manager, &self.settings, source, move || {
                    let _ = event_tx.send(AppEvent::Settled);
                })
            }
        }
    }

    pub fn initialize(&mut self, choice: SourceChoice) -> Result<(), ActivationError> {
        let watcher = match self.activate(Self::build_source(choice)) {
            Ok(watcher) => watcher,
            Err(ActivationError::Subscription { strategy, reason })
                if choice == SourceChoice::Native =>
            {
                self.add_log(format!(
                    "{} unavailable ({}), polling ports instead",
                    strategy, reason
                ));
                tracing::warn!(%strategy, %reason, "falling back to port polling");
                self.activate(Self::build_source(SourceChoice::Poll))?
            }
            Err(err) => return Err(err),
        };

        self.add_log(format!(
            "Watching via {} ({} scheduler, {} ms settle delay)",
            watcher.strategy(),
            watcher.scheduler(),
            watcher.settle_delay().as_millis()
        ));

        let snapshot = watcher.snapshot();
        if snapshot.is_empty() {
            self.add_log("No MIDI ports found. Plug in a device to see it appear.".to_string());
        } else {
            self.add_log(format!(
                "Found {} input(s) and {} output(s)",
                snapshot.len(PortDirection::Input),
                snapshot.len(PortDirection::Output)
            ));
        }

        self.watcher = Some(watcher);
        Ok(())
    }

    pub fn watcher(&self) -> Option<&Watcher> {
        self.watcher.as_ref()
    }

    /// Slots as the reconciler last saw them
    pub fn slots(&self, direction: PortDirection) -> &[PortInfo] {
        self.watcher
            .as_ref()
            .map(|watcher| watcher.snapshot().slots(direction))
            .unwrap_or(&[])
    }

    /// Poll-tick scheduler step, called once per UI loop iteration
    pub fn tick(&mut self) {
        let report = match self.watcher.as_mut() {
            Some(watcher) => watcher.tick(&mut self.manager, Instant::now()),
            None => None,
        };
        if let Some(report) = report {
            self.record_report("Devices settled", report);
        }
    }

    pub fn process_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                AppEvent::Settled => self.reconcile_now("Devices settled"),
            }
        }
    }

    fn reconcile_now(&mut self, reason: &str) {
        let report = match self.watcher.as_mut() {
            Some(watcher) => watcher.reconcile(&mut self.manager),
            None => return,
        };
        self.record_report(reason, report);
    }

    fn record_report(&mut self, reason: &str, report: ReconcileReport) {
        self.reconciliations += 1;
        self.add_log(format!("{}: {}", reason, report));

        for direction in PortDirection::ALL {
            for index in report.changed(direction) {
                if let Some(slot) = self.slots(direction).get(*index) {
                    let state = if slot.attached { "attached" } else { "detached" };
                    let line = format!("  {} [{}] {} {}", direction, index, slot.name, state);
                    self.add_log(line);
                }
            }
        }
        self.clamp_selection();
    }

    fn add_log(&mut self, msg: String) {
        self.log_messages.push_back(msg);
        if self.log_messages.len() > MAX_LOG_MESSAGES {
            self.log_messages.pop_front();
        }
    }

    fn clamp_selection(&mut self) {
        let inputs = self.slots(PortDirection::Input).len();
        let outputs = self.slots(PortDirection::Output).len();
        let state = &mut self.ui_state;
        state.selected_input_idx = state.selected_input_idx.min(inputs.saturating_sub(1));
        state.selected_output_idx = state.selected_output_idx.min(outputs.saturating_sub(1));
    }

    pub fn get_selected_input_idx(&self) -> Option<usize> {
        (self.ui_state.focus == PaneFocus::Inputs).then_some(self.ui_state.selected_input_idx)
    }

    pub fn get_selected_output_idx(&self) -> Option<usize> {
        (self.ui_state.focus == PaneFocus::Outputs).then_some(self.ui_state.selected_output_idx)
    }

    // Keyboard input handlers

    /// Reconcile immediately, skipping the settle delay
    pub fn handle_refresh(&mut self) {
        self.reconcile_now("Manual refresh");
    }

    pub fn handle_key_up(&mut self) {
        let state = &mut self.ui_state;
        match state.focus {
            PaneFocus::Inputs => {
                state.selected_input_idx = state.selected_input_idx.saturating_sub(1)
            }
            PaneFocus::Outputs => {
                state.selected_output_idx = state.selected_output_idx.saturating_sub(1)
            }
        }
    }

    pub fn handle_key_down(&mut self) {
        let inputs = self.slots(PortDirection::Input).len();
        let outputs = self.slots(PortDirection::Output).len();
        let state = &mut self.ui_state;
        match state.focus {
            PaneFocus::Inputs if state.selected_input_idx < inputs.saturating_sub(1) => {
                state.selected_input_idx += 1
            }
            PaneFocus::Outputs if state.selected_output_idx < outputs.saturating_sub(1) => {
                state.selected_output_idx += 1
            }
            _ => {}
        }
    }

    pub fn handle_tab(&mut self) {
        self.ui_state.focus = match self.ui_state.focus {
            PaneFocus::Inputs => PaneFocus::Outputs,
            PaneFocus::Outputs => PaneFocus::Inputs,
        };
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
        if let Some(mut watcher) = self.watcher.take() {
            watcher.shutdown();
        }
    }
}

mod app;
mod events;
mod ui;

use anyhow::{Context, Result};
use app::{App, SourceChoice};
use automidireset::midi::MidiManager;
use automidireset::{logging, PortDirection, PortInfo, SchedulerKind, Settings};
use clap::{Parser, ValueEnum};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchedulerArg {
    PollTick,
    OneShot,
}

impl From<SchedulerArg> for SchedulerKind {
    fn from(arg: SchedulerArg) -> Self {
        match arg {
            SchedulerArg::PollTick => SchedulerKind::PollTick,
            SchedulerArg::OneShot => SchedulerKind::OneShot,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    /// The platform's device notification mechanism
    Native,
    /// Periodic MIDI port enumeration
    Poll,
}

impl From<SourceArg> for SourceChoice {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Native => SourceChoice::Native,
            SourceArg::Poll => SourceChoice::Poll,
        }
    }
}

/// Watch for MIDI hardware changes and reinitialize the affected ports
#[derive(Debug, Parser)]
#[command(name = "amr", version)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debounce scheduler, overrides the settings file
    #[arg(long, value_enum)]
    scheduler: Option<SchedulerArg>,

    /// Where device-change signals come from
    #[arg(long, value_enum, default_value = "native")]
    source: SourceArg,

    /// Reinit everything before the per-port pass
    #[arg(long)]
    global_prepass: bool,

    /// Log destination; the terminal belongs to the UI
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the current MIDI ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_ports {
        return list_ports_and_exit();
    }

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path).with_context(|| "failed to load settings")?,
        None => Settings::default(),
    };
    if let Some(scheduler) = cli.scheduler {
        settings.scheduler = scheduler.into();
    }
    if cli.global_prepass {
        settings.global_prepass = true;
    }

    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("amr.log"));
    logging::init_file(&settings.log_filter, &log_file)
        .with_context(|| format!("cannot open log file {}", log_file.display()))?;

    // Create app and start watching before the terminal is taken over
    let mut app = App::new(settings);
    app.initialize(cli.source.into())
        .context("failed to start watching for MIDI device changes")?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = run_app(&mut terminal, &mut app);
    app.quit();

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result.context("application error")
}

#[derive(Serialize)]
struct PortListing<'a> {
    inputs: &'a [PortInfo],
    outputs: &'a [PortInfo],
}

fn port_listing_json(manager: &MidiManager) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&PortListing {
        inputs: manager.slots(PortDirection::Input),
        outputs: manager.slots(PortDirection::Output),
    })
}

/// CLI mode: list all MIDI ports and exit
fn list_ports_and_exit() -> Result<()> {
    let mut manager = MidiManager::new();
    manager.refresh_all();
    println!("{}", port_listing_json(&manager)?);
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        // Debounce step and settled callbacks from the scheduler thread
        app.tick();
        app.process_events();

        // Draw UI
        terminal.draw(|f| ui::render(f, app))?;

        // Handle keyboard input with timeout
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') => {
                        app.quit();
                    }
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        app.quit();
                    }
                    KeyCode::Char('R') => {
                        app.handle_refresh();
                    }
                    KeyCode::Tab => {
                        app.handle_tab();
                    }
                    KeyCode::Up | KeyCode::Char('k') => {
                        app.handle_key_up();
                    }
                    KeyCode::Down | KeyCode::Char('j') => {
                        app.handle_key_down();
                    }
                    KeyCode::Char('?') => {
                        app.toggle_help();
                    }
                    _ => {}
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

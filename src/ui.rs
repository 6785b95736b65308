use crate::app::{App, PaneFocus};
use automidireset::{PortDirection, PortInfo};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),      // Title
            Constraint::Length(3),      // Watcher status
            Constraint::Min(8),         // Inputs/outputs
            Constraint::Length(8),      // Log
            Constraint::Length(1),      // Help
        ])
        .split(f.area());

    render_title(f, chunks[0]);
    render_status(f, chunks[1], app);
    render_ports(f, chunks[2], app);
    render_log(f, chunks[3], app);
    render_help(f, chunks[4], app);
}

fn render_title(f: &mut Frame, area: Rect) {
    let title = Paragraph::new("Auto MIDI Reset - Device Watcher")
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, area);
}

fn render_status(f: &mut Frame, area: Rect, app: &App) {
    let line = match app.watcher() {
        Some(watcher) => {
            let (state, color) = if watcher.is_settling() {
                ("settling", Color::Yellow)
            } else {
                ("idle", Color::Green)
            };
            Line::from(vec![
                Span::raw(format!(
                    "{} | {} scheduler | {:?} reinit | {} ms | ",
                    watcher.strategy(),
                    watcher.scheduler(),
                    watcher.mode(),
                    watcher.settle_delay().as_millis()
                )),
                Span::styled(state, Style::default().fg(color)),
                Span::raw(format!(" | {} reconciliation(s)", app.reconciliations)),
            ])
        }
        None => Line::from(Span::styled("not watching", Style::default().fg(Color::Red))),
    };

    let paragraph =
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("WATCHER"));
    f.render_widget(paragraph, area);
}

fn render_ports(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    render_port_list(
        f,
        chunks[0],
        "INPUTS",
        app.slots(PortDirection::Input),
        app.get_selected_input_idx(),
        app.ui_state.focus == PaneFocus::Inputs,
    );

    render_port_list(
        f,
        chunks[1],
        "OUTPUTS",
        app.slots(PortDirection::Output),
        app.get_selected_output_idx(),
        app.ui_state.focus == PaneFocus::Outputs,
    );
}

fn render_port_list(
    f: &mut Frame,
    area: Rect,
    title: &str,
    ports: &[PortInfo],
    selected_idx: Option<usize>,
    is_active: bool,
) {
    let items: Vec<ListItem> = ports
        .iter()
        .enumerate()
        .map(|(idx, port)| {
            let is_selected = selected_idx == Some(idx);
            let prefix = if is_selected { "> " } else { "  " };

            let marker_color = if port.attached { Color::Green } else { Color::DarkGray };
            let name = if port.is_valid() { port.name.as_str() } else { "(empty slot)" };

            let line = Line::from(vec![
                Span::raw(format!("{}[{}] ", prefix, idx)),
                Span::styled("● ", Style::default().fg(marker_color)),
                Span::raw(name.to_string()),
            ]);

            let style = if !port.attached {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };

            let style = if is_selected {
                style.add_modifier(Modifier::BOLD)
            } else {
                style
            };

            ListItem::new(line).style(style)
        })
        .collect();

    let border_style = if is_active {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(border_style),
    );

    f.render_widget(list, area);
}

fn render_log(f: &mut Frame, area: Rect, app: &App) {
    // Newest entries win when the pane is too short.
    let visible = area.height.saturating_sub(2) as usize;
    let skip = app.log_messages.len().saturating_sub(visible);
    let log_lines: Vec<Line> = app
        .log_messages
        .iter()
        .skip(skip)
        .map(|msg| Line::from(msg.clone()))
        .collect();

    let paragraph = Paragraph::new(log_lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("LOG"),
    );

    f.render_widget(paragraph, area);
}

fn render_help(f: &mut Frame, area: Rect, app: &App) {
    let help_text = if app.show_help {
        concat!(
            "[R] Reconcile now, skipping the settle delay | [Tab] Switch pane | ",
            "[↑↓/jk] Navigate | [?] Hide help | [q] Quit"
        )
    } else {
        "[R] Refresh | [Tab] Switch Pane | [?] Help | [q] Quit"
    };

    let help = Paragraph::new(help_text).style(Style::default().fg(Color::DarkGray));
    f.render_widget(help, area);
}

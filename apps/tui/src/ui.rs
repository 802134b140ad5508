//! UI rendering module.
//!
//! Contains all the widget rendering logic (View).

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Tabs, Wrap},
};

use crate::app::{App, DeviceStatus, LogEntry, Tab};
use litra_core::events::{LogLevel, PacketDirection};
use litra_core::protocol::{MAX_BRIGHTNESS, MAX_TEMPERATURE, MIN_BRIGHTNESS, MIN_TEMPERATURE};
use litra_core::state::SessionPhase;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header/tabs
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Footer/status bar
        ])
        .split(area);

    draw_header(frame, chunks[0], app);

    match app.current_tab {
        Tab::Main => draw_main_view(frame, chunks[1], app),
        Tab::Logs => draw_logs_view(frame, chunks[1], app),
        Tab::Packets => draw_packets_view(frame, chunks[1], app),
        Tab::Help => draw_help_view(frame, chunks[1]),
    }

    draw_footer(frame, chunks[2], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let titles = vec!["Main", "Logs (F2)", "Packets (F3)", "Help (F1)"];
    let selected = match app.current_tab {
        Tab::Main => 0,
        Tab::Logs => 1,
        Tab::Packets => 2,
        Tab::Help => 3,
    };

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Litra Monitor ")
                .title_style(
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
        )
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .divider(symbols::DOT);

    frame.render_widget(tabs, area);
}

fn draw_footer(frame: &mut Frame, area: Rect, app: &App) {
    let status = match &app.device_status {
        DeviceStatus::Disconnected => {
            Span::styled(" ○ Disconnected ", Style::default().fg(Color::Red))
        }
        DeviceStatus::Connected { product, vid, pid } => Span::styled(
            format!(" ● {} {:04X}:{:04X} ", product, vid, pid),
            Style::default().fg(Color::Green),
        ),
    };

    let phase = Span::styled(format!(" {} ", app.phase), Style::default().fg(Color::Cyan));

    let help = Span::styled(
        " q: Quit | o/f: On/Off | +/-: Brightness | [/]: Temperature ",
        Style::default().fg(Color::DarkGray),
    );

    let line = Line::from(vec![status, phase, help]);

    let footer = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    frame.render_widget(footer, area);
}

fn draw_main_view(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    draw_light_panel(frame, chunks[0], app);
    draw_recent_logs(frame, chunks[1], app);
}

fn draw_light_panel(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Power + counters
            Constraint::Length(3), // Brightness
            Constraint::Length(3), // Temperature
            Constraint::Min(0),
        ])
        .split(area);

    let (power, power_color) = match app.state.power() {
        Some(true) => ("ON", Color::Yellow),
        Some(false) => ("OFF", Color::DarkGray),
        None => ("?", Color::DarkGray),
    };

    let power_color = if app.phase == SessionPhase::Closed {
        Color::DarkGray
    } else {
        power_color
    };

    let info = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Power: ", Style::default().fg(Color::Cyan)),
            Span::styled(
                power,
                Style::default().fg(power_color).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Skipped reports: ", Style::default().fg(Color::Cyan)),
            Span::styled(
                app.skipped_reports.to_string(),
                Style::default().fg(if app.skipped_reports > 0 {
                    Color::Yellow
                } else {
                    Color::White
                }),
            ),
        ]),
        Line::from(Span::styled(
            if app.is_connected() {
                ""
            } else {
                "Press 'r' to connect"
            },
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(" Light "),
    );
    frame.render_widget(info, chunks[0]);

    draw_gauge(
        frame,
        chunks[1],
        " Brightness ",
        app.state.brightness(),
        (MIN_BRIGHTNESS, MAX_BRIGHTNESS),
        "",
        Color::Yellow,
    );
    draw_gauge(
        frame,
        chunks[2],
        " Temperature ",
        app.state.temperature(),
        (MIN_TEMPERATURE, MAX_TEMPERATURE),
        "K",
        Color::LightBlue,
    );
}

fn draw_gauge(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    value: Option<u16>,
    (min, max): (u16, u16),
    unit: &str,
    color: Color,
) {
    let (ratio, label) = match value {
        Some(v) => (
            f64::from(v.saturating_sub(min)) / f64::from(max - min),
            format!("{}{}", v, unit),
        ),
        None => (0.0, "unknown".to_string()),
    };

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(title.to_string()),
        )
        .gauge_style(Style::default().fg(color).bg(Color::Black))
        .ratio(ratio.clamp(0.0, 1.0))
        .label(label);

    frame.render_widget(gauge, area);
}

fn draw_recent_logs(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .logs
        .iter()
        .rev()
        .take(area.height.saturating_sub(2) as usize)
        .map(|entry| log_to_list_item(entry, area.width))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Recent Logs "),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}

fn draw_logs_view(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .logs
        .iter()
        .skip(app.log_scroll)
        .take(area.height.saturating_sub(2) as usize)
        .map(|entry| log_to_list_item(entry, area.width))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(format!(
                    " Logs ({}/{}) ",
                    app.log_scroll + 1,
                    app.logs.len().max(1)
                )),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}

fn draw_packets_view(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .packets
        .iter()
        .skip(app.packet_scroll)
        .take(area.height.saturating_sub(2) as usize)
        .map(|p| {
            let color = match p.direction {
                PacketDirection::Tx => Color::Magenta,
                PacketDirection::Rx => Color::Green,
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{} ", p.timestamp),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(format!("{} ", p.direction), Style::default().fg(color)),
                Span::styled(
                    format!("0x{:02X} {:>3}B ", p.endpoint, p.length),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(p.data_preview.clone(), Style::default().fg(Color::White)),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(
                " Packets ({}/{}) ",
                app.packet_scroll + 1,
                app.packets.len().max(1)
            )),
    );

    frame.render_widget(list, area);
}

fn draw_help_view(frame: &mut Frame, area: Rect) {
    let help_text = vec![
        "",
        "  Litra Monitor - Logitech Litra Glow/Beam",
        "",
        "  KEYBOARD SHORTCUTS:",
        "",
        "  q, Ctrl+Q, Ctrl+C, Esc Quit application",
        "  F1                     Show this help",
        "  F2                     View full logs",
        "  F3                     View USB packets",
        "  r                      Connect / retry",
        "  o / f                  Turn light on / off",
        "  s                      Query power state",
        "  + / -                  Brightness up / down",
        "  ] / [                  Temperature up / down",
        "",
        "  IN LOGS AND PACKETS VIEWS:",
        "",
        "  j/k, Up/Down           Scroll",
        "  Page Up/Down           Scroll by page",
        "  Home/End               Go to start/end",
        "",
        "  Press any key to return...",
    ];

    let text: Vec<Line> = help_text.iter().map(|s| Line::from(*s)).collect();

    let help = Paragraph::new(Text::from(text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Help "),
        )
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false });

    frame.render_widget(help, area);
}

fn log_to_list_item(entry: &LogEntry, width: u16) -> ListItem<'static> {
    let (icon, color) = match entry.level {
        LogLevel::Error => ("✗", Color::Red),
        LogLevel::Warn => ("⚠", Color::Yellow),
        LogLevel::Info => ("●", Color::Green),
        LogLevel::Debug => ("○", Color::Blue),
        LogLevel::Trace => ("·", Color::DarkGray),
    };

    let time_len = entry.timestamp.len() + 1;
    let icon_len = 2;
    let msg_width = (width.saturating_sub((time_len + icon_len + 4) as u16) as usize).max(1);

    let chars: Vec<char> = entry.message.chars().collect();
    let mut chunks = chars.chunks(msg_width);
    let first: String = chunks.next().map(|c| c.iter().collect()).unwrap_or_default();

    let mut lines = vec![Line::from(vec![
        Span::styled(
            format!("{} ", entry.timestamp),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(format!("{} ", icon), Style::default().fg(color)),
        Span::styled(first, Style::default().fg(Color::White)),
    ])];

    for chunk in chunks {
        lines.push(Line::from(vec![
            Span::raw(" ".repeat(time_len + icon_len)),
            Span::styled(chunk.iter().collect::<String>(), Style::default().fg(Color::White)),
        ]));
    }

    ListItem::new(Text::from(lines))
}

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::*;
use unicode_width::UnicodeWidthStr;

use crate::api::{Notice, NoticeLevel};
use crate::app::{AppState, Focus};
use crate::console::Severity;
use crate::serial::{ReaderState, SerialPortType};

const FORM_LABEL_WIDTH: usize = 14;

pub fn draw(frame: &mut Frame, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [Constraint::Length(3), Constraint::Min(5), Constraint::Length(3)].as_ref(),
        )
        .split(frame.size());

    draw_header(frame, chunks[0], app);
    draw_body(frame, chunks[1], app);
    draw_footer(frame, chunks[2], app);

    if let Some(notice) = &app.notice {
        draw_notice(frame, notice);
    }
}

fn draw_header(frame: &mut Frame, area: Rect, app: &AppState) {
    let mut spans: Vec<Span> = Vec::new();
    spans.push(Span::styled(" ari-rendemen ", Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)));
    let help = match app.focus {
        Focus::Ports => "  q:quit  TAB:focus  r:refresh  b/B:baud  Enter:start/stop ",
        Focus::Form => "  TAB:focus  Enter:send  F2:send  F3:reset  F4:load  \u{2190}/\u{2192}:pending ",
        Focus::Console => "  q:quit  TAB:focus  c:clear  PgUp/PgDn/Home/End:scroll ",
    };
    spans.push(Span::raw(help));
    spans.push(Span::styled(
        format!(" [baud:{}] ", app.baud_rate),
        Style::default().fg(Color::Yellow),
    ));
    let port = app
        .session
        .port()
        .filter(|_| app.session.is_active())
        .or_else(|| app.selected_port_name());
    if let Some(port) = port {
        spans.push(Span::styled(
            format!(" port:{port} "),
            Style::default().fg(Color::Green),
        ));
    }
    let (label, bg) = match app.session.state() {
        ReaderState::Streaming => (" ON ", Color::Green),
        ReaderState::Connecting => (" CONNECTING ", Color::Yellow),
        ReaderState::Error => (" ERROR ", Color::Red),
        ReaderState::Idle | ReaderState::Closed => (" OFF ", Color::Red),
    };
    spans.push(Span::styled(label, Style::default().fg(Color::Black).bg(bg)));

    let block = Block::default().borders(Borders::ALL).title("Help");
    let p = Paragraph::new(Text::from(Line::from(spans))).block(block);
    frame.render_widget(p, area);
}

fn draw_body(frame: &mut Frame, area: Rect, app: &AppState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(8)].as_ref())
        .split(columns[0]);

    draw_ports(frame, left[0], app);
    draw_form(frame, left[1], app);
    draw_console(frame, columns[1], app);
}

fn panel(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Block::default().borders(Borders::ALL).title(title).border_style(style)
}

fn draw_ports(frame: &mut Frame, area: Rect, app: &AppState) {
    let locked = app.session.is_active();
    let name_style = if locked {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::White)
    };
    let items: Vec<ListItem> = app
        .ports
        .iter()
        .map(|p| {
            let mut line = vec![Span::styled(&p.port_name, name_style)];
            if let SerialPortType::UsbPort(info) = &p.port_type {
                let tail = format!(
                    "  {} {}",
                    info.manufacturer.clone().unwrap_or_default(),
                    info.product.clone().unwrap_or_default(),
                );
                line.push(Span::styled(tail, Style::default().fg(Color::DarkGray)));
            }
            ListItem::new(Line::from(line))
        })
        .collect();

    let title = if locked { "Ports (locked)" } else { "Ports" };
    let list = List::new(items)
        .block(panel(title, app.focus == Focus::Ports))
        .highlight_style(Style::default().bg(Color::Blue))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.selected_port);
    frame.render_stateful_widget(list, area, &mut state);
}

fn field_line<'a>(label: &'a str, value: &'a str, highlight: bool) -> Line<'a> {
    let value_style = if highlight {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };
    Line::from(vec![
        Span::styled(
            format!("{label:<width$}", width = FORM_LABEL_WIDTH),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(value, value_style),
    ])
}

fn draw_form(frame: &mut Frame, area: Rect, app: &AppState) {
    let focused = app.focus == Focus::Form;
    let form = &app.form;
    let lines = vec![
        field_line("Kartu ARI:", &form.kartu_ari, focused),
        field_line("Brix (%):", &form.brix, false),
        field_line("Pol (%):", &form.pol, false),
        field_line("Pol Baca:", &form.pol_baca, false),
        field_line("Rendemen (%):", &form.rendemen, false),
    ];
    let p = Paragraph::new(Text::from(lines)).block(panel("Data", focused));
    frame.render_widget(p, area);

    if focused && app.notice.is_none() {
        let x = area.x + 1 + FORM_LABEL_WIDTH as u16 + form.kartu_ari.width() as u16;
        frame.set_cursor(x, area.y + 1);
    }
}

fn draw_console(frame: &mut Frame, area: Rect, app: &AppState) {
    let title = format!("Console ({} lines)", app.console.len());
    let block = panel(&title, app.focus == Focus::Console);

    let height = area.height.saturating_sub(2) as usize; // borders
    let lines = app.console.lines();
    let total = lines.len();
    let scroll_back = app.console.scroll as usize;
    let start = total.saturating_sub(height + scroll_back);
    let end = total.saturating_sub(scroll_back);

    let text: Vec<Line> = lines[start..end]
        .iter()
        .map(|l| match l.severity {
            Severity::Warn => Line::from(Span::styled(l.to_string(), Style::default().fg(Color::Red))),
            _ => Line::from(Span::raw(l.to_string())),
        })
        .collect();
    let p = Paragraph::new(Text::from(text))
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(p, area);
}

fn draw_footer(frame: &mut Frame, area: Rect, app: &AppState) {
    let status = match app.pending.position() {
        Some((n, total)) => format!("Record {n} of {total}"),
        None if app.pending.is_empty() => "No pending data".to_string(),
        None => String::new(),
    };
    let mut spans = vec![Span::raw(status)];
    if app.busy {
        spans.push(Span::styled(
            "  waiting for API...",
            Style::default().fg(Color::Yellow),
        ));
    }
    let block = Block::default().borders(Borders::ALL).title("Status");
    let p = Paragraph::new(Text::from(Line::from(spans))).block(block);
    frame.render_widget(p, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_notice(frame: &mut Frame, notice: &Notice) {
    let (color, icon) = match notice.level {
        NoticeLevel::Success => (Color::Green, "\u{2713}"),
        NoticeLevel::Warning => (Color::Blue, "\u{2139}"),
        NoticeLevel::Error => (Color::Red, "\u{2717}"),
    };
    let area = centered(frame.size(), 60, 16);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(format!(" {icon} {} ", notice.title));

    let mut lines: Vec<Line> = notice.message.lines().map(Line::from).collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "[Enter] OK",
        Style::default().add_modifier(Modifier::BOLD),
    )));

    frame.render_widget(Clear, area);
    let p = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(p, area);
}

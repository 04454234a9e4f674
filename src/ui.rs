//! Minimal ratatui render: a system summary line plus a sortable process
//! table. Deliberately plain — see the module doc on `main.rs`.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table},
    Frame,
};

use crate::app::App;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());

    draw_summary(f, app, chunks[0]);
    draw_process_table(f, app, chunks[1]);
    draw_footer(f, app, chunks[2]);
}

fn draw_summary(f: &mut Frame, app: &App, area: Rect) {
    let sys = &app.system;
    let text = format!(
        "{}  cpu {:>5.1}%  mem {:>5.1}% ({}/{})  swap {:>5.1}%  load {:.2} {:.2} {:.2}  uptime {}s",
        sys.hostname,
        sys.cpu_total.total_percent,
        sys.memory_used_percent,
        format_bytes(sys.memory_used_bytes),
        format_bytes(sys.memory_total_bytes),
        sys.swap_used_percent,
        sys.load_avg_1,
        sys.load_avg_5,
        sys.load_avg_15,
        sys.uptime_seconds,
    );
    let widget = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("procwatch"));
    f.render_widget(widget, area);
}

fn draw_process_table(f: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(vec!["PID", "USER", "CPU%", "MEM%", "RSS", "STATE", "COMMAND"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = app
        .processes
        .iter()
        .skip(app.scroll_offset)
        .take(app.visible_rows)
        .enumerate()
        .map(|(i, p)| {
            let absolute_index = i + app.scroll_offset;
            let state = p
                .display_state
                .as_ref()
                .map(|s| s.label())
                .unwrap_or("—");
            let row = Row::new(vec![
                p.pid.to_string(),
                p.user.clone(),
                format!("{:.1}", p.cpu_percent),
                format!("{:.1}", p.memory_percent),
                format_bytes(p.memory_bytes),
                state.to_string(),
                p.command.clone(),
            ]);
            if absolute_index == app.selected_index {
                row.style(Style::default().bg(Color::Blue).fg(Color::White))
            } else {
                row
            }
        })
        .collect();

    let widths = [
        Constraint::Length(7),
        Constraint::Length(10),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(8),
        Constraint::Length(10),
        Constraint::Min(10),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("processes"));
    f.render_widget(table, area);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let text = app
        .status_message
        .clone()
        .unwrap_or_else(|| "q quit  j/k move  p/m/n sort  t terminate  x kill  space pause  r refresh".to_string());
    let widget = Paragraph::new(Line::from(vec![Span::raw(text)]));
    f.render_widget(widget, area);
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}{}", UNITS[unit])
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

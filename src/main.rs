//! procwatch — a minimal cross-platform process/resource monitor TUI over
//! the `procwatch` data pipeline (probes → models → background samplers).
//!
//! This binary is a thin consumer: process table, system summary, basic
//! navigation and kill/terminate. The interesting work lives in the library.

mod app;
mod ui;

use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use procwatch::domain::config::SamplingConfig;
use ratatui::{backend::CrosstermBackend, Terminal};

use app::{App, SortField};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run_app(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    let config = SamplingConfig::default();
    let mut app = App::new(config);
    let poll_rate = Duration::from_millis(200);

    app.request_refresh();

    loop {
        let size = terminal.size()?;
        app.visible_rows = (size.height as usize).saturating_sub(5).max(1);

        app.pull_snapshots();
        terminal.draw(|f| ui::draw(f, &app))?;

        let deadline = Instant::now() + poll_rate;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            if event::poll(remaining)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        handle_key(&mut app, key.code);
                    }
                }
            } else {
                break;
            }
            if app.should_quit {
                return Ok(());
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key(app: &mut App, key: KeyCode) {
    match key {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::PageUp => app.page_up(),
        KeyCode::PageDown => app.page_down(),
        KeyCode::Char('p') => {
            app.sort_field = SortField::Cpu;
            app.sort_processes();
        }
        KeyCode::Char('m') => {
            app.sort_field = SortField::Memory;
            app.sort_processes();
        }
        KeyCode::Char('n') => {
            app.sort_field = SortField::Pid;
            app.sort_processes();
        }
        KeyCode::Char('t') => app.terminate_selected(),
        KeyCode::Char('x') => app.kill_selected(),
        KeyCode::Char(' ') => app.paused = !app.paused,
        KeyCode::Char('r') => app.request_refresh(),
        _ => {}
    }
}

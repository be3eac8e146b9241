use std::io;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::{info, warn};

mod app;
mod cli;
mod error;
mod host_keys;
mod logging;
mod model;
mod ssh;
mod storage;
mod transfer;
mod ui;

use app::App;
use app::constants::QUIT_GRACE_PERIOD;
use cli::Cli;

const TICK_RATE: Duration = Duration::from_millis(33);

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Err(err) = storage::log_path().and_then(|path| logging::init_tracing(&path)) {
        eprintln!("file logging disabled: {err:#}");
    }
    info!(version = env!("CARGO_PKG_VERSION"), "scpc starting");

    match cli.command {
        Some(command) => cli::run(command),
        None => {
            run_form()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_form() -> Result<()> {
    let mut app = App::load()?;

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|frame| ui::draw_ui(frame, app))?;

        let timeout = TICK_RATE.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    let ctrl_c = key.modifiers.contains(KeyModifiers::CONTROL)
                        && matches!(key.code, KeyCode::Char('c'));
                    if ctrl_c {
                        if app.is_transferring() {
                            warn!("quit requested during transfer, cancelling");
                            app.cancel_transfer();
                            terminal.draw(|frame| ui::draw_ui(frame, app))?;
                            if !app.wait_for_transfer(QUIT_GRACE_PERIOD) {
                                warn!("transfer did not stop before quitting");
                            }
                        }
                        return Ok(());
                    }
                    app.handle_key(key);
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            last_tick = Instant::now();
        }

        app.poll_transfer_events();
    }
}

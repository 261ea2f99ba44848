mod chart;
mod config;
mod data;
mod driver;
mod error;
mod logging;
#[cfg(test)]
mod testing;
mod ui;

use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend},
};
use std::{
    io::{Stdout, stdout},
    process,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::time;
use tracing::{info, warn};

use chart::ChartBoard;
use config::{Cli, Config, LOOKBACK_BLOCKS, UI_TICK};
use data::{AlloyChainSource, MetricAggregator, shared_status, status_read, status_write};
use driver::{LiveUpdater, initial_draw, watch_new_blocks};
use ui::Dashboard;

type Result<T> = eyre::Result<T>;
type CrosstermTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Redraw at least this often so relative ages stay current.
const IDLE_REDRAW: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // Nothing touches the network or the terminal without a key.
    let config = match Config::from_cli(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };

    let _log_guard = logging::configure_logging(&config.log_file)?;
    info!(
        rpc_url = %config.display_url(),
        charts = config.charts.len(),
        window = config.max_window,
        "starting blockpulse"
    );

    let source = Arc::new(AlloyChainSource::new(&config.rpc_url)?);
    let aggregator = MetricAggregator::new(Arc::clone(&source));
    let board = ChartBoard::new(config.charts.clone(), config.max_window);
    let status = shared_status(config.display_url());

    let feed = {
        let board = board.clone();
        let status = Arc::clone(&status);
        let poll_interval = config.poll_interval;
        tokio::spawn(async move {
            let last_seen = match initial_draw(&board, &aggregator, &status, LOOKBACK_BLOCKS).await {
                Ok(head) => Some(head),
                Err(e) => {
                    warn!(error = %e, "initial draw aborted");
                    status_write(&status).record_error(&e);
                    None
                }
            };
            let blocks = watch_new_blocks(source, poll_interval, last_seen, Arc::clone(&status));
            LiveUpdater::new(board, aggregator, status).run(blocks).await;
        })
    };

    let mut terminal = TerminalGuard::new(setup_terminal()?, cleanup_terminal);
    let mut dashboard = Dashboard::new(config.poll_interval);
    let mut drawn_revision = None;
    let mut last_draw = Instant::now();

    loop {
        status_write(&status).check_staleness();

        let revision = board.revision();
        if drawn_revision != Some(revision) || last_draw.elapsed() >= IDLE_REDRAW {
            let snapshot = status_read(&status).clone();
            terminal
                .terminal()
                .draw(|frame| dashboard.render(frame, &board, &snapshot))?;
            drawn_revision = Some(revision);
            last_draw = Instant::now();
        }

        if event::poll(UI_TICK)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        dashboard.quit();
                    }
                    _ => {}
                }
            }
        }

        if dashboard.should_quit {
            break;
        }

        time::sleep(Duration::from_millis(10)).await;
    }

    feed.abort();
    terminal.restore()?;
    info!("shutting down");
    Ok(())
}

/// Owns the terminal and runs `restore` exactly once, on the normal path via
/// [`TerminalGuard::restore`] or on drop when `main` bails out early.
struct TerminalGuard<B: Backend> {
    terminal: Terminal<B>,
    restore: fn(&mut Terminal<B>) -> Result<()>,
    restored: bool,
}

impl<B: Backend> TerminalGuard<B> {
    fn new(terminal: Terminal<B>, restore: fn(&mut Terminal<B>) -> Result<()>) -> Self {
        Self {
            terminal,
            restore,
            restored: false,
        }
    }

    fn terminal(&mut self) -> &mut Terminal<B> {
        &mut self.terminal
    }

    fn restore(mut self) -> Result<()> {
        self.restored = true;
        (self.restore)(&mut self.terminal)
    }
}

impl<B: Backend> Drop for TerminalGuard<B> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;
        if let Err(e) = (self.restore)(&mut self.terminal) {
            warn!(error = %e, "failed to restore terminal");
        }
    }
}

fn setup_terminal() -> Result<CrosstermTerminal> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn cleanup_terminal(terminal: &mut CrosstermTerminal) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_terminal() -> Terminal<TestBackend> {
        Terminal::new(TestBackend::new(20, 5)).unwrap()
    }

    #[test]
    fn early_return_restores_terminal() {
        static RESTORES: AtomicUsize = AtomicUsize::new(0);
        fn restore(_: &mut Terminal<TestBackend>) -> Result<()> {
            RESTORES.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn failing_loop() -> Result<()> {
            let mut terminal = TerminalGuard::new(test_terminal(), restore);
            terminal.terminal().draw(|_| {})?;
            Err(eyre::eyre!("input device went away"))
        }

        assert!(failing_loop().is_err());
        assert_eq!(RESTORES.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_restore_runs_once() {
        static RESTORES: AtomicUsize = AtomicUsize::new(0);
        fn restore(_: &mut Terminal<TestBackend>) -> Result<()> {
            RESTORES.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        let terminal = TerminalGuard::new(test_terminal(), restore);
        terminal.restore().unwrap();
        assert_eq!(RESTORES.load(Ordering::SeqCst), 1);
    }
}

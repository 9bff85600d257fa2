use crate::format::{Dashboard, dashboard_lines};
use crate::scheduler::Control;
use crossterm::cursor::{Hide, Show};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
    enable_raw_mode,
};
use crossterm::tty::IsTty;
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph};
use std::io::{self, Stdout};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("not a TTY: run `prpeek` in an interactive terminal")]
    NotATty,

    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Draws frames. Errors are reported to the caller, which decides whether they matter.
pub trait Renderer {
    fn render(&mut self, dashboard: &Dashboard) -> Result<(), RenderError>;

    /// Redraw the last frame with `notice` in place of its footer notice.
    fn show_notice(&mut self, notice: &str) -> Result<(), RenderError>;

    fn scroll(&mut self, _delta: i32) {}
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
}

/// Owns the alternate screen for its lifetime. Dropping it (or panicking)
/// puts the terminal back the way it was.
pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    pub fn enter() -> Result<Self, RenderError> {
        if !io::stdin().is_tty() || !io::stdout().is_tty() {
            return Err(RenderError::NotATty);
        }
        enable_raw_mode()?;
        // From here on, Drop undoes whatever succeeded.
        let guard = Self { _private: () };
        execute!(
            io::stdout(),
            EnterAlternateScreen,
            Clear(ClearType::All),
            Clear(ClearType::Purge),
            Hide
        )?;

        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            restore_terminal();
            previous(info);
        }));

        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

pub struct TerminalRenderer {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    title: String,
    last: Option<Dashboard>,
    scroll: u16,
}

impl TerminalRenderer {
    pub fn new(title: String) -> Result<Self, RenderError> {
        let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        Ok(Self {
            terminal,
            title,
            last: None,
            scroll: 0,
        })
    }

    fn draw(&mut self) -> Result<(), RenderError> {
        let area = self.terminal.size()?;
        let inner_width = area.width.saturating_sub(4) as usize;
        let inner_height = area.height.saturating_sub(2) as usize;

        let lines = match &self.last {
            Some(d) => dashboard_lines(d, inner_width),
            None => Vec::new(),
        };
        let max_scroll = lines.len().saturating_sub(inner_height);
        self.scroll = self.scroll.min(u16::try_from(max_scroll).unwrap_or(u16::MAX));

        let title = format!(" {} ", self.title);
        let scroll = self.scroll;
        self.terminal.draw(|f| {
            let block = Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(Color::Magenta))
                .title(Span::styled(
                    title,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            let paragraph = Paragraph::new(Text::from(lines))
                .block(block)
                .scroll((scroll, 0));
            f.render_widget(paragraph, f.area());
        })?;
        Ok(())
    }
}

impl Renderer for TerminalRenderer {
    fn render(&mut self, dashboard: &Dashboard) -> Result<(), RenderError> {
        self.title = dashboard.title.clone();
        self.last = Some(dashboard.clone());
        self.draw()
    }

    fn show_notice(&mut self, notice: &str) -> Result<(), RenderError> {
        let frame = self.last.get_or_insert_with(|| Dashboard {
            title: self.title.clone(),
            sections: Vec::new(),
            updated_at: None,
            notice: None,
        });
        frame.notice = Some(notice.to_string());
        self.draw()
    }

    fn scroll(&mut self, delta: i32) {
        let next = i32::from(self.scroll).saturating_add(delta);
        self.scroll = u16::try_from(next.max(0)).unwrap_or(u16::MAX);
    }
}

/// Map a terminal event to a scheduler request.
pub fn control_for(event: &Event) -> Option<Control> {
    match event {
        Event::Resize(_, _) => Some(Control::Resize),
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) => match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Control::Quit),
            KeyCode::Char('q') | KeyCode::Esc => Some(Control::Quit),
            KeyCode::Char('r') => Some(Control::Refresh),
            KeyCode::Up | KeyCode::Char('k') => Some(Control::Scroll(-1)),
            KeyCode::Down | KeyCode::Char('j') => Some(Control::Scroll(1)),
            KeyCode::PageUp => Some(Control::Scroll(-10)),
            KeyCode::PageDown => Some(Control::Scroll(10)),
            _ => None,
        },
        _ => None,
    }
}

/// Forward keyboard and resize events until the scheduler stops listening.
pub fn spawn_input(tx: mpsc::UnboundedSender<Control>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = EventStream::new();
        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "terminal event stream failed");
                    let _ = tx.send(Control::Quit);
                    return;
                }
            };
            let Some(control) = control_for(&event) else {
                continue;
            };
            if tx.send(control).is_err() || control == Control::Quit {
                return;
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Turn SIGINT/SIGTERM into a quit request.
pub fn spawn_signals(tx: mpsc::UnboundedSender<Control>) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = tx.send(Control::Quit);
    })
}

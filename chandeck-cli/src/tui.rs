use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{
        self, DisableFocusChange, EnableFocusChange, Event as CEvent, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::{info, warn};

use chandeck_core::clock::SystemClock;
use chandeck_core::engine::{DashCommand, Dashboard, DashboardHandle};

use crate::context::AppContext;
use crate::ui::{self, Selection};

type Term = Terminal<CrosstermBackend<io::Stdout>>;

fn setup_terminal() -> io::Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Term) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Quit,
    Up,
    Down,
    Toggle,
    SwitchLayout,
    NextServer,
    Refresh,
    Dismiss,
}

fn key_action(key: KeyEvent) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }
    let action = match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Up | KeyCode::Char('k') => Action::Up,
        KeyCode::Down | KeyCode::Char('j') => Action::Down,
        KeyCode::Char(' ') | KeyCode::Enter => Action::Toggle,
        KeyCode::Char('v') => Action::SwitchLayout,
        KeyCode::Char('s') => Action::NextServer,
        KeyCode::Char('r') => Action::Refresh,
        KeyCode::Esc => Action::Dismiss,
        _ => return None,
    };
    Some(action)
}

pub async fn run_tui(mut ctx: AppContext) -> anyhow::Result<()> {
    let settings = ctx.config.engine_settings(ctx.initial_layout());
    let (dashboard, handle) = Dashboard::new(ctx.factory(), Arc::new(SystemClock), settings);
    let engine = tokio::spawn(dashboard.run());

    if let Some(server) = ctx.initial_server() {
        handle.send(DashCommand::SelectServer(server)).await;
    } else {
        warn!("no server configured; waiting for a selection");
    }

    let mut terminal = setup_terminal()?;
    let result = tui_loop(&mut terminal, &handle, &mut ctx).await;
    restore_terminal(terminal)?;

    handle.send(DashCommand::Shutdown).await;
    if let Err(e) = engine.await {
        warn!("engine task ended abnormally: {}", e);
    }
    info!("dashboard closed");
    result
}

async fn tui_loop(
    terminal: &mut Term,
    handle: &DashboardHandle,
    ctx: &mut AppContext,
) -> anyhow::Result<()> {
    let mut selection = Selection::default();
    let demo = ctx.is_demo();

    loop {
        let board = handle.board().await;
        selection.clamp(board.len());
        terminal.draw(|f| ui::draw(f, &board, &selection, demo))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }

        let action = match event::read()? {
            CEvent::Key(key) => key_action(key),
            CEvent::FocusLost => {
                handle.send(DashCommand::SetVisible(false)).await;
                None
            }
            CEvent::FocusGained => {
                handle.send(DashCommand::SetVisible(true)).await;
                None
            }
            _ => None,
        };
        let Some(action) = action else {
            continue;
        };

        match action {
            Action::Quit => return Ok(()),
            Action::Up => selection.up(),
            Action::Down => selection.down(board.len()),
            Action::Toggle => {
                if let Some(channel) = selection.channel(&board) {
                    handle.send(DashCommand::Toggle { channel }).await;
                }
            }
            Action::SwitchLayout => {
                let layout = board.layout.other();
                handle.send(DashCommand::SetLayout(layout)).await;
                ctx.persist(board.server.as_deref(), layout);
            }
            Action::NextServer => match ctx.next_server(board.server.as_deref()) {
                Some(server) => {
                    selection = Selection::default();
                    ctx.persist(Some(&server), board.layout);
                    handle.send(DashCommand::SelectServer(server)).await;
                }
                None => warn!("no candidate servers to switch to"),
            },
            Action::Refresh => {
                handle.send(DashCommand::RefreshNow).await;
            }
            Action::Dismiss => {
                handle.send(DashCommand::DismissNotice).await;
            }
        }
    }
}

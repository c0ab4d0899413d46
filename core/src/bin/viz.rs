/// Terminal page for the sync engine: nav badges, chat list and open thread
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use groovesync_core::engine::PageSnapshot;
use groovesync_core::sync_types::SyncEvent;
use groovesync_core::transport::HttpTransport;
use groovesync_core::visibility::PageSignal;
use groovesync_core::{Config, SyncEngine};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};

const REFRESH_EVERY: Duration = Duration::from_millis(250);

struct ViewState {
    visible: bool,
    /// Thread lines hidden below the viewport; 0 follows the newest message
    scroll_from_bottom: usize,
    last_event: Option<String>,
    snapshot: PageSnapshot,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let transport = HttpTransport::new(&config)
        .map_err(|e| anyhow::anyhow!("Transport error: {}", e))?;
    let seed = config.page_seed();
    let engine = SyncEngine::start(config, Arc::new(transport), seed).await;
    let mut events = engine.subscribe();

    // TUI setup
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let res = run_app(&mut terminal, &engine, &mut events).await;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    engine.shutdown().await;
    if let Err(e) = res {
        eprintln!("TUI error: {e}");
    }
    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    engine: &SyncEngine,
    events: &mut broadcast::Receiver<SyncEvent>,
) -> std::io::Result<()> {
    let mut view = ViewState {
        visible: true,
        scroll_from_bottom: 0,
        last_event: None,
        snapshot: engine.snapshot().await,
    };
    let mut dirty = true;
    let mut last_redraw = Instant::now();

    loop {
        // Drain engine events
        loop {
            match events.try_recv() {
                Ok(event) => {
                    view.last_event = Some(describe(&event));
                    dirty = true;
                }
                Err(TryRecvError::Lagged(_)) => dirty = true,
                Err(_) => break,
            }
        }

        // Handle keys
        if event::poll(Duration::from_millis(5))? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        engine.visibility().handle(PageSignal::Unload).await;
                        return Ok(());
                    }
                    KeyCode::Char('h') => {
                        view.visible = !view.visible;
                        let signal = if view.visible {
                            PageSignal::Visible
                        } else {
                            PageSignal::Hidden
                        };
                        engine.visibility().handle(signal).await;
                        dirty = true;
                    }
                    KeyCode::Char('r') => {
                        engine.chat().force_refresh().await;
                        dirty = true;
                    }
                    KeyCode::Up => {
                        let max = view.snapshot.thread.len().saturating_sub(1);
                        view.scroll_from_bottom = (view.scroll_from_bottom + 1).min(max);
                        dirty = true;
                    }
                    KeyCode::Down => {
                        view.scroll_from_bottom = view.scroll_from_bottom.saturating_sub(1);
                        dirty = true;
                    }
                    _ => {}
                }
            }
        }

        if dirty || last_redraw.elapsed() >= REFRESH_EVERY {
            view.snapshot = engine.snapshot().await;
            if view.snapshot.scroll_to_bottom {
                view.scroll_from_bottom = 0;
            }
            terminal.draw(|f| draw(f, &view))?;
            last_redraw = Instant::now();
            dirty = false;
        }

        tokio::time::sleep(Duration::from_millis(16)).await;
    }
}

fn describe(event: &SyncEvent) -> String {
    match event {
        SyncEvent::BadgesUpdated { follow, message } => {
            format!("badges: follow={} message={}", follow.count, message.count)
        }
        SyncEvent::MessagesAppended { peer_id, message_ids } => {
            format!("{} new message(s) from {}", message_ids.len(), peer_id)
        }
        SyncEvent::ScrollRequested { peer_id } => format!("scroll thread {}", peer_id),
        SyncEvent::ContactsReordered { order } => format!("chat list: {:?}", order),
        SyncEvent::ContactRead { contact_id } => format!("read {}", contact_id),
        SyncEvent::ReactionApplied {
            target_type,
            target_id,
            widgets,
        } => format!("reaction {} {} ({} widgets)", target_type, target_id, widgets),
    }
}

fn badge_span(label: &str, text: &str, lit: bool) -> Span<'static> {
    let shown = if text.is_empty() {
        format!(" {} ", label)
    } else {
        format!(" {} [{}] ", label, text)
    };
    let style = if lit {
        Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    Span::styled(shown, style)
}

fn draw(f: &mut Frame, view: &ViewState) {
    let snap = &view.snapshot;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(5), Constraint::Length(4)].as_ref())
        .split(f.size());

    let nav = Paragraph::new(Line::from(vec![
        badge_span("Followers", &snap.follow.text, snap.follow.has_notification),
        Span::raw("  "),
        badge_span("Messages", &snap.message.text, snap.message.has_notification),
    ]))
    .block(Block::default().title("GrooveSync").borders(Borders::ALL));
    f.render_widget(nav, rows[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)].as_ref())
        .split(rows[1]);
    draw_contacts(f, snap, columns[0]);
    draw_thread(f, snap, view.scroll_from_bottom, columns[1]);

    let mut info = vec![Line::from(vec![
        Span::raw(format!("notifications: {:?}", snap.notification_status)),
        Span::raw("   "),
        Span::raw(format!(
            "chat: {}",
            snap.chat_status
                .map(|s| format!("{:?}", s))
                .unwrap_or_else(|| "-".to_string())
        )),
        Span::raw("   "),
        Span::raw(if view.visible { "visible" } else { "hidden" }),
        Span::raw("   h: hide/show  r: refresh  ↑/↓: scroll  q: quit"),
    ])];
    if let Some(ev) = &view.last_event {
        info.push(Line::from(Span::styled(ev.clone(), Style::default().fg(Color::Yellow))));
    }
    let info = Paragraph::new(info).block(Block::default().title("Status").borders(Borders::ALL));
    f.render_widget(info, rows[2]);
}

fn draw_contacts(f: &mut Frame, snap: &PageSnapshot, area: Rect) {
    let lines: Vec<Line> = snap
        .contacts
        .iter()
        .map(|c| {
            let marker = if snap.conversation == Some(c.id) { "▶ " } else { "  " };
            let mut spans = vec![Span::raw(format!("{}user {}", marker, c.id))];
            if let Some(badge) = c.badge_text() {
                spans.push(Span::styled(
                    format!(" ({})", badge),
                    Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
                ));
            }
            Line::from(spans)
        })
        .collect();
    let list = Paragraph::new(lines).block(Block::default().title("Chats").borders(Borders::ALL));
    f.render_widget(list, area);
}

fn draw_thread(f: &mut Frame, snap: &PageSnapshot, scroll_from_bottom: usize, area: Rect) {
    let title = match snap.conversation {
        Some(peer) => format!("Conversation with {}", peer),
        None => "No conversation".to_string(),
    };
    let mut lines: Vec<Line> = if snap.conversation.is_some() && snap.thread.is_empty() {
        vec![Line::from(Span::styled(
            "No messages yet.",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        snap.thread
            .iter()
            .map(|m| {
                let (prefix, color) = if m.from_me {
                    ("me", Color::Cyan)
                } else {
                    ("them", Color::White)
                };
                Line::from(vec![
                    Span::styled(format!("{:>4}: ", prefix), Style::default().fg(color)),
                    Span::raw(m.content.clone()),
                    Span::styled(format!("  {}", m.display_time), Style::default().fg(Color::DarkGray)),
                ])
            })
            .collect()
    };

    // Window ending `scroll_from_bottom` lines above the newest message
    let visible_rows = area.height.saturating_sub(2) as usize;
    let end = lines.len().saturating_sub(scroll_from_bottom);
    lines.truncate(end);
    if lines.len() > visible_rows {
        lines.drain(..lines.len() - visible_rows);
    }
    let thread = Paragraph::new(lines).block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(thread, area);
}

use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pilah_cycle::CycleCommand;
use pilah_types::{
    classification::ClassificationResult,
    cycle::CyclePhase,
    events::{CycleEvent, EventPayload},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Terminal,
};
use tokio::sync::mpsc::Sender;

const MAX_LOG_ENTRIES: usize = 120;

pub enum UiMessage {
    Event(CycleEvent),
}

/// What the screen shows, folded from cycle events.
#[derive(Debug)]
struct ViewState {
    phase: CyclePhase,
    status: String,
    result: Option<ClassificationResult>,
    notice: Option<String>,
    logs: VecDeque<String>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            phase: CyclePhase::Idle,
            status: "Starting camera...".into(),
            result: None,
            notice: None,
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
        }
    }
}

impl ViewState {
    fn apply(&mut self, event: &CycleEvent) {
        match &event.payload {
            EventPayload::StateChanged { to, .. } => {
                self.phase = *to;
                if matches!(to, CyclePhase::Live) {
                    self.result = None;
                }
            }
            EventPayload::Status(status) => self.status = status.clone(),
            EventPayload::Result(result) => self.result = Some(result.clone()),
            EventPayload::Failure(_) => self.result = None,
            EventPayload::Notice(notice) => self.notice = Some(notice.clone()),
        }
        if self.logs.len() == MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(format_event(event));
    }

    fn hints(&self) -> &'static str {
        match self.phase {
            CyclePhase::Live => "c/space capture",
            CyclePhase::Resulted | CyclePhase::Failed | CyclePhase::Unavailable => "r retake",
            CyclePhase::Idle | CyclePhase::Stilled => "",
        }
    }
}

pub fn run(receiver: Receiver<UiMessage>, commands: Sender<CycleCommand>, summary: String) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, &commands, summary.as_str());
    let _ = commands.blocking_send(CycleCommand::Shutdown);

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    commands: &Sender<CycleCommand>,
    summary: &str,
) -> Result<()> {
    let mut view = ViewState::default();

    loop {
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::Event(event)) => view.apply(&event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }

        terminal.draw(|f| draw(f, &view, summary))?;

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let command = match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Enter | KeyCode::Char('x') => {
                        view.notice = None;
                        None
                    }
                    KeyCode::Char('c') | KeyCode::Char(' ') => Some(CycleCommand::Capture),
                    KeyCode::Char('r') => Some(CycleCommand::Retake),
                    _ => None,
                };
                if let Some(command) = command {
                    if commands.blocking_send(command).is_err() {
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

fn draw(f: &mut ratatui::Frame, view: &ViewState, summary: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(4),
                Constraint::Length(if view.notice.is_some() { 3 } else { 0 }),
                Constraint::Min(0),
            ]
            .as_ref(),
        )
        .split(f.size());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "Pilah",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::raw(format!("{:?}", view.phase)),
        Span::raw("  "),
        Span::styled("config:", Style::default().fg(Color::Magenta)),
        Span::raw(" "),
        Span::raw(summary),
        Span::raw("  "),
        Span::styled(view.hints(), Style::default().fg(Color::Yellow)),
        Span::raw("  q quit"),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Summary"));
    f.render_widget(header, chunks[0]);

    let mut lines = vec![Line::from(view.status.clone())];
    if let Some(result) = &view.result {
        lines.push(Line::from(Span::styled(
            result.label_line(),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(result.confidence_line()));
    }
    let result = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Result"));
    f.render_widget(result, chunks[1]);

    if let Some(notice) = &view.notice {
        let notice = Paragraph::new(notice.as_str())
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Notice (Enter to dismiss)"),
            );
        f.render_widget(notice, chunks[2]);
    }

    let items: Vec<ListItem> = view
        .logs
        .iter()
        .rev()
        .map(|entry| ListItem::new(entry.clone()))
        .collect();
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Recent events"));
    f.render_widget(list, chunks[3]);
}

fn format_event(event: &CycleEvent) -> String {
    let timestamp = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::StateChanged { from, to } => {
            format!("[{}] State {:?} -> {:?}", timestamp, from, to)
        }
        EventPayload::Status(status) => format!("[{}] {}", timestamp, status),
        EventPayload::Result(result) => format!(
            "[{}] {} ({})",
            timestamp,
            result.label(),
            result.confidence_percent()
        ),
        EventPayload::Failure(failure) => {
            format!("[{}] {:?}: {}", timestamp, failure.kind, failure.message)
        }
        EventPayload::Notice(notice) => format!("[{}] Notice: {}", timestamp, notice),
    }
}

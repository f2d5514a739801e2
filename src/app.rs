use crate::config::Settings;
use crate::session::{Command, Session};
use crate::transport::SeekTarget;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::stdout;
use std::time::{Duration, Instant};

const INPUT_POLL: Duration = Duration::from_millis(33);
const SPEED_STEP: f32 = 0.25;

/// Step sizes for the relative key bindings.
#[derive(Debug, Clone, Copy)]
pub struct KeySteps {
    pub seek_seconds: f64,
    pub volume: i32,
}

impl From<&Settings> for KeySteps {
    fn from(settings: &Settings) -> Self {
        Self {
            seek_seconds: f64::from(settings.seek_step_seconds),
            volume: i32::from(settings.volume_step),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Dispatch(Command),
    SelectBy(isize),
}

pub fn run(session: &mut Session, steps: KeySteps) -> Result<()> {
    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut selected = 0usize;
    let result: Result<()> = loop {
        session.pump(Instant::now());
        if session.is_quitting() {
            break Ok(());
        }

        let playlist_len = session.transport().playlist().len();
        selected = selected.min(playlist_len.saturating_sub(1));
        if let Err(err) = terminal.draw(|frame| crate::ui::draw(frame, session, selected)) {
            break Err(err.into());
        }

        let wait = session.until_next_tick(Instant::now()).min(INPUT_POLL);
        match event::poll(wait) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => break Err(err.into()),
        }
        let key = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
            Ok(_) => continue,
            Err(err) => break Err(err.into()),
        };

        match map_key(key, selected, steps) {
            Some(Action::Dispatch(command)) => session.dispatch(command),
            Some(Action::SelectBy(delta)) => {
                selected = selected
                    .saturating_add_signed(delta)
                    .min(playlist_len.saturating_sub(1));
            }
            None => {}
        }
    };

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

pub fn map_key(key: KeyEvent, selected: usize, steps: KeySteps) -> Option<Action> {
    let command = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Command::Quit,
        KeyCode::Char('q') => Command::Quit,
        KeyCode::Char(' ') => Command::TogglePause,
        KeyCode::Char('s') => Command::Stop,
        KeyCode::Char('n') => Command::Next,
        KeyCode::Char('p') => Command::Previous,
        KeyCode::Left => Command::Seek(SeekTarget::Relative(-steps.seek_seconds)),
        KeyCode::Right => Command::Seek(SeekTarget::Relative(steps.seek_seconds)),
        KeyCode::Char('+') | KeyCode::Char('=') => Command::AdjustVolume(steps.volume),
        KeyCode::Char('-') => Command::AdjustVolume(-steps.volume),
        KeyCode::Char(']') => Command::AdjustSpeed(SPEED_STEP),
        KeyCode::Char('[') => Command::AdjustSpeed(-SPEED_STEP),
        KeyCode::Char('r') => Command::CycleRepeat,
        KeyCode::Char('h') => Command::ToggleShuffle,
        KeyCode::Enter => Command::PlayIndex(selected),
        KeyCode::Delete | KeyCode::Char('d') => Command::RemoveTrack(selected),
        KeyCode::Up => return Some(Action::SelectBy(-1)),
        KeyCode::Down => return Some(Action::SelectBy(1)),
        KeyCode::PageUp => return Some(Action::SelectBy(-10)),
        KeyCode::PageDown => return Some(Action::SelectBy(10)),
        _ => return None,
    };
    Some(Action::Dispatch(command))
}

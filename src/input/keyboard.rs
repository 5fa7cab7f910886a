//! Keyboard capture for the race
//!
//! Key events are stamped the moment they are read and forwarded to the
//! coordinator; the coordinator decides whether a press counts.

use std::io::{self, Stdout};

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use futures::StreamExt;
use tokio::time::Instant;
use tracing::trace;

use crate::race::coordinator::UserAction;
use crate::race::model::TriggerKey;
use crate::race::runtime::CoordinatorHandle;
use crate::util::rate_limit::TriggerRateLimiter;

/// What a key means to the race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    Trigger(TriggerKey),
    Action(UserAction),
}

/// Translate a key event; `None` for keys the race does not use
pub fn map_key(event: &KeyEvent) -> Option<InputCommand> {
    if event.kind != KeyEventKind::Press {
        return None;
    }

    let command = match event.code {
        KeyCode::Esc => InputCommand::Action(UserAction::Reset),
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            InputCommand::Action(UserAction::Reset)
        }
        KeyCode::Char(' ') => InputCommand::Trigger(TriggerKey::Space),
        KeyCode::Enter => InputCommand::Trigger(TriggerKey::Enter),
        KeyCode::Char('a' | 'A') => InputCommand::Trigger(TriggerKey::A),
        KeyCode::Char('l' | 'L') => InputCommand::Trigger(TriggerKey::L),
        KeyCode::Char('g' | 'G') => InputCommand::Action(UserAction::Start),
        KeyCode::Char('n' | 'N') => InputCommand::Action(UserAction::NextRound),
        KeyCode::Char('r' | 'R') => InputCommand::Action(UserAction::RetryFinish),
        KeyCode::Char('c' | 'C') => InputCommand::Action(UserAction::NewGame),
        _ => return None,
    };
    Some(command)
}

/// Read terminal keys until the stream ends or the session stops
pub async fn forward_keys(handle: CoordinatorHandle) -> io::Result<()> {
    let mut events = EventStream::new();
    let limiter = TriggerRateLimiter::default();

    while let Some(event) = events.next().await {
        let at = Instant::now();
        let Event::Key(key) = event? else {
            continue;
        };

        let delivered = match map_key(&key) {
            Some(InputCommand::Trigger(trigger)) => {
                if !limiter.check(trigger) {
                    trace!(key = trigger.label(), "Key repeat dropped");
                    continue;
                }
                handle.key_pressed(trigger, at).await
            }
            Some(InputCommand::Action(action)) => handle.action(action).await,
            None => continue,
        };

        if !delivered {
            break;
        }
    }

    Ok(())
}

/// Raw mode for the lifetime of the guard
pub struct TerminalGuard {
    _stdout: Stdout,
}

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self {
            _stdout: io::stdout(),
        })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_trigger_keys_map_to_players() {
        assert_eq!(map_key(&press(KeyCode::Char(' '))), Some(InputCommand::Trigger(TriggerKey::Space)));
        assert_eq!(map_key(&press(KeyCode::Enter)), Some(InputCommand::Trigger(TriggerKey::Enter)));
        assert_eq!(map_key(&press(KeyCode::Char('A'))), Some(InputCommand::Trigger(TriggerKey::A)));
        assert_eq!(map_key(&press(KeyCode::Char('l'))), Some(InputCommand::Trigger(TriggerKey::L)));
    }

    #[test]
    fn test_control_keys() {
        assert_eq!(map_key(&press(KeyCode::Char('g'))), Some(InputCommand::Action(UserAction::Start)));
        assert_eq!(map_key(&press(KeyCode::Char('n'))), Some(InputCommand::Action(UserAction::NextRound)));
        assert_eq!(map_key(&press(KeyCode::Char('r'))), Some(InputCommand::Action(UserAction::RetryFinish)));
        assert_eq!(map_key(&press(KeyCode::Char('c'))), Some(InputCommand::Action(UserAction::NewGame)));
        assert_eq!(map_key(&press(KeyCode::Esc)), Some(InputCommand::Action(UserAction::Reset)));

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(&ctrl_c), Some(InputCommand::Action(UserAction::Reset)));
    }

    #[test]
    fn test_other_keys_and_releases_ignored() {
        assert_eq!(map_key(&press(KeyCode::Char('x'))), None);
        assert_eq!(map_key(&press(KeyCode::Tab)), None);

        let release = KeyEvent {
            code: KeyCode::Char(' '),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };
        assert_eq!(map_key(&release), None);
    }
}

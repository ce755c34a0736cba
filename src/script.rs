//! Counter scripts: the button presses of the counter as text.
//!
//! Steps are separated by whitespace or commas:
//! `normal`/`n`, `vip`/`v`, `+bot`/`+`, `-bot`/`-`, `tick` (one processing
//! interval), `wait:<ms>`, `show`, `quit`/`q`.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::dispatch::{DispatchError, Dispatcher, Priority, Snapshot};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("unknown step '{0}'")]
    UnknownStep(String),

    #[error("invalid wait '{0}': expected wait:<milliseconds>")]
    InvalidWait(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Submit(Priority),
    AddBot,
    RemoveBot,
    /// Advance the clock by one processing interval.
    Tick,
    Wait(Duration),
    Show,
    Quit,
}

pub fn parse_step(token: &str) -> Result<Step, ScriptError> {
    let token = token.trim();
    match token.to_ascii_lowercase().as_str() {
        "n" | "normal" => Ok(Step::Submit(Priority::Normal)),
        "v" | "vip" => Ok(Step::Submit(Priority::Vip)),
        "+" | "+bot" => Ok(Step::AddBot),
        "-" | "-bot" => Ok(Step::RemoveBot),
        "tick" => Ok(Step::Tick),
        "show" => Ok(Step::Show),
        "q" | "quit" => Ok(Step::Quit),
        other => match other.split_once(':') {
            Some(("wait", ms)) => ms
                .parse::<u64>()
                .map(|ms| Step::Wait(Duration::from_millis(ms)))
                .map_err(|_| ScriptError::InvalidWait(token.to_string())),
            _ => Err(ScriptError::UnknownStep(token.to_string())),
        },
    }
}

pub fn parse_script(script: &str) -> Result<Vec<Step>, ScriptError> {
    script
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(parse_step)
        .collect()
}

/// Run `steps` against a dispatcher on its virtual clock.
///
/// Returns a snapshot for every `show` step, plus one for the final state.
/// Stops early at `quit`.
pub fn replay(dispatcher: &mut Dispatcher, steps: &[Step]) -> Result<Vec<Snapshot>, DispatchError> {
    let mut shown = Vec::new();
    for step in steps {
        debug!(?step, "Replaying step");
        match *step {
            Step::Submit(priority) => {
                dispatcher.submit_order(priority)?;
            }
            Step::AddBot => {
                dispatcher.add_worker()?;
            }
            Step::RemoveBot => {
                dispatcher.remove_worker();
            }
            Step::Tick => {
                let interval = dispatcher.processing_duration();
                dispatcher.advance(interval);
            }
            Step::Wait(by) => {
                dispatcher.advance(by);
            }
            Step::Show => shown.push(dispatcher.snapshot()),
            Step::Quit => break,
        }
    }
    shown.push(dispatcher.snapshot());
    Ok(shown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_separators_and_aliases() {
        let steps = parse_script("n, VIP +bot\n-\twait:250 tick show q").unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Submit(Priority::Normal),
                Step::Submit(Priority::Vip),
                Step::AddBot,
                Step::RemoveBot,
                Step::Wait(Duration::from_millis(250)),
                Step::Tick,
                Step::Show,
                Step::Quit,
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_step("gold"),
            Err(ScriptError::UnknownStep("gold".to_string()))
        );
        assert_eq!(
            parse_step("wait:soon"),
            Err(ScriptError::InvalidWait("wait:soon".to_string()))
        );
        assert!(parse_script("n bogus").is_err());
        assert!(parse_script("  ").unwrap().is_empty());
    }

    #[test]
    fn test_replay_collects_shows_and_stops_at_quit() {
        let mut d = Dispatcher::new(Duration::from_millis(100));
        let steps = parse_script("n +bot show tick quit vip").unwrap();
        let shown = replay(&mut d, &steps).unwrap();

        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0].pending.len(), 1);
        assert_eq!(shown[1].completed.len(), 1);
        // Nothing after quit ran.
        assert_eq!(d.submitted_count(), 1);
    }
}

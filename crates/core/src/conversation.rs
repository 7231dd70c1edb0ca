//! Conversation state machine.
//!
//! [`reduce`] folds one [`ServerEvent`] into the current [`UiState`] and
//! returns the next state plus at most one [`Command`] for the runtime to
//! execute. It performs no I/O and never fails: a bad report payload becomes
//! an `Error` state and a [`Command::Disconnect`].

use chrono::{DateTime, Utc};
use openai_realtime_types::{OutputItem, ServerEvent};
use tracing::{info, warn};

use crate::{
    Command,
    report::{FINAL_REPORT_FUNCTION, PartialProgressReport, ProgressReport, duration_minutes},
    state::UiState,
};

pub const STATUS_SAVING_REPORT: &str = "Final report received, saving...";

/// Session metadata the reducer needs to complete a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContext {
    /// When the session became connected.
    pub session_date: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// The outcome of one reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: UiState,
    pub command: Option<Command>,
}

impl Step {
    fn state(state: UiState) -> Self {
        Self {
            state,
            command: None,
        }
    }
}

pub fn reduce(state: &UiState, event: &ServerEvent, ctx: &SessionContext) -> Step {
    let mut next = state.clone();
    match event {
        ServerEvent::SpeechStarted => {
            next.is_ai_speaking = true;
            next.ai_response_text.clear();
            Step::state(next)
        }
        ServerEvent::SpeechStopped => {
            next.is_ai_speaking = false;
            Step::state(next)
        }
        ServerEvent::TranscriptDelta { text } => {
            next.ai_response_text.push_str(text);
            Step::state(next)
        }
        ServerEvent::ResponseDone { output } => match select_function_call(output) {
            Some(call) if call.name.as_deref() == Some(FINAL_REPORT_FUNCTION) => {
                accept_final_report(next, call.arguments.as_deref(), ctx)
            }
            Some(call) => {
                warn!(name = ?call.name, "Ignoring unknown function call");
                Step::state(next)
            }
            None => Step::state(next),
        },
        ServerEvent::Other { .. } => Step::state(next),
    }
}

/// Picks the function call a completed response asks for.
///
/// The first `function_call` item wins. When there is none, an item named
/// `generate_final_report` of any type is used instead.
pub fn select_function_call(output: &[OutputItem]) -> Option<&OutputItem> {
    output.iter().find(|item| item.is_function_call()).or_else(|| {
        output
            .iter()
            .find(|item| item.name.as_deref() == Some(FINAL_REPORT_FUNCTION))
    })
}

fn accept_final_report(
    mut next: UiState,
    arguments: Option<&str>,
    ctx: &SessionContext,
) -> Step {
    if next.report_accepted {
        warn!("Final report already accepted for this session, ignoring");
        return Step::state(next);
    }

    let Some(arguments) = arguments else {
        next.fail("Error: the final report arrived without arguments.");
        return Step {
            state: next,
            command: Some(Command::Disconnect),
        };
    };

    match PartialProgressReport::from_arguments(arguments) {
        Ok(partial) => {
            let report = ProgressReport::from_partial(
                partial,
                ctx.session_date,
                duration_minutes(ctx.session_date, ctx.now),
            );
            info!(
                duration_minutes = report.duration_minutes,
                "Final report detected"
            );
            next.report_accepted = true;
            next.status_message = STATUS_SAVING_REPORT.to_string();
            Step {
                state: next,
                command: Some(Command::PersistReport(report)),
            }
        }
        Err(e) => {
            warn!(error = %e, "Final report arguments are malformed");
            next.fail(format!("Error processing the final report: {}", e));
            Step {
                state: next,
                command: Some(Command::Disconnect),
            }
        }
    }
}

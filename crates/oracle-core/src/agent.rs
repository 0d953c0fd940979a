//! Transition rules of the agent state machine.
//!
//! The runtime in `repo-oracle` drives a loop over [`Step`]s. Everything that
//! decides *where to go next*, and how history is compacted, is a pure
//! function here so it can be tested without a model or a database.
//!
//! ```text
//!            ┌──────────────┐ tool calls  ┌───────────────┐
//!   start ──►│  LlmDecide   │────────────►│ ExecuteTools  │
//!            └──────────────┘◄────────────└───────────────┘
//!              │          ▲
//!   > N msgs   ▼          │
//!            ┌──────────────┐
//!            │  Summarize   │        otherwise ──► Done
//!            └──────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationState, Message, Role};

/// Summarize once the history grows past this many messages.
pub const DEFAULT_SUMMARIZE_AFTER: usize = 12;
/// Messages kept verbatim by a summarization pass.
pub const DEFAULT_RETAIN_RECENT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    LlmDecide,
    ExecuteTools,
    Summarize,
    Done,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::LlmDecide => "llm_decide",
            Step::ExecuteTools => "execute_tools",
            Step::Summarize => "summarize",
            Step::Done => "done",
        }
    }
}

/// Thresholds governing the decide/summarize/stop choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPolicy {
    pub summarize_after: usize,
    pub retain_recent: usize,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            summarize_after: DEFAULT_SUMMARIZE_AFTER,
            retain_recent: DEFAULT_RETAIN_RECENT,
        }
    }
}

impl TransitionPolicy {
    /// Smallest `summarize_after` under which a turn can finish. A
    /// summarized history holds the summary, the retained tail and then the
    /// next answer; anything lower summarizes again on every decision.
    pub fn min_summarize_after(&self) -> usize {
        self.retain_recent + 2
    }

    pub fn terminates(&self) -> bool {
        self.summarize_after >= self.min_summarize_after()
    }

    /// Next step after the model has answered.
    ///
    /// Pending tool calls on the last message win; otherwise an oversized
    /// history is summarized; otherwise the turn is done.
    pub fn after_decision(&self, messages: &[Message]) -> Step {
        let wants_tools = messages
            .last()
            .map(|m| m.role == Role::Assistant && m.has_tool_calls())
            .unwrap_or(false);

        if wants_tools {
            Step::ExecuteTools
        } else if messages.len() > self.summarize_after {
            Step::Summarize
        } else {
            Step::Done
        }
    }

    /// Split history into the span to summarize and the tail kept verbatim.
    ///
    /// Earlier summary messages are left out of the span; their content is
    /// carried by `running_summary` instead.
    pub fn summary_span<'a>(&self, messages: &'a [Message]) -> (Vec<&'a Message>, &'a [Message]) {
        let cut = messages.len().saturating_sub(self.retain_recent);
        let span = messages[..cut].iter().filter(|m| !m.is_summary()).collect();
        (span, &messages[cut..])
    }

    /// Replace everything but the retained tail with a single summary
    /// message and record the new summary on the state.
    pub fn apply_summary(&self, state: &mut ConversationState, summary: String) {
        let cut = state.messages.len().saturating_sub(self.retain_recent);
        let retained = state.messages.split_off(cut);

        state.messages.clear();
        state.messages.push(Message::summary(&summary));
        state
            .messages
            .extend(retained.into_iter().filter(|m| !m.is_summary()));
        state.running_summary = Some(summary);
    }
}

/// Instruction appended to the summarized span.
pub fn summary_instruction(previous: Option<&str>) -> String {
    match previous {
        Some(summary) if !summary.trim().is_empty() => format!(
            "This is a summary of the conversation to date: {}\n\n\
             Extend the summary by taking into account the new messages above:",
            summary
        ),
        _ => "Create a summary of the conversation above:".to_string(),
    }
}

//! Agent loop runtime.
//!
//! Drives the decide / execute tools / summarize cycle for one user turn:
//!
//! ```text
//!          ┌──────────────┐  tool calls   ┌───────────────┐
//!   user ─▶│  LLM_DECIDE  │──────────────▶│ EXECUTE_TOOLS │
//!          └──────┬───────┘◀──────────────└───────────────┘
//!                 │ no tool calls
//!        > threshold?  ──yes──▶ SUMMARIZE ──▶ LLM_DECIDE
//!                 │ no
//!                 ▼
//!               DONE
//! ```
//!
//! Transition rules live in [`oracle_core::agent::TransitionPolicy`]; this
//! module performs the I/O for each step and checkpoints the state after
//! every one of them.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use oracle_core::agent::{summary_instruction, Step, TransitionPolicy};
use oracle_core::conversation::{ChatModel, ConversationState, Message, ToolCall, ToolSpec};
use oracle_core::store::CheckpointSaver;

use crate::error::OracleError;
use crate::prompts;
use crate::registry::StoreKey;
use crate::tools::{self, ToolBox, ToolInvocation};

pub const DEFAULT_MAX_STEPS: usize = 50;

pub struct AgentLoop {
    model: Arc<dyn ChatModel>,
    tools: ToolBox,
    specs: Vec<ToolSpec>,
    checkpoints: Arc<dyn CheckpointSaver>,
    stores: StoreKey,
    policy: TransitionPolicy,
    max_steps: usize,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolBox,
        checkpoints: Arc<dyn CheckpointSaver>,
        stores: StoreKey,
    ) -> Self {
        Self {
            model,
            tools,
            specs: tools::tool_specs(),
            checkpoints,
            stores,
            policy: TransitionPolicy::default(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// `summarize_after` is raised to the policy's minimum so a turn can
    /// always end.
    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = TransitionPolicy {
            summarize_after: policy.summarize_after.max(policy.min_summarize_after()),
            ..policy
        };
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Run one user turn on `thread_id` and return the answer text.
    ///
    /// The thread's latest checkpoint is loaded (or a fresh state created),
    /// the question appended, and the state machine run to `DONE`.
    pub async fn run_turn(&self, thread_id: &str, question: &str) -> Result<String> {
        let mut state = self
            .checkpoints
            .load(thread_id)
            .await?
            .unwrap_or_else(|| ConversationState::new(thread_id));

        state.messages.push(Message::user(question));
        state.turn_count += 1;
        info!(thread = %thread_id, turn = state.turn_count, "agent turn");

        self.run(&mut state).await
    }

    /// Run the state machine from `LLM_DECIDE` until `DONE`.
    pub async fn run(&self, state: &mut ConversationState) -> Result<String> {
        let mut step = Step::LlmDecide;
        let mut taken = 0usize;

        loop {
            if step == Step::Done {
                break;
            }
            if taken >= self.max_steps {
                return Err(OracleError::StepLimit(self.max_steps).into());
            }
            taken += 1;
            debug!(step = step.as_str(), messages = state.messages.len(), "agent step");

            step = match step {
                Step::LlmDecide => {
                    self.decide(state).await?;
                    self.policy.after_decision(&state.messages)
                }
                Step::ExecuteTools => {
                    self.execute_tools(state).await;
                    Step::LlmDecide
                }
                Step::Summarize => {
                    self.summarize(state).await?;
                    Step::LlmDecide
                }
                Step::Done => Step::Done,
            };

            self.checkpoints.save(state).await?;
        }

        Ok(state
            .last_assistant()
            .map(|m| m.content.answer_text())
            .unwrap_or_default())
    }

    async fn decide(&self, state: &mut ConversationState) -> Result<()> {
        let reply = self
            .model
            .complete(Some(prompts::SYSTEM_PROMPT), &state.messages, &self.specs)
            .await?;
        state.llm_calls += 1;
        state.messages.push(reply);
        Ok(())
    }

    /// Execute every tool call on the last message, in order.
    async fn execute_tools(&self, state: &mut ConversationState) {
        let calls = state
            .messages
            .last()
            .map(|m| m.tool_calls.clone())
            .unwrap_or_default();

        for call in &calls {
            let text = match self.invoke(call).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "tool failed");
                    format!("Error executing {}: {:#}", call.name, e)
                }
            };
            state.messages.push(Message::tool_result(call, text));
        }
    }

    async fn invoke(&self, call: &ToolCall) -> Result<String> {
        let mut invocation = ToolInvocation::parse(call)?;
        invocation.inject_store_paths(&self.stores);
        debug!(tool = invocation.name(), "executing tool");
        Ok(self.tools.execute(invocation).await?.into_text())
    }

    async fn summarize(&self, state: &mut ConversationState) -> Result<()> {
        let (span, _) = self.policy.summary_span(&state.messages);
        let mut request: Vec<Message> = span.into_iter().cloned().collect();
        request.push(Message::user(summary_instruction(
            state.running_summary.as_deref(),
        )));

        let reply = self.model.complete(None, &request, &[]).await?;
        state.llm_calls += 1;

        let before = state.messages.len();
        self.policy
            .apply_summary(state, reply.content.full_text().trim().to_string());
        info!(before, after = state.messages.len(), "conversation summarized");
        Ok(())
    }
}

use serde::{Deserialize, Serialize};

use crate::agent_engine::history::HistoryEntry;
use crate::executor::actions::{Action, Step};

/// Resolved plan for one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub steps: Vec<Step>,
    pub requires_observation: bool,
    pub goal: String,
}

/// How a session drives the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Run the intent's steps in order, fail-fast.
    Sequential,
    /// Observe → think → act → check until done or out of iterations.
    Agentic,
}

impl ExecutionMode {
    pub fn for_intent(intent: &Intent) -> Self {
        if intent.requires_observation {
            ExecutionMode::Agentic
        } else {
            ExecutionMode::Sequential
        }
    }
}

/// Lifecycle of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
    Init,
    Sequential { step: usize },
    Observing { iteration: u32 },
    Thinking { iteration: u32 },
    Acting { iteration: u32 },
    Done { outcome: Outcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub action: String,
    pub params: serde_json::Value,
}

impl ActionResult {
    pub fn ok(action: &Action) -> Self {
        Self {
            success: true,
            error: None,
            action: action.name().to_string(),
            params: action.params(),
        }
    }

    pub fn failed(action: impl Into<String>, params: serde_json::Value, error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            action: action.into(),
            params,
        }
    }
}

/// Failure category reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Api,
    Vision,
    Action,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub success: bool,
    pub message: String,
    pub steps: Vec<ActionResult>,
    pub iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExecutionMode>,
    pub history: Vec<HistoryEntry>,
}

/// Session-scoped mutable state, owned by exactly one engine run.
#[derive(Debug)]
pub struct AgentState {
    pub goal: String,
    pub iteration: u32,
    pub results: Vec<ActionResult>,
    pub phase: Phase,
}

impl AgentState {
    pub fn new(goal: String) -> Self {
        Self {
            goal,
            iteration: 0,
            results: Vec::new(),
            phase: Phase::Init,
        }
    }

    pub fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
    }
}

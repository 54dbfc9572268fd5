use serde::Deserialize;

use crate::agent_engine::extract::extract_json_object;
use crate::executor::actions::{Action, Step};

/// What the planning oracle asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDecision {
    Complete { reasoning: String },
    Act { action: Action, reasoning: String },
    /// Reply could not be turned into either of the above.
    Unusable { reason: String },
}

#[derive(Debug, Deserialize)]
struct PlanReply {
    #[serde(default)]
    complete: Option<bool>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    params: Option<serde_json::Value>,
}

pub fn parse_plan(reply: &str) -> PlanDecision {
    let Some(value) = extract_json_object(reply) else {
        return PlanDecision::Unusable {
            reason: "planner reply contains no JSON object".into(),
        };
    };
    let parsed: PlanReply = match serde_json::from_value(value) {
        Ok(p) => p,
        Err(e) => {
            return PlanDecision::Unusable {
                reason: format!("planner reply does not match schema: {e}"),
            }
        }
    };
    let reasoning = parsed.reasoning.unwrap_or_default();

    if parsed.complete == Some(true) {
        return PlanDecision::Complete {
            reasoning: if reasoning.is_empty() {
                "Goal completed".into()
            } else {
                reasoning
            },
        };
    }

    let Some(name) = parsed.action.filter(|a| !a.trim().is_empty()) else {
        return PlanDecision::Unusable {
            reason: "planner reply has neither completion nor an action".into(),
        };
    };
    let step = Step::new(name, parsed.params.unwrap_or_else(|| serde_json::json!({})));
    match step.to_action() {
        Ok(action) => PlanDecision::Act { action, reasoning },
        Err(reason) => PlanDecision::Unusable { reason },
    }
}

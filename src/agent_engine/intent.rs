use serde::Deserialize;

use crate::agent_engine::classifier::classify_complexity;
use crate::agent_engine::extract::extract_json_object;
use crate::agent_engine::prompts;
use crate::agent_engine::state::Intent;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::actions::Step;
use crate::llm::oracle::{Oracle, OracleRequest};

#[derive(Debug, Deserialize)]
struct IntentReply {
    steps: Vec<Step>,
    #[serde(default, rename = "requiresObservation", alias = "requires_observation")]
    requires_observation: Option<bool>,
    #[serde(default)]
    goal: Option<String>,
}

/// Ask the oracle for a plan. Any failure here is fatal for the session.
pub async fn resolve_intent(
    oracle: &dyn Oracle,
    command: &str,
    max_tokens: u32,
) -> DeskPilotResult<Intent> {
    let likely_visual = classify_complexity(command);
    tracing::info!(command, likely_visual, "resolving intent");

    let request = OracleRequest::text(
        prompts::INTENT_SYSTEM_PROMPT,
        prompts::intent_user_prompt(command, likely_visual),
    )
    .with_max_tokens(max_tokens);
    let reply = oracle.complete(request).await?;
    let intent = parse_intent(&reply, command)?;

    tracing::info!(
        steps = intent.steps.len(),
        requires_observation = intent.requires_observation,
        goal = %intent.goal,
        "intent resolved"
    );
    Ok(intent)
}

pub fn parse_intent(reply: &str, command: &str) -> DeskPilotResult<Intent> {
    let value = extract_json_object(reply).ok_or_else(|| {
        DeskPilotError::Parse(format!("intent reply contains no JSON object: {reply}"))
    })?;
    let parsed: IntentReply = serde_json::from_value(value)
        .map_err(|e| DeskPilotError::Parse(format!("intent reply does not match schema: {e}")))?;

    let requires_observation = parsed
        .requires_observation
        .unwrap_or_else(|| parsed.steps.iter().any(Step::is_click_element));
    let goal = parsed
        .goal
        .filter(|g| !g.trim().is_empty())
        .unwrap_or_else(|| command.to_string());

    Ok(Intent {
        steps: parsed.steps,
        requires_observation,
        goal,
    })
}

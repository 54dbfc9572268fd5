use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::history::{EntryKind, SessionHistory};
use crate::agent_engine::intent::resolve_intent;
use crate::agent_engine::planner::{parse_plan, PlanDecision};
use crate::agent_engine::prompts;
use crate::agent_engine::state::{
    ActionResult, AgentState, ErrorType, ExecutionMode, Intent, Outcome, Phase, SessionResult,
};
use crate::config::{AgentSettings, SettingsHandle};
use crate::errors::DeskPilotError;
use crate::executor::actions::{Action, Step};
use crate::executor::coordinator::click_point;
use crate::executor::dispatcher::ActionExecutor;
use crate::llm::oracle::{ImageAttachment, Oracle, OracleRequest};
use crate::perception::compression::compress_for_oracle;
use crate::perception::grounding::{parse_grounding, GroundingOutcome};
use crate::perception::screenshot::ScreenCapturer;
use crate::perception::types::CoordinateSet;

/// Why a single step did not succeed.
#[derive(Debug)]
enum StepError {
    /// Oracle transport failure: ends the session in every mode.
    Transport(DeskPilotError),
    Vision(String),
    Action(String),
}

impl StepError {
    fn message(&self) -> String {
        match self {
            StepError::Transport(e) => e.to_string(),
            StepError::Vision(m) | StepError::Action(m) => m.clone(),
        }
    }

    fn error_type(&self) -> ErrorType {
        match self {
            StepError::Transport(_) => ErrorType::Api,
            StepError::Vision(_) => ErrorType::Vision,
            StepError::Action(_) => ErrorType::Action,
        }
    }
}

/// Session-scoped bookkeeping: the state machine plus its history log.
struct Session {
    state: AgentState,
    history: SessionHistory,
    mode: Option<ExecutionMode>,
}

impl Session {
    fn finish(self, success: bool, message: String, error_type: Option<ErrorType>) -> SessionResult {
        let iterations = self.state.iteration;
        self.finish_with_iterations(success, message, error_type, iterations)
    }

    fn finish_with_iterations(
        mut self,
        success: bool,
        message: String,
        error_type: Option<ErrorType>,
        iterations: u32,
    ) -> SessionResult {
        let outcome = match (success, error_type) {
            (true, _) => Outcome::Success,
            (false, Some(ErrorType::Timeout)) => Outcome::Exhausted,
            (false, _) => Outcome::Failure,
        };
        self.state.enter(Phase::Done { outcome });
        tracing::info!(
            session = %self.history.session_id,
            success,
            iterations,
            error_type = ?error_type,
            message = %message,
            "session finished"
        );
        SessionResult {
            success,
            error: (!success).then(|| message.clone()),
            message,
            steps: self.state.results,
            iterations,
            error_type,
            session_id: self.history.session_id.clone(),
            mode: self.mode,
            history: self.history.into_entries(),
        }
    }
}

/// Drives one command from intent resolution to a terminal state.
///
/// Every external call is awaited before the next phase is built, so at most
/// one oracle, capture or executor call is in flight per session.
pub struct AgentEngine {
    oracle: Arc<dyn Oracle>,
    executor: Arc<dyn ActionExecutor>,
    capturer: Arc<dyn ScreenCapturer>,
    settings: SettingsHandle,
    history_dir: Option<PathBuf>,
}

impl AgentEngine {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        executor: Arc<dyn ActionExecutor>,
        capturer: Arc<dyn ScreenCapturer>,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            oracle,
            executor,
            capturer,
            settings,
            history_dir: None,
        }
    }

    /// Persist each session's history as JSONL under `dir`.
    pub fn with_history_dir(mut self, dir: PathBuf) -> Self {
        self.history_dir = Some(dir);
        self
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    fn new_session(&self, goal: String) -> Session {
        let history = match &self.history_dir {
            Some(dir) => SessionHistory::persisted_in(dir.clone()),
            None => SessionHistory::new(),
        };
        Session {
            state: AgentState::new(goal),
            history,
            mode: None,
        }
    }

    /// Resolve `command` into an intent and execute it.
    pub async fn run(&self, command: &str) -> SessionResult {
        let settings = self.settings.snapshot().await;
        match resolve_intent(self.oracle.as_ref(), command, settings.max_response_tokens).await {
            Ok(intent) => self.run_intent(intent).await,
            Err(e) => {
                tracing::error!(error = %e, "intent resolution failed");
                self.new_session(command.to_string()).finish(
                    false,
                    format!("Could not understand the command: {e}"),
                    Some(ErrorType::Api),
                )
            }
        }
    }

    /// Execute an already-resolved intent.
    pub async fn run_intent(&self, intent: Intent) -> SessionResult {
        let mut session = self.new_session(intent.goal.clone());
        let mode = ExecutionMode::for_intent(&intent);
        session.mode = Some(mode);
        tracing::info!(
            session = %session.history.session_id,
            goal = %intent.goal,
            steps = intent.steps.len(),
            ?mode,
            "session started"
        );
        match mode {
            ExecutionMode::Sequential => self.run_sequential(session, &intent.steps).await,
            ExecutionMode::Agentic => self.run_agentic(session, &intent.steps).await,
        }
    }

    // ── Sequential: ordered, fail-fast ─────────────────────────────────────

    async fn run_sequential(&self, mut session: Session, steps: &[Step]) -> SessionResult {
        session.state.iteration = 1;
        for (idx, step) in steps.iter().enumerate() {
            let number = idx + 1;
            session.state.enter(Phase::Sequential { step: number });
            tracing::info!(step = number, action = %step.action, "sequential step");

            match self.run_step(step).await {
                Ok(result) => {
                    session
                        .history
                        .push(EntryKind::Action, format!("{} {}: succeeded", result.action, result.params));
                    session.state.results.push(result);
                }
                Err(err) => {
                    let message = format!("Step {number} ({}) failed: {}", step.action, err.message());
                    tracing::warn!(step = number, error = %err.message(), "sequential run aborted");
                    session.history.push(EntryKind::Action, message.clone());
                    session.state.results.push(ActionResult::failed(
                        step.action.clone(),
                        serde_json::Value::Object(step.params.clone()),
                        err.message(),
                    ));
                    return session.finish(false, message, Some(err.error_type()));
                }
            }

            if number < steps.len() {
                let settings = self.settings.snapshot().await;
                pause(settings.inter_action_delay_secs).await;
            }
        }
        let message = format!("Completed {} step(s)", steps.len());
        session.finish(true, message, None)
    }

    // ── Agentic: pre-stage, then observe → think → check → act ─────────────

    async fn run_agentic(&self, mut session: Session, steps: &[Step]) -> SessionResult {
        for step in steps.iter().take_while(|s| !s.is_click_element()) {
            tracing::info!(action = %step.action, "pre-stage step");
            match self.run_step(step).await {
                Ok(result) => {
                    session
                        .history
                        .push(EntryKind::Action, format!("{} {}: succeeded", result.action, result.params));
                    session.state.results.push(result);
                }
                Err(StepError::Transport(e)) => {
                    return session.finish(false, format!("Oracle request failed: {e}"), Some(ErrorType::Api));
                }
                Err(err) => {
                    let text = format!("{} {}: failed: {}", step.action, serde_json::Value::Object(step.params.clone()), err.message());
                    session.history.push(EntryKind::Action, text);
                    session.state.results.push(ActionResult::failed(
                        step.action.clone(),
                        serde_json::Value::Object(step.params.clone()),
                        err.message(),
                    ));
                }
            }
            let settings = self.settings.snapshot().await;
            pause(settings.inter_action_delay_secs).await;
        }

        loop {
            let settings = self.settings.snapshot().await;
            if session.state.iteration >= settings.max_iterations {
                let max = settings.max_iterations;
                let message = format!(
                    "Iteration budget exhausted: {max} iteration(s) without completing the goal"
                );
                tracing::warn!(max, "iteration budget exhausted");
                return session.finish_with_iterations(false, message, Some(ErrorType::Timeout), max);
            }
            session.state.iteration += 1;
            let iteration = session.state.iteration;

            // Observe
            session.state.enter(Phase::Observing { iteration });
            pause(settings.observation_settle_delay_secs).await;
            let observation = match self.describe_screen(&session.state.goal).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(iteration, error = %e, "observation failed; continuing without it");
                    format!("Observation failed: {e}")
                }
            };
            session.history.push(EntryKind::Observation, observation);

            // Think
            session.state.enter(Phase::Thinking { iteration });
            let settings = self.settings.snapshot().await;
            let prompt = prompts::planner_user_prompt(
                &session.state.goal,
                iteration,
                settings.max_iterations,
                &session.history.render_window(settings.history_window),
            );
            let request = OracleRequest::text(prompts::PLANNER_SYSTEM_PROMPT, prompt)
                .with_max_tokens(settings.max_response_tokens);
            let reply = match self.oracle.complete(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(iteration, error = %e, "planning call failed");
                    return session.finish(false, format!("Planning failed: {e}"), Some(ErrorType::Api));
                }
            };

            // Check
            let (action, reasoning) = match parse_plan(&reply) {
                PlanDecision::Complete { reasoning } => {
                    tracing::info!(iteration, reasoning = %reasoning, "planner reports goal complete");
                    return session.finish(true, reasoning, None);
                }
                PlanDecision::Act { action, reasoning } => (action, reasoning),
                PlanDecision::Unusable { reason } => {
                    tracing::warn!(iteration, reason = %reason, "unusable plan; idling");
                    (Action::Idle {}, format!("planner reply unusable ({reason})"))
                }
            };

            // Act
            session.state.enter(Phase::Acting { iteration });
            tracing::info!(iteration, action = action.name(), reasoning = %reasoning, "acting");
            match self.perform(&action).await {
                Ok(point) => {
                    let at = point
                        .map(|p| format!(" at ({}, {})", p.logical_x, p.logical_y))
                        .unwrap_or_default();
                    session.history.push(
                        EntryKind::Action,
                        format!("{} {}{at}: succeeded. Reasoning: {reasoning}", action.name(), action.params()),
                    );
                    session.state.results.push(ActionResult::ok(&action));
                }
                Err(StepError::Transport(e)) => {
                    session.state.results.push(ActionResult::failed(action.name(), action.params(), e.to_string()));
                    return session.finish(false, format!("Oracle request failed: {e}"), Some(ErrorType::Api));
                }
                Err(err) => {
                    session.history.push(
                        EntryKind::Action,
                        format!("{} {}: failed: {}. Reasoning: {reasoning}", action.name(), action.params(), err.message()),
                    );
                    session
                        .state
                        .results
                        .push(ActionResult::failed(action.name(), action.params(), err.message()));
                }
            }

            let settings = self.settings.snapshot().await;
            pause(settings.inter_action_delay_secs).await;
        }
    }

    // ── Per-step execution shared by both modes ────────────────────────────

    async fn run_step(&self, step: &Step) -> Result<ActionResult, StepError> {
        let action = step.to_action().map_err(StepError::Action)?;
        self.perform(&action).await?;
        Ok(ActionResult::ok(&action))
    }

    /// Execute one action. Returns the resolved point for `click_element`.
    async fn perform(&self, action: &Action) -> Result<Option<CoordinateSet>, StepError> {
        match action {
            Action::ClickElement { description } => {
                let point = self.locate(description).await?;
                let click = Action::Click {
                    x: point.logical_x as i32,
                    y: point.logical_y as i32,
                };
                self.executor
                    .execute(&click)
                    .await
                    .map_err(|e| StepError::Action(e.to_string()))?;
                Ok(Some(point))
            }
            Action::Idle {} => Ok(None),
            other => {
                self.executor
                    .execute(other)
                    .await
                    .map_err(|e| StepError::Action(e.to_string()))?;
                Ok(None)
            }
        }
    }

    /// Fresh capture + budgeted encoding, as an oracle attachment.
    async fn snapshot_for_oracle(
        &self,
        settings: &AgentSettings,
    ) -> Result<(ImageAttachment, crate::perception::types::ScreenInfo), DeskPilotError> {
        let snapshot = self.capturer.capture().await?;
        let encoded = compress_for_oracle(&snapshot.image, &settings.capture)?;
        tracing::debug!(
            bytes = encoded.bytes.len(),
            stage = ?encoded.stage,
            "snapshot encoded"
        );
        Ok((
            ImageAttachment {
                bytes: encoded.bytes,
                media_type: encoded.media_type.to_string(),
            },
            snapshot.screen,
        ))
    }

    async fn describe_screen(&self, goal: &str) -> Result<String, DeskPilotError> {
        let settings = self.settings.snapshot().await;
        let (image, _) = self.snapshot_for_oracle(&settings).await?;
        let request = OracleRequest::vision(
            prompts::OBSERVE_SYSTEM_PROMPT,
            prompts::observe_user_prompt(goal),
            image,
        )
        .with_max_tokens(settings.max_response_tokens);
        self.oracle.complete(request).await
    }

    /// Ground `description` to a validated logical click point.
    async fn locate(&self, description: &str) -> Result<CoordinateSet, StepError> {
        let settings = self.settings.snapshot().await;
        let (image, screen) = self
            .snapshot_for_oracle(&settings)
            .await
            .map_err(|e| StepError::Vision(format!("screen capture failed: {e}")))?;
        let request = OracleRequest::vision(
            prompts::GROUNDING_SYSTEM_PROMPT,
            prompts::grounding_user_prompt(description),
            image,
        )
        .with_max_tokens(settings.max_response_tokens);
        let reply = self.oracle.complete(request).await.map_err(|e| {
            if e.is_transport() {
                StepError::Transport(e)
            } else {
                StepError::Vision(format!("grounding call failed: {e}"))
            }
        })?;

        match parse_grounding(&reply) {
            GroundingOutcome::Found(bbox) => {
                let point = click_point(&bbox, &screen).map_err(|e| {
                    StepError::Vision(format!("grounded \"{description}\" off screen: {e}"))
                })?;
                tracing::info!(
                    description,
                    x = point.logical_x,
                    y = point.logical_y,
                    "element grounded"
                );
                Ok(point)
            }
            GroundingOutcome::NotFound => Err(StepError::Vision(format!(
                "element not found: {description}"
            ))),
            GroundingOutcome::Unrecognized => {
                tracing::warn!(description, reply = %reply, "grounding reply not understood");
                Err(StepError::Vision(format!(
                    "could not read a location for \"{description}\" from the vision model"
                )))
            }
        }
    }
}

async fn pause(secs: f64) {
    if secs.is_nan() || secs <= 0.0 {
        return;
    }
    match Duration::try_from_secs_f64(secs) {
        Ok(delay) => tokio::time::sleep(delay).await,
        Err(e) => tracing::warn!(secs, error = %e, "delay out of range; not waiting"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use image::{DynamicImage, RgbImage};
    use serde_json::json;

    use crate::errors::DeskPilotResult;
    use crate::perception::screenshot::Snapshot;
    use crate::perception::types::ScreenInfo;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Call {
        Intent,
        Plan,
        Observe,
        Ground,
    }

    fn kind_of(request: &OracleRequest) -> Call {
        match request.system_prompt.as_str() {
            prompts::INTENT_SYSTEM_PROMPT => Call::Intent,
            prompts::PLANNER_SYSTEM_PROMPT => Call::Plan,
            prompts::OBSERVE_SYSTEM_PROMPT => Call::Observe,
            prompts::GROUNDING_SYSTEM_PROMPT => Call::Ground,
            other => panic!("unexpected system prompt {other}"),
        }
    }

    type Handler = dyn Fn(Call, u32) -> DeskPilotResult<String> + Send + Sync;

    /// Oracle fake: `handler(kind, nth call of that kind)`.
    struct ScriptedOracle {
        handler: Box<Handler>,
        requests: Mutex<Vec<(Call, OracleRequest)>>,
    }

    impl ScriptedOracle {
        fn new(handler: impl Fn(Call, u32) -> DeskPilotResult<String> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                handler: Box::new(handler),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn prompts_of(&self, kind: Call) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, r)| r.user_prompt.clone())
                .collect()
        }

        fn kinds(&self) -> Vec<Call> {
            self.requests.lock().unwrap().iter().map(|(k, _)| *k).collect()
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn complete(&self, request: OracleRequest) -> DeskPilotResult<String> {
            let kind = kind_of(&request);
            let nth = {
                let mut requests = self.requests.lock().unwrap();
                requests.push((kind, request));
                requests.iter().filter(|(k, _)| *k == kind).count() as u32
            };
            (self.handler)(kind, nth)
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        executed: Mutex<Vec<Action>>,
        fail_on_call: Option<usize>,
    }

    impl RecordingExecutor {
        fn failing_on(call: usize) -> Arc<Self> {
            Arc::new(Self {
                executed: Mutex::new(Vec::new()),
                fail_on_call: Some(call),
            })
        }

        fn executed(&self) -> Vec<Action> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionExecutor for RecordingExecutor {
        async fn execute(&self, action: &Action) -> DeskPilotResult<()> {
            let mut executed = self.executed.lock().unwrap();
            executed.push(action.clone());
            if Some(executed.len()) == self.fail_on_call {
                return Err(DeskPilotError::Executor("permission denied".into()));
            }
            Ok(())
        }
    }

    struct FixedCapturer {
        captures: AtomicU32,
    }

    impl FixedCapturer {
        fn new() -> Arc<Self> {
            Arc::new(Self { captures: AtomicU32::new(0) })
        }
    }

    #[async_trait]
    impl ScreenCapturer for FixedCapturer {
        async fn capture(&self) -> DeskPilotResult<Snapshot> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            Ok(Snapshot {
                image: DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, image::Rgb([200, 200, 200]))),
                screen: ScreenInfo::from_pixels(3024, 1964, 2.0),
            })
        }
    }

    fn engine(
        oracle: Arc<ScriptedOracle>,
        executor: Arc<RecordingExecutor>,
        capturer: Arc<FixedCapturer>,
        settings: AgentSettings,
    ) -> AgentEngine {
        AgentEngine::new(oracle, executor, capturer, SettingsHandle::new(settings))
    }

    fn fast_settings(max_iterations: u32) -> AgentSettings {
        AgentSettings {
            max_iterations,
            ..AgentSettings::without_delays()
        }
    }

    fn intent(steps: Vec<Step>, requires_observation: bool) -> Intent {
        Intent {
            steps,
            requires_observation,
            goal: "test goal".into(),
        }
    }

    fn never_called(kind: Call, _: u32) -> DeskPilotResult<String> {
        panic!("oracle should not be called, got {kind:?}")
    }

    #[tokio::test]
    async fn sequential_stops_at_first_failure() {
        let executor = RecordingExecutor::failing_on(2);
        let engine = engine(
            ScriptedOracle::new(never_called),
            executor.clone(),
            FixedCapturer::new(),
            fast_settings(10),
        );
        let steps = vec![
            Step::new("activate_app", json!({"app": "Safari"})),
            Step::new("press_key", json!({"key": "cmd+l"})),
            Step::new("type_text", json!({"text": "youtube.com"})),
        ];
        let result = engine.run_intent(intent(steps, false)).await;

        assert!(!result.success);
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps[0].success);
        assert!(!result.steps[1].success);
        assert!(result.message.contains("press_key"), "{}", result.message);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.error_type, Some(ErrorType::Action));
        assert_eq!(result.mode, Some(ExecutionMode::Sequential));
        assert_eq!(executor.executed().len(), 2);
    }

    #[tokio::test]
    async fn sequential_runs_every_step_in_order() {
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(
            ScriptedOracle::new(never_called),
            executor.clone(),
            FixedCapturer::new(),
            fast_settings(10),
        );
        let steps = vec![
            Step::new("open_url", json!({"url": "youtube.com"})),
            Step::new("wait", json!({"seconds": 0})),
            Step::new("press_key", json!({"key": "enter"})),
        ];
        let result = engine.run_intent(intent(steps, false)).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.steps.len(), 3);
        assert_eq!(
            executor.executed(),
            vec![
                Action::OpenUrl { url: "youtube.com".into() },
                Action::Wait { seconds: 0.0 },
                Action::PressKey { key: "enter".into() },
            ]
        );
    }

    #[tokio::test]
    async fn sequential_click_element_clicks_grounded_center() {
        let oracle = ScriptedOracle::new(|kind, _| match kind {
            Call::Ground => Ok("<box>(400,400,600,600)</box>".into()),
            other => panic!("unexpected {other:?}"),
        });
        let executor = Arc::new(RecordingExecutor::default());
        let capturer = FixedCapturer::new();
        let engine = engine(oracle, executor.clone(), capturer.clone(), fast_settings(10));
        let steps = vec![Step::new("click_element", json!({"description": "Subscribe"}))];
        // Explicitly sequential despite the click_element step.
        let result = engine.run_intent(intent(steps, false)).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(executor.executed(), vec![Action::Click { x: 756, y: 491 }]);
        assert_eq!(result.steps[0].action, "click_element");
        assert_eq!(capturer.captures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sequential_grounding_miss_is_a_vision_failure() {
        let oracle = ScriptedOracle::new(|_, _| Ok("<box>NOT_FOUND</box>".into()));
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(oracle, executor.clone(), FixedCapturer::new(), fast_settings(10));
        let steps = vec![
            Step::new("click_element", json!({"description": "Ghost button"})),
            Step::new("press_key", json!({"key": "enter"})),
        ];
        let result = engine.run_intent(intent(steps, false)).await;

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorType::Vision));
        assert_eq!(result.steps.len(), 1);
        assert!(result.message.contains("Ghost button"));
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn agentic_exhausts_iteration_budget() {
        let oracle = ScriptedOracle::new(|kind, _| match kind {
            Call::Observe => Ok("a browser window".into()),
            Call::Plan => Ok(r#"{"action":"scroll","params":{"direction":"down"},"reasoning":"keep looking"}"#.into()),
            other => panic!("unexpected {other:?}"),
        });
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(oracle.clone(), executor.clone(), FixedCapturer::new(), fast_settings(3));
        let result = engine.run_intent(intent(vec![], true)).await;

        assert!(!result.success);
        assert_eq!(result.iterations, 3);
        assert_eq!(result.error_type, Some(ErrorType::Timeout));
        assert_eq!(result.steps.len(), 3);
        assert_eq!(executor.executed().len(), 3);
        assert_eq!(oracle.prompts_of(Call::Plan).len(), 3);
    }

    #[tokio::test]
    async fn agentic_completes_after_acting() {
        let oracle = ScriptedOracle::new(|kind, nth| match (kind, nth) {
            (Call::Observe, _) => Ok("YouTube results page".into()),
            (Call::Plan, 1) => Ok(r#"{"action":"click_element","params":{"description":"first video"},"reasoning":"open it"}"#.into()),
            (Call::Plan, _) => Ok(r#"{"complete":true,"reasoning":"The video is playing"}"#.into()),
            (Call::Ground, _) => Ok("<box>(100,100,200,200)</box>".into()),
            (Call::Intent, _) => panic!("intent already resolved"),
        });
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(oracle.clone(), executor.clone(), FixedCapturer::new(), fast_settings(10));
        let result = engine.run_intent(intent(vec![], true)).await;

        assert!(result.success);
        assert_eq!(result.message, "The video is playing");
        assert_eq!(result.iterations, 2);
        assert_eq!(result.error_type, None);
        // normalized 150 → pixel 453 / 294 → logical 226 / 147
        assert_eq!(executor.executed(), vec![Action::Click { x: 226, y: 147 }]);
        // Strict phase ordering: observe, think, ground, observe, think.
        assert_eq!(
            oracle.kinds(),
            vec![Call::Observe, Call::Plan, Call::Ground, Call::Observe, Call::Plan]
        );
    }

    #[tokio::test]
    async fn agentic_pre_stage_runs_leading_setup_steps() {
        let oracle = ScriptedOracle::new(|kind, _| match kind {
            Call::Observe => Ok("Safari is open".into()),
            Call::Plan => Ok(r#"{"complete":true,"reasoning":"done"}"#.into()),
            other => panic!("unexpected {other:?}"),
        });
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(oracle, executor.clone(), FixedCapturer::new(), fast_settings(5));
        let steps = vec![
            Step::new("activate_app", json!({"app": "Safari"})),
            Step::new("click_element", json!({"description": "search box"})),
            Step::new("type_text", json!({"text": "never pre-staged"})),
        ];
        let result = engine.run_intent(intent(steps, true)).await;

        assert!(result.success);
        assert_eq!(executor.executed(), vec![Action::ActivateApp { app: "Safari".into() }]);
        assert_eq!(result.steps.len(), 1);
        assert!(result.history[0].text.starts_with("activate_app"));
    }

    #[tokio::test]
    async fn agentic_records_failed_observation_and_continues() {
        let oracle = ScriptedOracle::new(|kind, _| match kind {
            Call::Observe => Err(DeskPilotError::LlmProvider("503 Service Unavailable".into())),
            Call::Plan => Ok(r#"{"complete":true,"reasoning":"nothing to do"}"#.into()),
            other => panic!("unexpected {other:?}"),
        });
        let engine = engine(oracle.clone(), Arc::new(RecordingExecutor::default()), FixedCapturer::new(), fast_settings(5));
        let result = engine.run_intent(intent(vec![], true)).await;

        assert!(result.success);
        assert_eq!(result.history[0].kind, EntryKind::Observation);
        assert!(result.history[0].text.starts_with("Observation failed"));
        assert!(oracle.prompts_of(Call::Plan)[0].contains("503 Service Unavailable"));
    }

    #[tokio::test]
    async fn agentic_planning_transport_failure_is_fatal() {
        let oracle = ScriptedOracle::new(|kind, _| match kind {
            Call::Observe => Ok("desktop".into()),
            Call::Plan => Err(DeskPilotError::LlmProvider("429 Too Many Requests".into())),
            other => panic!("unexpected {other:?}"),
        });
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(oracle, executor.clone(), FixedCapturer::new(), fast_settings(5));
        let result = engine.run_intent(intent(vec![], true)).await;

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorType::Api));
        assert_eq!(result.iterations, 1);
        assert!(result.message.starts_with("Planning failed"));
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn agentic_unusable_plan_becomes_idle() {
        let oracle = ScriptedOracle::new(|kind, nth| match (kind, nth) {
            (Call::Observe, _) => Ok("desktop".into()),
            (Call::Plan, 1) => Ok("I am not sure what to do".into()),
            (Call::Plan, 2) => Ok(r#"{"reasoning":"still thinking"}"#.into()),
            (Call::Plan, _) => Ok(r#"{"complete":true,"reasoning":"done"}"#.into()),
            other => panic!("unexpected {other:?}"),
        });
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(oracle, executor.clone(), FixedCapturer::new(), fast_settings(5));
        let result = engine.run_intent(intent(vec![], true)).await;

        assert!(result.success);
        assert_eq!(result.iterations, 3);
        assert_eq!(result.steps.len(), 2);
        assert!(result.steps.iter().all(|s| s.action == "idle" && s.success));
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn agentic_action_failure_is_recorded_not_fatal() {
        let oracle = ScriptedOracle::new(|kind, nth| match (kind, nth) {
            (Call::Observe, _) => Ok("desktop".into()),
            (Call::Plan, 1) => Ok(r#"{"action":"activate_app","params":{"app":"Nope"}}"#.into()),
            (Call::Plan, _) => Ok(r#"{"complete":true,"reasoning":"gave up gracefully"}"#.into()),
            other => panic!("unexpected {other:?}"),
        });
        let engine = engine(oracle.clone(), RecordingExecutor::failing_on(1), FixedCapturer::new(), fast_settings(5));
        let result = engine.run_intent(intent(vec![], true)).await;

        assert!(result.success);
        assert!(!result.steps[0].success);
        assert!(oracle.prompts_of(Call::Plan)[1].contains("permission denied"));
    }

    #[tokio::test]
    async fn planning_prompt_sees_only_the_history_window() {
        let oracle = ScriptedOracle::new(|kind, nth| match kind {
            Call::Observe => Ok(format!("screen-{nth}")),
            Call::Plan => Ok(r#"{"action":"wait","params":{"seconds":0}}"#.into()),
            other => panic!("unexpected {other:?}"),
        });
        let settings = AgentSettings {
            history_window: 3,
            ..fast_settings(5)
        };
        let engine = engine(oracle.clone(), Arc::new(RecordingExecutor::default()), FixedCapturer::new(), settings);
        let result = engine.run_intent(intent(vec![], true)).await;

        let plans = oracle.prompts_of(Call::Plan);
        let last = plans.last().unwrap();
        assert!(last.contains("screen-5"));
        assert!(last.contains("screen-4"));
        assert!(!last.contains("screen-3"));
        assert_eq!(last.matches("ACTION:").count(), 1);

        // The returned log keeps everything.
        assert_eq!(result.history.len(), 10);
        assert_eq!(result.steps.len(), 5);
        assert_eq!(result.history[0].text, "screen-1");
    }

    #[tokio::test]
    async fn unparseable_intent_fails_before_any_action() {
        let oracle = ScriptedOracle::new(|kind, _| match kind {
            Call::Intent => Ok("Sorry, I cannot do that.".into()),
            other => panic!("unexpected {other:?}"),
        });
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(oracle, executor.clone(), FixedCapturer::new(), fast_settings(5));
        let result = engine.run("open Safari").await;

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorType::Api));
        assert_eq!(result.iterations, 0);
        assert!(result.steps.is_empty());
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn run_resolves_then_executes_sequentially() {
        let oracle = ScriptedOracle::new(|kind, _| match kind {
            Call::Intent => Ok(r#"{"steps":[{"action":"activate_app","params":{"app":"Safari"}}],"requiresObservation":false}"#.into()),
            other => panic!("unexpected {other:?}"),
        });
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(oracle, executor.clone(), FixedCapturer::new(), fast_settings(5));
        let result = engine.run("open Safari").await;

        assert!(result.success, "{}", result.message);
        assert_eq!(result.mode, Some(ExecutionMode::Sequential));
        assert_eq!(executor.executed(), vec![Action::ActivateApp { app: "Safari".into() }]);
    }

    #[tokio::test]
    async fn settings_update_applies_to_later_sessions() {
        let oracle = ScriptedOracle::new(|kind, _| match kind {
            Call::Observe => Ok("desktop".into()),
            Call::Plan => Ok(r#"{"action":"wait","params":{"seconds":0}}"#.into()),
            other => panic!("unexpected {other:?}"),
        });
        let engine = engine(oracle, Arc::new(RecordingExecutor::default()), FixedCapturer::new(), fast_settings(4));
        engine.settings().update(|s| s.max_iterations = 2).await;
        let result = engine.run_intent(intent(vec![], true)).await;
        assert_eq!(result.iterations, 2);
        assert_eq!(result.error_type, Some(ErrorType::Timeout));
    }

    #[tokio::test]
    async fn sequential_grounding_transport_failure_is_api_error() {
        let oracle = ScriptedOracle::new(|kind, _| match kind {
            Call::Ground => Err(DeskPilotError::LlmProvider("502 Bad Gateway".into())),
            other => panic!("unexpected {other:?}"),
        });
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(oracle, executor.clone(), FixedCapturer::new(), fast_settings(10));
        let steps = vec![
            Step::new("activate_app", json!({"app": "Safari"})),
            Step::new("click_element", json!({"description": "Subscribe"})),
            Step::new("press_key", json!({"key": "enter"})),
        ];
        let result = engine.run_intent(intent(steps, false)).await;

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorType::Api));
        assert_eq!(result.iterations, 1);
        assert_eq!(result.steps.len(), 2);
        assert!(result.message.contains("click_element"), "{}", result.message);
        assert!(result.message.contains("502 Bad Gateway"));
        assert_eq!(executor.executed(), vec![Action::ActivateApp { app: "Safari".into() }]);
    }

    #[tokio::test]
    async fn agentic_grounding_transport_failure_is_fatal() {
        let oracle = ScriptedOracle::new(|kind, _| match kind {
            Call::Observe => Ok("YouTube home".into()),
            Call::Plan => Ok(r#"{"action":"click_element","params":{"description":"search box"}}"#.into()),
            Call::Ground => Err(DeskPilotError::LlmProvider("connection reset".into())),
            Call::Intent => panic!("intent already resolved"),
        });
        let executor = Arc::new(RecordingExecutor::default());
        let engine = engine(oracle.clone(), executor.clone(), FixedCapturer::new(), fast_settings(10));
        let result = engine.run_intent(intent(vec![], true)).await;

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorType::Api));
        assert_eq!(result.iterations, 1);
        assert_eq!(result.steps.len(), 1);
        assert!(!result.steps[0].success);
        assert!(executor.executed().is_empty());
        // No replanning after a transport failure.
        assert_eq!(oracle.prompts_of(Call::Plan).len(), 1);
    }

    /// Lowers the iteration budget from inside the first planning call.
    struct BudgetCuttingOracle {
        settings: SettingsHandle,
        plan_prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Oracle for BudgetCuttingOracle {
        async fn complete(&self, request: OracleRequest) -> DeskPilotResult<String> {
            match kind_of(&request) {
                Call::Observe => Ok("desktop".into()),
                Call::Plan => {
                    let first = {
                        let mut prompts = self.plan_prompts.lock().unwrap();
                        prompts.push(request.user_prompt.clone());
                        prompts.len() == 1
                    };
                    if first {
                        self.settings.update(|s| s.max_iterations = 2).await;
                    }
                    Ok(r#"{"action":"wait","params":{"seconds":0}}"#.into())
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn settings_update_mid_session_applies_to_later_phases() {
        let settings = SettingsHandle::new(fast_settings(10));
        let oracle = Arc::new(BudgetCuttingOracle {
            settings: settings.clone(),
            plan_prompts: Mutex::new(Vec::new()),
        });
        let engine = AgentEngine::new(
            oracle.clone(),
            Arc::new(RecordingExecutor::default()),
            FixedCapturer::new(),
            settings,
        );
        let result = engine.run_intent(intent(vec![], true)).await;

        let prompts = oracle.plan_prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 2);
        // The in-flight phase kept its snapshot; the next one saw the update.
        assert!(prompts[0].contains("Iteration: 1/10"), "{}", prompts[0]);
        assert!(prompts[1].contains("Iteration: 2/2"), "{}", prompts[1]);
        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorType::Timeout));
        assert_eq!(result.iterations, 2);
    }
}

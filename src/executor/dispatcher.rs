use async_trait::async_trait;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::actions::Action;
use crate::executor::{apps, input};

/// Runs one primitive action against the OS.
///
/// `ClickElement` and `Idle` are resolved by the engine and never reach an executor.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action) -> DeskPilotResult<()>;
}

/// Executor backed by enigo and the platform application launcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeExecutor;

#[async_trait]
impl ActionExecutor for NativeExecutor {
    async fn execute(&self, action: &Action) -> DeskPilotResult<()> {
        tracing::info!(action = action.name(), params = %action.params(), "executing native action");
        match action {
            Action::ActivateApp { app } => apps::activate_app(app).await,
            Action::QuitApp { app } => apps::quit_app(app).await,
            Action::OpenUrl { url } => apps::open_url(&apps::normalize_url(url)).await,
            Action::Click { x, y } => input::mouse_click(*x, *y).await,
            Action::DoubleClick { x, y } => input::mouse_double_click(*x, *y).await,
            Action::RightClick { x, y } => input::mouse_right_click(*x, *y).await,
            Action::MoveTo { x, y } => input::mouse_move(*x, *y).await,
            Action::Scroll { direction, amount } => input::scroll(*direction, *amount).await,
            Action::TypeText { text } => input::type_text(text.clone()).await,
            Action::PressKey { key } => input::press_keys(key.clone()).await,
            Action::Wait { seconds } => {
                let duration = std::time::Duration::try_from_secs_f64(seconds.max(0.0))
                    .map_err(|e| DeskPilotError::Executor(format!("invalid wait of {seconds}s: {e}")))?;
                tokio::time::sleep(duration).await;
                Ok(())
            }
            Action::ClickElement { .. } | Action::Idle {} => Err(DeskPilotError::Executor(format!(
                "`{}` must be resolved by the engine before execution",
                action.name()
            ))),
        }
    }
}

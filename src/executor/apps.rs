// Application and URL control through the platform launcher.
use tokio::process::Command;

use crate::errors::{DeskPilotError, DeskPilotResult};

async fn run(program: &str, args: &[&str]) -> DeskPilotResult<()> {
    tracing::debug!(program, ?args, "spawning launcher");
    let output = Command::new(program).args(args).output().await.map_err(|e| {
        DeskPilotError::Executor(format!("failed to run {program}: {e}"))
    })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(DeskPilotError::Executor(format!(
        "{program} exited with {}: {}",
        output.status,
        stderr.trim()
    )))
}

#[cfg(target_os = "macos")]
pub async fn activate_app(app: &str) -> DeskPilotResult<()> {
    run("open", &["-a", app]).await
}

#[cfg(target_os = "macos")]
pub async fn quit_app(app: &str) -> DeskPilotResult<()> {
    let script = format!("quit app \"{}\"", escape_applescript(app));
    run("osascript", &["-e", &script]).await
}

#[cfg(target_os = "macos")]
pub async fn open_url(url: &str) -> DeskPilotResult<()> {
    run("open", &[url]).await
}

#[cfg(target_os = "windows")]
pub async fn activate_app(app: &str) -> DeskPilotResult<()> {
    run("cmd", &["/C", "start", "", app]).await
}

#[cfg(target_os = "windows")]
pub async fn quit_app(app: &str) -> DeskPilotResult<()> {
    let image = if app.to_lowercase().ends_with(".exe") {
        app.to_string()
    } else {
        format!("{app}.exe")
    };
    run("taskkill", &["/IM", &image]).await
}

#[cfg(target_os = "windows")]
pub async fn open_url(url: &str) -> DeskPilotResult<()> {
    run("cmd", &["/C", "start", "", url]).await
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub async fn activate_app(app: &str) -> DeskPilotResult<()> {
    let program = app.to_lowercase();
    let child = Command::new(&program)
        .spawn()
        .map_err(|e| DeskPilotError::Executor(format!("failed to launch {app}: {e}")))?;
    tracing::debug!(pid = ?child.id(), app, "application launched");
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub async fn quit_app(app: &str) -> DeskPilotResult<()> {
    run("pkill", &["-x", &app.to_lowercase()]).await
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub async fn open_url(url: &str) -> DeskPilotResult<()> {
    run("xdg-open", &[url]).await
}

/// URLs without a scheme get `https://`.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.contains("://") || trimmed.starts_with("mailto:") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

#[cfg(any(target_os = "macos", test))]
fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

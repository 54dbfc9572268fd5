pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;

use std::sync::Arc;

use crate::agent_engine::engine::AgentEngine;
use crate::agent_engine::history::default_history_dir;
use crate::config::{AppConfig, SettingsHandle};
use crate::executor::dispatcher::NativeExecutor;
use crate::llm::registry::ProviderRegistry;
use crate::perception::screenshot::XcapCapturer;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Wire the production oracle, executor and capturer from `config`.
pub fn build_engine(config: &AppConfig) -> AgentEngine {
    let registry = ProviderRegistry::from_config(config);
    tracing::info!(providers = ?registry.list_names(), active = %config.llm.active_provider, "LLM registry ready");

    let engine = AgentEngine::new(
        Arc::new(registry),
        Arc::new(NativeExecutor),
        Arc::new(XcapCapturer),
        SettingsHandle::new(config.agent.clone()),
    );
    if config.history.persist {
        let dir = config.history.dir.clone().unwrap_or_else(default_history_dir);
        tracing::info!(dir = %dir.display(), "persisting session history");
        engine.with_history_dir(dir)
    } else {
        engine
    }
}

use anyhow::{Context, Result};
use cade_core::completion::CompletionService;
use cade_core::config::DispatchConfig;
use cade_infrastructure::{CadePaths, ConfigStorage};
use cade_interaction::{OfflineCompletion, OpenAiCompletionClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolves the configuration file path and loads it.
///
/// A missing file yields the defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, DispatchConfig)> {
    let path = CadePaths::resolve_config_file(explicit).context("Failed to locate config file")?;
    let config = ConfigStorage::new(path.clone())
        .load()
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    Ok((path, config))
}

/// Builds the completion service named by `[completion].provider`.
///
/// Without credentials the OpenAI client is replaced by the offline service,
/// so every language-model step uses its keyword fallback.
pub fn completion_service(config: &DispatchConfig) -> Arc<dyn CompletionService> {
    match config.completion.provider.as_str() {
        "openai" => match OpenAiCompletionClient::from_config(&config.completion) {
            Ok(client) => {
                tracing::info!(model = %client.model(), "Using OpenAI completion service");
                Arc::new(client)
            }
            Err(e) => {
                tracing::warn!(error = %e, "OpenAI unavailable, running offline");
                Arc::new(OfflineCompletion)
            }
        },
        _ => Arc::new(OfflineCompletion),
    }
}

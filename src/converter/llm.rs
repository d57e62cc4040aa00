//! LLM interaction: build chat messages and call the provider.
//!
//! Prompts live in [`crate::prompts`] and
//! retrying lives in [`crate::retry`]; here a call is made exactly once,
//! bounded by the configured timeout, and any failure is classified into a
//! [`CapabilityError`] on the spot.

use crate::config::ServiceConfig;
use crate::error::{CapabilityError, DocToMdError};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Per-call parameters taken from [`ServiceConfig`].
#[derive(Debug, Clone, Copy)]
pub struct LlmSettings {
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout: Duration,
}

impl LlmSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.llm_timeout(),
        }
    }

    fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Build the provider once at startup.
///
/// 1. A pre-built `config.provider` is used as-is.
/// 2. With an API key, the named provider is created through
///    [`ProviderFactory`]. The factory only reads `MISTRAL_API_KEY` from the
///    process environment, so a key set on the builder alone is rejected
///    with [`DocToMdError::InvalidConfig`]; embedders without that variable
///    pass a ready `provider` instead.
/// 3. Otherwise `Ok(None)`: the service runs without LLM-assisted capabilities.
pub fn resolve_provider(config: &ServiceConfig) -> Result<Option<Arc<dyn LLMProvider>>, DocToMdError> {
    if let Some(ref provider) = config.provider {
        return Ok(Some(Arc::clone(provider)));
    }
    let Some(ref key) = config.mistral_api_key else {
        info!("MISTRAL_API_KEY not set; LLM-assisted conversion disabled");
        return Ok(None);
    };
    check_key_source(key, std::env::var("MISTRAL_API_KEY").ok().as_deref())?;

    let provider = ProviderFactory::create_llm_provider(&config.llm_provider, &config.llm_model)
        .map_err(|e| {
            DocToMdError::InvalidConfig(format!(
                "Could not create {} provider for model '{}': {e}",
                config.llm_provider, config.llm_model
            ))
        })?;
    info!(
        "LLM provider ready: {} / {}",
        config.llm_provider, config.llm_model
    );
    Ok(Some(provider))
}

/// The configured key must be the one the factory will find in the
/// environment.
fn check_key_source(configured: &str, environment: Option<&str>) -> Result<(), DocToMdError> {
    match environment.map(str::trim) {
        Some(env_key) if env_key == configured.trim() => Ok(()),
        Some(env_key) if !env_key.is_empty() => Err(DocToMdError::InvalidConfig(
            "mistral_api_key differs from MISTRAL_API_KEY in the environment; \
             the provider factory only uses the environment variable"
                .to_string(),
        )),
        _ => Err(DocToMdError::InvalidConfig(
            "mistral_api_key is set but MISTRAL_API_KEY is not in the environment; \
             export it or pass a pre-built provider"
                .to_string(),
        )),
    }
}

/// Transcribe one image (a rendered page or an uploaded picture).
///
/// The user turn carries only the image; the system prompt holds every
/// instruction.
pub async fn transcribe_image(
    provider: &Arc<dyn LLMProvider>,
    settings: &LlmSettings,
    system_prompt: &str,
    image: ImageData,
    page_number: usize,
) -> Result<String, CapabilityError> {
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images("", vec![image]),
    ];
    chat(provider, settings, &messages, page_number).await
}

/// Rewrite extracted text (used for web pages).
pub async fn complete_text(
    provider: &Arc<dyn LLMProvider>,
    settings: &LlmSettings,
    system_prompt: &str,
    user_message: &str,
) -> Result<String, CapabilityError> {
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user(user_message),
    ];
    chat(provider, settings, &messages, 1).await
}

async fn chat(
    provider: &Arc<dyn LLMProvider>,
    settings: &LlmSettings,
    messages: &[ChatMessage],
    page_number: usize,
) -> Result<String, CapabilityError> {
    let start = Instant::now();
    let options = settings.completion_options();

    let response = tokio::time::timeout(settings.timeout, provider.chat(messages, Some(&options)))
        .await
        .map_err(|_| {
            CapabilityError::permanent(format!(
                "LLM request for page {page_number} timed out after {}s",
                settings.timeout.as_secs()
            ))
        })?
        .map_err(|e| CapabilityError::classify(e.to_string()))?;

    debug!(
        "Page {}: {} input tokens, {} output tokens, {:?}",
        page_number,
        response.prompt_tokens,
        response.completion_tokens,
        start.elapsed()
    );
    Ok(response.content)
}

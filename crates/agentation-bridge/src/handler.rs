//! Sampling-backed feedback handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use agentation_config::SamplingConfig;
use agentation_protocols::{
    FeedbackHandler, FeedbackRequest, HandlerError, ModelHint, ModelPreferences,
    SamplingCapability, SamplingError, SamplingRequest, SubmitFeedbackPayload,
};

use crate::prompt::build_feedback_prompt;

/// Response text used when the AI answers with non-text content.
pub const NON_TEXT_RESPONSE: &str = "AI response received (non-text format)";

/// Parameters of every sampling request.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeOptions {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub model_preferences: ModelPreferences,
    pub timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self::from(&SamplingConfig::default())
    }
}

impl From<&SamplingConfig> for BridgeOptions {
    fn from(config: &SamplingConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            model_preferences: ModelPreferences {
                hints: config
                    .model_hints
                    .iter()
                    .map(|name| ModelHint { name: name.clone() })
                    .collect(),
                cost_priority: None,
                speed_priority: Some(config.speed_priority),
                intelligence_priority: Some(config.intelligence_priority),
            },
            timeout: config.timeout(),
        }
    }
}

/// Check that a submission is worth sending to the AI.
pub fn validate_submission(payload: &SubmitFeedbackPayload) -> Result<(), HandlerError> {
    if payload.annotations.is_empty() {
        return Err(HandlerError::InvalidSubmission(
            "submission has no annotations".to_string(),
        ));
    }
    if let Some(position) = payload
        .annotations
        .iter()
        .position(|a| a.feedback().trim().is_empty())
    {
        return Err(HandlerError::InvalidSubmission(format!(
            "annotation {} has no feedback",
            position + 1
        )));
    }
    Ok(())
}

/// [`FeedbackHandler`] that renders the prompt and asks a [`SamplingCapability`].
pub struct SamplingFeedbackHandler {
    sampler: Arc<dyn SamplingCapability>,
    options: BridgeOptions,
}

impl SamplingFeedbackHandler {
    pub fn new(sampler: Arc<dyn SamplingCapability>, options: BridgeOptions) -> Self {
        Self { sampler, options }
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    fn sampling_request(&self, prompt: String) -> SamplingRequest {
        SamplingRequest::user_text(prompt, self.options.max_tokens)
            .with_system_prompt(self.options.system_prompt.clone())
            .with_model_preferences(self.options.model_preferences.clone())
    }
}

#[async_trait]
impl FeedbackHandler for SamplingFeedbackHandler {
    async fn handle(&self, request: &FeedbackRequest) -> Result<String, HandlerError> {
        validate_submission(&request.payload)?;

        if !self.sampler.is_available() {
            return Err(SamplingError::Unsupported.into());
        }

        let prompt = build_feedback_prompt(&request.payload);
        debug!("Sampling prompt for {} ({} chars)", request.id, prompt.len());

        let sampling = self.sampler.create_message(self.sampling_request(prompt));
        let response = match tokio::time::timeout(self.options.timeout, sampling).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Sampling failed for {}: {}", request.id, e);
                return Err(e.into());
            }
            Err(_) => {
                warn!("Sampling timed out for {}", request.id);
                return Err(SamplingError::Timeout(self.options.timeout).into());
            }
        };

        info!("Sampling completed for {} (model: {})", request.id, response.model);
        Ok(response
            .content
            .as_text()
            .map(str::to_string)
            .unwrap_or_else(|| NON_TEXT_RESPONSE.to_string()))
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

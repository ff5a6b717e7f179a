use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Client;
use crate::generation::{GenerationConfig, GenerationError};
use crate::model::{CausalLm, GenerationRequest};

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    prompt: Vec<u32>,
    n_predict: usize,
    temperature: f64,
    top_k: usize,
    top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pad_token_id: Option<u32>,
    attention_mask: Vec<u32>,
    return_tokens: bool,
    stream: bool,
}

impl CompletionRequest {
    /// Greedy decoding is requested with a zero temperature. At least one
    /// token is always requested, even when the prompt fills `max_length`.
    pub fn new(prompt: &[u32], attention_mask: &[u32], config: &GenerationConfig) -> Self {
        let temperature = if config.do_sample {
            config.temperature
        } else {
            0.0
        };

        Self {
            prompt: prompt.to_vec(),
            n_predict: config.max_length.saturating_sub(prompt.len()).max(1),
            temperature,
            top_k: config.top_k,
            top_p: config.top_p,
            seed: config.seed,
            pad_token_id: config.pad_token_id,
            attention_mask: attention_mask.to_vec(),
            return_tokens: true,
            stream: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tokens: Vec<u32>,
}

impl Client {
    pub async fn completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, GenerationError> {
        let response = self
            .http
            .post(format!("{}/completion", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<CompletionResponse>().await?)
    }
}

#[async_trait]
impl CausalLm for Client {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Vec<u32>, GenerationError> {
        let prompt = request.input_ids;
        let body = CompletionRequest::new(prompt, request.attention_mask, request.config);
        let response = self.completion(&body).await?;
        if response.tokens.is_empty() && !response.content.is_empty() {
            return Err(GenerationError::MissingTokens);
        }

        let mut sequence = prompt.to_vec();
        sequence.extend(response.tokens);
        sequence.truncate(request.config.max_length.max(prompt.len() + 1));

        debug!(
            prompt_tokens = prompt.len(),
            total_tokens = sequence.len(),
            "completion finished"
        );
        Ok(sequence)
    }
}

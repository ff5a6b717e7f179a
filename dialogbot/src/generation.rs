use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::model::{ChatModel, SharedModel};

/// Returned for every request while the model is unavailable.
pub const MODEL_NOT_READY: &str =
    "The chatbot model is not ready. Prepare and save the model, then restart the chat.";

const GENERATION_FAILED: &str = "Sorry, I couldn't generate a response";

#[derive(Error, Diagnostic, Debug)]
pub enum GenerationError {
    #[error("tokenizer {0}")]
    Tokenizer(String),
    #[error("inference request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("inference server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference server did not return token ids")]
    #[diagnostic(help("the server must support `return_tokens` on /completion"))]
    MissingTokens,
    #[error("the model produced an empty reply")]
    EmptyReply,
    #[error("{0}")]
    Backend(String),
}

/// Decoding settings handed to the model. `max_length` counts the prompt
/// tokens too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_length: usize,
    pub do_sample: bool,
    pub temperature: f64,
    pub top_k: usize,
    pub top_p: f64,
    #[serde(default)]
    pub pad_token_id: Option<u32>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::greedy()
    }
}

impl GenerationConfig {
    /// Short greedy replies.
    pub fn greedy() -> Self {
        Self {
            max_length: 50,
            do_sample: false,
            temperature: 1.0,
            top_k: 50,
            top_p: 1.0,
            pad_token_id: None,
            seed: None,
        }
    }

    /// Longer, sampled replies.
    pub fn sampled() -> Self {
        Self {
            max_length: 1000,
            do_sample: true,
            temperature: 0.8,
            top_k: 50,
            top_p: 0.95,
            pad_token_id: None,
            seed: None,
        }
    }

    pub(crate) fn with_pad_token_default(&self, eos_token_id: u32) -> Self {
        Self {
            pad_token_id: Some(self.pad_token_id.unwrap_or(eos_token_id)),
            ..self.clone()
        }
    }
}

/// Turns one line of user text into a reply. Never fails: model and
/// generation errors come back as displayable text.
#[derive(Clone)]
pub struct ResponseGenerator {
    model: Arc<SharedModel>,
    config: GenerationConfig,
}

impl ResponseGenerator {
    pub fn new(model: Arc<SharedModel>, config: GenerationConfig) -> Self {
        Self { model, config }
    }

    pub fn model(&self) -> &Arc<SharedModel> {
        &self.model
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    #[instrument(skip_all, fields(chars = text.len()))]
    pub async fn generate(&self, text: &str) -> String {
        let Some(model) = self.model.get().await else {
            debug!("model unavailable");
            return MODEL_NOT_READY.to_owned();
        };

        soft_reply(&model, text, &self.config).await
    }
}

/// Asks `model` for a reply, converting any failure into a displayable
/// message.
pub async fn soft_reply(model: &ChatModel, text: &str, config: &GenerationConfig) -> String {
    match model.respond(text, config).await {
        Ok(reply) => {
            debug!(reply_chars = reply.len(), "generated reply");
            reply
        }
        Err(err) => {
            warn!(error = %err, "generation failed");
            format!("{GENERATION_FAILED}: {err}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::model::ModelError;
    use crate::testing::{self, FailingModel, ScriptedModel, FINE_THANKS};

    fn generator(model: SharedModel) -> ResponseGenerator {
        ResponseGenerator::new(Arc::new(model), GenerationConfig::greedy())
    }

    #[test(tokio::test)]
    async fn returns_only_the_continuation() {
        let generator = generator(SharedModel::ready(testing::fixture_model(ScriptedModel::new(
            FINE_THANKS,
        ))));

        let prompt = "Hello, how are you?";
        let reply = generator.generate(prompt).await;

        assert!(!reply.is_empty());
        assert!(!reply.starts_with(prompt));
        assert_eq!(reply, "i am fine thanks");
    }

    #[test(tokio::test)]
    async fn backend_failures_become_text() {
        let generator = generator(SharedModel::ready(testing::fixture_model(FailingModel(
            "CUDA out of memory",
        ))));

        let reply = generator.generate("hi").await;
        assert_eq!(reply, "Sorry, I couldn't generate a response: CUDA out of memory");
    }

    #[test(tokio::test)]
    async fn unloaded_model_always_answers_not_ready() {
        let generator = generator(SharedModel::new(|| {
            Err(ModelError::Tokenizer("no tokenizer".to_owned()))
        }));

        for input in ["hi", "Hello, how are you?", "again"] {
            assert_eq!(generator.generate(input).await, MODEL_NOT_READY);
        }
    }

    #[test(tokio::test)]
    async fn prompt_filling_max_length_still_gets_a_reply() {
        let generator = ResponseGenerator::new(
            Arc::new(SharedModel::ready(testing::fixture_model(ScriptedModel::new(
                FINE_THANKS,
            )))),
            GenerationConfig {
                max_length: 2,
                ..GenerationConfig::greedy()
            },
        );

        assert_eq!(generator.generate("hello there !").await, "i");
    }

    #[test(tokio::test)]
    async fn empty_continuation_becomes_an_apology() {
        let generator = generator(SharedModel::ready(testing::fixture_model(ScriptedModel::new(
            Vec::new(),
        ))));

        assert_eq!(
            generator.generate("hi").await,
            "Sorry, I couldn't generate a response: the model produced an empty reply"
        );
    }

    #[test]
    fn presets_differ_only_in_decoding() {
        let greedy = GenerationConfig::default();
        let sampled = GenerationConfig::sampled();

        assert_eq!(greedy, GenerationConfig::greedy());
        assert_eq!(greedy.max_length, 50);
        assert!(!greedy.do_sample);
        assert_eq!(sampled.max_length, 1000);
        assert!(sampled.do_sample);
        assert_eq!((sampled.top_k, sampled.top_p, sampled.temperature), (50, 0.95, 0.8));
    }

    #[test]
    fn explicit_pad_token_is_kept() {
        let config = GenerationConfig {
            pad_token_id: Some(7),
            ..GenerationConfig::greedy()
        };

        assert_eq!(config.with_pad_token_default(0).pad_token_id, Some(7));
        assert_eq!(GenerationConfig::greedy().with_pad_token_default(3).pad_token_id, Some(3));
    }
}

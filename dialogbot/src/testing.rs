//! Test doubles for the model resource: a small word-level tokenizer and
//! scripted backends standing in for the inference server.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;

use crate::generation::GenerationError;
use crate::model::{
    tokenizer::{DialogTokenizer, DEFAULT_EOS_TOKEN},
    CausalLm, ChatModel, GenerationRequest, ModelManifest,
};

/// Word-level vocabulary split on whitespace and punctuation, with
/// `<|endoftext|>` registered as special token 0.
pub const FIXTURE_TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [
    {
      "id": 0,
      "content": "<|endoftext|>",
      "single_word": false,
      "lstrip": false,
      "rstrip": false,
      "normalized": false,
      "special": true
    }
  ],
  "normalizer": null,
  "pre_tokenizer": { "type": "Whitespace" },
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {
      "<|endoftext|>": 0,
      "[UNK]": 1,
      "Hello": 2,
      "hello": 3,
      ",": 4,
      "how": 5,
      "are": 6,
      "you": 7,
      "?": 8,
      "i": 9,
      "am": 10,
      "fine": 11,
      "thanks": 12,
      "hi": 13,
      "there": 14,
      "!": 15
    },
    "unk_token": "[UNK]"
  }
}"#;

/// Ids of "i am fine thanks" in the fixture vocabulary.
pub const FINE_THANKS: [u32; 4] = [9, 10, 11, 12];

pub fn fixture_tokenizer() -> DialogTokenizer {
    DialogTokenizer::from_bytes(FIXTURE_TOKENIZER_JSON.as_bytes(), DEFAULT_EOS_TOKEN)
        .expect("fixture tokenizer is valid")
}

pub fn fixture_manifest() -> ModelManifest {
    ModelManifest {
        source: "fixture".to_owned(),
        inference_url: "http://127.0.0.1:9".to_owned(),
        eos_token: DEFAULT_EOS_TOKEN.to_owned(),
    }
}

pub fn fixture_model(backend: impl CausalLm + 'static) -> ChatModel {
    ChatModel::new(fixture_tokenizer(), backend, fixture_manifest())
}

/// Echoes the prompt back followed by a fixed continuation and an eos
/// token, the way a causal LM's generate call returns its sequence. At
/// least one new token survives truncation.
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    continuation: Vec<u32>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedModel {
    pub fn new(continuation: impl Into<Vec<u32>>) -> Self {
        Self {
            continuation: continuation.into(),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl CausalLm for ScriptedModel {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Vec<u32>, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let eos = request.config.pad_token_id.unwrap_or_default();
        let mut sequence = request.input_ids.to_vec();
        sequence.extend_from_slice(&self.continuation);
        sequence.push(eos);
        sequence.truncate(request.config.max_length.max(request.input_ids.len() + 1));

        Ok(sequence)
    }
}

/// Fails every call with the given message.
#[derive(Debug, Clone)]
pub struct FailingModel(pub &'static str);

#[async_trait]
impl CausalLm for FailingModel {
    async fn generate(&self, _request: GenerationRequest<'_>) -> Result<Vec<u32>, GenerationError> {
        Err(GenerationError::Backend(self.0.to_owned()))
    }
}

use std::path::{Path, PathBuf};

use tokenizers::Tokenizer;
use tracing::debug;

use super::ModelError;
use crate::generation::GenerationError;

pub const DEFAULT_EOS_TOKEN: &str = "<|endoftext|>";

/// Token ids for a prompt together with its attention mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
}

/// A `tokenizers` tokenizer that knows its end-of-sequence marker.
pub struct DialogTokenizer {
    inner: Tokenizer,
    eos_token: String,
    eos_token_id: u32,
}

impl DialogTokenizer {
    pub fn new(inner: Tokenizer, eos_token: impl Into<String>) -> Result<Self, ModelError> {
        let eos_token = eos_token.into();
        let eos_token_id = inner
            .token_to_id(&eos_token)
            .ok_or_else(|| ModelError::MissingEosToken(eos_token.clone()))?;

        Ok(Self {
            inner,
            eos_token,
            eos_token_id,
        })
    }

    /// Loads from a `tokenizer.json` file, a directory containing one, or a
    /// Hugging Face hub id when no such path exists.
    pub fn from_source(source: &str, eos_token: &str) -> Result<Self, ModelError> {
        let path = Path::new(source);
        if path.exists() {
            return Self::from_file(resolve_tokenizer_file(path)?, eos_token);
        }

        debug!(source, "fetching tokenizer from the hub");
        let inner = Tokenizer::from_pretrained(source, None)
            .map_err(|e| ModelError::Tokenizer(format!("failed to fetch `{source}`: {e}")))?;
        Self::new(inner, eos_token)
    }

    pub fn from_file(path: impl AsRef<Path>, eos_token: &str) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let inner = Tokenizer::from_file(path).map_err(|e| {
            ModelError::Tokenizer(format!("failed to load {}: {e}", path.display()))
        })?;
        Self::new(inner, eos_token)
    }

    pub fn from_bytes(bytes: &[u8], eos_token: &str) -> Result<Self, ModelError> {
        let inner = Tokenizer::from_bytes(bytes)
            .map_err(|e| ModelError::Tokenizer(format!("failed to parse tokenizer: {e}")))?;
        Self::new(inner, eos_token)
    }

    pub fn eos_token(&self) -> &str {
        &self.eos_token
    }

    pub fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    pub fn encode(&self, text: &str) -> Result<Encoded, GenerationError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| GenerationError::Tokenizer(format!("encoding failed: {e}")))?;

        Ok(Encoded {
            ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
        })
    }

    /// Decodes with special tokens skipped.
    pub fn decode(&self, ids: &[u32]) -> Result<String, GenerationError> {
        self.inner
            .decode(ids, true)
            .map_err(|e| GenerationError::Tokenizer(format!("decoding failed: {e}")))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        self.inner.save(path, true).map_err(|e| {
            ModelError::Tokenizer(format!("failed to save tokenizer to {}: {e}", path.display()))
        })
    }
}

fn resolve_tokenizer_file(path: &Path) -> Result<PathBuf, ModelError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let candidate = path.join("tokenizer.json");
    if candidate.is_file() {
        return Ok(candidate);
    }

    Err(ModelError::Tokenizer(format!(
        "directory '{}' does not contain tokenizer.json",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn appends_eos_as_a_single_token() {
        let tokenizer = testing::fixture_tokenizer();
        let encoded = tokenizer.encode("hello<|endoftext|>").unwrap();

        assert_eq!(encoded.ids.last(), Some(&tokenizer.eos_token_id()));
        assert_eq!(encoded.ids.len(), encoded.attention_mask.len());
        assert!(encoded.attention_mask.iter().all(|&m| m == 1));
    }

    #[test]
    fn decode_skips_special_tokens() {
        let tokenizer = testing::fixture_tokenizer();
        let ids = tokenizer.encode("i am fine<|endoftext|>").unwrap().ids;

        assert_eq!(tokenizer.decode(&ids).unwrap(), "i am fine");
    }

    #[test]
    fn unknown_eos_token_is_rejected() {
        let result = DialogTokenizer::from_bytes(testing::FIXTURE_TOKENIZER_JSON.as_bytes(), "</s>");
        assert!(matches!(result, Err(ModelError::MissingEosToken(token)) if token == "</s>"));
    }

    #[test]
    fn loads_from_a_directory_after_saving() {
        let dir = tempfile::tempdir().unwrap();
        testing::fixture_tokenizer()
            .save(dir.path().join("tokenizer.json"))
            .unwrap();

        let source = dir.path().to_str().unwrap();
        let reloaded = DialogTokenizer::from_source(source, DEFAULT_EOS_TOKEN).unwrap();
        assert_eq!(reloaded.eos_token_id(), 0);

        let empty = tempfile::tempdir().unwrap();
        let missing = DialogTokenizer::from_source(empty.path().to_str().unwrap(), DEFAULT_EOS_TOKEN);
        assert!(matches!(missing, Err(ModelError::Tokenizer(_))));
    }
}

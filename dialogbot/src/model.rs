use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::generation::{GenerationConfig, GenerationError};
use crate::inference;

pub mod tokenizer;

use tokenizer::{DialogTokenizer, DEFAULT_EOS_TOKEN};

pub const MANIFEST_FILE: &str = "model.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

#[derive(Error, Diagnostic, Debug)]
pub enum ModelError {
    #[error("could not access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model manifest {}", path.display())]
    #[diagnostic(help("run `dialogbot prepare` to write a fresh model directory"))]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Tokenizer(String),
    #[error("end-of-sequence token `{0}` is not in the tokenizer vocabulary")]
    MissingEosToken(String),
    #[error("could not build the inference client")]
    Client(#[source] reqwest::Error),
    #[error("no model loader is configured")]
    NoLoader,
}

/// Everything besides the tokenizer that is needed to reach the model again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub source: String,
    pub inference_url: String,
    #[serde(default = "default_eos_token")]
    pub eos_token: String,
}

fn default_eos_token() -> String {
    DEFAULT_EOS_TOKEN.to_owned()
}

impl ModelManifest {
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let json = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ModelError::Manifest {
            path: path.to_owned(),
            source,
        })
    }

    pub fn to_file(&self, path: &Path) -> Result<(), ModelError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ModelError::Manifest {
            path: path.to_owned(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ModelError::Io {
            path: path.to_owned(),
            source,
        })
    }
}

pub struct GenerationRequest<'a> {
    pub input_ids: &'a [u32],
    pub attention_mask: &'a [u32],
    pub config: &'a GenerationConfig,
}

/// The decode procedure of a pretrained causal language model.
#[async_trait]
pub trait CausalLm: Send + Sync {
    /// Returns the full sequence: the prompt ids followed by the generated
    /// ids, at most `config.max_length` long.
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Vec<u32>, GenerationError>;
}

pub struct ChatModel {
    tokenizer: DialogTokenizer,
    backend: Box<dyn CausalLm>,
    manifest: ModelManifest,
}

impl ChatModel {
    pub fn new(
        tokenizer: DialogTokenizer,
        backend: impl CausalLm + 'static,
        manifest: ModelManifest,
    ) -> Self {
        Self {
            tokenizer,
            backend: Box::new(backend),
            manifest,
        }
    }

    /// Loads a directory written by [`ChatModel::save`]. `inference_url`
    /// overrides the endpoint recorded in the manifest.
    pub fn load(dir: &Path, inference_url: Option<&str>) -> Result<Self, ModelError> {
        let mut manifest = ModelManifest::from_file(&dir.join(MANIFEST_FILE))?;
        if let Some(url) = inference_url {
            manifest.inference_url = url.to_owned();
        }

        let tokenizer = DialogTokenizer::from_file(dir.join(TOKENIZER_FILE), &manifest.eos_token)?;
        let client = inference::Config::new(&manifest.inference_url)
            .client()
            .map_err(ModelError::Client)?;

        info!(dir = %dir.display(), url = %manifest.inference_url, "loaded model");
        Ok(Self::new(tokenizer, client, manifest))
    }

    pub fn save(&self, dir: &Path) -> Result<(), ModelError> {
        std::fs::create_dir_all(dir).map_err(|source| ModelError::Io {
            path: dir.to_owned(),
            source,
        })?;

        self.tokenizer.save(dir.join(TOKENIZER_FILE))?;
        self.manifest.to_file(&dir.join(MANIFEST_FILE))
    }

    pub fn tokenizer(&self) -> &DialogTokenizer {
        &self.tokenizer
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    /// Generates a continuation for one line of user text. Only the newly
    /// generated part is decoded; the echoed prompt is sliced off. A
    /// continuation that decodes to nothing is an error.
    pub async fn respond(
        &self,
        text: &str,
        config: &GenerationConfig,
    ) -> Result<String, GenerationError> {
        let prompt = format!("{text}{}", self.tokenizer.eos_token());
        let encoded = self.tokenizer.encode(&prompt)?;
        let config = config.with_pad_token_default(self.tokenizer.eos_token_id());

        let output = self
            .backend
            .generate(GenerationRequest {
                input_ids: &encoded.ids,
                attention_mask: &encoded.attention_mask,
                config: &config,
            })
            .await?;

        let continuation = output.get(encoded.ids.len()..).unwrap_or_default();
        let reply = self.tokenizer.decode(continuation)?;
        if reply.trim().is_empty() {
            return Err(GenerationError::EmptyReply);
        }
        Ok(reply)
    }
}

type Loader = Box<dyn Fn() -> Result<ChatModel, ModelError> + Send + Sync>;

/// Process-wide model handle, loaded once on first use. A failed load is
/// kept and never retried.
pub struct SharedModel {
    cell: OnceCell<Result<Arc<ChatModel>, String>>,
    loader: Option<Loader>,
}

impl SharedModel {
    pub fn new(loader: impl Fn() -> Result<ChatModel, ModelError> + Send + Sync + 'static) -> Self {
        Self {
            cell: OnceCell::new(),
            loader: Some(Box::new(loader)),
        }
    }

    pub fn from_dir(dir: impl Into<PathBuf>, inference_url: Option<String>) -> Self {
        let dir = dir.into();
        Self::new(move || ChatModel::load(&dir, inference_url.as_deref()))
    }

    /// A handle that is already initialized with `model`.
    pub fn ready(model: ChatModel) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Ok(Arc::new(model)))),
            loader: None,
        }
    }

    pub async fn get(&self) -> Option<Arc<ChatModel>> {
        let loaded = self
            .cell
            .get_or_init(|| async {
                let result = match &self.loader {
                    Some(loader) => loader(),
                    None => Err(ModelError::NoLoader),
                };

                match result {
                    Ok(model) => Ok(Arc::new(model)),
                    Err(err) => {
                        let message = error_chain(&err);
                        error!(error = %message, "model failed to load, chats will report it as not ready");
                        Err(message)
                    }
                }
            })
            .await;

        loaded.as_ref().ok().cloned()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }

    /// Why the model is unavailable, once a load has been attempted and failed.
    pub fn load_error(&self) -> Option<&str> {
        match self.cell.get() {
            Some(Err(message)) => Some(message),
            _ => None,
        }
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    std::iter::successors(Some(err), |err| (*err).source())
        .map(ToString::to_string)
        .join(": ")
}

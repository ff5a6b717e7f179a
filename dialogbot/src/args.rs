use std::path::PathBuf;

use clap::{Args, ValueEnum};

use crate::generation::GenerationConfig;
use crate::model::SharedModel;
use crate::DEFAULT_SAVE_PATH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Decoding {
    Greedy,
    Sampled,
}

#[derive(Debug, Clone, Args)]
pub struct GenerationArgs {
    #[arg(long, value_enum, env = "DIALOGBOT_DECODING", default_value_t = Decoding::Greedy)]
    pub decoding: Decoding,

    #[arg(long, env = "DIALOGBOT_MAX_LENGTH", help = "Maximum total length, prompt included")]
    pub max_length: Option<usize>,

    #[arg(long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub top_k: Option<usize>,

    #[arg(long)]
    pub top_p: Option<f64>,

    #[arg(long, help = "Defaults to the end-of-sequence token")]
    pub pad_token_id: Option<u32>,

    #[arg(long)]
    pub seed: Option<u64>,
}

impl GenerationArgs {
    /// The chosen preset with any explicit overrides applied. Any explicit
    /// sampling setting turns sampling on.
    pub fn config(&self) -> GenerationConfig {
        let preset = match self.decoding {
            Decoding::Greedy => GenerationConfig::greedy(),
            Decoding::Sampled => GenerationConfig::sampled(),
        };

        let sampling_override =
            self.temperature.is_some() || self.top_k.is_some() || self.top_p.is_some();

        GenerationConfig {
            max_length: self.max_length.unwrap_or(preset.max_length),
            do_sample: preset.do_sample || sampling_override,
            temperature: self.temperature.unwrap_or(preset.temperature),
            top_k: self.top_k.unwrap_or(preset.top_k),
            top_p: self.top_p.unwrap_or(preset.top_p),
            pad_token_id: self.pad_token_id.or(preset.pad_token_id),
            seed: self.seed.or(preset.seed),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    #[arg(long, env = "DIALOGBOT_MODEL_DIR", default_value = DEFAULT_SAVE_PATH)]
    pub model_dir: PathBuf,

    #[arg(long, env = "DIALOGBOT_INFERENCE_URL", help = "Overrides the URL saved with the model")]
    pub inference_url: Option<String>,
}

impl ModelArgs {
    pub fn shared_model(&self) -> SharedModel {
        SharedModel::from_dir(self.model_dir.clone(), self.inference_url.clone())
    }
}

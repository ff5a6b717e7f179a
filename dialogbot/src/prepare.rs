use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use miette::IntoDiagnostic;
use tracing::info;

use crate::args::GenerationArgs;
use crate::dataset::{self, DatasetError, DialogPair, Split};
use crate::generation::{soft_reply, GenerationConfig};
use crate::inference;
use crate::model::{
    tokenizer::{DialogTokenizer, DEFAULT_EOS_TOKEN},
    ChatModel, ModelError, ModelManifest,
};
use crate::DEFAULT_SAVE_PATH;

pub const SMOKE_TEST_PROMPT: &str = "Hello, how are you?";
pub const DEFAULT_TOKENIZER: &str = "microsoft/DialoGPT-medium";
pub const DEFAULT_INFERENCE_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, Args)]
pub struct PrepareArgs {
    #[arg(long, default_value = "dialogs.txt", help = "Tab separated input/response pairs")]
    pub dialogs: PathBuf,

    #[arg(
        long,
        default_value = DEFAULT_TOKENIZER,
        help = "tokenizer.json, a directory holding it, or a hub model id"
    )]
    pub tokenizer: String,

    #[arg(long, default_value = DEFAULT_EOS_TOKEN)]
    pub eos_token: String,

    #[arg(long, env = "DIALOGBOT_INFERENCE_URL", default_value = DEFAULT_INFERENCE_URL)]
    pub inference_url: String,

    #[arg(long, default_value = DEFAULT_SAVE_PATH)]
    pub save_path: PathBuf,

    #[arg(long, default_value_t = 0.2)]
    pub test_size: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[command(flatten)]
    pub generation: GenerationArgs,
}

#[derive(Debug)]
pub struct PrepareReport {
    pub train: usize,
    pub test: usize,
    pub smoke_test_reply: String,
    pub saved_to: PathBuf,
}

/// Runs the whole pipeline, writing progress lines to `out` as each step
/// completes.
pub async fn run(args: &PrepareArgs, out: &mut impl Write) -> miette::Result<PrepareReport> {
    let split = split_dialogs(&args.dialogs, args.test_size, args.seed)?;
    info!(
        train = split.train.len(),
        test = split.test.len(),
        "split dialogues"
    );
    writeln!(out, "Training samples: {}", split.train.len()).into_diagnostic()?;
    writeln!(out, "Testing samples: {}", split.test.len()).into_diagnostic()?;

    let tokenizer = DialogTokenizer::from_source(&args.tokenizer, &args.eos_token)?;
    let client = inference::Config::new(&args.inference_url)
        .client()
        .map_err(ModelError::Client)?;
    let manifest = ModelManifest {
        source: args.tokenizer.clone(),
        inference_url: args.inference_url.clone(),
        eos_token: args.eos_token.clone(),
    };
    let model = ChatModel::new(tokenizer, client, manifest);

    let smoke_test_reply =
        smoke_test_and_save(&model, &args.generation.config(), &args.save_path, &mut *out).await?;
    writeln!(
        out,
        "Model and tokenizer saved to: {}",
        args.save_path.display()
    )
    .into_diagnostic()?;

    Ok(PrepareReport {
        train: split.train.len(),
        test: split.test.len(),
        smoke_test_reply,
        saved_to: args.save_path.clone(),
    })
}

/// Reads, cleans and splits the dialogue file. The partitions are reported
/// only; nothing trains on them yet.
pub fn split_dialogs(
    path: &Path,
    test_size: f64,
    seed: u64,
) -> Result<Split<DialogPair>, DatasetError> {
    let dialogs = dataset::read_dialogs(path)?;
    dataset::train_test_split(dialogs, test_size, seed)
}

/// Runs one generation as a sanity check, prints the reply, then writes the
/// model directory.
pub async fn smoke_test_and_save(
    model: &ChatModel,
    config: &GenerationConfig,
    save_path: &Path,
    out: &mut impl Write,
) -> miette::Result<String> {
    let reply = soft_reply(model, SMOKE_TEST_PROMPT, config).await;
    info!(prompt = SMOKE_TEST_PROMPT, reply = %reply, "smoke test finished");
    writeln!(out, "Bot: {reply}").into_diagnostic()?;

    model.save(save_path)?;
    info!(path = %save_path.display(), "saved model");

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::model::{MANIFEST_FILE, TOKENIZER_FILE};
    use crate::testing::{self, FailingModel, ScriptedModel, FINE_THANKS};

    #[test]
    fn splits_the_dialogue_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Hi\tHello there\nBye\tGoodbye\n").unwrap();

        let split = split_dialogs(file.path(), 0.2, 42).unwrap();

        assert_eq!(split.train.len() + split.test.len(), 2);
        assert!(split.train.iter().all(|row| !split.test.contains(row)));
    }

    #[test(tokio::test)]
    async fn smoke_test_then_save() {
        let dir = tempfile::tempdir().unwrap();
        let save_path = dir.path().join("saved");
        let model = testing::fixture_model(ScriptedModel::new(FINE_THANKS));

        let mut out = Vec::new();
        let reply = smoke_test_and_save(&model, &GenerationConfig::greedy(), &save_path, &mut out)
            .await
            .unwrap();

        assert_eq!(reply, "i am fine thanks");
        assert_eq!(String::from_utf8(out).unwrap(), "Bot: i am fine thanks\n");
        assert!(save_path.join(TOKENIZER_FILE).is_file());
        assert!(save_path.join(MANIFEST_FILE).is_file());
    }

    #[test(tokio::test)]
    async fn failed_smoke_test_still_saves() {
        let dir = tempfile::tempdir().unwrap();
        let model = testing::fixture_model(FailingModel("connection refused"));

        let reply = smoke_test_and_save(
            &model,
            &GenerationConfig::greedy(),
            dir.path(),
            &mut Vec::new(),
        )
        .await
        .unwrap();

        assert!(reply.ends_with("connection refused"));
        assert!(dir.path().join(MANIFEST_FILE).is_file());
    }

    fn prepare_args(dir: &Path, tokenizer: &str) -> PrepareArgs {
        let dialogs = dir.join("dialogs.txt");
        std::fs::write(&dialogs, "Hi\tHello there\nBye\tGoodbye\nHow are you?\tFine.\n").unwrap();

        PrepareArgs {
            dialogs,
            tokenizer: tokenizer.to_owned(),
            eos_token: DEFAULT_EOS_TOKEN.to_owned(),
            // Nothing listens here, so the smoke test fails softly.
            inference_url: "http://127.0.0.1:9".to_owned(),
            save_path: dir.join("model"),
            test_size: 0.2,
            seed: 42,
            generation: crate::args::GenerationArgs {
                decoding: crate::args::Decoding::Greedy,
                max_length: None,
                temperature: None,
                top_k: None,
                top_p: None,
                pad_token_id: None,
                seed: None,
            },
        }
    }

    #[test(tokio::test)]
    async fn run_writes_a_loadable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = dir.path().join("tokenizer.json");
        testing::fixture_tokenizer().save(&tokenizer).unwrap();
        let args = prepare_args(dir.path(), tokenizer.to_str().unwrap());

        let mut out = Vec::new();
        let report = run(&args, &mut out).await.unwrap();

        assert_eq!((report.train, report.test), (2, 1));
        assert!(report.smoke_test_reply.starts_with("Sorry"));
        let model = ChatModel::load(&args.save_path, None).unwrap();
        assert_eq!(model.manifest().inference_url, "http://127.0.0.1:9");

        let printed = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines[0], "Training samples: 2");
        assert_eq!(lines[1], "Testing samples: 1");
        assert!(lines[2].starts_with("Bot: Sorry"));
        assert!(lines[3].starts_with("Model and tokenizer saved to: "));
    }

    #[test(tokio::test)]
    async fn counts_are_printed_before_the_tokenizer_loads() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("tokenizer.json");
        std::fs::write(&broken, "not a tokenizer").unwrap();
        let args = prepare_args(dir.path(), broken.to_str().unwrap());

        let mut out = Vec::new();
        assert!(run(&args, &mut out).await.is_err());

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Training samples: 2\nTesting samples: 1\n"
        );
        assert!(!args.save_path.exists());
    }
}

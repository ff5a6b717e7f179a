use std::path::{Path, PathBuf};

use miette::Diagnostic;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use crate::normalize::normalize;

/// One cleaned `input<TAB>response` row of the dialogue file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogPair {
    pub input: String,
    pub response: String,
}

#[derive(Debug)]
pub struct Split<T> {
    pub train: Vec<T>,
    pub test: Vec<T>,
}

#[derive(Error, Diagnostic, Debug)]
pub enum DatasetError {
    #[error("could not read dialogue file {}", path.display())]
    #[diagnostic(help("the file must be tab separated with two columns and no header"))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("test size must be between 0 and 1, got {0}")]
    InvalidTestSize(f64),
    #[error("cannot split {records} records with test size {test_size}: one partition would be empty")]
    TooFewRecords { records: usize, test_size: f64 },
}

pub fn read_dialogs(path: &Path) -> Result<Vec<DialogPair>, DatasetError> {
    let contents = std::fs::read_to_string(path).map_err(|source| DatasetError::Read {
        path: path.to_owned(),
        source,
    })?;

    let dialogs = parse_dialogs(&contents);
    info!(path = %path.display(), records = dialogs.len(), "loaded dialogues");

    Ok(dialogs)
}

/// Parses headerless two-column TSV, normalizing both fields. Rows with a
/// missing column are dropped: no tab, or nothing on one side of it. A field
/// that only normalizes to an empty string is still a value and is kept.
pub fn parse_dialogs(contents: &str) -> Vec<DialogPair> {
    let mut dropped = 0usize;

    let dialogs: Vec<DialogPair> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let pair = line
                .split_once('\t')
                .filter(|(input, response)| !input.is_empty() && !response.is_empty())
                .map(|(input, response)| DialogPair {
                    input: normalize(input),
                    response: normalize(response),
                });

            if pair.is_none() {
                dropped += 1;
            }
            pair
        })
        .collect();

    if dropped > 0 {
        debug!(dropped, "dropped incomplete dialogue rows");
    }

    dialogs
}

/// Shuffles with a seeded RNG and puts `ceil(len * test_size)` records in the
/// test partition.
pub fn train_test_split<T>(
    records: Vec<T>,
    test_size: f64,
    seed: u64,
) -> Result<Split<T>, DatasetError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(DatasetError::InvalidTestSize(test_size));
    }

    let total = records.len();
    let n_test = (total as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= total {
        return Err(DatasetError::TooFewRecords {
            records: total,
            test_size,
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut shuffled = records;
    shuffled.shuffle(&mut rng);

    let train = shuffled.split_off(n_test);
    Ok(Split {
        train,
        test: shuffled,
    })
}

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::model::KokoroError;

/// Tokens a long phoneme sequence may be cut after.
const SPLIT_PUNCTUATION: [char; 6] = [';', ':', ',', '.', '!', '?'];

#[derive(Deserialize)]
struct ModelConfig {
    vocab: HashMap<String, i64>,
}

/// Read the phoneme vocabulary from the model's `config.json`.
pub fn load_vocab(config_path: &Path) -> Result<HashMap<char, i64>, KokoroError> {
    let content = std::fs::read_to_string(config_path)?;
    parse_vocab(&content)
}

fn parse_vocab(content: &str) -> Result<HashMap<char, i64>, KokoroError> {
    let config: ModelConfig = serde_json::from_str(content)
        .map_err(|e| KokoroError::Config(format!("Failed to parse JSON: {e}")))?;

    config
        .vocab
        .into_iter()
        .map(|(key, id)| {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Ok((ch, id)),
                _ => Err(KokoroError::Config(format!(
                    "vocab key {key:?} must be a single character"
                ))),
            }
        })
        .collect()
}

/// Ids of the sentence punctuation present in `vocab`.
pub fn punctuation_ids(vocab: &HashMap<char, i64>) -> Vec<i64> {
    SPLIT_PUNCTUATION
        .iter()
        .filter_map(|ch| vocab.get(ch).copied())
        .collect()
}

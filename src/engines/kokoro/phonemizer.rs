use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::model::KokoroError;

/// Location of the espeak-ng binary and its data directory. `None` falls back
/// to `espeak-ng` on PATH and its compiled-in data path.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    fn command(&self) -> Command {
        let mut command = match &self.bin_path {
            Some(bin) => Command::new(bin),
            None => Command::new("espeak-ng"),
        };
        if let Some(data) = &self.data_path {
            command.env("ESPEAK_DATA_PATH", data);
        }
        command
    }
}

/// espeak-ng voice for a pipeline language code.
pub fn espeak_language(lang_code: &str) -> Option<&'static str> {
    let lang = match lang_code {
        "a" => "en-us",
        "b" => "en-gb",
        "e" => "es",
        "f" => "fr-fr",
        "h" => "hi",
        "i" => "it",
        "j" => "ja",
        "p" => "pt-br",
        "z" => "cmn",
        _ => return None,
    };
    Some(lang)
}

/// Phoneme form of a text chunk and its model token ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phonemes {
    pub ipa: String,
    pub ids: Vec<i64>,
}

/// Convert text to IPA via espeak-ng, keeping boundary punctuation attached
/// to the preceding word. Characters missing from `vocab` are dropped from
/// `ids` but kept in `ipa`.
pub fn phonemize(
    text: &str,
    lang: &str,
    vocab: &HashMap<char, i64>,
    espeak: &EspeakConfig,
) -> Result<Phonemes, KokoroError> {
    let parts = split_text_parts(text);

    let text_segments: Vec<&str> = parts
        .iter()
        .filter_map(|part| match part {
            TextPart::Text(segment) => Some(segment.as_str()),
            TextPart::Punct(_) => None,
        })
        .collect();

    let segment_ipa = if text_segments.is_empty() {
        Vec::new()
    } else {
        phonemize_segments_batch(&text_segments, lang, espeak)?
    };

    let mut ipa = String::new();
    let mut segments = segment_ipa.into_iter();
    for part in parts {
        match part {
            TextPart::Text(_) => {
                let Some(chunk) = segments.next() else {
                    continue;
                };
                if chunk.is_empty() {
                    continue;
                }
                if !ipa.is_empty() && !ipa.ends_with(' ') {
                    ipa.push(' ');
                }
                ipa.push_str(&chunk);
            }
            TextPart::Punct(ch) => ipa.push(ch),
        }
    }

    let ids = ipa.chars().filter_map(|ch| vocab.get(&ch).copied()).collect();
    Ok(Phonemes { ipa, ids })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TextPart {
    Text(String),
    Punct(char),
}

fn split_text_parts(text: &str) -> Vec<TextPart> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for (idx, ch) in text.char_indices() {
        if let Some(punct) = boundary_punctuation(ch) {
            if !joins_digits(text, idx, ch) {
                flush_text_part(&mut parts, &mut current);
                parts.push(TextPart::Punct(punct));
                continue;
            }
        }

        if ch.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            continue;
        }

        current.push(ch);
    }

    flush_text_part(&mut parts, &mut current);
    parts
}

fn flush_text_part(parts: &mut Vec<TextPart>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(TextPart::Text(trimmed.to_string()));
    }
    current.clear();
}

fn boundary_punctuation(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}'
        | '\u{201d}' => Some(ch),
        // Full-width CJK punctuation maps to its ASCII counterpart.
        '。' => Some('.'),
        '，' | '、' => Some(','),
        '！' => Some('!'),
        '？' => Some('?'),
        _ => None,
    }
}

/// `2.0` and `1,000` stay inside the text so espeak-ng reads them as numbers.
fn joins_digits(text: &str, idx: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }
    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch.len_utf8()..].chars().next();
    matches!(
        (prev, next),
        (Some(left), Some(right)) if left.is_ascii_digit() && right.is_ascii_digit()
    )
}

fn phonemize_segments_batch(
    segments: &[&str],
    lang: &str,
    espeak: &EspeakConfig,
) -> Result<Vec<String>, KokoroError> {
    let output = run_espeak(&segments.join("\n"), lang, espeak)?;
    let lines: Vec<&str> = output.lines().collect();

    // One output line per input line is expected; otherwise go one by one.
    if lines.len() != segments.len() {
        return segments
            .iter()
            .map(|segment| Ok(clean_ipa(&run_espeak(segment, lang, espeak)?)))
            .collect();
    }

    Ok(lines.iter().map(|line| clean_ipa(line)).collect())
}

/// Join espeak-ng's output lines and drop its `_` pause markers.
fn clean_ipa(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .replace('_', "")
}

fn run_espeak(input: &str, lang: &str, espeak: &EspeakConfig) -> Result<String, KokoroError> {
    let mut child = espeak
        .command()
        .args(["--ipa", "--stdin", "-q", "-v", lang])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KokoroError::EspeakNotFound
            } else {
                KokoroError::Io(e)
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // Without a final newline espeak-ng under-processes the last token.
        stdin.write_all(newline_terminated(input).as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(KokoroError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {stderr}",
            output.status.code()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn newline_terminated(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        clean_ipa, espeak_language, newline_terminated, phonemize, split_text_parts,
        EspeakConfig, TextPart,
    };
    use std::collections::HashMap;
    use std::process::Command;

    fn espeak_available() -> bool {
        Command::new("espeak-ng").arg("--version").output().is_ok()
    }

    #[test]
    fn splits_text_and_punctuation_parts() {
        let parts = split_text_parts("Hello, world. Testing!");
        assert_eq!(
            parts,
            vec![
                TextPart::Text("Hello".to_string()),
                TextPart::Punct(','),
                TextPart::Text("world".to_string()),
                TextPart::Punct('.'),
                TextPart::Text("Testing".to_string()),
                TextPart::Punct('!'),
            ]
        );
    }

    #[test]
    fn keeps_decimal_and_thousands_separators_inside_text() {
        let parts = split_text_parts("Version 2.0 reached 1,000 users.");
        assert_eq!(
            parts,
            vec![
                TextPart::Text("Version 2.0 reached 1,000 users".to_string()),
                TextPart::Punct('.'),
            ]
        );
    }

    #[test]
    fn full_width_punctuation_is_normalized() {
        let parts = split_text_parts("你好。世界！");
        assert_eq!(
            parts,
            vec![
                TextPart::Text("你好".to_string()),
                TextPart::Punct('.'),
                TextPart::Text("世界".to_string()),
                TextPart::Punct('!'),
            ]
        );
    }

    #[test]
    fn every_catalog_language_has_an_espeak_voice() {
        for code in ["a", "b", "e", "f", "h", "i", "j", "p", "z"] {
            assert!(espeak_language(code).is_some(), "{code}");
        }
        assert_eq!(espeak_language("q"), None);
    }

    #[test]
    fn pause_markers_are_removed() {
        assert_eq!(clean_ipa("  həlˈoʊ_ \n wˈɜːld\n"), "həlˈoʊ wˈɜːld");
    }

    #[test]
    fn appends_trailing_newline_once() {
        assert_eq!(newline_terminated("America"), "America\n");
        assert_eq!(newline_terminated("America\n"), "America\n");
    }

    #[test]
    fn phonemize_attaches_punctuation_and_keeps_terminal_schwa() {
        if !espeak_available() {
            return;
        }

        let vocab: HashMap<char, i64> = [(',', 3), ('ə', 83), (' ', 16)].into_iter().collect();
        let result = phonemize("America, America", "en-us", &vocab, &EspeakConfig::default())
            .expect("phonemize should succeed");
        assert!(result.ipa.contains("ə, "), "got {:?}", result.ipa);
        assert_eq!(result.ids.last(), Some(&83));
        assert!(result.ids.contains(&3));
    }
}

//! The voice catalog: voice ids, their display names and language codes.
//!
//! The built-in catalog is embedded from `resources/voices.json` and parsed
//! once per process.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;

use crate::error::TtsError;

const BUILTIN_VOICES: &str = include_str!("../resources/voices.json");

/// A selectable voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Asset id, e.g. `af_heart`.
    pub id: String,
    /// Name shown in the voice dropdown, e.g. `American Female 1`.
    pub name: String,
    /// Single-letter pipeline language code, e.g. `a`.
    pub lang_code: String,
}

#[derive(Deserialize)]
struct CatalogFile {
    voices: Vec<VoiceEntry>,
    lang_codes: HashMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct VoiceEntry {
    id: String,
    name: String,
}

#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    voices: Vec<Voice>,
}

impl VoiceCatalog {
    /// The catalog shipped with the crate.
    pub fn builtin() -> &'static VoiceCatalog {
        static CATALOG: OnceLock<VoiceCatalog> = OnceLock::new();
        CATALOG.get_or_init(|| {
            Self::from_json(BUILTIN_VOICES).unwrap_or_else(|e| {
                log::error!("Built-in voice catalog is invalid: {e}");
                Self { voices: Vec::new() }
            })
        })
    }

    /// Parse a catalog. Every voice id must start with one of the listed
    /// language prefixes.
    pub fn from_json(json: &str) -> Result<Self, TtsError> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| TtsError::Config(format!("voice catalog: {e}")))?;

        let mut voices = Vec::with_capacity(file.voices.len());
        for entry in file.voices {
            let lang_code = file
                .lang_codes
                .iter()
                .find(|(_, prefixes)| prefixes.iter().any(|p| entry.id.starts_with(p.as_str())))
                .map(|(code, _)| code.clone())
                .ok_or_else(|| {
                    TtsError::Config(format!("voice '{}' has no language code", entry.id))
                })?;
            voices.push(Voice {
                id: entry.id,
                name: entry.name,
                lang_code,
            });
        }

        if voices.is_empty() {
            return Err(TtsError::Config("voice catalog is empty".to_string()));
        }
        Ok(Self { voices })
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn get(&self, voice_id: &str) -> Option<&Voice> {
        self.voices.iter().find(|v| v.id == voice_id)
    }

    /// Reverse lookup by display name. The first voice with that name wins.
    pub fn by_display_name(&self, name: &str) -> Option<&Voice> {
        self.voices.iter().find(|v| v.name == name)
    }

    pub fn lang_code(&self, voice_id: &str) -> Option<&str> {
        self.get(voice_id).map(|v| v.lang_code.as_str())
    }

    /// Display names in catalog order, as offered by the voice dropdown.
    pub fn display_names(&self) -> Vec<&str> {
        self.voices.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn default_voice(&self) -> Option<&Voice> {
        self.voices.first()
    }
}

#[cfg(test)]
mod tests {
    use super::VoiceCatalog;

    #[test]
    fn builtin_catalog_maps_prefixes_to_language_codes() {
        let catalog = VoiceCatalog::builtin();
        assert_eq!(catalog.lang_code("af_heart"), Some("a"));
        assert_eq!(catalog.lang_code("bm_george"), Some("b"));
        assert_eq!(catalog.lang_code("jf_alpha"), Some("j"));
        assert_eq!(catalog.lang_code("zm_yunxi"), Some("z"));
        assert_eq!(catalog.lang_code("xx_nobody"), None);
    }

    #[test]
    fn default_voice_is_first_entry() {
        let catalog = VoiceCatalog::builtin();
        let first = catalog.default_voice().unwrap();
        assert_eq!(first.id, "af_heart");
        assert_eq!(first.name, "American Female 1");
        assert_eq!(catalog.display_names()[0], "American Female 1");
    }

    #[test]
    fn duplicate_display_names_resolve_to_first_match() {
        let catalog = VoiceCatalog::from_json(
            r#"{
                "voices": [
                    {"id": "af_one", "name": "Narrator"},
                    {"id": "bf_two", "name": "Narrator"}
                ],
                "lang_codes": {"a": ["af"], "b": ["bf"]}
            }"#,
        )
        .unwrap();
        assert_eq!(catalog.by_display_name("Narrator").unwrap().id, "af_one");
    }

    #[test]
    fn voice_without_language_prefix_is_rejected() {
        let err = VoiceCatalog::from_json(
            r#"{"voices": [{"id": "qq_x", "name": "X"}], "lang_codes": {"a": ["af"]}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("qq_x"));
    }
}

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use super::model::{KokoroError, STYLE_DIM};

/// Style vectors of one voice, indexed by phoneme token count.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleTable(Vec<[f32; STYLE_DIM]>);

impl StyleTable {
    /// Read a `<voice>.pt` file. The tensor storage is the zip entry ending in
    /// `/data/0`: little-endian f32 of shape `[N, 1, 256]`.
    pub fn load(path: &Path) -> Result<Self, KokoroError> {
        let file = File::open(path)?;
        Self::from_archive(file, &path.display().to_string())
    }

    fn from_archive<R: Read + Seek>(reader: R, name: &str) -> Result<Self, KokoroError> {
        let mut zip = zip::ZipArchive::new(reader)
            .map_err(|e| KokoroError::VoiceParse(format!("{name}: not a torch archive: {e}")))?;

        let entry_name = zip
            .file_names()
            .find(|entry| entry.ends_with("/data/0"))
            .map(str::to_string)
            .ok_or_else(|| KokoroError::VoiceParse(format!("{name}: no tensor storage found")))?;

        let mut data = Vec::new();
        zip.by_name(&entry_name)
            .map_err(|e| KokoroError::VoiceParse(format!("{name}: {e}")))?
            .read_to_end(&mut data)?;

        Self::from_le_bytes(&data, name)
    }

    fn from_le_bytes(data: &[u8], name: &str) -> Result<Self, KokoroError> {
        if data.len() % 4 != 0 {
            return Err(KokoroError::VoiceParse(format!(
                "{name}: float data length {} is not a multiple of 4",
                data.len()
            )));
        }

        let floats: Vec<f32> = data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if floats.is_empty() || floats.len() % STYLE_DIM != 0 {
            return Err(KokoroError::VoiceParse(format!(
                "{name}: float count {} is not a positive multiple of {STYLE_DIM}",
                floats.len()
            )));
        }

        let rows = floats
            .chunks_exact(STYLE_DIM)
            .map(|row| {
                let mut style = [0f32; STYLE_DIM];
                style.copy_from_slice(row);
                style
            })
            .collect();
        Ok(Self(rows))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Row `token_count - 1`, clamped to the table.
    pub fn for_token_count(&self, token_count: usize) -> &[f32; STYLE_DIM] {
        let idx = token_count
            .saturating_sub(1)
            .min(self.0.len().saturating_sub(1));
        &self.0[idx]
    }
}

/// Style tables loaded so far, keyed by voice id.
#[derive(Debug, Default)]
pub struct VoiceStore {
    voices: HashMap<String, StyleTable>,
}

impl VoiceStore {
    /// Table for `voice_id`, reading `path` on first use.
    pub fn get_or_load(&mut self, voice_id: &str, path: &Path) -> Result<&StyleTable, KokoroError> {
        if !self.voices.contains_key(voice_id) {
            let table = StyleTable::load(path)?;
            log::debug!("Loaded voice '{voice_id}' ({} styles)", table.len());
            self.voices.insert(voice_id.to_string(), table);
        }
        self.voices
            .get(voice_id)
            .ok_or_else(|| KokoroError::VoiceParse(voice_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

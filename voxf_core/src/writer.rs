use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::debug;

use crate::codec::Codec;
use crate::config::CodecConfig;
use crate::error::{Error, Result};
use crate::format::{FormatHeader, CURRENT_VERSION};
use crate::world::{ChunkSelector, SaveReport, WorldRecord};

/// Serializes worlds into VOXF files.
///
/// # Format layout written
/// ```text
/// [HEADER: 13 bytes, never compressed]
/// [ENVELOPE: codec.compress_payload(payload)]
/// ```
/// Output is a pure function of the world, the config and the codec: saving
/// the same world twice gives identical bytes.
pub struct WorldWriter {
    codec: Box<dyn Codec>,
    config: CodecConfig,
    selector: ChunkSelector,
}

impl WorldWriter {
    pub fn new(codec: Box<dyn Codec>) -> Self {
        Self {
            codec,
            config: CodecConfig::default(),
            selector: ChunkSelector::All,
        }
    }

    /// The codec named in `config` is resolved by the caller; only the
    /// encoding knobs are read here.
    pub fn with_config(mut self, config: CodecConfig) -> Self {
        self.config = config;
        self
    }

    /// Save only the chunks `selector` accepts.
    pub fn with_selector(mut self, selector: ChunkSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub fn save(&self, world: &WorldRecord) -> Result<Vec<u8>> {
        self.save_with_report(world).map(|(bytes, _)| bytes)
    }

    pub fn save_with_report(&self, world: &WorldRecord) -> Result<(Vec<u8>, SaveReport)> {
        let (payload, mut report) = world.encode_payload(&self.config, &self.selector)?;
        let raw_len = u32::try_from(payload.len())
            .map_err(|_| Error::Invalid(format!("payload of {} bytes is too large", payload.len())))?;

        let compressed = self
            .codec
            .compress_payload(&payload)
            .map_err(|e| Error::Compression(e.into()))?;

        let header = FormatHeader {
            version: CURRENT_VERSION,
            codec_id: self.codec.id(),
            raw_len,
        };
        let mut out = Vec::with_capacity(header.to_bytes().len() + compressed.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&compressed);

        report.file_len = out.len();
        debug!(
            "saved {} chunks with {}: {} sections ({} empty, {} direct), {} block states, {} -> {} bytes",
            report.chunks,
            self.codec.name(),
            report.sections,
            report.empty_sections,
            report.direct_sections,
            report.global_palette_len,
            report.raw_len,
            report.file_len
        );
        Ok((out, report))
    }

    /// Save to `path`, overwriting any existing file.
    pub fn save_to_path(&self, world: &WorldRecord, path: impl AsRef<Path>) -> Result<SaveReport> {
        let (bytes, report) = self.save_with_report(world)?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(report)
    }
}

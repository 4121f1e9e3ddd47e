use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::codec::Codec;
use crate::config::CodecConfig;
use crate::converter::DataConverter;
use crate::error::{Error, Result};
use crate::format::{FormatHeader, CURRENT_VERSION, HEADER_SIZE};
use crate::legacy;
use crate::migration::MigrationChain;
use crate::world::{ChunkSelector, DecodeOptions, WorldRecord};

/// What a load found besides the world itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Version the file was written in.
    pub source_version: u32,
    pub migrated: bool,
    pub raw_len: usize,
    pub chunks: usize,
}

/// Parses VOXF files back into [`WorldRecord`]s.
///
/// # Load sequence
/// 1. Read the 13-byte header (magic check, version, codec id, raw length).
/// 2. Reject versions newer than this build understands.
/// 3. Strip the envelope and check the raw length.
/// 4. Older versions go through the raw tree and the migration chain, then
///    everything is decoded by the same current-version decoder.
pub struct WorldReader {
    codec: Arc<dyn Codec>,
    migrations: MigrationChain,
    converter: Option<Arc<dyn DataConverter>>,
    selector: ChunkSelector,
    parallel: bool,
}

impl WorldReader {
    /// `codec` must match the codec id stored in the file header. Use
    /// [`WorldReader::peek_header`] and `voxf_codecs::codec_by_id` to pick
    /// one from the file itself.
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self {
            codec,
            migrations: MigrationChain::builtin(),
            converter: None,
            selector: ChunkSelector::All,
            parallel: CodecConfig::default().parallel,
        }
    }

    pub fn with_config(mut self, config: &CodecConfig) -> Self {
        self.parallel = config.parallel;
        self
    }

    pub fn with_migrations(mut self, migrations: MigrationChain) -> Self {
        self.migrations = migrations;
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn DataConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Decode only the chunks `selector` accepts; the rest are skipped
    /// unread.
    pub fn with_selector(mut self, selector: ChunkSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn migrations_mut(&mut self) -> &mut MigrationChain {
        &mut self.migrations
    }

    /// Parse just the header of a file.
    pub fn peek_header(bytes: &[u8]) -> Result<FormatHeader> {
        FormatHeader::from_bytes(bytes)
    }

    pub fn load(&self, bytes: &[u8]) -> Result<WorldRecord> {
        self.load_with_report(bytes).map(|(world, _)| world)
    }

    pub fn load_from_path(&self, path: impl AsRef<Path>) -> Result<WorldRecord> {
        let bytes = std::fs::read(path)?;
        self.load(&bytes)
    }

    pub fn load_with_report(&self, bytes: &[u8]) -> Result<(WorldRecord, LoadReport)> {
        // ── Header ─────────────────────────────────────────────────────────
        let header = FormatHeader::from_bytes(bytes)?;
        if header.version == 0 || header.version > CURRENT_VERSION {
            return Err(Error::UnsupportedVersion {
                found: header.version,
                supported: CURRENT_VERSION,
            });
        }
        if header.codec_id != self.codec.id() {
            return Err(Error::CodecMismatch {
                found: header.codec_id,
                expected: self.codec.id(),
            });
        }
        if header.version < CURRENT_VERSION {
            self.migrations.check_path(header.version, CURRENT_VERSION)?;
        }

        // ── Envelope ───────────────────────────────────────────────────────
        let raw_len = header.raw_len as usize;
        let mut payload = self
            .codec
            .decompress_payload(&bytes[HEADER_SIZE..], raw_len)
            .map_err(|e| Error::Decompression(e.into()))?;
        if payload.len() != raw_len {
            return Err(Error::Decompression(
                format!(
                    "{} envelope produced {} bytes but the header promises {raw_len}",
                    self.codec.name(),
                    payload.len()
                )
                .into(),
            ));
        }

        // ── Migration ──────────────────────────────────────────────────────
        let migrated = header.version < CURRENT_VERSION;
        if migrated {
            debug!("migrating world from version {} to {CURRENT_VERSION}", header.version);
            let tree = legacy::read_tree(&payload, header.version)?;
            let tree = self.migrations.upgrade(tree, header.version, CURRENT_VERSION)?;
            payload = legacy::lower_current(&tree)?;
        }

        let options = DecodeOptions {
            selector: self.selector.clone(),
            converter: self.converter.as_deref(),
            parallel: self.parallel,
        };
        let world = WorldRecord::decode_payload(&payload, &options)?;
        let report = LoadReport {
            source_version: header.version,
            migrated,
            raw_len,
            chunks: world.chunk_count(),
        };
        debug!(
            "loaded {} chunks from a version {} file ({} raw bytes)",
            report.chunks, report.source_version, report.raw_len
        );
        Ok((world, report))
    }
}

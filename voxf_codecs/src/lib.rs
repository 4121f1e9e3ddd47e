mod gzip_codec;
mod lz4_codec;
mod passthrough;
mod zstd_codec;

pub use gzip_codec::GzipCodec;
pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use zstd_codec::ZstdCodec;

use std::path::Path;
use std::sync::Arc;

use log::debug;
use voxf_core::format::{CODEC_GZIP, CODEC_LZ4, CODEC_PASSTHROUGH, CODEC_ZSTD};
use voxf_core::{Codec, CodecConfig, Error, CURRENT_VERSION, SaveReport, WorldReader, WorldRecord, WorldWriter};

/// Resolve a codec from the id stored in a file header.
///
/// Compression levels are not stored in files and are irrelevant when
/// decoding, so defaults are returned.
pub fn codec_by_id(id: u8) -> voxf_core::Result<Arc<dyn Codec>> {
    match id {
        CODEC_PASSTHROUGH => Ok(Arc::new(PassThroughCodec)),
        CODEC_ZSTD => Ok(Arc::new(ZstdCodec::default())),
        CODEC_LZ4 => Ok(Arc::new(Lz4Codec)),
        CODEC_GZIP => Ok(Arc::new(GzipCodec::default())),
        other => Err(Error::UnknownCodec(other)),
    }
}

/// Resolve the codec a config asks for, with its level applied.
pub fn codec_from_config(config: &CodecConfig) -> voxf_core::Result<Box<dyn Codec>> {
    match config.codec.as_str() {
        "passthrough" | "none" => Ok(Box::new(PassThroughCodec)),
        "zstd" => Ok(Box::new(ZstdCodec::new(config.zstd_level))),
        "lz4" => Ok(Box::new(Lz4Codec)),
        "gzip" => Ok(Box::new(GzipCodec::default())),
        other => Err(Error::Invalid(format!(
            "unknown codec {other:?}; expected passthrough, zstd, lz4 or gzip"
        ))),
    }
}

/// Save with the codec and knobs from `config`.
pub fn save_world(world: &WorldRecord, config: &CodecConfig) -> voxf_core::Result<(Vec<u8>, SaveReport)> {
    let writer = WorldWriter::new(codec_from_config(config)?).with_config(config.clone());
    writer.save_with_report(world)
}

/// Load a file with whichever bundled codec its header names.
pub fn load_world(bytes: &[u8]) -> voxf_core::Result<WorldRecord> {
    reader_for(bytes)?.load(bytes)
}

/// A reader set up for the codec `bytes` was written with. Further options
/// (selector, converter, migrations) can be chained onto it.
pub fn reader_for(bytes: &[u8]) -> voxf_core::Result<WorldReader> {
    let header = WorldReader::peek_header(bytes)?;
    if header.version > CURRENT_VERSION {
        return Err(Error::UnsupportedVersion {
            found: header.version,
            supported: CURRENT_VERSION,
        });
    }
    let codec = codec_by_id(header.codec_id)?;
    debug!("file version {} uses the {} envelope", header.version, codec.name());
    Ok(WorldReader::new(codec))
}

pub fn load_world_from_path(path: impl AsRef<Path>) -> voxf_core::Result<WorldRecord> {
    let bytes = std::fs::read(path)?;
    load_world(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn payload() -> Vec<u8> {
        let pattern = b"minecraft:stone minecraft:dirt minecraft:air ";
        (0..20_000).map(|i| pattern[i % pattern.len()]).collect()
    }

    fn all() -> Vec<Box<dyn Codec>> {
        vec![
            Box::new(PassThroughCodec),
            Box::new(ZstdCodec::default()),
            Box::new(Lz4Codec),
            Box::new(GzipCodec::default()),
        ]
    }

    #[test]
    fn every_envelope_restores_the_payload() {
        let raw = payload();
        for codec in all() {
            let packed = codec.compress_payload(&raw).unwrap();
            if codec.id() != CODEC_PASSTHROUGH {
                assert!(packed.len() < raw.len(), "{} did not shrink repetitive input", codec.name());
            }
            assert_eq!(codec.decompress_payload(&packed, raw.len()).unwrap(), raw, "{}", codec.name());
        }
    }

    #[test]
    fn ids_resolve_to_the_same_codec() {
        for codec in all() {
            assert_eq!(codec_by_id(codec.id()).unwrap().name(), codec.name());
        }
        assert_matches!(codec_by_id(42), Err(Error::UnknownCodec(42)));
    }

    #[test]
    fn config_names_resolve() {
        let config = CodecConfig {
            codec: "lz4".into(),
            ..CodecConfig::default()
        };
        assert_eq!(codec_from_config(&config).unwrap().id(), CODEC_LZ4);
        let config = CodecConfig {
            codec: "brotli".into(),
            ..CodecConfig::default()
        };
        assert_matches!(codec_from_config(&config), Err(Error::Invalid(_)));
    }

    #[test]
    fn envelopes_reject_a_wrong_raw_length() {
        let raw = payload();
        for codec in [Box::new(ZstdCodec::default()) as Box<dyn Codec>, Box::new(Lz4Codec)] {
            let packed = codec.compress_payload(&raw).unwrap();
            assert!(codec.decompress_payload(&packed, raw.len() - 1).is_err(), "{}", codec.name());
        }
        let gzip = GzipCodec::default();
        let packed = gzip.compress_payload(&raw).unwrap();
        assert_eq!(gzip.decompress_payload(&packed, 10).unwrap().len(), 11);
    }

    #[test]
    fn corrupt_envelopes_fail() {
        let raw = payload();
        for codec in all().into_iter().filter(|c| c.id() != CODEC_PASSTHROUGH) {
            let mut packed = codec.compress_payload(&raw).unwrap();
            packed.truncate(packed.len() / 2);
            let result = codec.decompress_payload(&packed, raw.len());
            assert!(
                result.map_or(true, |out| out != raw),
                "{} accepted a truncated envelope",
                codec.name()
            );
        }
    }
}

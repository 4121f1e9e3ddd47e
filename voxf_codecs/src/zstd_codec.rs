use log::warn;
use voxf_core::codec::Codec;
use voxf_core::format::CODEC_ZSTD;

pub const DEFAULT_LEVEL: i32 = 3;

/// Zstandard envelope, the default for new files.
///
/// The header's raw length bounds the decompression buffer, so a frame that
/// claims a larger content size is rejected instead of allocated.
pub struct ZstdCodec {
    level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: DEFAULT_LEVEL }
    }
}

impl ZstdCodec {
    /// Levels outside what the linked zstd supports are clamped.
    pub fn new(level: i32) -> Self {
        let range = zstd::compression_level_range();
        let clamped = level.clamp(*range.start(), *range.end());
        if clamped != level {
            warn!("zstd level {level} out of range, using {clamped}");
        }
        Self { level: clamped }
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Codec for ZstdCodec {
    fn id(&self) -> u8 {
        CODEC_ZSTD
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress_payload(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(zstd::bulk::compress(raw, self.level)?)
    }

    fn decompress_payload(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        Ok(zstd::bulk::decompress(compressed, raw_len)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_level_is_clamped() {
        let max = *zstd::compression_level_range().end();
        assert_eq!(ZstdCodec::new(max + 10).level(), max);
        assert_eq!(ZstdCodec::new(7).level(), 7);
        assert_eq!(ZstdCodec::default().level(), DEFAULT_LEVEL);
    }
}

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use voxf_core::codec::Codec;
use voxf_core::format::CODEC_LZ4;

/// LZ4 block envelope with the uncompressed size prepended.
///
/// Fastest to decode of the bundled codecs, at a lower ratio than zstd.
/// Best for worlds that are loaded far more often than they are saved.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn id(&self) -> u8 {
        CODEC_LZ4
    }

    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress_payload(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compress_prepend_size(raw))
    }

    fn decompress_payload(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        let prefix = compressed
            .get(..4)
            .ok_or_else(|| anyhow::anyhow!("lz4 envelope shorter than its size prefix"))?;
        let claimed = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if claimed != raw_len {
            anyhow::bail!("lz4 envelope claims {} bytes but the header says {}", claimed, raw_len);
        }
        let raw = decompress_size_prepended(compressed)
            .map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))?;
        Ok(raw)
    }
}

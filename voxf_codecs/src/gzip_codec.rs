use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use voxf_core::codec::Codec;
use voxf_core::format::CODEC_GZIP;

/// Gzip envelope, for tooling that can only inflate.
pub struct GzipCodec {
    /// 0 = store, 9 = smallest.
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl Codec for GzipCodec {
    fn id(&self) -> u8 {
        CODEC_GZIP
    }

    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress_payload(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level.min(9)));
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }

    fn decompress_payload(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(raw_len);
        // read one byte past raw_len so an oversized stream shows up as a length mismatch
        GzDecoder::new(compressed)
            .take(raw_len as u64 + 1)
            .read_to_end(&mut raw)?;
        Ok(raw)
    }
}

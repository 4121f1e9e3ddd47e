use voxf_core::codec::Codec;
use voxf_core::format::CODEC_PASSTHROUGH;

/// No-op envelope: the payload is stored verbatim.
///
/// Useful for:
/// - Inspecting payload bytes with a hex editor.
/// - Hosts that compress the file again at a different layer.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn id(&self) -> u8 {
        CODEC_PASSTHROUGH
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress_payload(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_payload(&self, compressed: &[u8], _raw_len: usize) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}

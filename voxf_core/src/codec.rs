/// Compression envelope wrapped around a world payload.
///
/// Each `Codec` implementation:
/// - Is identified by a stable numeric `id()` stored in the VOXF header.
/// - Compresses the whole payload in one call; the header already records
///   the raw length, which is handed back as a hint on decompress.
pub trait Codec: Send + Sync {
    /// Stable codec ID stored in the file header.
    fn id(&self) -> u8;

    /// Human-readable name, as used in `CodecConfig::codec`.
    fn name(&self) -> &'static str;

    fn compress_payload(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// `raw_len` is the length the header promises. Implementations may use
    /// it to size buffers but must not trust it beyond that; the reader
    /// checks the result.
    fn decompress_payload(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>>;
}

impl std::fmt::Debug for dyn Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").field("id", &self.id()).field("name", &self.name()).finish()
    }
}

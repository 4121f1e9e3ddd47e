use crate::error::{Error, Result};

/// Magic bytes opening every VOXF file.
pub const MAGIC: &[u8; 4] = b"VOXF";

/// Fixed size of the uncompressed file header in bytes.
///   magic[4] + version:u32 + codec_id:u8 + raw_len:u32
///   = 4 + 4 + 1 + 4 = 13
pub const HEADER_SIZE: usize = 13;

// ── Versions ───────────────────────────────────────────────────────────────

/// Initial layout: one optional heightmap, a single light flag per section.
pub const VERSION_INITIAL: u32 = 1;
/// Adds the data version, world and chunk user data, optional block entity data.
pub const VERSION_USER_DATA: u32 = 2;
/// Per-layer light content, named heightmaps, `short_grass` rename.
pub const VERSION_LIGHT_CONTENT: u32 = 3;

pub const CURRENT_VERSION: u32 = VERSION_LIGHT_CONTENT;

// ── Codec IDs ──────────────────────────────────────────────────────────────

pub const CODEC_PASSTHROUGH: u8 = 0;
pub const CODEC_ZSTD: u8 = 1;
pub const CODEC_LZ4: u8 = 2;
pub const CODEC_GZIP: u8 = 3;

// ── Header ─────────────────────────────────────────────────────────────────

/// The only part of a file that is never compressed. Its layout is the same
/// in every version, so any reader can at least tell which version it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    pub version: u32,
    pub codec_id: u8,
    /// Length of the payload once the envelope is removed.
    pub raw_len: u32,
}

impl FormatHeader {
    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..4].copy_from_slice(MAGIC);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8] = self.codec_id;
        buf[9..13].copy_from_slice(&self.raw_len.to_le_bytes());
        buf
    }

    /// Parse the header at the start of `buf`, checking the magic before
    /// anything else.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < MAGIC.len() {
            return Err(Error::Truncated {
                needed: MAGIC.len(),
                remaining: buf.len(),
            });
        }
        if &buf[..4] != MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(&buf[..4]);
            return Err(Error::InvalidMagic { found });
        }
        if buf.len() < HEADER_SIZE {
            return Err(Error::Truncated {
                needed: HEADER_SIZE,
                remaining: buf.len(),
            });
        }
        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        Ok(Self {
            version: word(4),
            codec_id: buf[8],
            raw_len: word(9),
        })
    }
}

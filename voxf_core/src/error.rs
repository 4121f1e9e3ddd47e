use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed source error carried out of a compression envelope.
pub type EnvelopeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every way an encode or decode can fail.
///
/// All variants are terminal for the operation that produced them: the codec
/// never substitutes default data for a section or chunk it could not read.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid magic bytes {found:02x?}; not a VOXF world file")]
    InvalidMagic { found: [u8; 4] },

    #[error("unsupported VOXF version {found} (this reader handles versions 1 through {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("no upgrader registered for version {from} -> {}", .from + 1)]
    MigrationGap { from: u32 },

    #[error("unknown codec id {0}")]
    UnknownCodec(u8),

    #[error("codec mismatch: file uses codec {found} but provided codec has id {expected}")]
    CodecMismatch { found: u8, expected: u8 },

    #[error("payload compression failed: {0}")]
    Compression(#[source] EnvelopeError),

    #[error("payload decompression failed: {0}")]
    Decompression(#[source] EnvelopeError),

    #[error("malformed tag: {0}")]
    MalformedTag(String),

    #[error("palette index {index} out of range for a palette of {palette_len} entries")]
    PaletteIndexOutOfRange { index: u32, palette_len: usize },

    #[error("chunk has {found} sections but the world is configured for {expected}")]
    ChunkHeightMismatch { expected: usize, found: usize },

    #[error("unexpected end of data: needed {needed} bytes but only {remaining} remain")]
    Truncated { needed: usize, remaining: usize },

    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("invalid world data: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("chunk ({x}, {z}): {source}")]
    Chunk {
        x: i32,
        z: i32,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Error::Malformed {
            what,
            reason: reason.into(),
        }
    }

    /// Attach a chunk coordinate to an error raised while that chunk was
    /// being encoded or decoded.
    pub(crate) fn in_chunk(self, x: i32, z: i32) -> Self {
        match self {
            already @ Error::Chunk { .. } => already,
            other => Error::Chunk {
                x,
                z,
                source: Box::new(other),
            },
        }
    }

    /// The violated invariant, with any chunk-coordinate context stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::Chunk { source, .. } => source.root(),
            other => other,
        }
    }

    /// Coordinate of the chunk being processed when the error was raised.
    pub fn chunk_coordinate(&self) -> Option<(i32, i32)> {
        match self {
            Error::Chunk { x, z, .. } => Some((*x, *z)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_context_is_not_nested_twice() {
        let err = Error::Truncated {
            needed: 4,
            remaining: 1,
        }
        .in_chunk(3, -2)
        .in_chunk(9, 9);

        assert_eq!(err.chunk_coordinate(), Some((3, -2)));
        assert!(matches!(err.root(), Error::Truncated { needed: 4, .. }));
        assert!(err.to_string().starts_with("chunk (3, -2): unexpected end"));
    }

    #[test]
    fn migration_gap_names_both_versions() {
        let err = Error::MigrationGap { from: 2 };
        assert_eq!(err.to_string(), "no upgrader registered for version 2 -> 3");
    }
}

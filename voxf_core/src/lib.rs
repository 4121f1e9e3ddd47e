//! VOXF: a compact, versioned binary format for voxel-world state.
//!
//! A world is a set of chunk columns, each a vertical stack of 16³ sections.
//! Block states are deduplicated twice, once per world in a global palette
//! and once per section in a local palette, and section cells are bit packed
//! at the narrowest width the palette allows. The payload is wrapped in a
//! pluggable compression envelope (see `voxf_codecs`) behind a small fixed
//! header.

pub mod block;
pub mod buffer;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod converter;
pub mod error;
pub mod format;
pub mod host;
mod legacy;
pub mod migration;
pub mod palette;
pub mod reader;
pub mod section;
pub mod tag;
pub mod world;
pub mod writer;

pub use block::{BlockState, GlobalBlockPalette};
pub use chunk::{BlockEntity, Chunk, ChunkPos, HeightmapKind};
pub use codec::Codec;
pub use config::CodecConfig;
pub use converter::{DataConverter, NoopConverter, UNKNOWN_DATA_VERSION};
pub use error::{Error, Result};
pub use format::{FormatHeader, CURRENT_VERSION, HEADER_SIZE, MAGIC};
pub use host::{restore, snapshot, WorldSink, WorldSource};
pub use migration::MigrationChain;
pub use palette::{Palette, PalettedArray};
pub use reader::{LoadReport, WorldReader};
pub use section::{Light, Section, SectionEncoding, StorageMode};
pub use tag::Tag;
pub use world::{ChunkSelector, SaveReport, SectionRange, WorldRecord};
pub use writer::WorldWriter;

//! The in-memory world and its uncompressed payload.
//!
//! # Payload layout (current version)
//! ```text
//! [min section: i8][max section: i8][data version: i32][user data: tag]
//! [global palette: u32 count + block states]
//! [chunk count: u32]
//! [chunk 0: u32 byte length + record] ... sorted by (x, z)
//! ```
//! Chunk records carry their own length so a reader can skip chunks it was
//! not asked for and hand the rest to worker threads.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::BufMut;
use log::{debug, trace, warn};
use rayon::prelude::*;

use crate::block::GlobalBlockPalette;
use crate::buffer::{put_bytes, put_len, ByteReader};
use crate::chunk::{Chunk, ChunkPos, ChunkStats};
use crate::config::CodecConfig;
use crate::converter::{self, DataConverter, UNKNOWN_DATA_VERSION};
use crate::error::{Error, Result};
use crate::format::CURRENT_VERSION;
use crate::palette::Palette;
use crate::section::{Section, SECTION_EDGE};
use crate::tag::Tag;

// ── Section range ──────────────────────────────────────────────────────────

/// Inclusive vertical extent of every chunk, in sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionRange {
    min: i8,
    max: i8,
}

impl SectionRange {
    /// The overworld height of current releases, y = -64..320.
    pub const OVERWORLD: SectionRange = SectionRange { min: -4, max: 19 };

    pub fn new(min: i8, max: i8) -> Result<Self> {
        if min > max {
            return Err(Error::Invalid(format!("section range {min}..={max} is inverted")));
        }
        let range = Self { min, max };
        if range.count() > usize::from(u8::MAX) {
            return Err(Error::Invalid(format!(
                "section range {min}..={max} holds more than {} sections",
                u8::MAX
            )));
        }
        Ok(range)
    }

    pub fn min(&self) -> i8 {
        self.min
    }

    pub fn max(&self) -> i8 {
        self.max
    }

    pub fn count(&self) -> usize {
        (i16::from(self.max) - i16::from(self.min) + 1) as usize
    }

    pub fn min_block_y(&self) -> i32 {
        i32::from(self.min) * SECTION_EDGE as i32
    }

    /// One past the highest block y.
    pub fn max_block_y(&self) -> i32 {
        (i32::from(self.max) + 1) * SECTION_EDGE as i32
    }
}

impl Default for SectionRange {
    fn default() -> Self {
        Self::OVERWORLD
    }
}

// ── Chunk selection ────────────────────────────────────────────────────────

/// Which chunks a save or load should touch.
#[derive(Clone, Default)]
pub enum ChunkSelector {
    #[default]
    All,
    /// Chunks whose euclidean distance from `center` is at most `radius`.
    Radius { center: ChunkPos, radius: u32 },
    Custom(Arc<dyn Fn(ChunkPos) -> bool + Send + Sync>),
}

impl ChunkSelector {
    pub fn radius(center_x: i32, center_z: i32, radius: u32) -> Self {
        ChunkSelector::Radius {
            center: ChunkPos::new(center_x, center_z),
            radius,
        }
    }

    pub fn custom(test: impl Fn(ChunkPos) -> bool + Send + Sync + 'static) -> Self {
        ChunkSelector::Custom(Arc::new(test))
    }

    pub fn test(&self, pos: ChunkPos) -> bool {
        match self {
            ChunkSelector::All => true,
            ChunkSelector::Radius { center, radius } => {
                center.distance_squared(&pos) <= u64::from(*radius) * u64::from(*radius)
            }
            ChunkSelector::Custom(test) => test(pos),
        }
    }
}

impl fmt::Debug for ChunkSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkSelector::All => f.write_str("All"),
            ChunkSelector::Radius { center, radius } => f
                .debug_struct("Radius")
                .field("center", center)
                .field("radius", radius)
                .finish(),
            ChunkSelector::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ── Save report ────────────────────────────────────────────────────────────

/// What a save produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub chunks: usize,
    pub sections: usize,
    pub empty_sections: usize,
    pub direct_sections: usize,
    pub global_palette_len: usize,
    /// Payload bytes before the envelope.
    pub raw_len: usize,
    /// Header plus envelope bytes.
    pub file_len: usize,
}

impl SaveReport {
    pub fn ratio(&self) -> f64 {
        if self.file_len == 0 {
            return 1.0;
        }
        self.raw_len as f64 / self.file_len as f64
    }
}

// ── World ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct WorldRecord {
    /// Format version of the in-memory layout. Loading always yields the
    /// current version, whatever the file was stored as.
    pub version: u32,
    /// Game data version, or [`UNKNOWN_DATA_VERSION`].
    pub data_version: i32,
    pub user_data: Tag,
    range: SectionRange,
    chunks: BTreeMap<ChunkPos, Chunk>,
}

impl Default for WorldRecord {
    fn default() -> Self {
        Self::new(SectionRange::default())
    }
}

impl WorldRecord {
    pub fn new(range: SectionRange) -> Self {
        Self {
            version: CURRENT_VERSION,
            data_version: UNKNOWN_DATA_VERSION,
            user_data: Tag::compound(),
            range,
            chunks: BTreeMap::new(),
        }
    }

    pub fn section_range(&self) -> SectionRange {
        self.range
    }

    pub fn section_count(&self) -> usize {
        self.range.count()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, x: i32, z: i32) -> Option<&Chunk> {
        self.chunks.get(&ChunkPos::new(x, z))
    }

    pub fn chunk_mut(&mut self, x: i32, z: i32) -> Option<&mut Chunk> {
        self.chunks.get_mut(&ChunkPos::new(x, z))
    }

    /// The chunk at `(x, z)`, created full of empty sections if absent.
    pub fn chunk_or_insert(&mut self, x: i32, z: i32) -> &mut Chunk {
        let count = self.range.count();
        self.chunks
            .entry(ChunkPos::new(x, z))
            .or_insert_with(|| Chunk::new(x, z, count))
    }

    /// Insert or replace a chunk. Its height must match the world's.
    pub fn insert_chunk(&mut self, chunk: Chunk) -> Result<Option<Chunk>> {
        if chunk.sections.len() != self.range.count() {
            return Err(Error::ChunkHeightMismatch {
                expected: self.range.count(),
                found: chunk.sections.len(),
            }
            .in_chunk(chunk.x, chunk.z));
        }
        Ok(self.chunks.insert(chunk.pos(), chunk))
    }

    pub fn remove_chunk(&mut self, x: i32, z: i32) -> Option<Chunk> {
        self.chunks.remove(&ChunkPos::new(x, z))
    }

    /// Chunks in coordinate order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> + '_ {
        self.chunks.values()
    }

    pub fn chunk_positions(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.chunks.keys().copied()
    }

    /// Change the world height. Sections keep their index from the bottom:
    /// chunks are padded with empty sections at the top or lose their top
    /// sections.
    pub fn set_section_range(&mut self, min: i8, max: i8) -> Result<()> {
        let range = SectionRange::new(min, max)?;
        let count = range.count();
        for chunk in self.chunks.values_mut() {
            chunk.sections.resize_with(count, Section::empty);
        }
        self.range = range;
        Ok(())
    }

    /// Collect the block states used by selected chunks, in chunk then
    /// section order. Must finish before any chunk is encoded.
    fn global_palette(&self, chunks: &[&Chunk]) -> GlobalBlockPalette {
        let mut palette = Palette::new();
        for chunk in chunks {
            for section in chunk.sections.iter().filter(|s| !s.is_empty()) {
                for state in section.block_palette().values() {
                    palette.insert(state);
                }
            }
        }
        GlobalBlockPalette::from_palette(palette)
    }

    /// Serialize the selected chunks into an uncompressed current-version
    /// payload.
    pub fn encode_payload(&self, config: &CodecConfig, selector: &ChunkSelector) -> Result<(Vec<u8>, SaveReport)> {
        config.validate()?;
        let mut selected: Vec<&Chunk> = Vec::with_capacity(self.chunks.len());
        for (pos, chunk) in &self.chunks {
            if chunk.pos() != *pos {
                return Err(Error::Invalid(format!("chunk stored at {pos} claims to be at {}", chunk.pos()))
                    .in_chunk(pos.x, pos.z));
            }
            if selector.test(*pos) {
                selected.push(chunk);
            }
        }
        let global = self.global_palette(&selected);
        let expected = self.range.count();
        let threshold = config.direct_threshold_bits;

        let encode_one = |chunk: &&Chunk| -> Result<(Vec<u8>, ChunkStats)> {
            let mut buf = Vec::new();
            let stats = chunk.encode(&global, expected, threshold, &mut buf)?;
            trace!("encoded chunk {} into {} bytes", chunk.pos(), buf.len());
            Ok((buf, stats))
        };
        let records: Vec<(Vec<u8>, ChunkStats)> = if config.parallel {
            selected.par_iter().map(encode_one).collect::<Result<_>>()?
        } else {
            selected.iter().map(encode_one).collect::<Result<_>>()?
        };

        let mut buf = Vec::with_capacity(records.iter().map(|(r, _)| r.len() + 4).sum::<usize>() + 64);
        buf.put_i8(self.range.min);
        buf.put_i8(self.range.max);
        buf.put_i32_le(self.data_version);
        self.user_data.encode(&mut buf)?;
        global.encode(&mut buf)?;

        let mut stats = ChunkStats::default();
        put_len(&mut buf, records.len(), "chunk list")?;
        for (record, chunk_stats) in &records {
            put_bytes(&mut buf, record)?;
            stats.merge(*chunk_stats);
        }

        let report = SaveReport {
            chunks: records.len(),
            sections: stats.sections,
            empty_sections: stats.empty_sections,
            direct_sections: stats.direct_sections,
            global_palette_len: global.len(),
            raw_len: buf.len(),
            file_len: 0,
        };
        Ok((buf, report))
    }

    /// Parse a current-version payload.
    pub fn decode_payload(payload: &[u8], options: &DecodeOptions<'_>) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let min = r.read_i8()?;
        let max = r.read_i8()?;
        let range = SectionRange::new(min, max).map_err(|e| Error::malformed("section range", e.to_string()))?;
        let stored_data_version = r.read_i32()?;
        let user_data = Tag::decode(&mut r)?;
        let mut global = GlobalBlockPalette::decode(&mut r)?;

        let (data_version, conversion) = match options.converter {
            Some(conv) => {
                let (from, to) = converter::plan(stored_data_version, conv);
                if let Some(to) = to {
                    warn!("converting world data from version {from} to {to}");
                    conv.convert_block_palette(&mut global, from, to);
                }
                (to.unwrap_or(from), to.map(|to| (conv, from, to)))
            }
            None => (stored_data_version, None),
        };

        let chunk_count = r.read_len(4)?;
        let mut records = Vec::with_capacity(chunk_count);
        let mut skipped = 0usize;
        for _ in 0..chunk_count {
            let record = r.read_bytes()?;
            let pos = peek_pos(record)?;
            if options.selector.test(pos) {
                records.push(record);
            } else {
                skipped += 1;
            }
        }
        r.expect_end("world payload")?;

        let expected = range.count();
        let decode_one = |record: &&[u8]| -> Result<Chunk> {
            let mut cr = ByteReader::new(record);
            let mut chunk = Chunk::decode(&mut cr, &global, expected)?;
            cr.expect_end("chunk record").map_err(|e| e.in_chunk(chunk.x, chunk.z))?;
            if let Some((conv, from, to)) = conversion {
                for entity in &mut chunk.block_entities {
                    conv.convert_block_entity(entity, from, to);
                }
            }
            Ok(chunk)
        };
        let decoded: Vec<Chunk> = if options.parallel {
            records.par_iter().map(decode_one).collect::<Result<_>>()?
        } else {
            records.iter().map(decode_one).collect::<Result<_>>()?
        };

        let mut chunks = BTreeMap::new();
        for chunk in decoded {
            let (x, z) = (chunk.x, chunk.z);
            if chunks.insert(chunk.pos(), chunk).is_some() {
                return Err(Error::malformed("chunk list", "coordinate stored twice").in_chunk(x, z));
            }
        }
        debug!(
            "decoded {} chunks ({} skipped), {} block states, sections {min}..={max}",
            chunks.len(),
            skipped,
            global.len()
        );

        Ok(Self {
            version: CURRENT_VERSION,
            data_version,
            user_data,
            range,
            chunks,
        })
    }
}

/// Knobs for [`WorldRecord::decode_payload`].
#[derive(Clone, Default)]
pub struct DecodeOptions<'a> {
    pub selector: ChunkSelector,
    pub converter: Option<&'a dyn DataConverter>,
    pub parallel: bool,
}

fn peek_pos(record: &[u8]) -> Result<ChunkPos> {
    let mut r = ByteReader::new(record);
    Ok(ChunkPos::new(r.read_i32()?, r.read_i32()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockState;
    use crate::chunk::BlockEntity;

    fn options() -> DecodeOptions<'static> {
        DecodeOptions {
            parallel: true,
            ..DecodeOptions::default()
        }
    }

    fn sample() -> WorldRecord {
        let mut world = WorldRecord::new(SectionRange::new(-1, 2).unwrap());
        world.data_version = 3700;
        world.user_data = Tag::compound().with("name", "spawn");
        for (x, z) in [(0, 0), (-1, 4), (2, -2)] {
            let chunk = world.chunk_or_insert(x, z);
            chunk.sections[1] = Section::filled(BlockState::new("minecraft:stone"));
            chunk.sections[2].set_block(x.unsigned_abs() as usize, 0, 0, BlockState::new("minecraft:gold_block"));
        }
        world
    }

    #[test]
    fn payload_round_trips_in_order() {
        let world = sample();
        let (payload, report) = world.encode_payload(&CodecConfig::default(), &ChunkSelector::All).unwrap();
        assert_eq!(report.chunks, 3);
        assert_eq!(report.sections, 12);
        assert_eq!(report.empty_sections, 6);
        assert_eq!(report.raw_len, payload.len());

        let back = WorldRecord::decode_payload(&payload, &options()).unwrap();
        assert_eq!(back, world);
        let order: Vec<ChunkPos> = back.chunk_positions().collect();
        assert_eq!(order, vec![ChunkPos::new(-1, 4), ChunkPos::new(0, 0), ChunkPos::new(2, -2)]);
    }

    #[test]
    fn sequential_and_parallel_payloads_match() {
        let world = sample();
        let parallel = world.encode_payload(&CodecConfig::default(), &ChunkSelector::All).unwrap().0;
        let config = CodecConfig {
            parallel: false,
            ..CodecConfig::default()
        };
        let sequential = world.encode_payload(&config, &ChunkSelector::All).unwrap().0;
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn selector_filters_both_directions() {
        let world = sample();
        let near_origin = ChunkSelector::radius(0, 0, 3);
        let (payload, report) = world.encode_payload(&CodecConfig::default(), &near_origin).unwrap();
        assert_eq!(report.chunks, 2);
        let back = WorldRecord::decode_payload(&payload, &options()).unwrap();
        assert!(back.chunk(-1, 4).is_none());

        let (payload, _) = world.encode_payload(&CodecConfig::default(), &ChunkSelector::All).unwrap();
        let only_east = DecodeOptions {
            selector: ChunkSelector::custom(|pos| pos.x > 0),
            ..options()
        };
        let back = WorldRecord::decode_payload(&payload, &only_east).unwrap();
        assert_eq!(back.chunk_positions().collect::<Vec<_>>(), vec![ChunkPos::new(2, -2)]);
    }

    #[test]
    fn height_change_pads_and_truncates_at_the_top() {
        let mut world = sample();
        world.set_section_range(-1, 4).unwrap();
        let chunk = world.chunk(0, 0).unwrap();
        assert_eq!(chunk.sections.len(), 6);
        assert!(chunk.sections[5].is_empty());
        assert_eq!(chunk.sections[1].block(0, 0, 0).name(), "minecraft:stone");

        world.set_section_range(0, 1).unwrap();
        assert_eq!(world.chunk(0, 0).unwrap().sections.len(), 2);
        assert!(world.set_section_range(3, 1).is_err());
    }

    #[test]
    fn moved_chunk_is_rejected_before_writing() {
        let mut world = sample();
        world.chunk_or_insert(5, 0);
        world.chunk_mut(0, 0).unwrap().x = 5;
        let err = world.encode_payload(&CodecConfig::default(), &ChunkSelector::All).unwrap_err();
        assert_eq!(err.chunk_coordinate(), Some((0, 0)));
        assert!(matches!(err.root(), Error::Invalid(_)));
    }

    #[test]
    fn radius_selects_a_disc() {
        let unit = ChunkSelector::radius(0, 0, 1);
        assert!(unit.test(ChunkPos::new(1, 0)));
        assert!(unit.test(ChunkPos::new(0, -1)));
        assert!(!unit.test(ChunkPos::new(1, 1)));

        let offset = ChunkSelector::radius(10, -10, 5);
        assert!(offset.test(ChunkPos::new(13, -6)));
        assert!(!offset.test(ChunkPos::new(14, -6)));
        assert!(ChunkSelector::radius(i32::MIN, 0, u32::MAX).test(ChunkPos::new(i32::MAX, 0)));
    }

    #[test]
    fn deepest_block_entity_data_decodes_in_parallel() {
        let data = crate::tag::nested(crate::tag::MAX_DEPTH);
        let mut world = WorldRecord::new(SectionRange::new(0, 0).unwrap());
        for x in 0..8 {
            world
                .chunk_or_insert(x, 0)
                .block_entities
                .push(BlockEntity::new(1, 2, 3).with_data(data.clone()));
        }
        let config = CodecConfig {
            parallel: false,
            ..CodecConfig::default()
        };
        let (payload, _) = world.encode_payload(&config, &ChunkSelector::All).unwrap();
        let back = WorldRecord::decode_payload(&payload, &options()).unwrap();
        assert_eq!(back, world);
    }

    #[test]
    fn inserting_a_short_chunk_fails() {
        let mut world = WorldRecord::new(SectionRange::new(0, 3).unwrap());
        let err = world.insert_chunk(Chunk::new(5, 5, 2)).unwrap_err();
        assert_eq!(err.chunk_coordinate(), Some((5, 5)));
        assert!(matches!(err.root(), Error::ChunkHeightMismatch { expected: 4, found: 2 }));
    }

    #[test]
    fn converter_rewrites_palette_and_block_entities() {
        struct Rename;
        impl DataConverter for Rename {
            fn data_version(&self) -> i32 {
                3800
            }
            fn convert_block_palette(&self, palette: &mut [BlockState], _from: i32, _to: i32) {
                for state in palette {
                    if state.name() == "minecraft:gold_block" {
                        state.set_name("minecraft:stone");
                    }
                }
            }
            fn convert_block_entity(&self, entity: &mut BlockEntity, _from: i32, _to: i32) {
                entity.id = entity.id.take().map(|id| id.to_uppercase());
            }
        }

        let mut world = sample();
        world
            .chunk_or_insert(0, 0)
            .block_entities
            .push(BlockEntity::new(0, 0, 0).with_id("minecraft:sign"));
        let (payload, _) = world.encode_payload(&CodecConfig::default(), &ChunkSelector::All).unwrap();

        let back = WorldRecord::decode_payload(
            &payload,
            &DecodeOptions {
                converter: Some(&Rename),
                ..options()
            },
        )
        .unwrap();
        assert_eq!(back.data_version, 3800);
        let chunk = back.chunk(2, -2).unwrap();
        assert_eq!(chunk.sections[2].block(2, 0, 0).name(), "minecraft:stone");
        assert_eq!(back.chunk(0, 0).unwrap().block_entities[0].id.as_deref(), Some("MINECRAFT:SIGN"));
    }
}

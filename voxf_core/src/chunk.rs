use std::collections::BTreeMap;
use std::fmt;

use bytes::BufMut;

use crate::block::{BlockState, GlobalBlockPalette};
use crate::buffer::{put_i32s, put_len, put_opt_string, ByteReader};
use crate::error::{Error, Result};
use crate::section::{Section, SectionEncoding, SECTION_EDGE};
use crate::tag::Tag;

/// Horizontal chunk coordinate. Orders by `x`, then `z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Squared euclidean distance in chunks.
    pub fn distance_squared(&self, other: &ChunkPos) -> u64 {
        let dx = (i64::from(self.x) - i64::from(other.x)).unsigned_abs();
        let dz = (i64::from(self.z) - i64::from(other.z)).unsigned_abs();
        (dx * dx).saturating_add(dz * dz)
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

// ── Heightmaps ─────────────────────────────────────────────────────────────

/// Named heightmap kinds. The discriminant is the bit in the stored mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum HeightmapKind {
    MotionBlocking = 0,
    MotionBlockingNoLeaves = 1,
    OceanFloor = 2,
    OceanFloorWorldGen = 3,
    WorldSurface = 4,
    WorldSurfaceWorldGen = 5,
}

impl HeightmapKind {
    pub const ALL: [HeightmapKind; 6] = [
        HeightmapKind::MotionBlocking,
        HeightmapKind::MotionBlockingNoLeaves,
        HeightmapKind::OceanFloor,
        HeightmapKind::OceanFloorWorldGen,
        HeightmapKind::WorldSurface,
        HeightmapKind::WorldSurfaceWorldGen,
    ];

    pub fn bit(self) -> u32 {
        1 << self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            HeightmapKind::MotionBlocking => "motion_blocking",
            HeightmapKind::MotionBlockingNoLeaves => "motion_blocking_no_leaves",
            HeightmapKind::OceanFloor => "ocean_floor",
            HeightmapKind::OceanFloorWorldGen => "ocean_floor_wg",
            HeightmapKind::WorldSurface => "world_surface",
            HeightmapKind::WorldSurfaceWorldGen => "world_surface_wg",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    fn known_mask() -> u32 {
        Self::ALL.iter().fold(0, |mask, k| mask | k.bit())
    }
}

// ── Block entities ─────────────────────────────────────────────────────────

/// Extra data attached to one block. `x` and `z` are local to the chunk
/// (0..16); `y` is the world block height.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEntity {
    pub x: u8,
    pub y: i32,
    pub z: u8,
    pub id: Option<String>,
    pub data: Option<Tag>,
}

impl BlockEntity {
    pub fn new(x: u8, y: i32, z: u8) -> Self {
        Self {
            x,
            y,
            z,
            id: None,
            data: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: Tag) -> Self {
        self.data = Some(data);
        self
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        if usize::from(self.x) >= SECTION_EDGE || usize::from(self.z) >= SECTION_EDGE {
            return Err(Error::Invalid(format!(
                "block entity at local ({}, {}) is outside the chunk",
                self.x, self.z
            )));
        }
        buf.put_u8(self.x);
        buf.put_i32_le(self.y);
        buf.put_u8(self.z);
        put_opt_string(buf, self.id.as_deref())?;
        match &self.data {
            Some(tag) => {
                buf.put_u8(1);
                tag.encode(buf)?;
            }
            None => buf.put_u8(0),
        }
        Ok(())
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let x = r.read_u8()?;
        let y = r.read_i32()?;
        let z = r.read_u8()?;
        if usize::from(x) >= SECTION_EDGE || usize::from(z) >= SECTION_EDGE {
            return Err(Error::malformed(
                "block entity",
                format!("local position ({x}, {z}) outside the chunk"),
            ));
        }
        let id = r.read_opt_string()?;
        let data = if r.read_bool("block entity data flag")? {
            Some(Tag::decode(r)?)
        } else {
            None
        };
        Ok(Self { x, y, z, id, data })
    }
}

// ── Chunk ──────────────────────────────────────────────────────────────────

/// Per-chunk section tallies gathered while encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    pub sections: usize,
    pub empty_sections: usize,
    pub direct_sections: usize,
}

impl ChunkStats {
    fn record(&mut self, encoding: SectionEncoding) {
        self.sections += 1;
        if encoding.used_empty_marker() {
            self.empty_sections += 1;
        }
        if encoding.used_direct_mode() {
            self.direct_sections += 1;
        }
    }

    pub(crate) fn merge(&mut self, other: ChunkStats) {
        self.sections += other.sections;
        self.empty_sections += other.empty_sections;
        self.direct_sections += other.direct_sections;
    }
}

/// A full-height column of sections, bottom section first.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub x: i32,
    pub z: i32,
    pub sections: Vec<Section>,
    pub heightmaps: BTreeMap<HeightmapKind, Vec<i32>>,
    pub block_entities: Vec<BlockEntity>,
    pub user_data: Tag,
}

impl Chunk {
    /// A chunk of `section_count` empty sections.
    pub fn new(x: i32, z: i32, section_count: usize) -> Self {
        Self {
            x,
            z,
            sections: vec![Section::empty(); section_count],
            heightmaps: BTreeMap::new(),
            block_entities: Vec::new(),
            user_data: Tag::compound(),
        }
    }

    pub fn pos(&self) -> ChunkPos {
        ChunkPos::new(self.x, self.z)
    }

    pub fn heightmap(&self, kind: HeightmapKind) -> Option<&[i32]> {
        self.heightmaps.get(&kind).map(Vec::as_slice)
    }

    pub fn set_heightmap(&mut self, kind: HeightmapKind, heights: Vec<i32>) {
        self.heightmaps.insert(kind, heights);
    }

    /// Append this chunk's record to `buf`. Fails if the chunk does not hold
    /// exactly `expected_sections` sections.
    pub fn encode(
        &self,
        global: &GlobalBlockPalette,
        expected_sections: usize,
        direct_threshold_bits: u8,
        buf: &mut Vec<u8>,
    ) -> Result<ChunkStats> {
        self.encode_inner(global, expected_sections, direct_threshold_bits, buf)
            .map_err(|e| e.in_chunk(self.x, self.z))
    }

    fn encode_inner(
        &self,
        global: &GlobalBlockPalette,
        expected_sections: usize,
        direct_threshold_bits: u8,
        buf: &mut Vec<u8>,
    ) -> Result<ChunkStats> {
        if self.sections.len() != expected_sections {
            return Err(Error::ChunkHeightMismatch {
                expected: expected_sections,
                found: self.sections.len(),
            });
        }
        let count = u8::try_from(self.sections.len())
            .map_err(|_| Error::Invalid(format!("{} sections do not fit a chunk record", self.sections.len())))?;

        buf.put_i32_le(self.x);
        buf.put_i32_le(self.z);
        buf.put_u8(count);

        let mut stats = ChunkStats::default();
        for section in &self.sections {
            stats.record(section.encode(global, direct_threshold_bits, buf)?);
        }

        let mask = self.heightmaps.keys().fold(0u32, |mask, k| mask | k.bit());
        buf.put_u32_le(mask);
        for heights in self.heightmaps.values() {
            put_i32s(buf, heights)?;
        }

        put_len(buf, self.block_entities.len(), "block entity list")?;
        for entity in &self.block_entities {
            entity.encode(buf)?;
        }

        self.user_data.encode(buf)?;
        Ok(stats)
    }

    /// Read one chunk record.
    pub fn decode(r: &mut ByteReader<'_>, global: &[BlockState], expected_sections: usize) -> Result<Self> {
        let x = r.read_i32()?;
        let z = r.read_i32()?;
        Self::decode_body(r, x, z, global, expected_sections).map_err(|e| e.in_chunk(x, z))
    }

    fn decode_body(
        r: &mut ByteReader<'_>,
        x: i32,
        z: i32,
        global: &[BlockState],
        expected_sections: usize,
    ) -> Result<Self> {
        let count = usize::from(r.read_u8()?);
        if count != expected_sections {
            return Err(Error::ChunkHeightMismatch {
                expected: expected_sections,
                found: count,
            });
        }
        let sections = (0..count)
            .map(|_| Section::decode(r, global))
            .collect::<Result<Vec<_>>>()?;

        let mask = r.read_u32()?;
        if mask & !HeightmapKind::known_mask() != 0 {
            return Err(Error::malformed("heightmap mask", format!("unknown kinds in {mask:#x}")));
        }
        let mut heightmaps = BTreeMap::new();
        for kind in HeightmapKind::ALL {
            if mask & kind.bit() != 0 {
                heightmaps.insert(kind, r.read_i32s()?);
            }
        }

        // x + y + z + two flags
        let entity_count = r.read_len(8)?;
        let block_entities = (0..entity_count)
            .map(|_| BlockEntity::decode(r))
            .collect::<Result<Vec<_>>>()?;

        let user_data = Tag::decode(r)?;
        Ok(Self {
            x,
            z,
            sections,
            heightmaps,
            block_entities,
            user_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::Palette;

    fn global_for(chunk: &Chunk) -> GlobalBlockPalette {
        let mut palette = Palette::new();
        for section in &chunk.sections {
            for state in section.block_palette().values() {
                palette.insert(state);
            }
        }
        GlobalBlockPalette::from_palette(palette)
    }

    fn sample() -> Chunk {
        let mut chunk = Chunk::new(-3, 7, 4);
        chunk.sections[1] = Section::filled(BlockState::new("minecraft:stone"));
        chunk.sections[2].set_block(4, 4, 4, BlockState::new("minecraft:torch"));
        chunk.set_heightmap(HeightmapKind::WorldSurface, vec![33; 256]);
        chunk.set_heightmap(HeightmapKind::MotionBlocking, (0..256).collect());
        chunk.block_entities.push(
            BlockEntity::new(15, -12, 0)
                .with_id("minecraft:chest")
                .with_data(Tag::compound().with("Lock", "key")),
        );
        chunk.block_entities.push(BlockEntity::new(1, 2, 3));
        chunk.user_data = Tag::compound().with("generated", true);
        chunk
    }

    #[test]
    fn chunk_record_round_trips() {
        let chunk = sample();
        let global = global_for(&chunk);
        let mut buf = Vec::new();
        let stats = chunk.encode(&global, 4, 8, &mut buf).unwrap();
        assert_eq!(
            stats,
            ChunkStats {
                sections: 4,
                empty_sections: 2,
                direct_sections: 0
            }
        );

        let mut r = ByteReader::new(&buf);
        let back = Chunk::decode(&mut r, global.states(), 4).unwrap();
        assert!(r.is_empty());
        assert_eq!(back, chunk);
        assert_eq!(back.heightmap(HeightmapKind::WorldSurface).map(|h| h.len()), Some(256));
        assert_eq!(back.heightmap(HeightmapKind::OceanFloor), None);
    }

    #[test]
    fn wrong_height_is_rejected_both_ways() {
        let chunk = sample();
        let global = global_for(&chunk);

        let err = chunk.encode(&global, 5, 8, &mut Vec::new()).unwrap_err();
        assert_eq!(err.chunk_coordinate(), Some((-3, 7)));
        assert!(matches!(err.root(), Error::ChunkHeightMismatch { expected: 5, found: 4 }));

        let mut buf = Vec::new();
        chunk.encode(&global, 4, 8, &mut buf).unwrap();
        let err = Chunk::decode(&mut ByteReader::new(&buf), global.states(), 3).unwrap_err();
        assert!(matches!(err.root(), Error::ChunkHeightMismatch { expected: 3, found: 4 }));
    }

    #[test]
    fn unknown_heightmap_bits_are_malformed() {
        let chunk = Chunk::new(0, 0, 1);
        let global = global_for(&chunk);
        let mut buf = Vec::new();
        chunk.encode(&global, 1, 8, &mut buf).unwrap();
        // [x][z][count][one empty section] then the mask
        let mask_at = 4 + 4 + 1 + 1;
        buf[mask_at] = 0x80;

        let err = Chunk::decode(&mut ByteReader::new(&buf), global.states(), 1).unwrap_err();
        assert!(matches!(err.root(), Error::Malformed { what: "heightmap mask", .. }));
    }

    #[test]
    fn block_entity_outside_chunk_fails_encoding() {
        let mut chunk = Chunk::new(0, 0, 1);
        chunk.block_entities.push(BlockEntity::new(16, 0, 0));
        let err = chunk.encode(&global_for(&chunk), 1, 8, &mut Vec::new()).unwrap_err();
        assert!(matches!(err.root(), Error::Invalid(_)));
    }

    #[test]
    fn heightmap_names_resolve() {
        for kind in HeightmapKind::ALL {
            assert_eq!(HeightmapKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(HeightmapKind::from_name("light_blocking"), None);
    }

    #[test]
    fn positions_order_by_x_then_z() {
        let mut positions = vec![ChunkPos::new(1, -5), ChunkPos::new(0, 9), ChunkPos::new(1, -6)];
        positions.sort();
        assert_eq!(positions, vec![ChunkPos::new(0, 9), ChunkPos::new(1, -6), ChunkPos::new(1, -5)]);
        assert_eq!(ChunkPos::new(0, 0).distance_squared(&ChunkPos::new(-3, 2)), 13);
        let far = ChunkPos::new(i32::MIN, i32::MIN).distance_squared(&ChunkPos::new(i32::MAX, i32::MAX));
        assert_eq!(far, u64::MAX);
    }
}

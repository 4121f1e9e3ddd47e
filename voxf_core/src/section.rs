//! One 16×16×16 slice of a chunk column.
//!
//! # Record layout
//! ```text
//! [empty: u8]                       1 → nothing else follows
//! [block mode: u8]                  0 single | 1 indirect | 2 direct
//!   single:   [global id: u32]
//!   indirect: [palette len: u32][global id: u32 × len][bit width: u8][packed: u32 len + bytes]
//!   direct:   [bit width: u8][packed global ids: u32 len + bytes]
//! [biome mode: u8]                  0 single | 1 indirect
//!   single:   [name: string]
//!   indirect: [palette len: u32][name × len][bit width: u8][packed: u32 len + bytes]
//! [block light content: u8] (+ 2048 bytes when present)
//! [sky light content: u8]   (+ 2048 bytes when present)
//! ```

use bytes::BufMut;

use crate::block::{BlockState, GlobalBlockPalette};
use crate::buffer::{put_bytes, put_len, put_string, ByteReader};
use crate::error::{Error, Result};
use crate::palette::{minimal_bit_width, pack, storage_bit_width, unpack, Palette, PalettedArray};

pub const SECTION_EDGE: usize = 16;
pub const BLOCKS_PER_SECTION: usize = SECTION_EDGE * SECTION_EDGE * SECTION_EDGE;
pub const BIOME_EDGE: usize = 4;
pub const BIOMES_PER_SECTION: usize = BIOME_EDGE * BIOME_EDGE * BIOME_EDGE;
/// One nibble per block.
pub const LIGHT_BYTES: usize = BLOCKS_PER_SECTION / 2;
pub const DEFAULT_BIOME: &str = "minecraft:plains";

const MODE_SINGLE: u8 = 0;
const MODE_INDIRECT: u8 = 1;
const MODE_DIRECT: u8 = 2;

// ── Light ──────────────────────────────────────────────────────────────────

/// Content of one light layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Light {
    /// Never computed; the host should relight.
    #[default]
    Missing,
    /// Every nibble is 0.
    Empty,
    /// Every nibble is 15.
    Full,
    /// Exactly [`LIGHT_BYTES`] nibble-packed bytes.
    Present(Vec<u8>),
}

impl Light {
    pub fn present(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != LIGHT_BYTES {
            return Err(Error::Invalid(format!(
                "light array must be {LIGHT_BYTES} bytes, found {}",
                bytes.len()
            )));
        }
        Ok(Light::Present(bytes))
    }

    pub fn content_id(&self) -> u8 {
        match self {
            Light::Missing => 0,
            Light::Empty => 1,
            Light::Full => 2,
            Light::Present(_) => 3,
        }
    }

    /// Light level (0..=15) of the block at `index`, if the layer is known.
    pub fn level(&self, index: usize) -> Option<u8> {
        match self {
            Light::Missing => None,
            Light::Empty => Some(0),
            Light::Full => Some(15),
            Light::Present(bytes) => {
                let byte = *bytes.get(index / 2)?;
                Some(if index % 2 == 0 { byte & 0x0F } else { byte >> 4 })
            }
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.put_u8(self.content_id());
        if let Light::Present(bytes) = self {
            if bytes.len() != LIGHT_BYTES {
                return Err(Error::Invalid(format!(
                    "light array must be {LIGHT_BYTES} bytes, found {}",
                    bytes.len()
                )));
            }
            buf.put_slice(bytes);
        }
        Ok(())
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        match r.read_u8()? {
            0 => Ok(Light::Missing),
            1 => Ok(Light::Empty),
            2 => Ok(Light::Full),
            3 => Ok(Light::Present(r.take(LIGHT_BYTES)?.to_vec())),
            other => Err(Error::malformed("light", format!("unknown content id {other}"))),
        }
    }
}

// ── Encoding report ────────────────────────────────────────────────────────

/// How one cell array was stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Single,
    Indirect { bit_width: u8 },
    Direct { bit_width: u8 },
}

/// What [`Section::encode`] chose for a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionEncoding {
    Empty,
    Paletted { blocks: StorageMode, biomes: StorageMode },
}

impl SectionEncoding {
    pub fn used_empty_marker(&self) -> bool {
        matches!(self, SectionEncoding::Empty)
    }

    pub fn used_direct_mode(&self) -> bool {
        matches!(
            self,
            SectionEncoding::Paletted {
                blocks: StorageMode::Direct { .. },
                ..
            }
        )
    }
}

// ── Section ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    blocks: PalettedArray<BlockState>,
    biomes: PalettedArray<String>,
    pub block_light: Light,
    pub sky_light: Light,
}

impl Default for Section {
    fn default() -> Self {
        Self::empty()
    }
}

impl Section {
    /// All air, default biome, no light data.
    pub fn empty() -> Self {
        Self::filled(BlockState::air())
    }

    pub fn filled(state: BlockState) -> Self {
        Self {
            blocks: PalettedArray::filled(state, BLOCKS_PER_SECTION),
            biomes: PalettedArray::filled(DEFAULT_BIOME.to_owned(), BIOMES_PER_SECTION),
            block_light: Light::Missing,
            sky_light: Light::Missing,
        }
    }

    /// Build from block states in [`block_index`] order.
    pub fn from_blocks<I>(states: I) -> Result<Self>
    where
        I: IntoIterator<Item = BlockState>,
    {
        let blocks = PalettedArray::from_values(states)?;
        if blocks.len() != BLOCKS_PER_SECTION {
            return Err(Error::Invalid(format!(
                "a section holds {BLOCKS_PER_SECTION} blocks, got {}",
                blocks.len()
            )));
        }
        Ok(Self {
            blocks,
            ..Self::empty()
        })
    }

    pub fn blocks(&self) -> &PalettedArray<BlockState> {
        &self.blocks
    }

    pub fn biomes(&self) -> &PalettedArray<String> {
        &self.biomes
    }

    pub fn block(&self, x: usize, y: usize, z: usize) -> &BlockState {
        self.blocks.get(block_index(x, y, z))
    }

    pub fn set_block(&mut self, x: usize, y: usize, z: usize, state: BlockState) {
        self.blocks.set(block_index(x, y, z), state);
    }

    /// Biome of the 4×4×4 cell at biome coordinates `(x, y, z)`, each 0..4.
    pub fn biome(&self, x: usize, y: usize, z: usize) -> &str {
        self.biomes.get(biome_index(x, y, z))
    }

    pub fn set_biome(&mut self, x: usize, y: usize, z: usize, biome: impl Into<String>) {
        self.biomes.set(biome_index(x, y, z), biome.into());
    }

    pub fn fill_biome(&mut self, biome: impl Into<String>) {
        self.biomes = PalettedArray::filled(biome.into(), BIOMES_PER_SECTION);
    }

    /// True when the section can be written as the one-byte empty marker.
    pub fn is_empty(&self) -> bool {
        self.blocks.uniform_value().is_some_and(BlockState::is_air)
            && self.biomes.uniform_value().is_some_and(|b| b == DEFAULT_BIOME)
            && self.block_light == Light::Missing
            && self.sky_light == Light::Missing
    }

    /// Block states the section actually uses, in first-seen cell order.
    pub fn block_palette(&self) -> Palette<BlockState> {
        Palette::build(self.blocks.iter())
    }

    /// Append this section's record to `buf`.
    ///
    /// Every block state must already be present in `global`. The block
    /// array switches to direct storage when its local palette would need
    /// more than `direct_threshold_bits` bits per index.
    pub fn encode(
        &self,
        global: &GlobalBlockPalette,
        direct_threshold_bits: u8,
        buf: &mut Vec<u8>,
    ) -> Result<SectionEncoding> {
        if self.is_empty() {
            buf.put_u8(1);
            return Ok(SectionEncoding::Empty);
        }
        buf.put_u8(0);

        let blocks = self.encode_blocks(global, direct_threshold_bits, buf)?;
        let biomes = self.encode_biomes(buf)?;
        self.block_light.encode(buf)?;
        self.sky_light.encode(buf)?;
        Ok(SectionEncoding::Paletted { blocks, biomes })
    }

    fn encode_blocks(
        &self,
        global: &GlobalBlockPalette,
        direct_threshold_bits: u8,
        buf: &mut Vec<u8>,
    ) -> Result<StorageMode> {
        let global_id = |state: &BlockState| {
            global
                .id_of(state)
                .ok_or_else(|| Error::Invalid(format!("block state {state} missing from the global palette")))
        };

        let local = self.block_palette();
        let width = local.storage_bit_width();
        if width == 0 {
            buf.put_u8(MODE_SINGLE);
            buf.put_u32_le(global_id(self.blocks.get(0))?);
            return Ok(StorageMode::Single);
        }

        if width > direct_threshold_bits {
            let bit_width = global.direct_bit_width();
            let ids = self
                .blocks
                .iter()
                .map(global_id)
                .collect::<Result<Vec<u32>>>()?;
            buf.put_u8(MODE_DIRECT);
            buf.put_u8(bit_width);
            put_bytes(buf, &pack(&ids, bit_width))?;
            return Ok(StorageMode::Direct { bit_width });
        }

        buf.put_u8(MODE_INDIRECT);
        put_len(buf, local.len(), "block palette")?;
        for state in local.values() {
            buf.put_u32_le(global_id(state)?);
        }
        let indices = local.indices_of(self.blocks.iter())?;
        buf.put_u8(width);
        put_bytes(buf, &pack(&indices, width))?;
        Ok(StorageMode::Indirect { bit_width: width })
    }

    fn encode_biomes(&self, buf: &mut Vec<u8>) -> Result<StorageMode> {
        let local = Palette::build(self.biomes.iter());
        let width = local.storage_bit_width();
        if width == 0 {
            buf.put_u8(MODE_SINGLE);
            put_string(buf, self.biomes.get(0))?;
            return Ok(StorageMode::Single);
        }

        buf.put_u8(MODE_INDIRECT);
        put_len(buf, local.len(), "biome palette")?;
        for biome in local.values() {
            put_string(buf, biome)?;
        }
        let indices = local.indices_of(self.biomes.iter())?;
        buf.put_u8(width);
        put_bytes(buf, &pack(&indices, width))?;
        Ok(StorageMode::Indirect { bit_width: width })
    }

    /// Read one section record. `global` is the world's block palette in
    /// stored order.
    pub fn decode(r: &mut ByteReader<'_>, global: &[BlockState]) -> Result<Self> {
        if r.read_bool("section empty flag")? {
            return Ok(Self::empty());
        }
        let blocks = decode_blocks(r, global)?;
        let biomes = decode_biomes(r)?;
        let block_light = Light::decode(r)?;
        let sky_light = Light::decode(r)?;
        Ok(Self {
            blocks,
            biomes,
            block_light,
            sky_light,
        })
    }
}

fn lookup_global(global: &[BlockState], id: u32) -> Result<BlockState> {
    global.get(id as usize).cloned().ok_or(Error::PaletteIndexOutOfRange {
        index: id,
        palette_len: global.len(),
    })
}

/// Palette length of an indirect array: at least two entries, never more
/// than there are cells.
fn read_palette_len(r: &mut ByteReader<'_>, elem_size: usize, cells: usize, what: &'static str) -> Result<usize> {
    let len = r.read_len(elem_size)?;
    if len < 2 || len > cells {
        return Err(Error::malformed(
            what,
            format!("indirect palette of {len} entries for {cells} cells"),
        ));
    }
    Ok(len)
}

fn read_packed(r: &mut ByteReader<'_>, expected_width: u8, cells: usize, palette_len: usize) -> Result<Vec<u32>> {
    let width = r.read_u8()?;
    if width != expected_width {
        return Err(Error::malformed(
            "index array",
            format!("bit width {width} does not match the {expected_width} bits a palette of {palette_len} needs"),
        ));
    }
    let packed = r.read_bytes()?;
    unpack(packed, width, cells, palette_len)
}

fn decode_blocks(r: &mut ByteReader<'_>, global: &[BlockState]) -> Result<PalettedArray<BlockState>> {
    match r.read_u8()? {
        MODE_SINGLE => {
            let state = lookup_global(global, r.read_u32()?)?;
            Ok(PalettedArray::filled(state, BLOCKS_PER_SECTION))
        }
        MODE_INDIRECT => {
            let len = read_palette_len(r, 4, BLOCKS_PER_SECTION, "block palette")?;
            let states = (0..len)
                .map(|_| lookup_global(global, r.read_u32()?))
                .collect::<Result<Vec<_>>>()?;
            let indices = read_packed(r, storage_bit_width(len), BLOCKS_PER_SECTION, len)?;
            PalettedArray::from_parts(states, indices, BLOCKS_PER_SECTION)
        }
        MODE_DIRECT => {
            if global.is_empty() {
                return Err(Error::malformed("block array", "direct storage with an empty global palette"));
            }
            let ids = read_packed(r, minimal_bit_width(global.len()), BLOCKS_PER_SECTION, global.len())?;
            PalettedArray::from_values(ids.into_iter().map(|id| global[id as usize].clone()))
        }
        other => Err(Error::malformed("block array", format!("unknown storage mode {other}"))),
    }
}

fn decode_biomes(r: &mut ByteReader<'_>) -> Result<PalettedArray<String>> {
    match r.read_u8()? {
        MODE_SINGLE => Ok(PalettedArray::filled(r.read_string()?, BIOMES_PER_SECTION)),
        MODE_INDIRECT => {
            let len = read_palette_len(r, 4, BIOMES_PER_SECTION, "biome palette")?;
            let names = (0..len).map(|_| r.read_string()).collect::<Result<Vec<_>>>()?;
            let indices = read_packed(r, storage_bit_width(len), BIOMES_PER_SECTION, len)?;
            PalettedArray::from_parts(names, indices, BIOMES_PER_SECTION)
        }
        other => Err(Error::malformed("biome array", format!("unknown storage mode {other}"))),
    }
}

/// Cell index of block `(x, y, z)`; x varies fastest, then z, then y.
pub fn block_index(x: usize, y: usize, z: usize) -> usize {
    assert!(
        x < SECTION_EDGE && y < SECTION_EDGE && z < SECTION_EDGE,
        "block ({x}, {y}, {z}) outside a section"
    );
    (y * SECTION_EDGE + z) * SECTION_EDGE + x
}

pub fn biome_index(x: usize, y: usize, z: usize) -> usize {
    assert!(
        x < BIOME_EDGE && y < BIOME_EDGE && z < BIOME_EDGE,
        "biome cell ({x}, {y}, {z}) outside a section"
    );
    (y * BIOME_EDGE + z) * BIOME_EDGE + x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global_of(sections: &[&Section]) -> GlobalBlockPalette {
        let mut palette = Palette::new();
        for section in sections {
            for state in section.block_palette().values() {
                palette.insert(state);
            }
        }
        GlobalBlockPalette::from_palette(palette)
    }

    fn round_trip(section: &Section, threshold: u8) -> (Section, SectionEncoding, usize) {
        let global = global_of(&[section]);
        let mut buf = Vec::new();
        let encoding = section.encode(&global, threshold, &mut buf).unwrap();
        let mut r = ByteReader::new(&buf);
        let back = Section::decode(&mut r, global.states()).unwrap();
        assert!(r.is_empty());
        (back, encoding, buf.len())
    }

    fn checkerboard() -> Section {
        Section::from_blocks((0..BLOCKS_PER_SECTION).map(|i| {
            let (x, z) = (i % 16, (i / 16) % 16);
            if (x + z) % 2 == 0 {
                BlockState::new("minecraft:stone")
            } else {
                BlockState::new("minecraft:dirt")
            }
        }))
        .unwrap()
    }

    #[test]
    fn empty_section_is_a_single_byte() {
        let (back, encoding, len) = round_trip(&Section::empty(), 8);
        assert_eq!(encoding, SectionEncoding::Empty);
        assert_eq!(len, 1);
        assert_eq!(back, Section::empty());
    }

    #[test]
    fn lit_air_section_is_not_collapsed() {
        let mut section = Section::empty();
        section.sky_light = Light::Full;
        let (back, encoding, _) = round_trip(&section, 8);
        assert!(!encoding.used_empty_marker());
        assert_eq!(back.sky_light, Light::Full);
    }

    #[test]
    fn checkerboard_uses_one_bit_indices() {
        let section = checkerboard();
        let (back, encoding, _) = round_trip(&section, 8);
        assert_eq!(
            encoding,
            SectionEncoding::Paletted {
                blocks: StorageMode::Indirect { bit_width: 1 },
                biomes: StorageMode::Single,
            }
        );
        assert_eq!(back, section);
        assert_eq!(back.block(1, 7, 0).name(), "minecraft:dirt");
    }

    #[test]
    fn wide_palette_falls_back_to_direct_storage() {
        let states: Vec<BlockState> = (0..BLOCKS_PER_SECTION)
            .map(|i| BlockState::new("minecraft:note_block").with_property("note", (i % 300).to_string()))
            .collect();
        let section = Section::from_blocks(states).unwrap();

        let (back, encoding, _) = round_trip(&section, 8);
        assert!(encoding.used_direct_mode());
        assert_eq!(back, section);

        // A higher threshold keeps the same section paletted.
        let (_, encoding, _) = round_trip(&section, 9);
        assert_eq!(
            encoding,
            SectionEncoding::Paletted {
                blocks: StorageMode::Indirect { bit_width: 9 },
                biomes: StorageMode::Single,
            }
        );
    }

    #[test]
    fn biomes_and_light_round_trip() {
        let mut section = checkerboard();
        section.set_biome(3, 0, 2, "minecraft:desert");
        section.set_biome(0, 3, 0, "minecraft:river");
        let mut light = vec![0u8; LIGHT_BYTES];
        light[0] = 0xF3;
        section.block_light = Light::present(light).unwrap();
        section.sky_light = Light::Empty;

        let (back, encoding, _) = round_trip(&section, 8);
        assert_eq!(
            encoding,
            SectionEncoding::Paletted {
                blocks: StorageMode::Indirect { bit_width: 1 },
                biomes: StorageMode::Indirect { bit_width: 2 },
            }
        );
        assert_eq!(back.biome(3, 0, 2), "minecraft:desert");
        assert_eq!(back.biome(1, 1, 1), DEFAULT_BIOME);
        assert_eq!(back.block_light.level(0), Some(3));
        assert_eq!(back.block_light.level(1), Some(15));
        assert_eq!(back, section);
    }

    #[test]
    fn global_id_past_the_palette_is_rejected() {
        let section = Section::filled(BlockState::new("minecraft:stone"));
        let global = global_of(&[&section]);
        let mut buf = Vec::new();
        section.encode(&global, 8, &mut buf).unwrap();

        let err = Section::decode(&mut ByteReader::new(&buf), &[]).unwrap_err();
        assert!(matches!(err, Error::PaletteIndexOutOfRange { index: 0, palette_len: 0 }));
    }

    #[test]
    fn mismatched_bit_width_is_rejected() {
        let section = checkerboard();
        let global = global_of(&[&section]);
        let mut buf = Vec::new();
        section.encode(&global, 8, &mut buf).unwrap();
        // [empty][mode][len u32][2 × id u32][width]
        buf[1 + 1 + 4 + 8] = 2;

        let err = Section::decode(&mut ByteReader::new(&buf), global.states()).unwrap_err();
        assert!(matches!(err, Error::Malformed { what: "index array", .. }));
    }

    #[test]
    fn truncated_record_is_rejected() {
        let section = checkerboard();
        let global = global_of(&[&section]);
        let mut buf = Vec::new();
        section.encode(&global, 8, &mut buf).unwrap();
        buf.pop();

        let err = Section::decode(&mut ByteReader::new(&buf), global.states()).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn state_missing_from_global_palette_fails_encoding() {
        let section = checkerboard();
        let global = GlobalBlockPalette::default();
        let err = section.encode(&global, 8, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn indices_follow_x_then_z_then_y() {
        assert_eq!(block_index(1, 0, 0), 1);
        assert_eq!(block_index(0, 0, 1), 16);
        assert_eq!(block_index(0, 1, 0), 256);
        assert_eq!(biome_index(3, 3, 3), 63);
    }
}

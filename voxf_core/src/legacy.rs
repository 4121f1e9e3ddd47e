//! Raw access to payloads written by older format versions.
//!
//! Old payloads are never decoded into typed values directly. They are read
//! into a [`Tag`] tree that mirrors their layout field for field, upgraded
//! one version at a time by the migration chain, and finally lowered back to
//! current-version bytes for the one typed decoder. The tree shape is
//! described in [`crate::migration`].

use bytes::BufMut;

use crate::block::{BlockState, GlobalBlockPalette};
use crate::buffer::{put_bytes, put_i32s, put_len, put_opt_string, put_string, ByteReader};
use crate::chunk::HeightmapKind;
use crate::error::{Error, Result};
use crate::format::{CURRENT_VERSION, VERSION_INITIAL, VERSION_USER_DATA};
use crate::palette::MAX_BIT_WIDTH;
use crate::section::LIGHT_BYTES;
use crate::tag::{Compound, Tag};

// ── Tree keys ──────────────────────────────────────────────────────────────

pub(crate) const MIN_SECTION: &str = "min_section";
pub(crate) const MAX_SECTION: &str = "max_section";
pub(crate) const DATA_VERSION: &str = "data_version";
pub(crate) const USER_DATA: &str = "user_data";
pub(crate) const PALETTE: &str = "palette";
pub(crate) const NAME: &str = "name";
pub(crate) const PROPERTIES: &str = "properties";
pub(crate) const CHUNKS: &str = "chunks";
pub(crate) const X: &str = "x";
pub(crate) const Y: &str = "y";
pub(crate) const Z: &str = "z";
pub(crate) const SECTIONS: &str = "sections";
pub(crate) const EMPTY: &str = "empty";
pub(crate) const BLOCKS: &str = "blocks";
pub(crate) const BIOMES: &str = "biomes";
pub(crate) const MODE: &str = "mode";
pub(crate) const IDS: &str = "ids";
pub(crate) const NAMES: &str = "names";
pub(crate) const BITS: &str = "bits";
pub(crate) const DATA: &str = "data";
pub(crate) const LIGHT: &str = "light";
pub(crate) const BLOCK: &str = "block";
pub(crate) const SKY: &str = "sky";
pub(crate) const BLOCK_LIGHT: &str = "block_light";
pub(crate) const SKY_LIGHT: &str = "sky_light";
pub(crate) const CONTENT: &str = "content";
pub(crate) const HEIGHTMAP: &str = "heightmap";
pub(crate) const HEIGHTMAPS: &str = "heightmaps";
pub(crate) const BLOCK_ENTITIES: &str = "block_entities";
pub(crate) const ID: &str = "id";

pub(crate) const LIGHT_PRESENT: i8 = 3;
pub(crate) const LIGHT_MISSING: i8 = 0;

// ── Raw readers ────────────────────────────────────────────────────────────

/// Read a version 1 or 2 payload into its raw tree.
pub(crate) fn read_tree(payload: &[u8], version: u32) -> Result<Tag> {
    if !(VERSION_INITIAL..CURRENT_VERSION).contains(&version) {
        return Err(Error::UnsupportedVersion {
            found: version,
            supported: CURRENT_VERSION,
        });
    }
    let mut r = ByteReader::new(payload);
    let mut world = Tag::compound()
        .with(MIN_SECTION, r.read_i8()?)
        .with(MAX_SECTION, r.read_i8()?);
    if version >= VERSION_USER_DATA {
        world.insert(DATA_VERSION, r.read_i32()?);
        world.insert(USER_DATA, Tag::decode(&mut r)?);
    }

    let palette = GlobalBlockPalette::decode(&mut r)?;
    world.insert(PALETTE, Tag::List(palette.iter().map(state_tree).collect()));

    let count = r.read_len(4)?;
    let mut chunks = Vec::with_capacity(count);
    for _ in 0..count {
        let record = r.read_bytes()?;
        let mut cr = ByteReader::new(record);
        let chunk = read_chunk(&mut cr, version)?;
        cr.expect_end("legacy chunk record")?;
        chunks.push(chunk);
    }
    world.insert(CHUNKS, Tag::List(chunks));
    r.expect_end("legacy world payload")?;
    Ok(world)
}

fn state_tree(state: &BlockState) -> Tag {
    let properties: Compound = state
        .properties()
        .iter()
        .map(|(k, v)| (k.clone(), Tag::String(v.clone())))
        .collect();
    Tag::compound()
        .with(NAME, state.name())
        .with(PROPERTIES, properties)
}

fn read_chunk(r: &mut ByteReader<'_>, version: u32) -> Result<Tag> {
    let x = r.read_i32()?;
    let z = r.read_i32()?;
    read_chunk_body(r, version, x, z).map_err(|e| e.in_chunk(x, z))
}

fn read_chunk_body(r: &mut ByteReader<'_>, version: u32, x: i32, z: i32) -> Result<Tag> {
    let mut chunk = Tag::compound().with(X, x).with(Z, z);

    let count = r.read_u8()?;
    let sections = (0..count).map(|_| read_section(r)).collect::<Result<Vec<_>>>()?;
    chunk.insert(SECTIONS, Tag::List(sections));

    if r.read_bool("heightmap flag")? {
        chunk.insert(HEIGHTMAP, r.read_i32s()?);
    }

    let entity_count = r.read_len(7)?;
    let mut entities = Vec::with_capacity(entity_count);
    for _ in 0..entity_count {
        let mut entity = Tag::compound()
            .with(X, r.read_u8()? as i8)
            .with(Y, r.read_i32()?)
            .with(Z, r.read_u8()? as i8);
        if let Some(id) = r.read_opt_string()? {
            entity.insert(ID, id);
        }
        let has_data = version < VERSION_USER_DATA || r.read_bool("block entity data flag")?;
        if has_data {
            entity.insert(DATA, Tag::decode(r)?);
        }
        entities.push(entity);
    }
    chunk.insert(BLOCK_ENTITIES, Tag::List(entities));

    if version >= VERSION_USER_DATA {
        chunk.insert(USER_DATA, Tag::decode(r)?);
    }
    Ok(chunk)
}

/// Sections before version 3 carry one flag for both light layers.
fn read_section(r: &mut ByteReader<'_>) -> Result<Tag> {
    if r.read_bool("section empty flag")? {
        return Ok(Tag::compound().with(EMPTY, 1i8));
    }
    let mut section = Tag::compound()
        .with(BLOCKS, read_block_storage(r)?)
        .with(BIOMES, read_biome_storage(r)?);
    if r.read_bool("light flag")? {
        let light = Tag::compound()
            .with(BLOCK, r.take(LIGHT_BYTES)?.to_vec())
            .with(SKY, r.take(LIGHT_BYTES)?.to_vec());
        section.insert(LIGHT, light);
    }
    Ok(section)
}

fn read_bits_and_data(r: &mut ByteReader<'_>, storage: Tag) -> Result<Tag> {
    let bits = r.read_u8()?;
    if bits > MAX_BIT_WIDTH {
        return Err(Error::malformed("index array", format!("bit width {bits} exceeds {MAX_BIT_WIDTH}")));
    }
    Ok(storage.with(BITS, bits as i8).with(DATA, r.read_bytes()?.to_vec()))
}

fn read_block_storage(r: &mut ByteReader<'_>) -> Result<Tag> {
    let mode = r.read_u8()?;
    let storage = Tag::compound().with(MODE, mode as i8);
    match mode {
        0 => Ok(storage.with(IDS, vec![r.read_u32()? as i32])),
        1 => {
            let len = r.read_len(4)?;
            let ids = (0..len).map(|_| Ok(r.read_u32()? as i32)).collect::<Result<Vec<i32>>>()?;
            read_bits_and_data(r, storage.with(IDS, ids))
        }
        2 => read_bits_and_data(r, storage),
        other => Err(Error::malformed("block array", format!("unknown storage mode {other}"))),
    }
}

fn read_biome_storage(r: &mut ByteReader<'_>) -> Result<Tag> {
    let mode = r.read_u8()?;
    let storage = Tag::compound().with(MODE, mode as i8);
    match mode {
        0 => Ok(storage.with(NAMES, Tag::List(vec![Tag::String(r.read_string()?)]))),
        1 => {
            let len = r.read_len(4)?;
            let names = (0..len).map(|_| Ok(Tag::String(r.read_string()?))).collect::<Result<Vec<_>>>()?;
            read_bits_and_data(r, storage.with(NAMES, Tag::List(names)))
        }
        other => Err(Error::malformed("biome array", format!("unknown storage mode {other}"))),
    }
}

// ── Lowering ───────────────────────────────────────────────────────────────

fn missing(name: &str) -> Error {
    Error::malformed("migrated world", format!("missing or mistyped field {name:?}"))
}

fn field<'a>(tag: &'a Tag, name: &str) -> Result<&'a Tag> {
    tag.get(name).ok_or_else(|| missing(name))
}

fn byte(tag: &Tag, name: &str) -> Result<i8> {
    field(tag, name)?.as_byte().ok_or_else(|| missing(name))
}

fn int(tag: &Tag, name: &str) -> Result<i32> {
    field(tag, name)?.as_int().ok_or_else(|| missing(name))
}

fn bytes_of<'a>(tag: &'a Tag, name: &str) -> Result<&'a [u8]> {
    field(tag, name)?.as_byte_array().ok_or_else(|| missing(name))
}

fn ints<'a>(tag: &'a Tag, name: &str) -> Result<&'a [i32]> {
    field(tag, name)?.as_int_array().ok_or_else(|| missing(name))
}

fn list<'a>(tag: &'a Tag, name: &str) -> Result<&'a [Tag]> {
    field(tag, name)?.as_list().ok_or_else(|| missing(name))
}

/// Write a current-version tree out as current-version payload bytes.
pub(crate) fn lower_current(world: &Tag) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.put_i8(byte(world, MIN_SECTION)?);
    buf.put_i8(byte(world, MAX_SECTION)?);
    buf.put_i32_le(int(world, DATA_VERSION)?);
    field(world, USER_DATA)?.encode(&mut buf)?;

    let palette = list(world, PALETTE)?;
    put_len(&mut buf, palette.len(), "global block palette")?;
    for entry in palette {
        lower_state(entry)?.encode(&mut buf)?;
    }

    let chunks = list(world, CHUNKS)?;
    put_len(&mut buf, chunks.len(), "chunk list")?;
    let mut record = Vec::new();
    for chunk in chunks {
        record.clear();
        lower_chunk(chunk, &mut record)?;
        put_bytes(&mut buf, &record)?;
    }
    Ok(buf)
}

fn lower_state(entry: &Tag) -> Result<BlockState> {
    let name = field(entry, NAME)?.as_str().ok_or_else(|| missing(NAME))?;
    let mut state = BlockState::new(name);
    if let Some(properties) = entry.get(PROPERTIES).and_then(Tag::as_compound) {
        for (key, value) in properties {
            let value = value.as_str().ok_or_else(|| missing(PROPERTIES))?;
            state = state.with_property(key.clone(), value);
        }
    }
    Ok(state)
}

fn lower_chunk(chunk: &Tag, buf: &mut Vec<u8>) -> Result<()> {
    let x = int(chunk, X)?;
    let z = int(chunk, Z)?;
    lower_chunk_body(chunk, x, z, buf).map_err(|e| e.in_chunk(x, z))
}

fn lower_chunk_body(chunk: &Tag, x: i32, z: i32, buf: &mut Vec<u8>) -> Result<()> {
    buf.put_i32_le(x);
    buf.put_i32_le(z);

    let sections = list(chunk, SECTIONS)?;
    let count = u8::try_from(sections.len())
        .map_err(|_| Error::malformed("migrated chunk", format!("{} sections", sections.len())))?;
    buf.put_u8(count);
    for section in sections {
        lower_section(section, buf)?;
    }

    let heightmaps = field(chunk, HEIGHTMAPS)?.as_compound().ok_or_else(|| missing(HEIGHTMAPS))?;
    let mut present = Vec::new();
    for (name, heights) in heightmaps {
        let kind = HeightmapKind::from_name(name)
            .ok_or_else(|| Error::malformed("migrated chunk", format!("unknown heightmap {name:?}")))?;
        let heights = heights.as_int_array().ok_or_else(|| missing(HEIGHTMAPS))?;
        present.push((kind, heights));
    }
    present.sort_by_key(|(kind, _)| *kind);
    buf.put_u32_le(present.iter().fold(0, |mask, (kind, _)| mask | kind.bit()));
    for (_, heights) in present {
        put_i32s(buf, heights)?;
    }

    let entities = list(chunk, BLOCK_ENTITIES)?;
    put_len(buf, entities.len(), "block entity list")?;
    for entity in entities {
        buf.put_u8(byte(entity, X)? as u8);
        buf.put_i32_le(int(entity, Y)?);
        buf.put_u8(byte(entity, Z)? as u8);
        put_opt_string(buf, entity.get(ID).and_then(Tag::as_str))?;
        match entity.get(DATA) {
            Some(data) => {
                buf.put_u8(1);
                data.encode(buf)?;
            }
            None => buf.put_u8(0),
        }
    }

    field(chunk, USER_DATA)?.encode(buf)
}

fn lower_section(section: &Tag, buf: &mut Vec<u8>) -> Result<()> {
    if section.get(EMPTY).and_then(Tag::as_byte) == Some(1) {
        buf.put_u8(1);
        return Ok(());
    }
    buf.put_u8(0);

    let blocks = field(section, BLOCKS)?;
    let mode = byte(blocks, MODE)?;
    buf.put_u8(mode as u8);
    match mode {
        0 => {
            let ids = ints(blocks, IDS)?;
            buf.put_u32_le(*ids.first().ok_or_else(|| missing(IDS))? as u32);
        }
        1 => {
            let ids = ints(blocks, IDS)?;
            put_len(buf, ids.len(), "block palette")?;
            for &id in ids {
                buf.put_u32_le(id as u32);
            }
            lower_bits_and_data(blocks, buf)?;
        }
        _ => lower_bits_and_data(blocks, buf)?,
    }

    let biomes = field(section, BIOMES)?;
    let mode = byte(biomes, MODE)?;
    buf.put_u8(mode as u8);
    let names = list(biomes, NAMES)?
        .iter()
        .map(|n| n.as_str().ok_or_else(|| missing(NAMES)))
        .collect::<Result<Vec<_>>>()?;
    if mode == 0 {
        put_string(buf, names.first().ok_or_else(|| missing(NAMES))?)?;
    } else {
        put_len(buf, names.len(), "biome palette")?;
        for name in names {
            put_string(buf, name)?;
        }
        lower_bits_and_data(biomes, buf)?;
    }

    lower_light(field(section, BLOCK_LIGHT)?, buf)?;
    lower_light(field(section, SKY_LIGHT)?, buf)
}

fn lower_bits_and_data(storage: &Tag, buf: &mut Vec<u8>) -> Result<()> {
    buf.put_u8(byte(storage, BITS)? as u8);
    put_bytes(buf, bytes_of(storage, DATA)?)
}

fn lower_light(light: &Tag, buf: &mut Vec<u8>) -> Result<()> {
    let content = byte(light, CONTENT)?;
    buf.put_u8(content as u8);
    if content == LIGHT_PRESENT {
        buf.put_slice(bytes_of(light, DATA)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_one_payload_reads_into_a_tree() {
        let mut p = Vec::new();
        p.put_i8(0);
        p.put_i8(0);
        // palette: one state, no properties
        p.put_u32_le(1);
        put_string(&mut p, "minecraft:stone").unwrap();
        p.put_u16_le(0);
        // one chunk with one single-mode section, no light, no heightmap
        let mut chunk = Vec::new();
        chunk.put_i32_le(4);
        chunk.put_i32_le(-4);
        chunk.put_u8(1);
        chunk.put_u8(0);
        chunk.put_u8(0);
        chunk.put_u32_le(0);
        chunk.put_u8(0);
        put_string(&mut chunk, "minecraft:plains").unwrap();
        chunk.put_u8(0);
        chunk.put_u8(0);
        chunk.put_u32_le(0);
        p.put_u32_le(1);
        put_bytes(&mut p, &chunk).unwrap();

        let tree = read_tree(&p, VERSION_INITIAL).unwrap();
        assert_eq!(tree.get(DATA_VERSION), None);
        let chunks = tree.get(CHUNKS).and_then(Tag::as_list).unwrap();
        assert_eq!(chunks[0].get(Z).and_then(Tag::as_int), Some(-4));
        let section = &chunks[0].get(SECTIONS).and_then(Tag::as_list).unwrap()[0];
        assert_eq!(section.get(LIGHT), None);
        assert_eq!(section.get(BLOCKS).and_then(|b| b.get(IDS)).and_then(Tag::as_int_array), Some(&[0][..]));

        p.push(0);
        assert!(matches!(read_tree(&p, VERSION_INITIAL), Err(Error::Malformed { .. })));
    }

    #[test]
    fn current_version_has_no_raw_reader() {
        let err = read_tree(&[], CURRENT_VERSION).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { found: 3, .. }));
    }

    #[test]
    fn lowering_reports_missing_fields() {
        let err = lower_current(&Tag::compound().with(MIN_SECTION, 0i8)).unwrap_err();
        assert!(err.to_string().contains("max_section"));
    }
}

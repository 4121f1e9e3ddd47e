//! Bridge between a running host world and [`WorldRecord`].
//!
//! The codec never talks to a game engine directly. A host exposes its
//! loaded world through [`WorldSource`] to be snapshotted for saving, and
//! accepts a decoded world back through [`WorldSink`].

use log::debug;

use crate::chunk::{Chunk, ChunkPos};
use crate::converter::UNKNOWN_DATA_VERSION;
use crate::error::Result;
use crate::tag::Tag;
use crate::world::{ChunkSelector, SectionRange, WorldRecord};

pub trait WorldSource {
    fn section_range(&self) -> SectionRange;

    fn data_version(&self) -> i32 {
        UNKNOWN_DATA_VERSION
    }

    fn user_data(&self) -> Tag {
        Tag::compound()
    }

    fn chunk_positions(&self) -> Vec<ChunkPos>;

    /// `None` if the chunk is not loaded any more.
    fn read_chunk(&self, pos: ChunkPos) -> Result<Option<Chunk>>;
}

pub trait WorldSink {
    /// Called once, before any chunk.
    fn set_world_metadata(&mut self, range: SectionRange, data_version: i32, user_data: &Tag) -> Result<()>;

    fn write_chunk(&mut self, chunk: &Chunk) -> Result<()>;
}

/// Copy the selected chunks of `source` into a new record.
pub fn snapshot(source: &dyn WorldSource, selector: &ChunkSelector) -> Result<WorldRecord> {
    let mut world = WorldRecord::new(source.section_range());
    world.data_version = source.data_version();
    world.user_data = source.user_data();

    let mut positions = source.chunk_positions();
    positions.sort();
    positions.dedup();
    for pos in positions.into_iter().filter(|p| selector.test(*p)) {
        if let Some(chunk) = source.read_chunk(pos)? {
            world.insert_chunk(chunk)?;
        }
    }
    debug!("snapshot captured {} chunks", world.chunk_count());
    Ok(world)
}

/// Hand every chunk of `world` to `sink`, in coordinate order. Returns the
/// number of chunks written.
pub fn restore(world: &WorldRecord, sink: &mut dyn WorldSink) -> Result<usize> {
    sink.set_world_metadata(world.section_range(), world.data_version, &world.user_data)?;
    let mut written = 0;
    for chunk in world.chunks() {
        sink.write_chunk(chunk)?;
        written += 1;
    }
    debug!("restored {written} chunks");
    Ok(written)
}

impl WorldSource for WorldRecord {
    fn section_range(&self) -> SectionRange {
        WorldRecord::section_range(self)
    }

    fn data_version(&self) -> i32 {
        self.data_version
    }

    fn user_data(&self) -> Tag {
        self.user_data.clone()
    }

    fn chunk_positions(&self) -> Vec<ChunkPos> {
        WorldRecord::chunk_positions(self).collect()
    }

    fn read_chunk(&self, pos: ChunkPos) -> Result<Option<Chunk>> {
        Ok(self.chunk(pos.x, pos.z).cloned())
    }
}

impl WorldSink for WorldRecord {
    fn set_world_metadata(&mut self, range: SectionRange, data_version: i32, user_data: &Tag) -> Result<()> {
        self.set_section_range(range.min(), range.max())?;
        self.data_version = data_version;
        self.user_data = user_data.clone();
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        self.insert_chunk(chunk.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::block::BlockState;
    use crate::error::Error;
    use crate::section::Section;

    /// Host keyed by position with chunks that may vanish between listing
    /// and reading.
    struct Loaded {
        chunks: HashMap<ChunkPos, Chunk>,
        listed_only: Vec<ChunkPos>,
    }

    impl WorldSource for Loaded {
        fn section_range(&self) -> SectionRange {
            SectionRange::new(0, 1).unwrap()
        }

        fn data_version(&self) -> i32 {
            3955
        }

        fn chunk_positions(&self) -> Vec<ChunkPos> {
            self.chunks.keys().chain(&self.listed_only).copied().collect()
        }

        fn read_chunk(&self, pos: ChunkPos) -> Result<Option<Chunk>> {
            Ok(self.chunks.get(&pos).cloned())
        }
    }

    #[derive(Default)]
    struct Recorder {
        metadata: Option<(SectionRange, i32)>,
        written: Vec<ChunkPos>,
    }

    impl WorldSink for Recorder {
        fn set_world_metadata(&mut self, range: SectionRange, data_version: i32, _user_data: &Tag) -> Result<()> {
            self.metadata = Some((range, data_version));
            Ok(())
        }

        fn write_chunk(&mut self, chunk: &Chunk) -> Result<()> {
            if self.metadata.is_none() {
                return Err(Error::Invalid("chunk before metadata".into()));
            }
            self.written.push(chunk.pos());
            Ok(())
        }
    }

    fn host() -> Loaded {
        let mut chunks = HashMap::new();
        for (x, z) in [(3, 3), (0, 1), (-8, 0)] {
            let mut chunk = Chunk::new(x, z, 2);
            chunk.sections[0] = Section::filled(BlockState::new("minecraft:bedrock"));
            chunks.insert(ChunkPos::new(x, z), chunk);
        }
        Loaded {
            chunks,
            listed_only: vec![ChunkPos::new(9, 9)],
        }
    }

    #[test]
    fn snapshot_skips_unloaded_and_unselected_chunks() {
        let world = snapshot(&host(), &ChunkSelector::radius(0, 0, 5)).unwrap();
        assert_eq!(world.data_version, 3955);
        assert_eq!(
            world.chunk_positions().collect::<Vec<_>>(),
            vec![ChunkPos::new(0, 1), ChunkPos::new(3, 3)]
        );
    }

    #[test]
    fn restore_writes_metadata_then_chunks_in_order() {
        let world = snapshot(&host(), &ChunkSelector::All).unwrap();
        let mut sink = Recorder::default();
        assert_eq!(restore(&world, &mut sink).unwrap(), 3);
        assert_eq!(sink.metadata, Some((SectionRange::new(0, 1).unwrap(), 3955)));
        assert_eq!(
            sink.written,
            vec![ChunkPos::new(-8, 0), ChunkPos::new(0, 1), ChunkPos::new(3, 3)]
        );
    }

    #[test]
    fn a_record_can_stand_in_for_a_host() {
        let world = snapshot(&host(), &ChunkSelector::All).unwrap();
        let mut copy = WorldRecord::default();
        restore(&world, &mut copy).unwrap();
        assert_eq!(copy, world);
    }
}

//! Format version upgrades.
//!
//! Payloads older than [`CURRENT_VERSION`] are read into a raw [`Tag`] tree
//! and walked up the chain one version at a time. An upgrader registered for
//! version `N` receives the version `N` tree and returns the version `N + 1`
//! tree.
//!
//! # Raw tree shape
//! ```text
//! world:   min_section: byte, max_section: byte,
//!          data_version: int, user_data: any         (version 2+)
//!          palette: [ { name: string, properties: { key: string } } ]
//!          chunks:  [ chunk ]
//! chunk:   x: int, z: int, sections: [ section ],
//!          heightmap: int[]                           (versions 1-2, optional)
//!          heightmaps: { motion_blocking: int[], .. } (version 3)
//!          block_entities: [ { x: byte, y: int, z: byte, id?: string, data?: any } ]
//!          user_data: any                             (version 2+)
//! section: empty: byte = 1, or
//!          blocks: { mode: byte, ids?: int[], bits?: byte, data?: byte[] }
//!          biomes: { mode: byte, names: [string], bits?: byte, data?: byte[] }
//!          light: { block: byte[], sky: byte[] }      (versions 1-2, optional)
//!          block_light, sky_light: { content: byte, data?: byte[] } (version 3)
//! ```

use std::collections::BTreeMap;
use std::fmt;

use log::debug;

use crate::chunk::HeightmapKind;
use crate::converter::UNKNOWN_DATA_VERSION;
use crate::error::{Error, Result};
use crate::format::{CURRENT_VERSION, VERSION_INITIAL, VERSION_USER_DATA};
use crate::legacy::{
    BLOCK, BLOCK_ENTITIES, BLOCK_LIGHT, CHUNKS, CONTENT, DATA, DATA_VERSION, EMPTY, HEIGHTMAP, HEIGHTMAPS,
    LIGHT, LIGHT_MISSING, LIGHT_PRESENT, NAME, PALETTE, SECTIONS, SKY, SKY_LIGHT, USER_DATA,
};
use crate::tag::Tag;

/// Turns a version `N` tree into a version `N + 1` tree.
pub type Upgrader = Box<dyn Fn(Tag) -> Result<Tag> + Send + Sync>;

/// Ordered registry of upgraders, keyed by the version they upgrade from.
pub struct MigrationChain {
    steps: BTreeMap<u32, Upgrader>,
}

impl Default for MigrationChain {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for MigrationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationChain")
            .field("from_versions", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MigrationChain {
    pub fn empty() -> Self {
        Self { steps: BTreeMap::new() }
    }

    /// Every upgrader this crate ships, covering all versions it can read.
    pub fn builtin() -> Self {
        let mut chain = Self::empty();
        chain.register(VERSION_INITIAL, upgrade_initial);
        chain.register(VERSION_USER_DATA, upgrade_user_data);
        chain
    }

    /// Register the upgrader for `from -> from + 1`, returning any it replaces.
    pub fn register(
        &mut self,
        from: u32,
        upgrader: impl Fn(Tag) -> Result<Tag> + Send + Sync + 'static,
    ) -> Option<Upgrader> {
        self.steps.insert(from, Box::new(upgrader))
    }

    pub fn unregister(&mut self, from: u32) -> Option<Upgrader> {
        self.steps.remove(&from)
    }

    pub fn without(mut self, from: u32) -> Self {
        self.unregister(from);
        self
    }

    /// Fail with the first missing step between `from` and `to`.
    pub fn check_path(&self, from: u32, to: u32) -> Result<()> {
        match (from..to).find(|v| !self.steps.contains_key(v)) {
            Some(gap) => Err(Error::MigrationGap { from: gap }),
            None => Ok(()),
        }
    }

    /// Apply every step from `from` up to `to`, in order. Nothing runs unless
    /// the whole path is registered.
    pub fn upgrade(&self, mut tree: Tag, from: u32, to: u32) -> Result<Tag> {
        self.check_path(from, to)?;
        for (&version, step) in self.steps.range(from..to) {
            debug!("upgrading world tree from version {version} to {}", version + 1);
            tree = step(tree)?;
        }
        Ok(tree)
    }

    pub fn upgrade_to_current(&self, tree: Tag, from: u32) -> Result<Tag> {
        self.upgrade(tree, from, CURRENT_VERSION)
    }
}

fn shape(reason: impl Into<String>) -> Error {
    Error::malformed("world tree", reason)
}

fn list_mut<'a>(tag: &'a mut Tag, name: &str) -> Result<&'a mut Vec<Tag>> {
    tag.get_mut(name)
        .and_then(Tag::as_list_mut)
        .ok_or_else(|| shape(format!("missing list {name:?}")))
}

/// 1 -> 2: the data version and user data fields appear. Block entity data
/// becomes optional, which needs no change.
fn upgrade_initial(mut world: Tag) -> Result<Tag> {
    world.insert(DATA_VERSION, UNKNOWN_DATA_VERSION);
    world.insert(USER_DATA, Tag::compound());
    for chunk in list_mut(&mut world, CHUNKS)? {
        chunk.insert(USER_DATA, Tag::compound());
    }
    Ok(world)
}

/// 2 -> 3: light layers get content states, the single heightmap becomes the
/// motion-blocking entry of a named set, and `grass` is now `short_grass`.
fn upgrade_user_data(mut world: Tag) -> Result<Tag> {
    for entry in list_mut(&mut world, PALETTE)? {
        if entry.get(NAME).and_then(Tag::as_str) == Some("minecraft:grass") {
            entry.insert(NAME, "minecraft:short_grass");
        }
    }

    for chunk in list_mut(&mut world, CHUNKS)? {
        let mut heightmaps = Tag::compound();
        if let Some(heights) = chunk.remove(HEIGHTMAP) {
            heightmaps.insert(HeightmapKind::MotionBlocking.name(), heights);
        }
        chunk.insert(HEIGHTMAPS, heightmaps);

        for section in list_mut(chunk, SECTIONS)? {
            if section.get(EMPTY).is_some() {
                continue;
            }
            let (block, sky) = match section.remove(LIGHT) {
                Some(mut light) => (present(light.remove(BLOCK))?, present(light.remove(SKY))?),
                None => (missing_light(), missing_light()),
            };
            section.insert(BLOCK_LIGHT, block);
            section.insert(SKY_LIGHT, sky);
        }

        if chunk.get(BLOCK_ENTITIES).is_none() {
            return Err(shape("chunk without a block entity list"));
        }
    }
    Ok(world)
}

fn present(data: Option<Tag>) -> Result<Tag> {
    let data = data.ok_or_else(|| shape("light layer without data"))?;
    Ok(Tag::compound().with(CONTENT, LIGHT_PRESENT).with(DATA, data))
}

fn missing_light() -> Tag {
    Tag::compound().with(CONTENT, LIGHT_MISSING)
}

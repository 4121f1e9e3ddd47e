//! Game data upgrades, separate from format migrations.
//!
//! A format migration changes how bytes are laid out. A data conversion
//! changes what the stored values mean, e.g. a block that was renamed between
//! game releases. The host supplies the converter; this crate only decides
//! when to call it.

use crate::block::BlockState;
use crate::chunk::BlockEntity;

/// Stored by worlds whose files predate the data version field.
pub const UNKNOWN_DATA_VERSION: i32 = -1;

pub trait DataConverter: Send + Sync {
    /// Data version the host runs at. Older worlds are converted up to it.
    fn data_version(&self) -> i32;

    /// Assumed version for worlds that never recorded one.
    fn default_data_version(&self) -> i32 {
        self.data_version()
    }

    fn convert_block_state(&self, _state: &mut BlockState, _from: i32, _to: i32) {}

    /// Rewrite the world's block palette in place. Entries may become equal
    /// to one another.
    fn convert_block_palette(&self, palette: &mut [BlockState], from: i32, to: i32) {
        for state in palette {
            self.convert_block_state(state, from, to);
        }
    }

    fn convert_block_entity(&self, _entity: &mut BlockEntity, _from: i32, _to: i32) {}
}

/// Leaves every value alone; only fills in unknown data versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConverter {
    pub data_version: i32,
}

impl DataConverter for NoopConverter {
    fn data_version(&self) -> i32 {
        self.data_version
    }
}

/// Resolve the version a world was written at and whether it must be
/// converted up to the host's.
pub(crate) fn plan(stored: i32, converter: &dyn DataConverter) -> (i32, Option<i32>) {
    let from = if stored == UNKNOWN_DATA_VERSION {
        converter.default_data_version()
    } else {
        stored
    };
    let to = converter.data_version();
    (from, (from < to).then_some(to))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(i32, i32);

    impl DataConverter for Fixed {
        fn data_version(&self) -> i32 {
            self.0
        }
        fn default_data_version(&self) -> i32 {
            self.1
        }
    }

    struct Flatten;

    impl DataConverter for Flatten {
        fn data_version(&self) -> i32 {
            2
        }
        fn convert_block_state(&self, state: &mut BlockState, _from: i32, _to: i32) {
            if state.name() == "minecraft:grass_path" {
                state.set_name("minecraft:dirt_path");
            }
        }
    }

    #[test]
    fn palette_conversion_visits_every_state() {
        let mut palette = vec![
            BlockState::new("minecraft:grass_path"),
            BlockState::new("minecraft:stone"),
            BlockState::new("grass_path"),
        ];
        Flatten.convert_block_palette(&mut palette, 1, 2);
        assert_eq!(palette[0].name(), "minecraft:dirt_path");
        assert_eq!(palette[1].name(), "minecraft:stone");
        assert_eq!(palette[2].name(), "minecraft:dirt_path");
    }

    #[test]
    fn unknown_version_uses_the_default() {
        assert_eq!(plan(UNKNOWN_DATA_VERSION, &Fixed(3700, 3500)), (3500, Some(3700)));
        assert_eq!(plan(3700, &Fixed(3700, 3500)), (3700, None));
        assert_eq!(plan(3900, &Fixed(3700, 3500)), (3900, None));
    }
}

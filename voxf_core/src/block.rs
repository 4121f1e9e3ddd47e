use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::BufMut;

use crate::buffer::{put_len, put_string, ByteReader};
use crate::error::{Error, Result};
use crate::palette::{minimal_bit_width, Palette};

pub const DEFAULT_NAMESPACE: &str = "minecraft";
pub const AIR: &str = "minecraft:air";

/// A block type plus its property values, e.g.
/// `minecraft:oak_stairs[facing=north,half=top]`.
///
/// Names without a namespace are stored under [`DEFAULT_NAMESPACE`], so
/// `stone` and `minecraft:stone` are the same state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockState {
    name: String,
    properties: BTreeMap<String, String>,
}

impl BlockState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: namespaced(name.into()),
            properties: BTreeMap::new(),
        }
    }

    pub fn air() -> Self {
        Self::new(AIR)
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = namespaced(name.into());
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// `(namespace, path)` with the default namespace filled in.
    pub fn key(&self) -> (&str, &str) {
        match self.name.split_once(':') {
            Some((ns, path)) => (ns, path),
            None => (DEFAULT_NAMESPACE, &self.name),
        }
    }

    /// True for the empty-space sentinel, written either `air` or `minecraft:air`.
    pub fn is_air(&self) -> bool {
        self.name == AIR && self.properties.is_empty()
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        put_string(buf, &self.name)?;
        let count = u16::try_from(self.properties.len())
            .map_err(|_| Error::Invalid(format!("block {} has too many properties", self.name)))?;
        buf.put_u16_le(count);
        for (k, v) in &self.properties {
            put_string(buf, k)?;
            put_string(buf, v)?;
        }
        Ok(())
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let name = namespaced(r.read_string()?);
        let count = r.read_u16()?;
        let mut properties = BTreeMap::new();
        for _ in 0..count {
            let key = r.read_string()?;
            let value = r.read_string()?;
            if properties.insert(key.clone(), value).is_some() {
                return Err(Error::malformed(
                    "block state",
                    format!("{name} repeats property {key:?}"),
                ));
            }
        }
        Ok(Self { name, properties })
    }
}

fn namespaced(name: String) -> String {
    if name.contains(':') {
        name
    } else {
        format!("{DEFAULT_NAMESPACE}:{name}")
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.properties.is_empty() {
            f.write_str("[")?;
            for (i, (k, v)) in self.properties.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{k}={v}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

impl FromStr for BlockState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = |reason: &str| Error::malformed("block state string", format!("{s:?}: {reason}"));
        let (name, props) = match s.find('[') {
            Some(open) => {
                let inner = s[open + 1..]
                    .strip_suffix(']')
                    .ok_or_else(|| bad("missing closing ']'"))?;
                (&s[..open], Some(inner))
            }
            None => (s, None),
        };
        if name.is_empty() {
            return Err(bad("empty block name"));
        }
        let mut state = BlockState::new(name);
        if let Some(props) = props.filter(|p| !p.is_empty()) {
            for pair in props.split(',') {
                let (k, v) = pair.split_once('=').ok_or_else(|| bad("property without '='"))?;
                state.properties.insert(k.trim().to_owned(), v.trim().to_owned());
            }
        }
        Ok(state)
    }
}

/// World-wide catalogue of block states, built once per save by a pre-pass
/// over every chunk and never modified afterwards. Sections refer to block
/// states by their index here.
#[derive(Debug, Clone, Default)]
pub struct GlobalBlockPalette {
    palette: Palette<BlockState>,
}

impl GlobalBlockPalette {
    pub fn from_palette(palette: Palette<BlockState>) -> Self {
        Self { palette }
    }

    pub fn len(&self) -> usize {
        self.palette.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palette.is_empty()
    }

    pub fn id_of(&self, state: &BlockState) -> Option<u32> {
        self.palette.index_of(state)
    }

    pub fn state(&self, id: u32) -> Option<&BlockState> {
        self.palette.get(id)
    }

    pub fn states(&self) -> &[BlockState] {
        self.palette.values()
    }

    /// Fixed width of a raw global id in direct-mode sections.
    pub fn direct_bit_width(&self) -> u8 {
        minimal_bit_width(self.len())
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        put_len(buf, self.len(), "global block palette")?;
        for state in self.states() {
            state.encode(buf)?;
        }
        Ok(())
    }

    /// Decoded entries are kept in stored order even if two are equal, so
    /// stored ids stay valid.
    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Vec<BlockState>> {
        // name length + property count
        let len = r.read_len(6)?;
        (0..len).map(|_| BlockState::decode(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_prints_property_syntax() {
        let state: BlockState = "minecraft:oak_stairs[half=top,facing=north]".parse().unwrap();
        assert_eq!(state.name(), "minecraft:oak_stairs");
        assert_eq!(state.property("facing"), Some("north"));
        assert_eq!(state.to_string(), "minecraft:oak_stairs[facing=north,half=top]");

        let plain: BlockState = "stone".parse().unwrap();
        assert_eq!(plain.key(), ("minecraft", "stone"));
        assert_eq!(plain, BlockState::new("minecraft:stone"));
        assert!("oak_stairs[facing".parse::<BlockState>().is_err());
    }

    #[test]
    fn air_sentinel_accepts_bare_and_namespaced_names() {
        assert!(BlockState::new("air").is_air());
        assert!(BlockState::air().is_air());
        assert!(!BlockState::new("minecraft:cave_air").is_air());
        assert!(!BlockState::new("other:air").is_air());
    }

    #[test]
    fn encoded_state_round_trips() {
        let state = BlockState::new("minecraft:lever")
            .with_property("powered", "true")
            .with_property("face", "wall");
        let mut buf = Vec::new();
        state.encode(&mut buf).unwrap();
        let mut r = ByteReader::new(&buf);
        assert_eq!(BlockState::decode(&mut r).unwrap(), state);
        assert!(r.is_empty());
    }
}

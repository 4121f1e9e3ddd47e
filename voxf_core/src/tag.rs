//! Self-describing metadata values.
//!
//! Tags carry everything that has no fixed place in the binary layout:
//! block-entity data, per-chunk and per-world user data, and the raw trees
//! the migration chain rewrites.

use std::collections::BTreeMap;
use std::fmt;

use bytes::BufMut;

use crate::buffer::{put_len, put_string, ByteReader};
use crate::error::{Error, Result};

/// Deepest list/compound nesting accepted by the encoder and the decoder.
/// Both recurse once per level, on rayon workers' default stacks.
pub const MAX_DEPTH: usize = 128;

pub type Compound = BTreeMap<String, Tag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TagKind {
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}

/// Kind byte that ends a compound and marks an empty list.
const END: u8 = 0;

impl TagKind {
    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            1 => TagKind::Byte,
            2 => TagKind::Short,
            3 => TagKind::Int,
            4 => TagKind::Long,
            5 => TagKind::Float,
            6 => TagKind::Double,
            7 => TagKind::ByteArray,
            8 => TagKind::String,
            9 => TagKind::List,
            10 => TagKind::Compound,
            11 => TagKind::IntArray,
            12 => TagKind::LongArray,
            _ => return None,
        })
    }

    /// Smallest encoded payload of this kind, used to sanity-check list counts.
    fn min_payload(self) -> usize {
        match self {
            TagKind::Byte => 1,
            TagKind::Short => 2,
            TagKind::Int | TagKind::Float => 4,
            TagKind::Long | TagKind::Double => 8,
            TagKind::ByteArray | TagKind::String | TagKind::IntArray | TagKind::LongArray => 4,
            TagKind::List => 5,
            TagKind::Compound => 1,
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<u8>),
    String(String),
    /// All elements share one kind.
    List(Vec<Tag>),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl Default for Tag {
    fn default() -> Self {
        Tag::compound()
    }
}

impl Tag {
    pub fn compound() -> Tag {
        Tag::Compound(Compound::new())
    }

    /// Build a list, rejecting mixed element kinds up front.
    pub fn list(items: Vec<Tag>) -> Result<Tag> {
        check_homogeneous(&items)?;
        Ok(Tag::List(items))
    }

    pub fn kind(&self) -> TagKind {
        match self {
            Tag::Byte(_) => TagKind::Byte,
            Tag::Short(_) => TagKind::Short,
            Tag::Int(_) => TagKind::Int,
            Tag::Long(_) => TagKind::Long,
            Tag::Float(_) => TagKind::Float,
            Tag::Double(_) => TagKind::Double,
            Tag::ByteArray(_) => TagKind::ByteArray,
            Tag::String(_) => TagKind::String,
            Tag::List(_) => TagKind::List,
            Tag::Compound(_) => TagKind::Compound,
            Tag::IntArray(_) => TagKind::IntArray,
            Tag::LongArray(_) => TagKind::LongArray,
        }
    }

    /// Look up a field of a compound. Returns `None` for other kinds.
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.as_compound()?.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tag> {
        self.as_compound_mut()?.get_mut(name)
    }

    /// Insert into a compound, returning the previous value. Non-compound
    /// tags are left untouched and hand the value back.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Tag>) -> Option<Tag> {
        match self {
            Tag::Compound(map) => map.insert(name.into(), value.into()),
            _ => Some(value.into()),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Tag> {
        self.as_compound_mut()?.remove(name)
    }

    /// Builder-style insert for compounds.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Tag>) -> Tag {
        self.insert(name, value);
        self
    }

    pub fn is_empty_compound(&self) -> bool {
        matches!(self, Tag::Compound(map) if map.is_empty())
    }

    pub fn as_byte(&self) -> Option<i8> {
        match *self {
            Tag::Byte(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_short(&self) -> Option<i16> {
        match *self {
            Tag::Short(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Tag::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match *self {
            Tag::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Tag::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match *self {
            Tag::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tag::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_byte_array(&self) -> Option<&[u8]> {
        match self {
            Tag::ByteArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i32]> {
        match self {
            Tag::IntArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_long_array(&self) -> Option<&[i64]> {
        match self {
            Tag::LongArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Tag]> {
        match self {
            Tag::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Tag>> {
        match self {
            Tag::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Tag::Compound(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound_mut(&mut self) -> Option<&mut Compound> {
        match self {
            Tag::Compound(v) => Some(v),
            _ => None,
        }
    }

    /// Write the kind byte followed by the payload.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.put_u8(self.kind() as u8);
        self.encode_payload(buf, 0)
    }

    fn encode_payload(&self, buf: &mut Vec<u8>, depth: usize) -> Result<()> {
        if matches!(self, Tag::List(_) | Tag::Compound(_)) {
            check_depth(depth)?;
        }
        match self {
            Tag::Byte(v) => buf.put_i8(*v),
            Tag::Short(v) => buf.put_i16_le(*v),
            Tag::Int(v) => buf.put_i32_le(*v),
            Tag::Long(v) => buf.put_i64_le(*v),
            Tag::Float(v) => buf.put_f32_le(*v),
            Tag::Double(v) => buf.put_f64_le(*v),
            Tag::ByteArray(v) => {
                put_len(buf, v.len(), "byte array tag")?;
                buf.put_slice(v);
            }
            Tag::String(v) => put_string(buf, v)?,
            Tag::List(items) => {
                check_homogeneous(items)?;
                match items.first() {
                    Some(first) => buf.put_u8(first.kind() as u8),
                    None => buf.put_u8(END),
                }
                put_len(buf, items.len(), "list tag")?;
                for item in items {
                    item.encode_payload(buf, depth + 1)?;
                }
            }
            Tag::Compound(map) => {
                for (name, value) in map {
                    buf.put_u8(value.kind() as u8);
                    put_string(buf, name)?;
                    value.encode_payload(buf, depth + 1)?;
                }
                buf.put_u8(END);
            }
            Tag::IntArray(v) => {
                put_len(buf, v.len(), "int array tag")?;
                for &i in v {
                    buf.put_i32_le(i);
                }
            }
            Tag::LongArray(v) => {
                put_len(buf, v.len(), "long array tag")?;
                for &l in v {
                    buf.put_i64_le(l);
                }
            }
        }
        Ok(())
    }

    /// Read one tag (kind byte + payload) from `reader`.
    pub fn decode(reader: &mut ByteReader<'_>) -> Result<Tag> {
        let id = reader.read_u8().map_err(malformed)?;
        let kind = TagKind::from_id(id).ok_or_else(|| Error::MalformedTag(format!("unknown tag kind {id}")))?;
        Self::decode_payload(kind, reader, 0).map_err(malformed)
    }

    /// Decode a tag that must occupy the whole slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Tag> {
        let mut reader = ByteReader::new(bytes);
        let tag = Tag::decode(&mut reader)?;
        reader.expect_end("tag").map_err(malformed)?;
        Ok(tag)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    fn decode_payload(kind: TagKind, r: &mut ByteReader<'_>, depth: usize) -> Result<Tag> {
        if matches!(kind, TagKind::List | TagKind::Compound) {
            check_depth(depth)?;
        }
        Ok(match kind {
            TagKind::Byte => Tag::Byte(r.read_i8()?),
            TagKind::Short => Tag::Short(r.read_i16()?),
            TagKind::Int => Tag::Int(r.read_i32()?),
            TagKind::Long => Tag::Long(r.read_i64()?),
            TagKind::Float => Tag::Float(r.read_f32()?),
            TagKind::Double => Tag::Double(r.read_f64()?),
            TagKind::ByteArray => Tag::ByteArray(r.read_bytes()?.to_vec()),
            TagKind::String => Tag::String(r.read_string()?),
            TagKind::List => {
                let elem_id = r.read_u8()?;
                if elem_id == END {
                    let len = r.read_u32()?;
                    if len != 0 {
                        return Err(Error::MalformedTag(format!(
                            "list without an element kind claims {len} elements"
                        )));
                    }
                    return Ok(Tag::List(Vec::new()));
                }
                let elem = TagKind::from_id(elem_id)
                    .ok_or_else(|| Error::MalformedTag(format!("unknown list element kind {elem_id}")))?;
                let len = r.read_len(elem.min_payload())?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(Self::decode_payload(elem, r, depth + 1)?);
                }
                Tag::List(items)
            }
            TagKind::Compound => {
                let mut map = Compound::new();
                loop {
                    let id = r.read_u8()?;
                    if id == END {
                        break;
                    }
                    let kind = TagKind::from_id(id)
                        .ok_or_else(|| Error::MalformedTag(format!("unknown tag kind {id}")))?;
                    let name = r.read_string()?;
                    let value = Self::decode_payload(kind, r, depth + 1)?;
                    if map.insert(name.clone(), value).is_some() {
                        return Err(Error::MalformedTag(format!("duplicate compound key {name:?}")));
                    }
                }
                Tag::Compound(map)
            }
            TagKind::IntArray => Tag::IntArray(r.read_i32s()?),
            TagKind::LongArray => {
                let len = r.read_len(8)?;
                let mut longs = Vec::with_capacity(len);
                for _ in 0..len {
                    longs.push(r.read_i64()?);
                }
                Tag::LongArray(longs)
            }
        })
    }
}

/// Anything that goes wrong inside a tag is reported as a malformed tag.
fn malformed(err: Error) -> Error {
    match err {
        Error::MalformedTag(_) => err,
        other => Error::MalformedTag(other.to_string()),
    }
}

/// `depth` counts the lists and compounds enclosing this one.
fn check_depth(depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
        return Err(Error::MalformedTag(format!("nesting deeper than {MAX_DEPTH}")));
    }
    Ok(())
}

fn check_homogeneous(items: &[Tag]) -> Result<()> {
    if let Some(first) = items.first() {
        let kind = first.kind();
        if let Some(odd) = items.iter().find(|t| t.kind() != kind) {
            return Err(Error::MalformedTag(format!(
                "list of {kind} also contains a {}",
                odd.kind()
            )));
        }
    }
    Ok(())
}

macro_rules! tag_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Tag {
            fn from(v: $ty) -> Tag {
                Tag::$variant(v)
            }
        })*
    };
}

tag_from! {
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<u8> => ByteArray,
    Vec<i32> => IntArray,
    Vec<i64> => LongArray,
    Compound => Compound,
}

impl From<&str> for Tag {
    fn from(v: &str) -> Tag {
        Tag::String(v.to_owned())
    }
}

impl From<bool> for Tag {
    fn from(v: bool) -> Tag {
        Tag::Byte(v as i8)
    }
}

/// `levels` compounds, each holding the next under "inner"; the innermost
/// holds a single byte.
#[cfg(test)]
pub(crate) fn nested(levels: usize) -> Tag {
    (1..levels).fold(Tag::compound().with("leaf", 1i8), |inner, _| {
        Tag::compound().with("inner", inner)
    })
}

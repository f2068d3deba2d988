//! Binary layout of the persisted vector index.
//!
//! ```text
//! magic    b"PRIX"
//! version  u16
//! dim      u32     (0 while no vector has been added)
//! count    u64
//! ids      count x (len: u32, utf-8 bytes)
//! vectors  count x dim x f32
//! ```
//! All integers and floats are little-endian.

use crate::error::StoreError;
use std::path::Path;

const MAGIC: [u8; 4] = *b"PRIX";
const VERSION: u16 = 1;

/// Flat L2 index: row `i` of `vectors` belongs to `ids[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FlatIndex {
    pub(crate) dimension: Option<usize>,
    pub(crate) vectors: Vec<f32>,
    pub(crate) ids: Vec<String>,
}

impl FlatIndex {
    pub(crate) fn len(&self) -> usize {
        match self.dimension {
            Some(dimension) if dimension > 0 => self.vectors.len() / dimension,
            _ => 0,
        }
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.vectors.chunks_exact(self.dimension.unwrap_or(1).max(1))
    }

    pub(crate) fn push(&mut self, id: String, vector: &[f32]) -> Result<(), StoreError> {
        match self.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None if vector.is_empty() => {
                return Err(StoreError::DimensionMismatch {
                    expected: 1,
                    actual: 0,
                });
            }
            None => self.dimension = Some(vector.len()),
        }
        self.vectors.extend_from_slice(vector);
        self.ids.push(id);
        Ok(())
    }
}

pub(crate) fn encode(index: &FlatIndex) -> Vec<u8> {
    let dimension = index.dimension.unwrap_or(0);
    let mut buffer = Vec::with_capacity(18 + index.vectors.len() * 4 + index.ids.len() * 32);

    buffer.extend_from_slice(&MAGIC);
    buffer.extend_from_slice(&VERSION.to_le_bytes());
    buffer.extend_from_slice(&(dimension as u32).to_le_bytes());
    buffer.extend_from_slice(&(index.ids.len() as u64).to_le_bytes());

    for id in &index.ids {
        buffer.extend_from_slice(&(id.len() as u32).to_le_bytes());
        buffer.extend_from_slice(id.as_bytes());
    }
    for value in &index.vectors {
        buffer.extend_from_slice(&value.to_le_bytes());
    }
    buffer
}

pub(crate) fn decode(bytes: &[u8], path: &Path) -> Result<FlatIndex, StoreError> {
    let mut cursor = Cursor {
        bytes,
        position: 0,
        path,
    };

    if cursor.take(4)? != MAGIC {
        return Err(cursor.corrupt("invalid magic"));
    }
    let version = u16::from_le_bytes(cursor.array()?);
    if version != VERSION {
        return Err(cursor.corrupt(&format!("unsupported version {version}")));
    }
    let dimension = u32::from_le_bytes(cursor.array()?) as usize;
    let count = usize::try_from(u64::from_le_bytes(cursor.array()?))
        .map_err(|_| cursor.corrupt("vector count overflows usize"))?;

    if count > 0 && dimension == 0 {
        return Err(cursor.corrupt("vectors present with zero dimension"));
    }

    let mut ids = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        let len = u32::from_le_bytes(cursor.array()?) as usize;
        let raw = cursor.take(len)?;
        let id = std::str::from_utf8(raw)
            .map_err(|_| cursor.corrupt("chunk id is not utf-8"))?
            .to_string();
        ids.push(id);
    }

    let floats = count
        .checked_mul(dimension)
        .ok_or_else(|| cursor.corrupt("vector block size overflows"))?;
    let mut vectors = Vec::with_capacity(floats.min(1 << 24));
    for _ in 0..floats {
        vectors.push(f32::from_le_bytes(cursor.array()?));
    }

    if cursor.position != bytes.len() {
        return Err(cursor.corrupt("trailing bytes after vector block"));
    }

    Ok(FlatIndex {
        dimension: (dimension > 0).then_some(dimension),
        vectors,
        ids,
    })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
    path: &'a Path,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], StoreError> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| self.corrupt("unexpected end of file"))?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], StoreError> {
        let slice = self.take(N)?;
        <[u8; N]>::try_from(slice).map_err(|_| self.corrupt("short read"))
    }

    fn corrupt(&self, details: &str) -> StoreError {
        StoreError::CorruptIndex {
            path: self.path.display().to_string(),
            details: format!("{details} at byte {}", self.position),
        }
    }
}

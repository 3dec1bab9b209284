//! Witness stack codec.
//!
//! Wire format of a per-input witness field:
//!
//! ```text
//! compact_size(item_count) || for each item: compact_size(len) || bytes
//! ```

use bitcoin::Witness;

use crate::error::{Error, Result};

/// Ordered witness items, bottom of the stack first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WitnessStack {
    items: Vec<Vec<u8>>,
}

impl WitnessStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<Vec<u8>>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, item: impl Into<Vec<u8>>) {
        self.items.push(item.into());
    }

    pub fn items(&self) -> &[Vec<u8>] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The last item, which for a script-hash spend is the witness script.
    pub fn last(&self) -> Option<&[u8]> {
        self.items.last().map(Vec::as_slice)
    }

    /// Serialize into the consensus witness field.
    pub fn encode(&self) -> Vec<u8> {
        let payload: usize = self.items.iter().map(|i| i.len() + 9).sum();
        let mut out = Vec::with_capacity(9 + payload);
        write_compact_size(&mut out, self.items.len() as u64);
        for item in &self.items {
            write_compact_size(&mut out, item.len() as u64);
            out.extend_from_slice(item);
        }
        out
    }

    /// Parse a consensus witness field. Trailing bytes are an error.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = bytes;
        let count = read_compact_size(&mut cursor)?;
        let mut items = Vec::with_capacity(count.min(1024) as usize);
        for i in 0..count {
            let len = read_compact_size(&mut cursor)? as usize;
            if cursor.len() < len {
                return Err(Error::Decode(format!(
                    "item {i} wants {len} bytes, {} left",
                    cursor.len()
                )));
            }
            let (item, rest) = cursor.split_at(len);
            items.push(item.to_vec());
            cursor = rest;
        }
        if !cursor.is_empty() {
            return Err(Error::Decode(format!(
                "{} trailing bytes after witness",
                cursor.len()
            )));
        }
        Ok(Self { items })
    }

    pub fn to_witness(&self) -> Witness {
        Witness::from_slice(&self.items)
    }
}

impl From<&Witness> for WitnessStack {
    fn from(witness: &Witness) -> Self {
        Self {
            items: witness.iter().map(<[u8]>::to_vec).collect(),
        }
    }
}

pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Read a compact size, rejecting non-canonical encodings.
pub fn read_compact_size(cursor: &mut &[u8]) -> Result<u64> {
    let (&prefix, rest) = cursor
        .split_first()
        .ok_or_else(|| Error::Decode("unexpected end of input".into()))?;
    *cursor = rest;

    let (width, min) = match prefix {
        0xfd => (2, 0xfd),
        0xfe => (4, 0x1_0000),
        0xff => (8, 0x1_0000_0000),
        n => return Ok(u64::from(n)),
    };
    if cursor.len() < width {
        return Err(Error::Decode("truncated compact size".into()));
    }
    let (raw, rest) = cursor.split_at(width);
    *cursor = rest;

    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(raw);
    let value = u64::from_le_bytes(buf);
    if value < min {
        return Err(Error::Decode(format!("non-canonical compact size {value}")));
    }
    Ok(value)
}

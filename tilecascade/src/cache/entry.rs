//! Cache entries and their on-disk encoding.
//!
//! A stored tile is a bincode header followed by the raw tile bytes:
//!
//! ```text
//! ┌──────────────────────────────┬───────────────────────┐
//! │ EntryHeader (bincode, varint)│ payload (payload_len) │
//! └──────────────────────────────┴───────────────────────┘
//! ```
//!
//! The header repeats the tile key so a file that ended up under the
//! wrong path is detected and treated as corrupt.

use std::io::Read;

use bincode::Options;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::traits::StoreError;
use crate::coord::TileIndex;

/// Marks the start of every encoded entry.
const ENTRY_MAGIC: [u8; 4] = *b"TCE1";

/// Current header layout version.
const ENTRY_VERSION: u8 = 1;

/// Upper bound on the encoded header size. Anything larger is corrupt.
const HEADER_LIMIT: u64 = 4096;

/// A cached tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    index: TileIndex,
    data: Bytes,
    expires_at: DateTime<Utc>,
    validator: Option<String>,
    stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stored now.
    pub fn new(index: TileIndex, data: impl Into<Bytes>, expires_at: DateTime<Utc>) -> Self {
        Self {
            index,
            data: data.into(),
            expires_at,
            validator: None,
            stored_at: Utc::now(),
        }
    }

    /// Attaches an HTTP validator (ETag or Last-Modified).
    pub fn with_validator(mut self, validator: Option<String>) -> Self {
        self.validator = validator;
        self
    }

    pub fn index(&self) -> &TileIndex {
        &self.index
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn validator(&self) -> Option<&str> {
        self.validator.as_deref()
    }

    pub fn stored_at(&self) -> DateTime<Utc> {
        self.stored_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Encodes the entry as header + payload.
    pub(crate) fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let header = EntryHeader {
            magic: ENTRY_MAGIC,
            version: ENTRY_VERSION,
            source: self.index.source().to_string(),
            zoom: self.index.zoom(),
            x: self.index.x(),
            y: self.index.y(),
            expires_at_ms: self.expires_at.timestamp_millis(),
            stored_at_ms: self.stored_at.timestamp_millis(),
            validator: self.validator.clone(),
            payload_len: self.data.len() as u64,
        };
        let mut buffer = codec()
            .serialize(&header)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        buffer.extend_from_slice(&self.data);
        Ok(buffer)
    }

    /// Decodes an entry, checking it belongs to `expected`.
    ///
    /// Returns `None` for anything that does not decode cleanly.
    pub(crate) fn decode(expected: &TileIndex, raw: &[u8]) -> Option<Self> {
        let mut reader = raw;
        let header = EntryHeader::read_from(&mut reader)?;
        if !header.matches(expected) || header.payload_len != reader.len() as u64 {
            return None;
        }
        Some(Self {
            index: expected.clone(),
            data: Bytes::copy_from_slice(reader),
            expires_at: DateTime::from_timestamp_millis(header.expires_at_ms)?,
            validator: header.validator,
            stored_at: DateTime::from_timestamp_millis(header.stored_at_ms)?,
        })
    }
}

/// Fixed-layout metadata written ahead of the payload.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EntryHeader {
    magic: [u8; 4],
    version: u8,
    source: String,
    zoom: u8,
    x: u32,
    y: u32,
    expires_at_ms: i64,
    stored_at_ms: i64,
    validator: Option<String>,
    payload_len: u64,
}

impl EntryHeader {
    /// Reads just the header, leaving the reader positioned at the payload.
    pub(crate) fn read_from<R: Read>(reader: R) -> Option<Self> {
        let header: EntryHeader = codec().deserialize_from(reader).ok()?;
        if header.magic != ENTRY_MAGIC || header.version != ENTRY_VERSION {
            return None;
        }
        Some(header)
    }

    fn matches(&self, index: &TileIndex) -> bool {
        self.source == index.source()
            && self.zoom == index.zoom()
            && self.x == index.x()
            && self.y == index.y()
    }

    pub(crate) fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expires_at_ms)
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(HEADER_LIMIT)
}

//! Log record definitions
//!
//! Defines the records appended to a segment and their on-disk frame.

use serde::{Deserialize, Serialize};

use crate::error::{DataLayerError, Result};

/// Frame header: payload length (4) + CRC32 of the payload (4)
pub const FRAME_HEADER_SIZE: usize = 8;

/// A single record in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Sequence number - monotonically increasing per disk
    pub seq: u64,

    /// The key the operation applies to
    pub key: Vec<u8>,

    /// The operation to perform
    pub operation: Operation,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Store the non-key columns of a key at a version
    Put { value: Vec<Vec<u8>>, version: u64 },

    /// Delete a key
    Delete,
}

impl LogRecord {
    pub fn put(seq: u64, key: Vec<u8>, value: Vec<Vec<u8>>, version: u64) -> Self {
        Self {
            seq,
            key,
            operation: Operation::Put { value, version },
        }
    }

    pub fn delete(seq: u64, key: Vec<u8>) -> Self {
        Self {
            seq,
            key,
            operation: Operation::Delete,
        }
    }

    /// Encode into a length-prefixed, checksummed frame
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            DataLayerError::Serialization(format!("record of {} bytes", payload.len()))
        })?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decode the frame at the start of `buf`
    ///
    /// Returns:
    /// - `Ok(Some((record, consumed)))`: a valid frame
    /// - `Ok(None)`: end of written data (zero length or no room for a header)
    /// - `Err(LogCorruption)`: torn frame or checksum mismatch
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let len = read_u32(&buf[0..4]) as usize;
        if len == 0 {
            return Ok(None);
        }

        let crc = read_u32(&buf[4..8]);
        let end = FRAME_HEADER_SIZE + len;
        if buf.len() < end {
            return Err(DataLayerError::LogCorruption(format!(
                "frame of {} bytes truncated at {}",
                len,
                buf.len() - FRAME_HEADER_SIZE
            )));
        }

        let payload = &buf[FRAME_HEADER_SIZE..end];
        if crc32fast::hash(payload) != crc {
            return Err(DataLayerError::LogCorruption("checksum mismatch".to_string()));
        }

        let record = bincode::deserialize(payload)?;
        Ok(Some((record, end)))
    }

    /// Decode every frame in `buf`, stopping at the end marker
    ///
    /// Returns the records and the number of bytes they occupy. A corrupt
    /// frame ends the scan; the error is returned alongside what was read.
    pub fn decode_all(buf: &[u8]) -> (Vec<Self>, usize, Option<DataLayerError>) {
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            match Self::decode(&buf[offset..]) {
                Ok(Some((record, consumed))) => {
                    records.push(record);
                    offset += consumed;
                }
                Ok(None) => return (records, offset, None),
                Err(e) => return (records, offset, Some(e)),
            }
        }
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

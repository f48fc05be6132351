//! Package payload segments.
//!
//! A plaintext payload is a run of segments, each a little-endian `u16`
//! target offset, a little-endian `u16` length and that many data bytes.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::package::PackageError;

/// Offset and length fields.
pub const SEGMENT_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub offset: u16,
    pub data: Vec<u8>,
}

impl Segment {
    pub fn new(offset: u16, data: &[u8]) -> Self {
        Self {
            offset,
            data: data.to_vec(),
        }
    }

    /// Bytes this segment occupies in a payload.
    pub fn encoded_len(&self) -> usize {
        SEGMENT_HEADER_LEN + self.data.len()
    }
}

/// Split a plaintext payload into segments.
pub fn parse_segments(payload: &[u8]) -> Result<Vec<Segment>, PackageError> {
    let mut cursor = Cursor::new(payload);
    let mut segments = Vec::new();
    while (cursor.position() as usize) < payload.len() {
        let at = cursor.position() as usize;
        let remaining = payload.len() - at;
        if remaining < SEGMENT_HEADER_LEN {
            return Err(PackageError::Segment {
                offset: at,
                reason: format!("{remaining} trailing bytes, too short for a segment header"),
            });
        }
        let offset = cursor.read_u16::<LittleEndian>().map_err(|e| segment_io(at, e))?;
        let len = cursor.read_u16::<LittleEndian>().map_err(|e| segment_io(at, e))? as usize;
        let mut data = vec![0; len];
        cursor.read_exact(&mut data).map_err(|_| PackageError::Segment {
            offset: at,
            reason: format!(
                "declares {len} bytes, {} available",
                remaining - SEGMENT_HEADER_LEN
            ),
        })?;
        segments.push(Segment { offset, data });
    }
    Ok(segments)
}

/// Serialize segments back to a payload.
pub fn write_segments(segments: &[Segment]) -> Result<Vec<u8>, PackageError> {
    let mut out = Vec::with_capacity(segments.iter().map(Segment::encoded_len).sum());
    for segment in segments {
        let len = u16::try_from(segment.data.len()).map_err(|_| PackageError::Segment {
            offset: out.len(),
            reason: format!("{} bytes exceed a segment", segment.data.len()),
        })?;
        out.write_u16::<LittleEndian>(segment.offset)
            .map_err(|e| segment_io(out.len(), e))?;
        out.write_u16::<LittleEndian>(len)
            .map_err(|e| segment_io(out.len(), e))?;
        out.extend_from_slice(&segment.data);
    }
    Ok(out)
}

fn segment_io(offset: usize, err: std::io::Error) -> PackageError {
    PackageError::Segment {
        offset,
        reason: err.to_string(),
    }
}

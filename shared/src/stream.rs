use thiserror::Error;

use crate::constants::{MAX_DATAGRAM_LEN, MAX_ZONES};
use crate::state::{GlobalState, ZoneState};
use crate::types::{Micros, StreamSeq, ZoneId};

/// First two bytes of every stream frame ("LM" on the wire).
pub const STREAM_MAGIC: u16 = 0x4D4C;
/// Stream frame layout version.
pub const STREAM_VERSION: u8 = 1;

const HEADER_LEN: usize = 16;
const GLOBAL_LEN: usize = 9;
const ZONE_ENTRY_LEN: usize = 4;

/// Errors that can occur while encoding or decoding a stream frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Frame shorter than its declared contents
    #[error("Stream frame truncated: needed {expected} bytes, had {actual}")]
    Truncated { expected: usize, actual: usize },

    /// First two bytes were not the stream magic
    #[error("Bad stream magic {magic:#06x}")]
    BadMagic { magic: u16 },

    /// Frame layout version this build does not understand
    #[error("Unsupported stream frame version {version}")]
    UnsupportedVersion { version: u8 },

    /// Zone count over the fleet limit. Also guards the datagram size
    /// cap, since zones are the only variable-length section
    #[error("Stream frame zone count {count} exceeds limit {limit}")]
    TooManyZones { count: usize, limit: usize },
}

/// Best-effort "current output state" datagram, sent to READY nodes at
/// the stream cadence. No applyAt: receivers render the latest frame
/// they have seen and drop stale sequence numbers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFrame {
    pub seq: StreamSeq,
    pub hub_epoch_us: Micros,
    pub global: GlobalState,
    pub zones: Vec<StreamZone>,
}

/// Per-zone slice of a stream frame. Only the fields that matter at
/// render time travel here; full zone geometry moves on the control
/// plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamZone {
    pub id: ZoneId,
    pub effect: u8,
    pub brightness: u8,
    pub blend: u8,
}

impl StreamZone {
    pub fn from_state(zone: &ZoneState) -> Self {
        Self {
            id: zone.id,
            effect: zone.effect,
            brightness: zone.brightness,
            blend: zone.blend,
        }
    }
}

impl StreamFrame {
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + GLOBAL_LEN + 1 + self.zones.len() * ZONE_ENTRY_LEN
    }

    /// Encode into a fresh buffer, little-endian throughout.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.zones.len() > MAX_ZONES {
            return Err(CodecError::TooManyZones {
                count: self.zones.len(),
                limit: MAX_ZONES,
            });
        }
        let len = self.encoded_len();
        debug_assert!(len <= MAX_DATAGRAM_LEN);

        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(&STREAM_MAGIC.to_le_bytes());
        buf.push(STREAM_VERSION);
        buf.push(0); // flags, reserved
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.extend_from_slice(&self.hub_epoch_us.to_le_bytes());

        let g = &self.global;
        buf.extend_from_slice(&[
            g.effect,
            g.brightness,
            g.speed,
            g.palette,
            g.hue,
            g.intensity,
            g.saturation,
            g.complexity,
            g.variation,
        ]);

        buf.push(self.zones.len() as u8);
        for zone in &self.zones {
            buf.extend_from_slice(&[zone.id.value(), zone.effect, zone.brightness, zone.blend]);
        }
        Ok(buf)
    }

    /// Decode with full bounds checking; garbled input yields a
    /// [`CodecError`], never a panic.
    pub fn decode(bytes: &[u8]) -> Result<StreamFrame, CodecError> {
        let mut reader = FrameReader::new(bytes);

        let magic = reader.read_u16()?;
        if magic != STREAM_MAGIC {
            return Err(CodecError::BadMagic { magic });
        }
        let version = reader.read_u8()?;
        if version != STREAM_VERSION {
            return Err(CodecError::UnsupportedVersion { version });
        }
        let _flags = reader.read_u8()?;
        let seq = reader.read_u32()?;
        let hub_epoch_us = reader.read_u64()?;

        let global = GlobalState {
            effect: reader.read_u8()?,
            brightness: reader.read_u8()?,
            speed: reader.read_u8()?,
            palette: reader.read_u8()?,
            hue: reader.read_u8()?,
            intensity: reader.read_u8()?,
            saturation: reader.read_u8()?,
            complexity: reader.read_u8()?,
            variation: reader.read_u8()?,
        };

        let zone_count = reader.read_u8()? as usize;
        if zone_count > MAX_ZONES {
            return Err(CodecError::TooManyZones {
                count: zone_count,
                limit: MAX_ZONES,
            });
        }
        let mut zones = Vec::with_capacity(zone_count);
        for _ in 0..zone_count {
            zones.push(StreamZone {
                id: ZoneId::new(reader.read_u8()?),
                effect: reader.read_u8()?,
                brightness: reader.read_u8()?,
                blend: reader.read_u8()?,
            });
        }

        Ok(StreamFrame {
            seq,
            hub_epoch_us,
            global,
            zones,
        })
    }
}

/// Returns whether a wrapping stream sequence is newer than another.
/// stream_seq_newer(2, 1) will return true
/// stream_seq_newer(1, 2) will return false
/// stream_seq_newer(1, 1) will return false
pub fn stream_seq_newer(s1: StreamSeq, s2: StreamSeq) -> bool {
    ((s1 > s2) && (s1 - s2 <= u32::MAX / 2)) || ((s1 < s2) && (s2 - s1 > u32::MAX / 2))
}

// Bounds-checked cursor over frame bytes.
struct FrameReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos + count;
        if end > self.bytes.len() {
            return Err(CodecError::Truncated {
                expected: end,
                actual: self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Microseconds in the hub epoch (since hub start). All scheduling math
/// happens in this timebase.
pub type Micros = u64;
/// Stream frame sequence number. Wraps; receivers drop stale frames.
pub type StreamSeq = u32;
pub type EffectId = u8;
pub type PaletteId = u8;

// NodeId
//
// Stable for the lifetime of a hardware address's membership in the
// fleet. Zero is never a valid id.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u8);

impl NodeId {
    pub fn new(value: u8) -> Self {
        NodeId(value)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ZoneId
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(u8);

impl ZoneId {
    pub fn new(value: u8) -> Self {
        ZoneId(value)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid hardware address: {input}")]
pub struct ParseAddrError {
    pub input: String,
}

impl ParseAddrError {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
        }
    }
}

// HwAddr
//
// MAC-style hardware address, the durable identity a node presents in
// its hello. Formatted `AA:BB:CC:DD:EE:FF` on the wire.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HwAddr([u8; 6]);

impl HwAddr {
    pub fn new(octets: [u8; 6]) -> Self {
        HwAddr(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for HwAddr {
    type Err = ParseAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in s.split(':') {
            if count >= 6 || part.len() != 2 {
                return Err(ParseAddrError::new(s));
            }
            octets[count] =
                u8::from_str_radix(part, 16).map_err(|_| ParseAddrError::new(s))?;
            count += 1;
        }
        if count != 6 {
            return Err(ParseAddrError::new(s));
        }
        Ok(HwAddr(octets))
    }
}

impl TryFrom<String> for HwAddr {
    type Error = ParseAddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HwAddr> for String {
    fn from(addr: HwAddr) -> Self {
        addr.to_string()
    }
}

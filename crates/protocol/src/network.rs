//! Logical network (channel) identifiers
//!
//! A physical link multiplexes several virtual buses. Each frame names the
//! bus it belongs to with a network id; short-format frames can only carry
//! ids below 16.

use serde::{Deserialize, Serialize};

/// Known logical networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum NetId {
    /// The device itself (status, timestamps)
    Device = 0,
    HsCan = 1,
    MsCan = 2,
    SwCan = 3,
    LsftCan = 4,
    /// Command and control channel of the device's main processor
    Main51 = 11,
    Red = 12,
    Lin = 16,
    HsCan2 = 42,
    HsCan3 = 44,
    HsCan4 = 61,
    HsCan5 = 62,
    FlexRay = 85,
    Ethernet = 93,
}

/// Broad class of a network, used as the first key of the decode table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkClass {
    Control,
    Can,
    Other,
}

impl NetId {
    /// Highest id representable in a short-format header nibble
    pub const MAX_SHORT_ID: u16 = 0x0F;

    /// Look up a raw id
    pub fn from_u16(id: u16) -> Option<Self> {
        let net = match id {
            0 => NetId::Device,
            1 => NetId::HsCan,
            2 => NetId::MsCan,
            3 => NetId::SwCan,
            4 => NetId::LsftCan,
            11 => NetId::Main51,
            12 => NetId::Red,
            16 => NetId::Lin,
            42 => NetId::HsCan2,
            44 => NetId::HsCan3,
            61 => NetId::HsCan4,
            62 => NetId::HsCan5,
            85 => NetId::FlexRay,
            93 => NetId::Ethernet,
            _ => return None,
        };
        Some(net)
    }

    /// Raw wire value
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn class(self) -> NetworkClass {
        match self {
            NetId::Device | NetId::Main51 => NetworkClass::Control,
            NetId::HsCan
            | NetId::MsCan
            | NetId::SwCan
            | NetId::LsftCan
            | NetId::HsCan2
            | NetId::HsCan3
            | NetId::HsCan4
            | NetId::HsCan5 => NetworkClass::Can,
            NetId::Red | NetId::Lin | NetId::FlexRay | NetId::Ethernet => NetworkClass::Other,
        }
    }

    pub fn is_can(self) -> bool {
        self.class() == NetworkClass::Can
    }

    /// Whether the id fits in a short-format header
    pub fn fits_short_header(self) -> bool {
        self.as_u16() <= Self::MAX_SHORT_ID
    }
}

impl std::fmt::Display for NetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

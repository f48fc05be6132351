//! Legacy two-byte ASCII commands.
//!
//! Older firmware reads a bare tag such as `rt` from the command file. The
//! tags double as two-byte EBML IDs in the `mide.ss.cmd` schema.

use std::fmt;

use super::constants::*;

/// A legacy fire-and-forget command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LegacyCommand {
    RecStart,
    LegacyFW,
    LegacyBL,
    LegacyAll,
    FlashPackage,
    LegacyUP,
    LegacyESP,
    SecureUpdateAll,
    Reset,
    SetKeys,
}

impl LegacyCommand {
    pub const ALL: [LegacyCommand; 10] = [
        LegacyCommand::RecStart,
        LegacyCommand::LegacyFW,
        LegacyCommand::LegacyBL,
        LegacyCommand::LegacyAll,
        LegacyCommand::FlashPackage,
        LegacyCommand::LegacyUP,
        LegacyCommand::LegacyESP,
        LegacyCommand::SecureUpdateAll,
        LegacyCommand::Reset,
        LegacyCommand::SetKeys,
    ];

    /// Wire tag, which is also the element ID.
    pub const fn tag(&self) -> u16 {
        match self {
            LegacyCommand::RecStart => CMD_REC_START,
            LegacyCommand::LegacyFW => CMD_LEGACY_FW,
            LegacyCommand::LegacyBL => CMD_LEGACY_BL,
            LegacyCommand::LegacyAll => CMD_LEGACY_ALL,
            LegacyCommand::FlashPackage => CMD_FLASH_PACKAGE,
            LegacyCommand::LegacyUP => CMD_LEGACY_UP,
            LegacyCommand::LegacyESP => CMD_LEGACY_ESP,
            LegacyCommand::SecureUpdateAll => CMD_SECURE_UPDATE_ALL,
            LegacyCommand::Reset => CMD_RESET,
            LegacyCommand::SetKeys => CMD_SET_KEYS,
        }
    }

    pub fn from_tag(tag: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tag() == tag)
    }

    /// Parse a bare two-byte tag.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            &[hi, lo] => Self::from_tag(u16::from_be_bytes([hi, lo])),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        self.tag().to_be_bytes()
    }

    /// Element name in the command schema.
    pub const fn name(&self) -> &'static str {
        match self {
            LegacyCommand::RecStart => "RecStart",
            LegacyCommand::LegacyFW => "LegacyFW",
            LegacyCommand::LegacyBL => "LegacyBL",
            LegacyCommand::LegacyAll => "LegacyAll",
            LegacyCommand::FlashPackage => "FlashPackage",
            LegacyCommand::LegacyUP => "LegacyUP",
            LegacyCommand::LegacyESP => "LegacyESP",
            LegacyCommand::SecureUpdateAll => "SecureUpdateAll",
            LegacyCommand::Reset => "Reset",
            LegacyCommand::SetKeys => "SetKeys",
        }
    }

    pub fn as_ascii(&self) -> String {
        self.to_bytes().iter().map(|&b| b as char).collect()
    }
}

impl fmt::Display for LegacyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.name(), self.as_ascii())
    }
}

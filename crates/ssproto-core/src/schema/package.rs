//! `mide.ss.fwpkg`: the firmware update package header.
//!
//! Header integers are written at fixed widths so a package can be patched
//! in place without shifting the payload.

use super::descriptor::{ElementDef, SchemaDef};
use super::header::{CRC32, EBML_HEADER, VOID};

pub const DOC_TYPE: &str = "mide.ss.fwpkg";

pub const UPDATE_PKG_ID: u32 = 0x5000;
pub const MIN_HW_REV_ID: u32 = 0x5001;
pub const FW_REV_ID: u32 = 0x5002;
pub const MIN_FW_REV_ID: u32 = 0x5003;
pub const KEY_SLOT_ID: u32 = 0x5004;
pub const PAYLOAD_LEN_ID: u32 = 0x5005;

const UPDATE_PKG_FIELDS: &[ElementDef] = &[
    ElementDef::uint("MinHWRev", MIN_HW_REV_ID).mandatory().width(2),
    ElementDef::uint("FWRev", FW_REV_ID).mandatory().width(4),
    ElementDef::uint("MinFWRev", MIN_FW_REV_ID).width(4),
    ElementDef::int("KeySlot", KEY_SLOT_ID).mandatory().width(2),
    ElementDef::uint("PayloadLen", PAYLOAD_LEN_ID).mandatory().width(4),
];

const ELEMENTS: &[ElementDef] = &[
    EBML_HEADER,
    VOID,
    CRC32,
    ElementDef::master("UpdatePkg", UPDATE_PKG_ID, UPDATE_PKG_FIELDS),
];

pub const PACKAGE_SCHEMA: SchemaDef = SchemaDef {
    doc_type: DOC_TYPE,
    version: 1,
    read_version: 1,
    elements: ELEMENTS,
};

//! EBML codec: vints, element trees, decoding, encoding and the CRC-32 guard.

pub mod crc;
pub mod decode;
pub mod encode;
pub mod error;
pub mod node;
pub mod vint;

mod validate;

pub use crc::CrcPolicy;
pub use decode::{DecodeOptions, DecodeReport, Decoded, decode, decode_element};
pub use encode::{encode, encode_all};
pub use error::{CodecError, CrcMismatch, Violation};
pub use node::{ElementNode, Value};
pub use vint::{MAX_ID_LENGTH, MAX_SIZE_LENGTH, UNKNOWN_SIZE};

//! Low-level integer encodings shared by every posting format: unsigned
//! LEB-128 varints for deltas, and QInt for four-field packed integers.

pub mod qint;
pub mod varint;

pub use qint::{qint_decode, qint_encode};
pub use varint::{decode_varint, encode_varint, write_varint};

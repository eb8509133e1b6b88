//! Purpose: Define the stable public Rust API boundary for strblob.
//! Exports: Field, region, reader, and error types needed by loaders and the CLI.
//! Role: Public, additive-only surface over the `core` modules.
//! Invariants: Re-exports only; no behavior lives here.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::entity::{DataSetRef, OffsetEntity};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::field::StringField;
pub use crate::core::format::{
    LENGTH_PREFIX_LEN, MAX_PAYLOAD_LEN, TERMINATOR, TERMINATOR_LEN, declared_len, encode_field,
    encoded_len, payload_len,
};
pub use crate::core::reader::{BinaryRead, FieldReader};
pub use crate::core::region::{Fields, StringRegion};

// Core modules implementing the field layout, decoding, caching, and error modeling.
pub mod entity;
pub mod error;
pub mod field;
pub mod format;
pub mod reader;
pub mod region;

//! Purpose: Decode length-prefixed UTF-8 string fields packed into shared binary blobs.
//! Exports: `api` (stable surface), `core` (layout, reader, fields, regions, errors).
//! Role: Library backing the `strblob` CLI and any loader that owns a string region.
//! Invariants: Entities are immutable after construction; only the text cache fills in.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;

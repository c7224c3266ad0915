//! Artifact store crate.
//!
//! Key-value blob storage for the source series, enriched outputs, and the
//! cursor, plus the CSV/JSON codecs for those artifacts.

pub mod codec;
pub mod local;
pub mod memory;
pub mod store;

pub use codec::{
    decode_cursor, decode_enriched, decode_series, encode_cursor, encode_enriched, encode_series,
};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use store::{ArtifactStore, WritePrecondition, WriteResult};

//! Binary Loyc Tree (BLT) encoder and decoder in Rust
//!
//! BLT is a compact binary serialization of Loyc trees: identifiers,
//! literals, and calls, each optionally decorated with attributes. Files
//! deduplicate three ways (symbols, call shapes, whole nodes) and decode in
//! one forward pass with no seeking.

mod builder;
/// Byte-level primitives: varints, fixed-width values, prefixed arrays
pub mod codec;
mod error;
/// On-disk vocabulary: magic, version, tags, templates
pub mod format;
mod intern;
/// The node algebra
pub mod node;
/// BLT decoder
pub mod read;
mod tables;
/// BLT encoder
pub mod write;

pub use self::error::{Error, Result};
pub use self::format::Version;
pub use self::node::{Decimal, Node, NodeFactory, SourceFactory, Value};
pub use self::read::{read_file, read_file_with};
pub use self::write::write_file;

//! Binary encodings of compiled code
//!
//! - [`binary`]: endianness-aware primitive reader/writer and the
//!   [`ObjectStorage`] that resolves assemblies by name
//! - [`il`]: method bodies
//! - [`assembly`]: whole assemblies (`NeslAssembly::get_raw_bytes` / `NeslAssembly::load`)

pub mod assembly;
pub mod binary;
pub mod il;

pub use binary::{Endianness, ObjectStorage, SerializationReader, SerializationWriter};
pub use il::{deserialize_il, serialize_il};

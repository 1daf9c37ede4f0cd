//! Primitive binary reader and writer

use crate::error::{Error, Result};
use crate::ir::NeslAssembly;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Byte order of multi-byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    /// Least significant byte first
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

macro_rules! write_number {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Writes a `", stringify!($ty), "`")]
            pub fn $name(&mut self, value: $ty) {
                match self.endianness {
                    Endianness::Little => self.buffer.extend_from_slice(&value.to_le_bytes()),
                    Endianness::Big => self.buffer.extend_from_slice(&value.to_be_bytes()),
                }
            }
        )*
    };
}

macro_rules! read_number {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Reads a `", stringify!($ty), "`")]
            pub fn $name(&mut self) -> Result<$ty> {
                let bytes = self.take::<{ std::mem::size_of::<$ty>() }>()?;
                Ok(match self.endianness {
                    Endianness::Little => <$ty>::from_le_bytes(bytes),
                    Endianness::Big => <$ty>::from_be_bytes(bytes),
                })
            }
        )*
    };
}

/// Growable output buffer
#[derive(Debug, Default)]
pub struct SerializationWriter {
    buffer: Vec<u8>,
    endianness: Endianness,
}

impl SerializationWriter {
    /// Empty little-endian writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty writer with the given byte order
    pub fn with_endianness(endianness: Endianness) -> Self {
        SerializationWriter {
            buffer: Vec::new(),
            endianness,
        }
    }

    /// Byte order of this writer
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    write_number! {
        write_u16: u16,
        write_u32: u32,
        write_i32: i32,
        write_u64: u64,
        write_f32: f32,
    }

    /// Writes a byte
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes `0` or `1`
    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(value as u8);
    }

    /// Writes raw bytes without a length prefix
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes an `i32` length followed by the bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_len(bytes.len())?;
        self.write_raw(bytes);
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Writes a collection length as `i32`
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len)
            .map_err(|_| Error::serialization(format!("length {} does not fit in i32", len)))?;
        self.write_i32(len);
        Ok(())
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing was written
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Written bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Cursor over serialized bytes
pub struct SerializationReader<'a> {
    data: &'a [u8],
    offset: usize,
    endianness: Endianness,
    storage: Option<Arc<ObjectStorage>>,
}

impl<'a> SerializationReader<'a> {
    /// Little-endian reader without storage
    pub fn new(data: &'a [u8]) -> Self {
        SerializationReader {
            data,
            offset: 0,
            endianness: Endianness::Little,
            storage: None,
        }
    }

    /// Sets the byte order
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Attaches the storage used to resolve assemblies
    pub fn with_storage(mut self, storage: Arc<ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Attached storage
    pub fn storage(&self) -> Result<&Arc<ObjectStorage>> {
        self.storage
            .as_ref()
            .ok_or_else(|| Error::serialization("reader has no object storage attached"))
    }

    /// Current read offset
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Bytes left
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_raw(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }

    read_number! {
        read_u16: u16,
        read_u32: u32,
        read_i32: i32,
        read_u64: u64,
        read_f32: f32,
    }

    /// Reads a byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    /// Reads a boolean written by [`SerializationWriter::write_bool`]
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::serialization(format!("invalid boolean byte {}", other))),
        }
    }

    /// Reads `len` raw bytes
    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::UnexpectedEndOfData {
                needed: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    /// Reads a length written by [`SerializationWriter::write_len`]
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| Error::serialization(format!("negative length {}", len)))
    }

    /// Reads length-prefixed bytes
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len()?;
        Ok(self.read_raw(len)?.to_vec())
    }

    /// Reads a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| Error::serialization(e.to_string()))
    }
}

/// Assemblies known while deserializing, by name
#[derive(Default)]
pub struct ObjectStorage {
    assemblies: RwLock<HashMap<String, Arc<NeslAssembly>>>,
    current: RwLock<Option<Arc<NeslAssembly>>>,
}

impl ObjectStorage {
    /// Empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that already knows the built-in `System` assembly
    pub fn with_default_library() -> Result<Self> {
        let storage = Self::new();
        storage.register(crate::compiler::default_library()?);
        Ok(storage)
    }

    /// Makes `assembly` and its transitive dependencies resolvable by name
    pub fn register(&self, assembly: Arc<NeslAssembly>) {
        for dependency in assembly.dependencies() {
            if !self.assemblies.read().contains_key(dependency.name()) {
                self.register(dependency.clone());
            }
        }
        self.assemblies
            .write()
            .insert(assembly.name().to_string(), assembly);
    }

    /// Assembly registered as `name`
    pub fn get(&self, name: &str) -> Result<Arc<NeslAssembly>> {
        self.assemblies
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::AssemblyNotFound(name.to_string()))
    }

    /// Sets the assembly IL containers are bound to while reading
    pub fn set_current(&self, assembly: Option<Arc<NeslAssembly>>) {
        *self.current.write() = assembly;
    }

    /// Assembly IL containers are bound to while reading
    pub fn current(&self) -> Result<Arc<NeslAssembly>> {
        self.current
            .read()
            .clone()
            .ok_or_else(|| Error::AssemblyNotFound("<current>".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_numbers() {
        let mut writer = SerializationWriter::with_endianness(Endianness::Big);
        writer.write_u32(0x0102_0304);
        writer.write_string("nesl").unwrap();
        let bytes = writer.into_bytes();
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);

        let mut reader = SerializationReader::new(&bytes).with_endianness(Endianness::Big);
        assert_eq!(reader.read_u32().unwrap(), 0x0102_0304);
        assert_eq!(reader.read_string().unwrap(), "nesl");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_read_past_end() {
        let mut reader = SerializationReader::new(&[1, 2]);
        match reader.read_u32() {
            Err(Error::UnexpectedEndOfData { needed, available }) => {
                assert_eq!((needed, available), (4, 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let mut writer = SerializationWriter::new();
        writer.write_i32(-5);
        let bytes = writer.into_bytes();
        assert!(SerializationReader::new(&bytes).read_bytes().is_err());
    }
}

//! Output of a SPIR-V compilation

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Pipeline stage of an entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    /// `GLCompute`, from `[Kernel]`
    Compute,
    /// `Vertex`, from `[VertexShader]`
    Vertex,
    /// `Fragment`, from `[FragmentShader]`
    Fragment,
}

/// One `OpEntryPoint` of the module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointInfo {
    /// Entry point name, the method name
    pub name: String,
    /// Full name of the NESL method
    pub method: String,
    /// Stage
    pub stage: ShaderStage,
    /// Work group size of compute entry points
    pub local_size: Option<[u32; 3]>,
    /// Input locations in flattening order
    pub inputs: Vec<InterfaceSlot>,
    /// Output locations in flattening order
    pub outputs: Vec<InterfaceSlot>,
}

/// A flattened entry point parameter or return field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSlot {
    /// `param.Field` or `return.Field`
    pub name: String,
    /// `Location` decoration; `None` for built-ins
    pub location: Option<u32>,
}

/// What a descriptor binding holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorKind {
    /// `RwBuffer<T>`
    StorageBuffer,
    /// `Texture2D<T>`
    StorageImage,
}

/// A resource the host must bind before dispatching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorBinding {
    /// `Owner.Full.Name.Field`
    pub name: String,
    /// Descriptor set, always 0
    pub set: u32,
    /// Binding number
    pub binding: u32,
    /// Resource kind
    pub kind: DescriptorKind,
    /// Byte stride of buffer elements; 0 for images
    pub stride: u32,
}

/// A push constant range used by an intrinsic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConstantRange {
    /// What the range carries
    pub name: String,
    /// Byte offset
    pub offset: u32,
    /// Byte size
    pub size: u32,
}

/// A compiled SPIR-V module plus what the host needs to build its pipeline
/// layout
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpirVCompilationResult {
    /// Module words, magic number first
    pub words: Vec<u32>,
    /// Push constant ranges
    pub push_constants: Vec<PushConstantRange>,
    /// Descriptor bindings ordered by binding number
    pub bindings: Vec<DescriptorBinding>,
    /// Entry points
    pub entry_points: Vec<EntryPointInfo>,
}

impl SpirVCompilationResult {
    /// Module as little-endian bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|word| word.to_le_bytes()).collect()
    }

    /// Entry point called `name`
    pub fn entry_point(&self, name: &str) -> Option<&EntryPointInfo> {
        self.entry_points.iter().find(|entry| entry.name == name)
    }

    /// Pipeline layout as pretty JSON: bindings, push constants and entry
    /// points, without the module words
    pub fn reflection_json(&self) -> Result<String> {
        let reflection = Reflection {
            push_constants: &self.push_constants,
            bindings: &self.bindings,
            entry_points: &self.entry_points,
        };
        serde_json::to_string_pretty(&reflection)
            .map_err(|error| Error::serialization(format!("reflection JSON: {}", error)))
    }
}

#[derive(Serialize)]
struct Reflection<'a> {
    push_constants: &'a [PushConstantRange],
    bindings: &'a [DescriptorBinding],
    entry_points: &'a [EntryPointInfo],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_bytes_is_little_endian() {
        let result = SpirVCompilationResult {
            words: vec![0x0723_0203, 1],
            ..SpirVCompilationResult::default()
        };
        assert_eq!(result.to_bytes(), vec![0x03, 0x02, 0x23, 0x07, 1, 0, 0, 0]);
    }

    #[test]
    fn test_reflection_omits_words() {
        let result = SpirVCompilationResult {
            words: vec![0x0723_0203],
            bindings: vec![DescriptorBinding {
                name: "Shaders.Blur.Image".to_string(),
                set: 0,
                binding: 0,
                kind: DescriptorKind::StorageImage,
                stride: 0,
            }],
            ..SpirVCompilationResult::default()
        };
        let json = result.reflection_json().unwrap();
        assert!(json.contains("\"StorageImage\""));
        assert!(!json.contains("words"));
    }
}

//! Module-wide state shared by every lowered function
//!
//! Functions are lowered one at a time; calls reserve the callee's id and
//! queue it. Global variables (built-ins, resources, push constants, static
//! fields) are created on first use and remembered per function so entry
//! points can list their interface transitively.

use super::result::{DescriptorBinding, DescriptorKind, PushConstantRange};
use super::types::SpirVModule;
use crate::error::{Error, Result};
use crate::ir::{identity_key, representation_of, resource_of, MethodRef, Representation, ResourceKind, TypeRef};
use rspirv::dr::Operand;
use rspirv::spirv::{BuiltIn, Decoration, StorageClass, Word};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;

/// Push constant block read by `VertexUtils.ObjectToClipPos`
pub(crate) const OBJECT_TO_CLIP: &str = "ObjectToClip";

#[derive(Debug, Default)]
struct FunctionUsage {
    interface: BTreeSet<Word>,
    callees: BTreeSet<Word>,
}

/// A descriptor-bound global
#[derive(Debug, Clone)]
pub(crate) struct ResourceVariable {
    pub variable: Word,
    pub ty: TypeRef,
}

pub(crate) struct CompilationContext {
    pub module: SpirVModule,
    functions: HashMap<usize, (MethodRef, Word)>,
    pending: VecDeque<(MethodRef, Word)>,
    usage: HashMap<Word, FunctionUsage>,
    builtins: HashMap<u32, Word>,
    resources: HashMap<(usize, u32), ResourceVariable>,
    statics: HashMap<(usize, u32), (TypeRef, Word)>,
    object_to_clip: Option<Word>,
    bindings: Vec<DescriptorBinding>,
    push_constants: Vec<PushConstantRange>,
}

impl CompilationContext {
    pub fn new(module: SpirVModule) -> Self {
        CompilationContext {
            module,
            functions: HashMap::new(),
            pending: VecDeque::new(),
            usage: HashMap::new(),
            builtins: HashMap::new(),
            resources: HashMap::new(),
            statics: HashMap::new(),
            object_to_clip: None,
            bindings: Vec::new(),
            push_constants: Vec::new(),
        }
    }

    /// Id of the function lowered from `method`, queueing it on first use
    pub fn function_id(&mut self, method: &MethodRef) -> Word {
        if let Some((_, id)) = self.functions.get(&identity_key(method)) {
            return *id;
        }
        let id = self.module.builder.id();
        self.functions.insert(identity_key(method), (method.clone(), id));
        self.pending.push_back((method.clone(), id));
        id
    }

    /// Next queued function
    pub fn next_pending(&mut self) -> Option<(MethodRef, Word)> {
        self.pending.pop_front()
    }

    pub fn record_call(&mut self, caller: Word, callee: Word) {
        self.usage.entry(caller).or_default().callees.insert(callee);
    }

    pub fn record_interface(&mut self, function: Word, variable: Word) {
        self.usage.entry(function).or_default().interface.insert(variable);
    }

    /// Input/Output variables used by `function` and everything it calls
    pub fn interface(&self, function: Word) -> Vec<Word> {
        let mut visited = BTreeSet::new();
        let mut interface = BTreeSet::new();
        let mut stack = vec![function];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(usage) = self.usage.get(&current) {
                interface.extend(usage.interface.iter().copied());
                stack.extend(usage.callees.iter().copied());
            }
        }
        interface.into_iter().collect()
    }

    /// `Input` variable decorated with `builtin`, created once per module
    pub fn builtin_input(&mut self, builtin: BuiltIn, value_type: Word, name: &str) -> Word {
        self.builtin(builtin, StorageClass::Input, value_type, name)
    }

    /// `Output` variable decorated with `builtin`, created once per module
    pub fn builtin_output(&mut self, builtin: BuiltIn, value_type: Word, name: &str) -> Word {
        self.builtin(builtin, StorageClass::Output, value_type, name)
    }

    fn builtin(&mut self, builtin: BuiltIn, class: StorageClass, value_type: Word, name: &str) -> Word {
        if let Some(variable) = self.builtins.get(&(builtin as u32)) {
            return *variable;
        }
        let pointer = self.module.pointer(class, value_type);
        let variable = self.module.builder.variable(pointer, None, class, None);
        self.module
            .builder
            .decorate(variable, Decoration::BuiltIn, [Operand::BuiltIn(builtin)]);
        self.module.name(variable, name);
        self.builtins.insert(builtin as u32, variable);
        variable
    }

    /// Descriptor-bound variable of the static field `owner.fields()[index]`.
    /// The binding number is the field's position among the owner's
    /// resource fields.
    pub fn resource(&mut self, owner: &TypeRef, index: u32) -> Result<ResourceVariable> {
        let key = (identity_key(owner), index);
        if let Some(resource) = self.resources.get(&key) {
            return Ok(resource.clone());
        }

        let fields = owner.fields()?;
        let field = fields
            .get(index as usize)
            .ok_or_else(|| Error::invalid_operation(format!("`{}` has no field #{}", owner, index)))?;
        let ty = field.field_type().clone();
        let kind = resource_of(&ty)
            .ok_or_else(|| Error::invalid_operation(format!("`{}` is not a resource", ty)))?;
        let binding = fields[..index as usize]
            .iter()
            .filter(|other| other.is_static() && resource_of(other.field_type()).is_some())
            .count() as u32;
        let element = ty
            .generic_arguments()
            .first()
            .cloned()
            .ok_or_else(|| Error::invalid_operation(format!("`{}` has no element type", ty)))?;

        let (variable, descriptor, stride) = match kind {
            ResourceKind::Buffer => {
                let (block, layout) = self.module.buffer_block(&element)?;
                let pointer = self.module.pointer(StorageClass::Uniform, block);
                let variable = self.module.builder.variable(pointer, None, StorageClass::Uniform, None);
                (variable, DescriptorKind::StorageBuffer, layout.stride())
            }
            ResourceKind::Texture2D => {
                let image = self.module.image(&element)?;
                let pointer = self.module.pointer(StorageClass::UniformConstant, image);
                let variable =
                    self.module
                        .builder
                        .variable(pointer, None, StorageClass::UniformConstant, None);
                (variable, DescriptorKind::StorageImage, 0)
            }
        };

        let name = format!("{}.{}", owner.full_name(), field.name());
        self.module
            .builder
            .decorate(variable, Decoration::DescriptorSet, [Operand::LiteralBit32(0)]);
        self.module
            .builder
            .decorate(variable, Decoration::Binding, [Operand::LiteralBit32(binding)]);
        self.module.name(variable, &name);
        debug!(resource = %name, binding, "bound resource");

        self.bindings.push(DescriptorBinding {
            name,
            set: 0,
            binding,
            kind: descriptor,
            stride,
        });
        let resource = ResourceVariable { variable, ty };
        self.resources.insert(key, resource.clone());
        Ok(resource)
    }

    /// `Private` variable backing a plain static field
    pub fn static_field(&mut self, owner: &TypeRef, index: u32) -> Result<(TypeRef, Word)> {
        let key = (identity_key(owner), index);
        if let Some(existing) = self.statics.get(&key) {
            return Ok(existing.clone());
        }

        let fields = owner.fields()?;
        let field = fields
            .get(index as usize)
            .ok_or_else(|| Error::invalid_operation(format!("`{}` has no field #{}", owner, index)))?;
        let ty = field.field_type().clone();
        let value_type = self.module.value_type(&ty)?;

        let initializer = match (representation_of(&ty), field.default_data()) {
            (Some(Representation::Scalar(_)), Some([flag])) => Some(self.module.constant_bool(*flag != 0)),
            (Some(Representation::Scalar(_)), Some(bytes)) if bytes.len() == 4 => {
                let mut word = [0u8; 4];
                word.copy_from_slice(bytes);
                Some(self.module.constant_bits(value_type, u32::from_le_bytes(word)))
            }
            _ => None,
        };

        let pointer = self.module.pointer(StorageClass::Private, value_type);
        let variable = self
            .module
            .builder
            .variable(pointer, None, StorageClass::Private, initializer);
        self.module
            .name(variable, &format!("{}.{}", owner.full_name(), field.name()));
        self.statics.insert(key, (ty.clone(), variable));
        Ok((ty, variable))
    }

    /// Push constant block holding the object-to-clip matrix
    pub fn object_to_clip(&mut self) -> Word {
        if let Some(variable) = self.object_to_clip {
            return variable;
        }

        let float4 = self.module.vector(crate::ir::ScalarKind::Float, 4);
        let matrix = self.module.builder.type_matrix(float4, 4);
        let block = self.module.builder.type_struct([matrix]);
        self.module.builder.decorate(block, Decoration::Block, []);
        self.module
            .builder
            .member_decorate(block, 0, Decoration::Offset, [Operand::LiteralBit32(0)]);
        self.module.builder.member_decorate(block, 0, Decoration::ColMajor, []);
        self.module
            .builder
            .member_decorate(block, 0, Decoration::MatrixStride, [Operand::LiteralBit32(16)]);

        let pointer = self.module.pointer(StorageClass::PushConstant, block);
        let variable = self
            .module
            .builder
            .variable(pointer, None, StorageClass::PushConstant, None);
        self.module.name(variable, OBJECT_TO_CLIP);

        self.push_constants.push(PushConstantRange {
            name: OBJECT_TO_CLIP.to_string(),
            offset: 0,
            size: 64,
        });
        self.object_to_clip = Some(variable);
        variable
    }

    /// Bindings and push constants collected so far
    pub fn into_layout(self) -> (SpirVModule, Vec<DescriptorBinding>, Vec<PushConstantRange>) {
        let mut bindings = self.bindings;
        bindings.sort_by(|left, right| left.binding.cmp(&right.binding).then_with(|| left.name.cmp(&right.name)));
        (self.module, bindings, self.push_constants)
    }
}

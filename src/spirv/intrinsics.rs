//! Hand-written SPIR-V for methods without an IL body
//!
//! The registry is keyed by the full name of the owner's generic definition
//! (or of the owner itself) and the method name, synthesized names such as
//! `'iG` and `'pGLength` included.

use super::function::FunctionLowering;
use super::types::unsupported;
use crate::error::{Error, Result};
use crate::il::OpCode;
use crate::ir::representation::{
    COMPUTE_UTILS, FLOAT32, INT32, RW_BUFFER, TEXTURE_2D, UINT32, VERTEX_UTILS,
};
use crate::ir::{representation_of, MethodRef, NeslOperators, Representation, ScalarKind, TypeRef};
use lazy_static::lazy_static;
use rspirv::spirv::{BuiltIn, StorageClass, Word};
use std::collections::HashMap;

/// Arguments of one intrinsic call site
pub(crate) struct IntrinsicCall<'a> {
    /// Resolved target
    pub method: &'a MethodRef,
    /// IL variables, receiver first for instance methods
    pub arguments: &'a [u32],
}

/// Emits the body of an intrinsic inline; returns the result value
pub(crate) type Intrinsic = fn(&mut FunctionLowering<'_>, &IntrinsicCall<'_>) -> Result<Option<Word>>;

/// Intrinsics by (owner definition, method name)
pub(crate) struct IntrinsicRegistry {
    entries: HashMap<(String, String), Intrinsic>,
}

lazy_static! {
    pub(crate) static ref INTRINSICS: IntrinsicRegistry = IntrinsicRegistry::builtin();
}

const VECTORS: [&str; 3] = ["System.Vector2", "System.Vector3", "System.Vector4"];

macro_rules! operator_intrinsics {
    ($($name:ident => $opcode:ident),* $(,)?) => {
        $(
            fn $name(lowering: &mut FunctionLowering<'_>, call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
                operator(lowering, call, OpCode::$opcode)
            }
        )*

        const OPERATORS: &[(&str, Intrinsic)] = &[$((stringify!($opcode), $name as Intrinsic),)*];
    };
}

operator_intrinsics! {
    add => Add,
    subtract => Subtract,
    multiply => Multiply,
    divide => Divide,
    modulo => Modulo,
    remainder => Remainder,
    negate => Negate,
}

impl IntrinsicRegistry {
    fn builtin() -> Self {
        let mut registry = IntrinsicRegistry {
            entries: HashMap::new(),
        };

        for owner in [UINT32, INT32, FLOAT32].into_iter().chain(VECTORS) {
            for (name, intrinsic) in OPERATORS {
                registry.register(owner, name, *intrinsic);
            }
        }
        registry.register(FLOAT32, "Power", power);
        for vector in VECTORS {
            registry.register(vector, NeslOperators::CONSTRUCTOR, construct);
        }

        registry.register(COMPUTE_UTILS, &NeslOperators::property_get("GlobalInvocation3"), global_invocation);
        registry.register(COMPUTE_UTILS, &NeslOperators::property_get("LocalInvocation3"), local_invocation);
        registry.register(COMPUTE_UTILS, &NeslOperators::property_get("WorkGroup3"), work_group);
        registry.register(VERTEX_UTILS, "ObjectToClipPos", object_to_clip_pos);
        registry.register(VERTEX_UTILS, &NeslOperators::property_get("Index"), vertex_index);

        registry.register(RW_BUFFER, NeslOperators::INDEXER_GET, buffer_get);
        registry.register(RW_BUFFER, NeslOperators::INDEXER_SET, buffer_set);
        registry.register(RW_BUFFER, &NeslOperators::property_get("Length"), buffer_length);
        registry.register(TEXTURE_2D, NeslOperators::INDEXER_GET, texture_get);
        registry.register(TEXTURE_2D, NeslOperators::INDEXER_SET, texture_set);
        registry
    }

    fn register(&mut self, owner: &str, method: &str, intrinsic: Intrinsic) {
        self.entries.insert((owner.to_string(), method.to_string()), intrinsic);
    }

    /// Intrinsic implementing `method`
    pub fn get(&self, method: &MethodRef) -> Result<Intrinsic> {
        let owner = method.owner()?;
        let definition = owner.generic_definition().cloned().unwrap_or(owner);
        self.entries
            .get(&(definition.full_name().to_string(), method.name().to_string()))
            .copied()
            .ok_or_else(|| {
                Error::invalid_operation(format!(
                    "unable to find definition of `{}`",
                    method.full_name()
                ))
            })
    }
}

fn return_type(call: &IntrinsicCall<'_>) -> Result<TypeRef> {
    call.method.return_type()?.ok_or_else(|| {
        Error::invalid_operation(format!("`{}` returns nothing", call.method.full_name()))
    })
}

fn arity_error(call: &IntrinsicCall<'_>) -> Error {
    Error::invalid_operation(format!(
        "`{}` called with {} arguments",
        call.method.full_name(),
        call.arguments.len()
    ))
}

fn operator(lowering: &mut FunctionLowering<'_>, call: &IntrinsicCall<'_>, opcode: OpCode) -> Result<Option<Word>> {
    let parameters = call.method.parameter_types()?;
    let operand_type = parameters.first().ok_or_else(|| arity_error(call))?;
    let result_type = lowering.context.module.value_type(&return_type(call)?)?;
    let operands = lowering.load_all(call.arguments)?;
    let value = match operands.as_slice() {
        [operand] if opcode == OpCode::Negate => {
            lowering.unary_operation(opcode, operand_type, result_type, *operand)?
        }
        [left, right] if opcode != OpCode::Negate => {
            lowering.binary_operation(opcode, operand_type, result_type, *left, *right)?
        }
        _ => return Err(arity_error(call)),
    };
    Ok(Some(value))
}

fn power(lowering: &mut FunctionLowering<'_>, call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    let result = return_type(call)?;
    let result_type = lowering.context.module.value_type(&result)?;
    match lowering.load_all(call.arguments)?.as_slice() {
        [left, right] => Ok(Some(lowering.power(&result, result_type, *left, *right)?)),
        _ => Err(arity_error(call)),
    }
}

fn construct(lowering: &mut FunctionLowering<'_>, call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    let result_type = lowering.context.module.value_type(&return_type(call)?)?;
    let components = lowering.load_all(call.arguments)?;
    Ok(Some(lowering.context.module.builder.composite_construct(
        result_type,
        None,
        components,
    )?))
}

fn invocation_vector(lowering: &mut FunctionLowering<'_>, builtin: BuiltIn, name: &str) -> Result<Option<Word>> {
    let uint3 = lowering.context.module.vector(ScalarKind::UnsignedInteger, 3);
    let variable = lowering.context.builtin_input(builtin, uint3, name);
    lowering.use_interface(variable);
    Ok(Some(lowering.context.module.builder.load(uint3, None, variable, None, [])?))
}

fn global_invocation(lowering: &mut FunctionLowering<'_>, _call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    invocation_vector(lowering, BuiltIn::GlobalInvocationId, "GlobalInvocationId")
}

fn local_invocation(lowering: &mut FunctionLowering<'_>, _call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    invocation_vector(lowering, BuiltIn::LocalInvocationId, "LocalInvocationId")
}

fn work_group(lowering: &mut FunctionLowering<'_>, _call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    invocation_vector(lowering, BuiltIn::WorkgroupId, "WorkgroupId")
}

fn vertex_index(lowering: &mut FunctionLowering<'_>, _call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    let uint = lowering.context.module.uint();
    let variable = lowering.context.builtin_input(BuiltIn::VertexIndex, uint, "VertexIndex");
    lowering.use_interface(variable);
    Ok(Some(lowering.context.module.builder.load(uint, None, variable, None, [])?))
}

/// `ObjectToClip * vec4(position, 1)`
fn object_to_clip_pos(lowering: &mut FunctionLowering<'_>, call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    let position = match call.arguments {
        [position] => lowering.load(*position)?,
        _ => return Err(arity_error(call)),
    };

    let float = lowering.context.module.float();
    let float4 = lowering.context.module.vector(ScalarKind::Float, 4);
    let one = lowering.context.module.constant_float(1.0);
    let block = lowering.context.object_to_clip();
    let matrix_type = lowering.context.module.builder.type_matrix(float4, 4);
    let matrix_pointer = lowering.context.module.pointer(StorageClass::PushConstant, matrix_type);
    let zero = lowering.context.module.constant_uint(0);

    let builder = &mut lowering.context.module.builder;
    let member = builder.access_chain(matrix_pointer, None, block, [zero])?;
    let matrix = builder.load(matrix_type, None, member, None, [])?;
    let x = builder.composite_extract(float, None, position, [0])?;
    let y = builder.composite_extract(float, None, position, [1])?;
    let z = builder.composite_extract(float, None, position, [2])?;
    let homogeneous = builder.composite_construct(float4, None, [x, y, z, one])?;
    Ok(Some(builder.matrix_times_vector(float4, None, matrix, homogeneous)?))
}

fn element_type(ty: &TypeRef) -> Result<TypeRef> {
    ty.generic_arguments()
        .first()
        .cloned()
        .ok_or_else(|| Error::invalid_operation(format!("`{}` has no element type", ty)))
}

/// Pointer to `buffer[index]`; the leading 0 selects the runtime array
/// inside the block struct
fn buffer_element(lowering: &mut FunctionLowering<'_>, buffer: u32, index: u32) -> Result<(Word, Word)> {
    let resource = lowering.resource(buffer)?;
    let element = element_type(&resource.ty)?;
    let element_type = lowering.context.module.value_type(&element)?;
    let pointer_type = lowering.context.module.pointer(StorageClass::Uniform, element_type);
    let zero = lowering.context.module.constant_uint(0);
    let index = lowering.load(index)?;
    let pointer = lowering
        .context
        .module
        .builder
        .access_chain(pointer_type, None, resource.variable, [zero, index])?;
    Ok((pointer, element_type))
}

fn buffer_get(lowering: &mut FunctionLowering<'_>, call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    let (pointer, element_type) = match call.arguments {
        [buffer, index] => buffer_element(lowering, *buffer, *index)?,
        _ => return Err(arity_error(call)),
    };
    Ok(Some(lowering.context.module.builder.load(element_type, None, pointer, None, [])?))
}

fn buffer_set(lowering: &mut FunctionLowering<'_>, call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    let (pointer, value) = match call.arguments {
        [buffer, index, value] => {
            let (pointer, _) = buffer_element(lowering, *buffer, *index)?;
            (pointer, lowering.load(*value)?)
        }
        _ => return Err(arity_error(call)),
    };
    lowering.context.module.builder.store(pointer, value, None, [])?;
    Ok(None)
}

fn buffer_length(lowering: &mut FunctionLowering<'_>, call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    let resource = match call.arguments {
        [buffer] => lowering.resource(*buffer)?,
        _ => return Err(arity_error(call)),
    };
    let uint = lowering.context.module.uint();
    Ok(Some(lowering.context.module.builder.array_length(
        uint,
        None,
        resource.variable,
        0,
    )?))
}

/// Loaded image, its texel type and the texel's component kind and count
fn texture(lowering: &mut FunctionLowering<'_>, texture: u32) -> Result<(Word, TypeRef, ScalarKind, u32)> {
    let resource = lowering.resource(texture)?;
    let texel = element_type(&resource.ty)?;
    let (kind, components) = match representation_of(&texel) {
        Some(Representation::Scalar(kind)) => (kind, 1),
        Some(Representation::Vector { element, size }) => (element, size),
        None => return Err(unsupported(&texel, "Texture2D")),
    };
    let image_type = lowering.context.module.image(&texel)?;
    let image = lowering
        .context
        .module
        .builder
        .load(image_type, None, resource.variable, None, [])?;
    Ok((image, texel, kind, components))
}

fn texture_get(lowering: &mut FunctionLowering<'_>, call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    let (texture_variable, position) = match call.arguments {
        [texture_variable, position] => (*texture_variable, *position),
        _ => return Err(arity_error(call)),
    };
    let (image, texel, kind, components) = texture(lowering, texture_variable)?;
    let coordinate = lowering.load(position)?;
    let read_type = lowering.context.module.vector(kind, 4);
    let texel_type = lowering.context.module.value_type(&texel)?;

    let builder = &mut lowering.context.module.builder;
    let value = builder.image_read(read_type, None, image, coordinate, None, [])?;
    if components == 1 {
        Ok(Some(builder.composite_extract(texel_type, None, value, [0])?))
    } else {
        Ok(Some(value))
    }
}

fn texture_set(lowering: &mut FunctionLowering<'_>, call: &IntrinsicCall<'_>) -> Result<Option<Word>> {
    let (texture_variable, position, value) = match call.arguments {
        [texture_variable, position, value] => (*texture_variable, *position, *value),
        _ => return Err(arity_error(call)),
    };
    let (image, _, _, _) = texture(lowering, texture_variable)?;
    let coordinate = lowering.load(position)?;
    let texel = lowering.load(value)?;
    lowering
        .context
        .module
        .builder
        .image_write(image, coordinate, texel, None, [])?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(owner: &str, method: &str) -> bool {
        INTRINSICS
            .entries
            .contains_key(&(owner.to_string(), method.to_string()))
    }

    #[test]
    fn test_registry_covers_library_externs() {
        assert!(registered(UINT32, "Add"));
        assert!(registered("System.Vector3", "'ctor"));
        assert!(registered(COMPUTE_UTILS, "'pGGlobalInvocation3"));
        assert!(registered(RW_BUFFER, "'iS"));
        assert!(registered(FLOAT32, "Power"));
        assert!(!registered(UINT32, "Power"));
    }

    #[test]
    fn test_abstract_method_has_no_intrinsic() {
        let library = crate::compiler::default_library().unwrap();
        let vertex = library.get_type(VERTEX_UTILS).unwrap();
        let known = &vertex.get_methods("ObjectToClipPos").unwrap()[0];
        assert!(INTRINSICS.get(known).is_ok());

        let interface = library.get_type("System.IAdd").unwrap();
        let abstract_add = &interface.get_methods("Add").unwrap()[0];
        let error = INTRINSICS.get(abstract_add).unwrap_err();
        assert!(error.to_string().contains("unable to find definition"));
    }
}

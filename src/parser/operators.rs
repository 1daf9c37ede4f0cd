//! Typing rules of method bodies: literal coercion, operator resolution
//! through the operator interfaces, overload selection and assignment
//! write-back.

use super::body::{BodyError, BodyResult, MethodBodyParser, Origin, ValueData};
use super::diagnostics::{CompilationError, CompilationErrorType};
use super::literal::LiteralValue;
use crate::il::OpCode;
use crate::ir::representation::{BOOLEAN, FLOAT32, INT32, UINT32};
use crate::ir::{representation_of, MethodRef, NeslOperators, Representation, ScalarKind, TypeRef};
use crate::lexer::{Token, TokenKind};
use std::sync::Arc;

/// Binary operators of the source language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Power,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl BinaryOperator {
    pub(super) fn from_token(kind: TokenKind) -> Option<BinaryOperator> {
        Some(match kind {
            TokenKind::Plus => BinaryOperator::Add,
            TokenKind::Minus => BinaryOperator::Subtract,
            TokenKind::Star => BinaryOperator::Multiply,
            TokenKind::Slash => BinaryOperator::Divide,
            TokenKind::Percent => BinaryOperator::Remainder,
            TokenKind::Power => BinaryOperator::Power,
            TokenKind::Equal => BinaryOperator::Equal,
            TokenKind::NotEqual => BinaryOperator::NotEqual,
            TokenKind::AngleOpen => BinaryOperator::Less,
            TokenKind::LessOrEqual => BinaryOperator::LessOrEqual,
            TokenKind::AngleClose => BinaryOperator::Greater,
            TokenKind::GreaterOrEqual => BinaryOperator::GreaterOrEqual,
            TokenKind::And => BinaryOperator::And,
            TokenKind::Or => BinaryOperator::Or,
            _ => return None,
        })
    }

    /// Operator interface and the static method it declares
    fn interface(self) -> Option<(&'static str, &'static str)> {
        match self {
            BinaryOperator::Add => Some(("System.IAdd", "Add")),
            BinaryOperator::Subtract => Some(("System.ISubtract", "Subtract")),
            BinaryOperator::Multiply => Some(("System.IMultiply", "Multiply")),
            BinaryOperator::Divide => Some(("System.IDivide", "Divide")),
            BinaryOperator::Remainder => Some(("System.IRemainder", "Remainder")),
            BinaryOperator::Power => Some(("System.IPower", "Power")),
            _ => None,
        }
    }

    fn opcode(self) -> Option<OpCode> {
        match self {
            BinaryOperator::Add => Some(OpCode::Add),
            BinaryOperator::Subtract => Some(OpCode::Subtract),
            BinaryOperator::Multiply => Some(OpCode::Multiply),
            BinaryOperator::Divide => Some(OpCode::Divide),
            BinaryOperator::Remainder => Some(OpCode::Remainder),
            BinaryOperator::Power => None,
            BinaryOperator::Equal => Some(OpCode::Equal),
            BinaryOperator::NotEqual => Some(OpCode::NotEqual),
            BinaryOperator::Less => Some(OpCode::Less),
            BinaryOperator::LessOrEqual => Some(OpCode::LessOrEqual),
            BinaryOperator::Greater => Some(OpCode::Greater),
            BinaryOperator::GreaterOrEqual => Some(OpCode::GreaterOrEqual),
            BinaryOperator::And => Some(OpCode::And),
            BinaryOperator::Or => Some(OpCode::Or),
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, BinaryOperator::Equal | BinaryOperator::NotEqual)
    }

    fn is_ordering(self) -> bool {
        matches!(
            self,
            BinaryOperator::Less
                | BinaryOperator::LessOrEqual
                | BinaryOperator::Greater
                | BinaryOperator::GreaterOrEqual
        )
    }
}

fn scalar_name(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Boolean => BOOLEAN,
        ScalarKind::UnsignedInteger => UINT32,
        ScalarKind::SignedInteger => INT32,
        ScalarKind::Float => FLOAT32,
    }
}

/// Whether `value` can be passed where `ty` is expected
fn accepts(value: &ValueData, ty: &TypeRef) -> bool {
    match value {
        ValueData::Variable { ty: actual, .. } => Arc::ptr_eq(actual, ty),
        ValueData::Literal { value, .. } => match representation_of(ty) {
            Some(Representation::Scalar(kind)) => value.fits(kind),
            _ => false,
        },
        _ => false,
    }
}

fn temporary(id: u32, ty: TypeRef) -> ValueData {
    ValueData::Variable {
        id,
        ty,
        origin: Origin::Temporary,
    }
}

fn diagnostic(token: &Token, error: CompilationErrorType) -> BodyError {
    BodyError::Diagnostic(CompilationError::at(token, error))
}

impl<'a> MethodBodyParser<'a> {
    // Types and literals

    pub(super) fn scalar_type(&self, kind: ScalarKind, token: &Token) -> BodyResult<TypeRef> {
        let name = scalar_name(kind);
        self.scope.assembly.get_type(name).ok_or_else(|| {
            BodyError::Diagnostic(
                CompilationError::at(token, CompilationErrorType::TypeNotFound).with_detail(name),
            )
        })
    }

    fn emit_constant(&mut self, id: u32, kind: ScalarKind, bits: u32) -> BodyResult<()> {
        match kind {
            ScalarKind::UnsignedInteger => self.generator.load_uint32(id, bits)?,
            ScalarKind::SignedInteger => self.generator.load_int32(id, bits as i32)?,
            ScalarKind::Float => self.generator.load_float32(id, f32::from_bits(bits))?,
            ScalarKind::Boolean => self.generator.load_bool(id, bits != 0)?,
        }
        Ok(())
    }

    /// Variable holding `value` as a `ty`
    pub(super) fn coerce(&mut self, value: ValueData, ty: &TypeRef, token: &Token) -> BodyResult<u32> {
        match value {
            ValueData::Variable { id, ty: actual, .. } => {
                if Arc::ptr_eq(&actual, ty) {
                    Ok(id)
                } else {
                    Err(BodyError::Diagnostic(
                        CompilationError::at(token, CompilationErrorType::ImplicitCastOperatorNotFound)
                            .with_detail(format!("{} -> {}", actual, ty)),
                    ))
                }
            }
            ValueData::Literal { value, token } => {
                let kind = match representation_of(ty) {
                    Some(Representation::Scalar(kind)) => kind,
                    _ => {
                        return Err(BodyError::Diagnostic(
                            CompilationError::at(&token, CompilationErrorType::ImplicitCastOperatorNotFound)
                                .with_detail(format!("literal -> {}", ty)),
                        ))
                    }
                };
                let bits = value
                    .bits(kind)
                    .ok_or_else(|| diagnostic(&token, CompilationErrorType::InvalidLiteral))?;
                let id = self.generator.def_variable(ty)?;
                self.emit_constant(id, kind, bits)?;
                Ok(id)
            }
            ValueData::Void | ValueData::StaticType(_) => {
                Err(diagnostic(token, CompilationErrorType::UnexpectedExpression))
            }
        }
    }

    pub(super) fn coerce_to_boolean(&mut self, value: ValueData) -> BodyResult<u32> {
        let token = self.cursor.peek();
        let boolean = self.scalar_type(ScalarKind::Boolean, token)?;
        self.coerce(value, &boolean, token)
    }

    /// Gives a literal its default type
    fn materialize(&mut self, value: ValueData, kind: ScalarKind, token: &Token) -> BodyResult<ValueData> {
        match value {
            ValueData::Literal { .. } => {
                let ty = self.scalar_type(kind, token)?;
                let id = self.coerce(value, &ty, token)?;
                Ok(temporary(id, ty))
            }
            other => Ok(other),
        }
    }

    /// Brings both operands to one type; literals follow the other side
    fn unify(&mut self, left: ValueData, right: ValueData, token: &Token) -> BodyResult<(u32, u32, TypeRef)> {
        let ty = match (&left, &right) {
            (ValueData::Literal { value: l, .. }, ValueData::Literal { value: r, .. }) => {
                let kind = promote(*l, *r).ok_or_else(|| diagnostic(token, CompilationErrorType::OperatorNotFound))?;
                self.scalar_type(kind, token)?
            }
            (ValueData::Literal { .. }, ValueData::Variable { ty, .. }) => ty.clone(),
            (ValueData::Variable { ty, .. }, _) => ty.clone(),
            _ => return Err(diagnostic(token, CompilationErrorType::UnexpectedExpression)),
        };
        if let (ValueData::Variable { ty: l, .. }, ValueData::Variable { ty: r, .. }) = (&left, &right) {
            if !Arc::ptr_eq(l, r) {
                return Err(BodyError::Diagnostic(
                    CompilationError::at(token, CompilationErrorType::OperatorNotFound)
                        .with_detail(format!("{} and {}", l, r)),
                ));
            }
        }
        let left = self.coerce(left, &ty, token)?;
        let right = self.coerce(right, &ty, token)?;
        Ok((left, right, ty))
    }

    // Operators

    pub(super) fn binary(
        &mut self,
        operator: BinaryOperator,
        left: ValueData,
        right: ValueData,
        token: &Token,
    ) -> BodyResult<ValueData> {
        let opcode = operator.opcode();
        if matches!(operator, BinaryOperator::And | BinaryOperator::Or) {
            let boolean = self.scalar_type(ScalarKind::Boolean, token)?;
            let left = self.coerce(left, &boolean, token)?;
            let right = self.coerce(right, &boolean, token)?;
            let dst = self.generator.def_variable(&boolean)?;
            if let Some(opcode) = opcode {
                self.generator.binary(opcode, dst, left, right)?;
            }
            return Ok(temporary(dst, boolean));
        }

        if operator.is_equality() || operator.is_ordering() {
            let (left, right, ty) = self.unify(left, right, token)?;
            let comparable = match representation_of(&ty) {
                Some(Representation::Scalar(kind)) => kind.is_numeric() || operator.is_equality(),
                _ => false,
            };
            if !comparable {
                return Err(BodyError::Diagnostic(
                    CompilationError::at(token, CompilationErrorType::OperatorNotFound)
                        .with_detail(ty.full_name()),
                ));
            }
            let boolean = self.scalar_type(ScalarKind::Boolean, token)?;
            let dst = self.generator.def_variable(&boolean)?;
            if let Some(opcode) = opcode {
                self.generator.binary(opcode, dst, left, right)?;
            }
            return Ok(temporary(dst, boolean));
        }

        self.arithmetic(operator, left, right, token)
    }

    /// Arithmetic through the operator interfaces of the operand types
    fn arithmetic(
        &mut self,
        operator: BinaryOperator,
        left: ValueData,
        right: ValueData,
        token: &Token,
    ) -> BodyResult<ValueData> {
        let (interface_name, method_name) = operator
            .interface()
            .ok_or_else(|| diagnostic(token, CompilationErrorType::OperatorNotFound))?;

        let literals = match (&left, &right) {
            (ValueData::Literal { value: l, .. }, ValueData::Literal { value: r, .. }) => Some((*l, *r)),
            _ => None,
        };
        let (left, right) = match literals {
            Some((l, r)) => {
                let kind = promote(l, r).ok_or_else(|| diagnostic(token, CompilationErrorType::OperatorNotFound))?;
                (
                    self.materialize(left, kind, token)?,
                    self.materialize(right, kind, token)?,
                )
            }
            None => (left, right),
        };

        let mut owners: Vec<TypeRef> = Vec::new();
        for value in [&left, &right] {
            if let ValueData::Variable { ty, .. } = value {
                if !owners.iter().any(|owner| Arc::ptr_eq(owner, ty)) {
                    owners.push(ty.clone());
                }
            }
        }

        let mut found = None;
        'search: for owner in &owners {
            for interface in owner.interfaces()? {
                let is_operator = interface
                    .generic_definition()
                    .map_or(false, |definition| definition.full_name() == interface_name);
                let arguments = interface.generic_arguments();
                if is_operator
                    && arguments.len() == 3
                    && accepts(&left, &arguments[0])
                    && accepts(&right, &arguments[1])
                {
                    found = Some((owner.clone(), interface.clone()));
                    break 'search;
                }
            }
        }

        let (owner, interface) = found.ok_or_else(|| {
            let names: Vec<String> = owners.iter().map(|owner| owner.full_name().to_string()).collect();
            BodyError::Diagnostic(
                CompilationError::at(token, CompilationErrorType::OperatorNotFound)
                    .with_detail(format!("{} on {}", interface_name, names.join(", "))),
            )
        })?;
        let arguments = interface.generic_arguments().to_vec();
        let left = self.coerce(left, &arguments[0], token)?;
        let right = self.coerce(right, &arguments[1], token)?;
        let result_type = arguments[2].clone();
        let dst = self.generator.def_variable(&result_type)?;

        let direct = representation_of(&owner).is_some()
            && arguments.iter().all(|argument| Arc::ptr_eq(argument, &owner));
        match operator.opcode() {
            Some(opcode) if direct => self.generator.binary(opcode, dst, left, right)?,
            _ => {
                let method = self.operator_method(&owner, &interface, method_name, &arguments[..2], token)?;
                self.generator.call(Some(dst), &method, vec![left, right])?;
            }
        }
        Ok(temporary(dst, result_type))
    }

    /// Implementation of an operator interface method on `owner`, or the
    /// interface method itself when `owner` is a generic parameter
    fn operator_method(
        &self,
        owner: &TypeRef,
        interface: &TypeRef,
        name: &str,
        parameters: &[TypeRef],
        token: &Token,
    ) -> BodyResult<MethodRef> {
        if !owner.is_generic_parameter() {
            for method in owner.get_methods(name)? {
                let types = method.parameter_types()?;
                let matches = method.is_static()
                    && types.len() == parameters.len()
                    && types.iter().zip(parameters).all(|(a, b)| Arc::ptr_eq(a, b));
                if matches {
                    return Ok(method);
                }
            }
        }
        interface
            .get_methods(name)?
            .into_iter()
            .next()
            .ok_or_else(|| diagnostic(token, CompilationErrorType::OperatorNotFound))
    }

    pub(super) fn negate(&mut self, operand: ValueData, token: &Token) -> BodyResult<ValueData> {
        let (ty, id) = match operand {
            ValueData::Literal { value, token } => {
                let value = value
                    .negated()
                    .map_err(|error| BodyError::Diagnostic(CompilationError::at(&token, error)))?;
                return Ok(ValueData::Literal { value, token });
            }
            ValueData::Variable { ty, id, .. } => (ty, id),
            _ => return Err(diagnostic(token, CompilationErrorType::UnexpectedExpression)),
        };

        let interface = ty
            .interfaces()?
            .into_iter()
        .find(|interface| {
            interface
                .generic_definition()
                .map_or(false, |definition| definition.full_name() == "System.INegate")
                && interface.generic_arguments().len() == 2
                && Arc::ptr_eq(&interface.generic_arguments()[0], &ty)
        })
        .ok_or_else(|| {
            BodyError::Diagnostic(
                CompilationError::at(token, CompilationErrorType::OperatorNotFound)
                    .with_detail(format!("System.INegate on {}", ty)),
            )
        })?;

        let result_type = interface.generic_arguments()[1].clone();
        let dst = self.generator.def_variable(&result_type)?;
        if representation_of(&ty).is_some() && Arc::ptr_eq(&result_type, &ty) {
            self.generator.unary(OpCode::Negate, dst, id)?;
        } else {
            let parameters = [ty.clone()];
            let method = self.operator_method(&ty, &interface, "Negate", &parameters, token)?;
            self.generator.call(Some(dst), &method, vec![id])?;
        }
        Ok(temporary(dst, result_type))
    }

    pub(super) fn not(&mut self, operand: ValueData, token: &Token) -> BodyResult<ValueData> {
        let boolean = self.scalar_type(ScalarKind::Boolean, token)?;
        let id = self.coerce(operand, &boolean, token)?;
        let dst = self.generator.def_variable(&boolean)?;
        self.generator.unary(OpCode::Not, dst, id)?;
        Ok(temporary(dst, boolean))
    }

    // Members

    fn variable_id(&self, value: &ValueData, token: &Token) -> BodyResult<u32> {
        match value {
            ValueData::Variable { id, .. } => Ok(*id),
            _ => Err(diagnostic(token, CompilationErrorType::UnexpectedExpression)),
        }
    }

    fn load_static(&mut self, owner: &TypeRef, index: u32, field_type: &TypeRef) -> BodyResult<ValueData> {
        let dst = self.generator.def_variable(field_type)?;
        self.generator.load_static_field(dst, owner, index)?;
        Ok(ValueData::Variable {
            id: dst,
            ty: field_type.clone(),
            origin: Origin::StaticField {
                owner: owner.clone(),
                field: index,
            },
        })
    }

    /// `receiver.name` for fields and properties
    pub(super) fn member(&mut self, receiver: ValueData, name: &Token) -> BodyResult<ValueData> {
        let not_found = || {
            BodyError::Diagnostic(
                CompilationError::at(name, CompilationErrorType::FieldNotFound).with_detail(name.text()),
            )
        };

        let (ty, is_static) = match &receiver {
            ValueData::Variable { ty, .. } => (ty.clone(), false),
            ValueData::StaticType(ty) => (ty.clone(), true),
            _ => return Err(diagnostic(name, CompilationErrorType::UnexpectedExpression)),
        };
        if ty.is_generic_parameter() {
            return Err(not_found());
        }

        if let Some((index, field)) = ty.get_field(name.text())? {
            if field.is_static() {
                return self.load_static(&ty, index, field.field_type());
            }
            if is_static {
                return Err(not_found());
            }
            let object = self.variable_id(&receiver, name)?;
            let dst = self.generator.def_variable(field.field_type())?;
            self.generator.load_field(dst, object, index)?;
            return Ok(ValueData::Variable {
                id: dst,
                ty: field.field_type().clone(),
                origin: Origin::Field {
                    object: Box::new(receiver),
                    field: index,
                },
            });
        }

        let accessor = |methods: Vec<MethodRef>| {
            methods
                .into_iter()
                .find(|method| method.is_static() == is_static)
        };
        let getter = accessor(ty.get_methods(&NeslOperators::property_get(name.text()))?)
            .ok_or_else(not_found)?;
        let setter = accessor(ty.get_methods(&NeslOperators::property_set(name.text()))?);

        let object = (!is_static).then(|| receiver.clone());
        let value = self.emit_call(&getter, object.clone(), Vec::new(), name)?;
        match value {
            ValueData::Variable { id, ty, .. } => Ok(ValueData::Variable {
                id,
                ty,
                origin: Origin::Property {
                    object: object.map(Box::new),
                    setter,
                },
            }),
            _ => Err(diagnostic(name, CompilationErrorType::UnexpectedExpression)),
        }
    }

    /// `receiver[index]`
    pub(super) fn index(&mut self, receiver: ValueData, index: ValueData, token: &Token) -> BodyResult<ValueData> {
        let (object, ty) = match &receiver {
            ValueData::Variable { id, ty, .. } => (*id, ty.clone()),
            _ => return Err(diagnostic(token, CompilationErrorType::UnexpectedExpression)),
        };

        if let Some(Representation::Vector { .. }) = representation_of(&ty) {
            let uint = self.scalar_type(ScalarKind::UnsignedInteger, token)?;
            let index = self.coerce(index, &uint, token)?;
            let element = ty
                .generic_arguments()
                .first()
                .cloned()
                .ok_or_else(|| diagnostic(token, CompilationErrorType::UnexpectedExpression))?;
            let dst = self.generator.def_variable(&element)?;
            self.generator.load_element(dst, object, index)?;
            return Ok(ValueData::Variable {
                id: dst,
                ty: element,
                origin: Origin::Element {
                    object: Box::new(receiver),
                    index,
                },
            });
        }

        if ty.is_generic_parameter() {
            return Err(diagnostic(token, CompilationErrorType::MethodNotFound));
        }
        let getters = ty.get_methods(NeslOperators::INDEXER_GET)?;
        if getters.is_empty() {
            return Err(diagnostic(token, CompilationErrorType::MethodNotFound));
        }
        let getter = self
            .select_overload(&getters, &[], false, true, std::slice::from_ref(&index), token)?
            .ok_or_else(|| diagnostic(token, CompilationErrorType::MethodWithGivenArgumentsNotFound))?;

        let index_type = getter
            .parameter_types()?
            .first()
            .cloned()
            .ok_or_else(|| diagnostic(token, CompilationErrorType::MethodWithGivenArgumentsNotFound))?;
        let index = self.coerce(index, &index_type, token)?;
        let result_type = getter
            .return_type()?
            .ok_or_else(|| diagnostic(token, CompilationErrorType::UnexpectedExpression))?;
        let dst = self.generator.def_variable(&result_type)?;
        self.generator.call(Some(dst), &getter, vec![object, index])?;

        let mut setter = None;
        for candidate in ty.get_methods(NeslOperators::INDEXER_SET)? {
            let parameters = candidate.parameter_types()?;
            if !candidate.is_static()
                && parameters.len() == 2
                && Arc::ptr_eq(&parameters[0], &index_type)
                && Arc::ptr_eq(&parameters[1], &result_type)
            {
                setter = Some(candidate);
                break;
            }
        }

        Ok(ValueData::Variable {
            id: dst,
            ty: result_type,
            origin: Origin::Indexer {
                object: Box::new(receiver),
                index,
                setter,
            },
        })
    }

    // Assignment

    pub(super) fn assignable_type(&self, target: &ValueData, token: &Token) -> BodyResult<TypeRef> {
        match target {
            ValueData::Variable { origin: Origin::Temporary, .. } => {
                Err(diagnostic(token, CompilationErrorType::UnexpectedExpression))
            }
            ValueData::Variable { ty, .. } => Ok(ty.clone()),
            _ => Err(diagnostic(token, CompilationErrorType::UnexpectedExpression)),
        }
    }

    /// Writes `source` to the storage `target` was read from
    pub(super) fn store(&mut self, target: &ValueData, source: u32, token: &Token) -> BodyResult<()> {
        let (id, origin) = match target {
            ValueData::Variable { id, origin, .. } => (*id, origin),
            _ => return Err(diagnostic(token, CompilationErrorType::UnexpectedExpression)),
        };

        match origin {
            Origin::Local => {
                if id != source {
                    self.generator.load(id, source)?;
                }
            }
            Origin::Temporary => return Err(diagnostic(token, CompilationErrorType::UnexpectedExpression)),
            Origin::Field { object, field } => {
                let object_id = self.variable_id(object, token)?;
                self.generator.set_field(object_id, *field, source)?;
                self.write_back(object, token)?;
            }
            Origin::StaticField { owner, field } => {
                self.generator.set_static_field(owner, *field, source)?;
            }
            Origin::Element { object, index } => {
                let object_id = self.variable_id(object, token)?;
                self.generator.set_element(object_id, *index, source)?;
                self.write_back(object, token)?;
            }
            Origin::Indexer { object, index, setter } => {
                let setter = setter
                    .as_ref()
                    .ok_or_else(|| diagnostic(token, CompilationErrorType::MethodNotFound))?;
                let object_id = self.variable_id(object, token)?;
                self.generator.call(None, setter, vec![object_id, *index, source])?;
                self.write_back(object, token)?;
            }
            Origin::Property { object, setter } => {
                let setter = setter
                    .as_ref()
                    .ok_or_else(|| diagnostic(token, CompilationErrorType::MethodNotFound))?;
                let mut arguments = Vec::new();
                if let Some(object) = object {
                    arguments.push(self.variable_id(object, token)?);
                }
                arguments.push(source);
                self.generator.call(None, setter, arguments)?;
                if let Some(object) = object {
                    self.write_back(object, token)?;
                }
            }
        }
        Ok(())
    }

    /// Stores a modified value-type copy back where it came from
    fn write_back(&mut self, object: &ValueData, token: &Token) -> BodyResult<()> {
        if let ValueData::Variable { id, ty, origin } = object {
            let stored_elsewhere = !matches!(origin, Origin::Local | Origin::Temporary);
            if ty.is_value_type() && stored_elsewhere {
                return self.store(object, *id, token);
            }
        }
        Ok(())
    }

    // Calls

    fn methods_named(&self, ty: &TypeRef, name: &str) -> BodyResult<Vec<MethodRef>> {
        if !ty.is_generic_parameter() {
            return Ok(ty.get_methods(name)?);
        }
        let mut methods = Vec::new();
        for constraint in ty.interfaces()? {
            methods.extend(constraint.get_methods(name)?);
        }
        Ok(methods)
    }

    /// First candidate whose parameters accept `arguments`
    pub(super) fn select_overload(
        &self,
        candidates: &[MethodRef],
        generic_arguments: &[TypeRef],
        allow_static: bool,
        has_receiver: bool,
        arguments: &[ValueData],
        token: &Token,
    ) -> BodyResult<Option<MethodRef>> {
        for candidate in candidates {
            let callable = if candidate.is_static() { allow_static } else { has_receiver };
            if !callable || candidate.generic_parameters().len() != generic_arguments.len() {
                continue;
            }

            let candidate = if generic_arguments.is_empty() {
                candidate.clone()
            } else {
                self.scope
                    .storage
                    .make_generic_method(candidate, generic_arguments, token)
                    .map_err(|error| {
                        BodyError::Diagnostic(
                            CompilationError::at(token, CompilationErrorType::InvalidGenericArgumentCount)
                                .with_detail(error.to_string()),
                        )
                    })?
            };

            let parameters = candidate.parameter_types()?;
            if parameters.len() == arguments.len()
                && parameters.iter().zip(arguments).all(|(parameter, argument)| accepts(argument, parameter))
            {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Emits a call; extern operator methods of built-in types become opcodes
    pub(super) fn emit_call(
        &mut self,
        method: &MethodRef,
        receiver: Option<ValueData>,
        arguments: Vec<ValueData>,
        token: &Token,
    ) -> BodyResult<ValueData> {
        let parameters = method.parameter_types()?;
        let mut ids = Vec::with_capacity(arguments.len() + 1);
        if let Some(receiver) = &receiver {
            ids.push(self.variable_id(receiver, token)?);
        }
        for (argument, parameter) in arguments.into_iter().zip(&parameters) {
            ids.push(self.coerce(argument, parameter, token)?);
        }

        let return_type = method.return_type()?;
        if let (Some(opcode), Some(result_type)) = (self.direct_opcode(method, &parameters)?, &return_type) {
            let dst = self.generator.def_variable(result_type)?;
            match ids.as_slice() {
                [operand] => self.generator.unary(opcode, dst, *operand)?,
                [left, right] => self.generator.binary(opcode, dst, *left, *right)?,
                _ => return Err(diagnostic(token, CompilationErrorType::MethodWithGivenArgumentsNotFound)),
            }
            return Ok(temporary(dst, result_type.clone()));
        }

        match return_type {
            Some(result_type) => {
                let dst = self.generator.def_variable(&result_type)?;
                self.generator.call(Some(dst), method, ids)?;
                Ok(temporary(dst, result_type))
            }
            None => {
                self.generator.call(None, method, ids)?;
                Ok(ValueData::Void)
            }
        }
    }

    fn direct_opcode(&self, method: &MethodRef, parameters: &[TypeRef]) -> BodyResult<Option<OpCode>> {
        let opcode = match OpCode::from_operator_method(method.name()) {
            Some(opcode) if method.is_static() && method.is_extern() => opcode,
            _ => return Ok(None),
        };
        let owner = method.owner()?;
        if representation_of(&owner).is_none() {
            return Ok(None);
        }
        let arity = if opcode == OpCode::Negate { 1 } else { 2 };
        let same_type = parameters.len() == arity
            && parameters.iter().all(|parameter| Arc::ptr_eq(parameter, &owner))
            && method
                .return_type()?
                .map_or(false, |result| Arc::ptr_eq(&result, &owner));
        Ok(same_type.then_some(opcode))
    }

    /// `receiver.name(args)`
    pub(super) fn call_member(
        &mut self,
        receiver: ValueData,
        name: &Token,
        generic_arguments: &[TypeRef],
        arguments: Vec<ValueData>,
    ) -> BodyResult<ValueData> {
        let (ty, is_static) = match &receiver {
            ValueData::Variable { ty, .. } => (ty.clone(), false),
            ValueData::StaticType(ty) => (ty.clone(), true),
            _ => return Err(diagnostic(name, CompilationErrorType::UnexpectedExpression)),
        };

        let candidates = self.methods_named(&ty, name.text())?;
        if candidates.is_empty() {
            return Err(BodyError::Diagnostic(
                CompilationError::at(name, CompilationErrorType::MethodNotFound)
                    .with_detail(format!("{}.{}", ty, name.text())),
            ));
        }
        let method = self
            .select_overload(&candidates, generic_arguments, is_static, !is_static, &arguments, name)?
            .ok_or_else(|| diagnostic(name, CompilationErrorType::MethodWithGivenArgumentsNotFound))?;

        let receiver = (!method.is_static()).then_some(receiver);
        self.emit_call(&method, receiver, arguments, name)
    }

    /// `name(args)` on the declaring type
    pub(super) fn call_unqualified(
        &mut self,
        name: &Token,
        generic_arguments: &[TypeRef],
        arguments: Vec<ValueData>,
    ) -> BodyResult<ValueData> {
        let owner = self.owner.clone();
        let candidates = owner.get_methods(name.text())?;
        if candidates.is_empty() {
            return Err(BodyError::Diagnostic(
                CompilationError::at(name, CompilationErrorType::MethodNotFound).with_detail(name.text()),
            ));
        }
        let has_receiver = !self.method.is_static();
        let method = self
            .select_overload(&candidates, generic_arguments, true, has_receiver, &arguments, name)?
            .ok_or_else(|| diagnostic(name, CompilationErrorType::MethodWithGivenArgumentsNotFound))?;

        let receiver = if method.is_static() {
            None
        } else {
            Some(ValueData::Variable {
                id: 0,
                ty: owner,
                origin: Origin::Local,
            })
        };
        self.emit_call(&method, receiver, arguments, name)
    }
}

/// Common kind of two literals
fn promote(left: LiteralValue, right: LiteralValue) -> Option<ScalarKind> {
    let (l, r) = (left.default_kind(), right.default_kind());
    match (l, r) {
        (ScalarKind::Boolean, ScalarKind::Boolean) => Some(ScalarKind::Boolean),
        (ScalarKind::Boolean, _) | (_, ScalarKind::Boolean) => None,
        (ScalarKind::Float, _) | (_, ScalarKind::Float) => Some(ScalarKind::Float),
        (ScalarKind::UnsignedInteger, _) | (_, ScalarKind::UnsignedInteger) => {
            Some(ScalarKind::UnsignedInteger)
        }
        _ => Some(ScalarKind::SignedInteger),
    }
}

//! The compilation passes
//!
//! Each pass is one [`fan_out`] over files, types or methods and ends in a
//! barrier, so a pass sees everything the previous passes declared:
//!
//! 1. lex and parse declarations, then register every type
//! 2. usings, aliases, type attributes and generic constraints
//! 3. fields
//! 4. method signatures
//! 5. implemented interfaces
//! 6. member materialization of requested generic instantiations
//! 7. method bodies
//! 8. unused usings and generic constraint satisfaction

use super::body::compile_body;
use super::declarations::parse_file;
use super::diagnostics::{has_errors, merge, CompilationError, CompilationErrorType};
use super::literal::LiteralValue;
use super::scope::TypeScope;
use super::storage::ParserStorage;
use super::syntax::{ConstraintSyntax, FileSyntax, MethodSyntax, TypeSyntax};
use crate::error::Result;
use crate::ir::{
    representation_of, substitute_type, AttributeTargets, MethodRef, MethodSignature, Modifiers,
    NeslAssembly, NeslAssemblyBuilder, NeslParameter, Representation, SubstitutionMap, TypeKind,
    TypeRef,
};
use crate::lexer::{lex, Token};
use crate::parallel::{fan_out, pool_size, try_fan_out};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// One source file handed to the compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the project root; its directories give the namespace
    pub path: String,
    /// Source text
    pub code: String,
}

impl SourceFile {
    /// Creates a source file
    pub fn new(path: impl Into<String>, code: impl Into<String>) -> Self {
        SourceFile {
            path: path.into(),
            code: code.into(),
        }
    }
}

struct FileUnit {
    syntax: FileSyntax,
    aliases: OnceLock<HashMap<String, TypeRef>>,
}

impl FileUnit {
    fn scope<'a>(&'a self, assembly: &'a Arc<NeslAssembly>, storage: &'a ParserStorage) -> TypeScope<'a> {
        TypeScope {
            assembly,
            storage,
            file: &self.syntax,
            aliases: self.aliases.get_or_init(HashMap::new),
            type_parameters: &[],
            method_parameters: &[],
        }
    }
}

struct TypeUnit<'f> {
    file: &'f FileUnit,
    syntax: &'f TypeSyntax,
    ty: TypeRef,
    methods: OnceLock<Vec<(MethodRef, &'f MethodSyntax)>>,
}

impl<'f> TypeUnit<'f> {
    fn scope<'a>(&'a self, assembly: &'a Arc<NeslAssembly>, storage: &'a ParserStorage) -> TypeScope<'a> {
        self.file
            .scope(assembly, storage)
            .with_type_parameters(self.ty.generic_parameters())
    }
}

/// Runs every pass over `files`, filling `builder`. Diagnostics come back
/// merged; an `Err` is an internal failure that aborts the compilation.
pub(crate) fn parse_assembly(
    builder: &NeslAssemblyBuilder,
    files: &[SourceFile],
    max_parallelism: usize,
) -> Result<Vec<CompilationError>> {
    let assembly = builder.assembly();
    let storage = ParserStorage::new();

    // 1
    let parsed = try_fan_out(files, pool_size(max_parallelism, files.len()), |file| {
        let tokens = lex(&file.path, &file.code)?;
        Ok(parse_file(&file.path, Arc::new(tokens), assembly.name()))
    })?;
    let mut diagnostics = Vec::new();
    let mut file_units = Vec::with_capacity(parsed.len());
    for (syntax, errors) in parsed {
        diagnostics.push(errors);
        file_units.push(FileUnit {
            syntax,
            aliases: OnceLock::new(),
        });
    }
    let (type_units, errors) = register_types(builder, &file_units)?;
    diagnostics.push(errors);
    barrier(1, &diagnostics);
    if diagnostics.iter().any(|list| has_errors(list)) {
        return Ok(merge(diagnostics));
    }

    // 2
    diagnostics.extend(fan_out(&file_units, max_parallelism, |unit| {
        resolve_usings(unit, assembly, &storage)
    })?);
    diagnostics.extend(fan_out(&type_units, max_parallelism, |unit| {
        analyze_type(unit, assembly, &storage)
    })?);
    barrier(2, &diagnostics);

    // 3
    diagnostics.extend(try_fan_out(&type_units, max_parallelism, |unit| {
        analyze_fields(unit, assembly, &storage)
    })?);
    barrier(3, &diagnostics);

    // 4
    diagnostics.extend(try_fan_out(&type_units, max_parallelism, |unit| {
        analyze_methods(unit, assembly, &storage)
    })?);
    barrier(4, &diagnostics);

    // 5
    diagnostics.extend(try_fan_out(&type_units, max_parallelism, |unit| {
        analyze_interfaces(unit, assembly, &storage)
    })?);
    barrier(5, &diagnostics);
    if diagnostics.iter().any(|list| has_errors(list)) {
        return Ok(merge(diagnostics));
    }

    // 6
    let requested = storage.types();
    try_fan_out(&requested, max_parallelism, |request| request.item.materialize_members())?;
    debug!(instantiations = requested.len(), "materialized generic instantiations");

    // 7
    let bodies: Vec<(&TypeUnit<'_>, &MethodRef, &MethodSyntax)> = type_units
        .iter()
        .flat_map(|unit| {
            unit.methods
                .get()
                .into_iter()
                .flatten()
                .filter(|(_, syntax)| syntax.body.is_some())
                .map(move |(method, syntax)| (unit, method, *syntax))
        })
        .collect();
    diagnostics.extend(try_fan_out(&bodies, max_parallelism, |(unit, method, syntax)| {
        let body = match &syntax.body {
            Some(body) => body.clone(),
            None => return Ok(Vec::new()),
        };
        let scope = unit
            .scope(assembly, &storage)
            .with_method_parameters(method.generic_parameters());
        let (container, errors) = compile_body(scope, &unit.ty, method, body)?;
        method.set_il(Arc::new(container))?;
        Ok(errors)
    })?);
    barrier(7, &diagnostics);

    // 8
    diagnostics.extend(fan_out(&file_units, max_parallelism, unused_usings)?);
    diagnostics.push(check_constraints(&storage)?);
    barrier(8, &diagnostics);

    Ok(merge(diagnostics))
}

fn barrier(pass: u32, diagnostics: &[Vec<CompilationError>]) {
    let count: usize = diagnostics.iter().map(Vec::len).sum();
    debug!(pass, diagnostics = count, "parser pass finished");
}

fn full_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

fn names(tokens: &[Token]) -> Vec<String> {
    tokens.iter().map(|token| token.text().to_string()).collect()
}

/// Declares every type of every file; runs on one thread so declaration
/// order stays deterministic
fn register_types<'f>(
    builder: &NeslAssemblyBuilder,
    files: &'f [FileUnit],
) -> Result<(Vec<TypeUnit<'f>>, Vec<CompilationError>)> {
    let mut units = Vec::new();
    let mut errors = Vec::new();
    for file in files {
        for syntax in &file.syntax.types {
            let name = syntax.name.text();
            let namespace = &file.syntax.namespace;
            if builder.get_local_type(&full_name(namespace, name)).is_some() {
                errors.push(
                    CompilationError::at(&syntax.name, CompilationErrorType::TypeAlreadyExists)
                        .with_detail(full_name(namespace, name)),
                );
                continue;
            }
            let ty = builder.define_type(
                namespace,
                name,
                syntax.kind,
                syntax.modifiers,
                &names(&syntax.generic_parameters),
            )?;
            units.push(TypeUnit {
                file,
                syntax,
                ty,
                methods: OnceLock::new(),
            });
        }
    }
    Ok((units, errors))
}

fn resolve_usings(unit: &FileUnit, assembly: &Arc<NeslAssembly>, storage: &ParserStorage) -> Vec<CompilationError> {
    let mut errors = Vec::new();
    for using in &unit.syntax.usings {
        if !assembly.has_namespace(&using.namespace) {
            warn!(namespace = %using.namespace, path = %unit.syntax.path, "dropping using directive");
            errors.push(
                CompilationError::at(&using.token, CompilationErrorType::UsingNotFound)
                    .with_detail(using.namespace.clone()),
            );
            // Unresolvable usings never count as unused
            using.used.store(true, Ordering::Relaxed);
        }
    }

    let empty = HashMap::new();
    let scope = TypeScope {
        assembly,
        storage,
        file: &unit.syntax,
        aliases: &empty,
        type_parameters: &[],
        method_parameters: &[],
    };
    let mut aliases = HashMap::new();
    for alias in &unit.syntax.aliases {
        if aliases.contains_key(alias.name.text()) {
            errors.push(CompilationError::at(&alias.name, CompilationErrorType::TypeAlreadyExists));
            continue;
        }
        match scope.resolve(&alias.target) {
            Ok(ty) => {
                aliases.insert(alias.name.text().to_string(), ty);
            }
            Err(error) => errors.push(error),
        }
    }
    // Only this pass sets the aliases
    let _ = unit.aliases.set(aliases);
    errors
}

/// Applies `where` clauses to the generic parameters they name
fn apply_constraints(
    scope: &TypeScope<'_>,
    parameters: &[TypeRef],
    constraints: &[ConstraintSyntax],
    errors: &mut Vec<CompilationError>,
) -> Result<()> {
    for clause in constraints {
        let parameter = match parameters
            .iter()
            .find(|parameter| parameter.name() == clause.parameter.text())
        {
            Some(parameter) => parameter,
            None => {
                errors.push(
                    CompilationError::at(&clause.parameter, CompilationErrorType::GenericParameterNotFound)
                        .with_detail(clause.parameter.text()),
                );
                continue;
            }
        };
        for constraint in &clause.constraints {
            match scope.resolve(constraint) {
                Ok(ty) => parameter.add_constraint(ty)?,
                Err(error) => errors.push(error),
            }
        }
    }
    Ok(())
}

fn analyze_type(unit: &TypeUnit<'_>, assembly: &Arc<NeslAssembly>, storage: &ParserStorage) -> Vec<CompilationError> {
    let scope = unit.scope(assembly, storage);
    let mut errors = Vec::new();

    for attribute in &unit.syntax.attributes {
        match scope.resolve_attribute(attribute, AttributeTargets::TYPE) {
            Ok(resolved) => {
                if let Err(error) = unit.ty.add_attribute(resolved) {
                    errors.push(
                        CompilationError::at(&attribute.name.token, CompilationErrorType::InvalidAttributeArguments)
                            .with_detail(error.to_string()),
                    );
                }
            }
            Err(error) => errors.push(error),
        }
    }

    if let Err(error) = apply_constraints(
        &scope,
        unit.ty.generic_parameters(),
        &unit.syntax.constraints,
        &mut errors,
    ) {
        errors.push(
            CompilationError::at(&unit.syntax.name, CompilationErrorType::GenericParameterNotFound)
                .with_detail(error.to_string()),
        );
    }
    errors
}

fn analyze_fields(unit: &TypeUnit<'_>, assembly: &Arc<NeslAssembly>, storage: &ParserStorage) -> Result<Vec<CompilationError>> {
    let scope = unit.scope(assembly, storage);
    let mut errors = Vec::new();

    for field in &unit.syntax.fields {
        if unit.ty.get_field(field.name.text())?.is_some() {
            errors.push(
                CompilationError::at(&field.name, CompilationErrorType::FieldAlreadyExists)
                    .with_detail(field.name.text()),
            );
            continue;
        }
        let field_type = match scope.resolve(&field.field_type) {
            Ok(ty) => ty,
            Err(error) => {
                errors.push(error);
                continue;
            }
        };

        let mut attributes = Vec::new();
        for attribute in &field.attributes {
            match scope.resolve_attribute(attribute, AttributeTargets::FIELD) {
                Ok(resolved) => attributes.push(resolved),
                Err(error) => errors.push(error),
            }
        }

        let default = match &field.default {
            None => None,
            Some(literal) => {
                let encoded = match representation_of(&field_type) {
                    Some(Representation::Scalar(kind)) => LiteralValue::from_syntax(literal)
                        .ok()
                        .and_then(|value| value.encode(kind)),
                    _ => None,
                };
                if encoded.is_none() {
                    errors.push(CompilationError::at(&literal.token, CompilationErrorType::InvalidLiteral));
                }
                encoded
            }
        };

        unit.ty.add_field(
            field.name.text(),
            field_type,
            field.modifiers,
            attributes,
            default,
        )?;
    }
    Ok(errors)
}

fn analyze_methods(unit: &TypeUnit<'_>, assembly: &Arc<NeslAssembly>, storage: &ParserStorage) -> Result<Vec<CompilationError>> {
    let type_scope = unit.scope(assembly, storage);
    let mut errors = Vec::new();
    let mut declared: Vec<(MethodRef, &MethodSyntax)> = Vec::new();

    for syntax in &unit.syntax.methods {
        let mut modifiers = syntax.modifiers;
        if syntax.body.is_none() {
            if unit.ty.kind() == TypeKind::Interface && !modifiers.contains(Modifiers::EXTERN) {
                modifiers |= Modifiers::ABSTRACT;
            }
            if !modifiers.contains(Modifiers::ABSTRACT) && !modifiers.contains(Modifiers::EXTERN) {
                errors.push(
                    CompilationError::at(&syntax.name, CompilationErrorType::MissingModifiers)
                        .with_detail(syntax.name.text()),
                );
            }
        }

        let method = unit
            .ty
            .define_method(syntax.name.text(), modifiers, &names(&syntax.generic_parameters))?;
        let scope = type_scope.with_method_parameters(method.generic_parameters());
        apply_constraints(&scope, method.generic_parameters(), &syntax.constraints, &mut errors)?;

        let mut signature = MethodSignature::default();
        if let Some(return_type) = &syntax.return_type {
            match scope.resolve(return_type) {
                Ok(ty) => signature.return_type = Some(ty),
                Err(error) => errors.push(error),
            }
        }

        let mut parameter_names = HashSet::new();
        for parameter in &syntax.parameters {
            if !parameter_names.insert(parameter.name.text()) {
                errors.push(
                    CompilationError::at(&parameter.name, CompilationErrorType::VariableAlreadyExists)
                        .with_detail(parameter.name.text()),
                );
            }
            let ty = match scope.resolve(&parameter.parameter_type) {
                Ok(ty) => ty,
                Err(error) => {
                    errors.push(error);
                    continue;
                }
            };
            let mut resolved = NeslParameter::new(parameter.name.text(), ty);
            for attribute in &parameter.attributes {
                match scope.resolve_attribute(attribute, AttributeTargets::PARAMETER) {
                    Ok(attribute) => resolved.attributes.push(attribute),
                    Err(error) => errors.push(error),
                }
            }
            signature.parameters.push(resolved);
        }

        for attribute in &syntax.attributes {
            let target = if attribute.on_return {
                AttributeTargets::RETURN_VALUE
            } else {
                AttributeTargets::METHOD
            };
            match scope.resolve_attribute(attribute, target) {
                Ok(resolved) if attribute.on_return => signature.return_attributes.push(resolved),
                Ok(resolved) => signature.attributes.push(resolved),
                Err(error) => errors.push(error),
            }
        }

        let duplicate = declared.iter().any(|(existing, _)| {
            existing.name() == method.name()
                && existing.generic_parameters().len() == method.generic_parameters().len()
                && existing.parameter_types().map_or(false, |types| {
                    types.len() == signature.parameters.len()
                        && types
                            .iter()
                            .zip(&signature.parameters)
                            .all(|(a, b)| Arc::ptr_eq(a, &b.parameter_type))
                })
        });
        if duplicate {
            errors.push(
                CompilationError::at(&syntax.name, CompilationErrorType::MethodAlreadyExists)
                    .with_detail(syntax.name.text()),
            );
        }

        method.set_signature(signature)?;
        declared.push((method, syntax));
    }

    // Only this pass fills the method list
    let _ = unit.methods.set(declared);
    Ok(errors)
}

/// Whether `candidate` implements the interface method `required`
fn implements_method(candidate: &MethodRef, required: &MethodRef) -> Result<bool> {
    if candidate.name() != required.name() || candidate.is_static() != required.is_static() {
        return Ok(false);
    }
    let (have, want) = (candidate.signature()?, required.signature()?);
    let same_return = match (&have.return_type, &want.return_type) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    };
    Ok(same_return
        && have.parameters.len() == want.parameters.len()
        && have
            .parameters
            .iter()
            .zip(&want.parameters)
            .all(|(a, b)| Arc::ptr_eq(&a.parameter_type, &b.parameter_type)))
}

fn analyze_interfaces(unit: &TypeUnit<'_>, assembly: &Arc<NeslAssembly>, storage: &ParserStorage) -> Result<Vec<CompilationError>> {
    let scope = unit.scope(assembly, storage);
    let mut errors = Vec::new();

    for name in &unit.syntax.interfaces {
        let interface = match scope.resolve(name) {
            Ok(interface) => interface,
            Err(error) => {
                errors.push(error);
                continue;
            }
        };
        if !interface.is_interface() {
            errors.push(
                CompilationError::at(&name.token, CompilationErrorType::TypeNotFound)
                    .with_detail(format!("`{}` is not an interface", interface.full_name())),
            );
            continue;
        }
        unit.ty.add_interface(interface.clone())?;

        if unit.ty.is_interface() {
            continue;
        }
        let own = unit.ty.methods()?;
        for required in interface.methods()? {
            if !required.is_abstract() {
                continue;
            }
            let mut implemented = false;
            for candidate in &own {
                if implements_method(candidate, &required)? {
                    implemented = true;
                    break;
                }
            }
            if !implemented {
                errors.push(
                    CompilationError::at(&unit.syntax.name, CompilationErrorType::AbstractMethodNotImplemented)
                        .with_detail(required.full_name()),
                );
            }
        }
    }
    Ok(errors)
}

fn unused_usings(unit: &FileUnit) -> Vec<CompilationError> {
    unit.syntax
        .usings
        .iter()
        .filter(|using| !using.used.load(Ordering::Relaxed))
        .map(|using| {
            CompilationError::at(&using.token, CompilationErrorType::UnusedUsing)
                .with_detail(using.namespace.clone())
        })
        .collect()
}

/// Whether `argument` satisfies `required`
fn satisfies(argument: &TypeRef, required: &TypeRef) -> Result<bool> {
    if argument.is_generic_parameter() {
        return Ok(argument
            .interfaces()?
            .iter()
            .any(|constraint| Arc::ptr_eq(constraint, required)));
    }
    argument.implements(required)
}

fn check_arguments(
    parameters: &[TypeRef],
    arguments: &[TypeRef],
    substitution: &SubstitutionMap,
    token: &Token,
    errors: &mut Vec<CompilationError>,
) -> Result<()> {
    for (parameter, argument) in parameters.iter().zip(arguments) {
        for constraint in parameter.interfaces()? {
            let required = substitute_type(&constraint, substitution)?;
            if !satisfies(argument, &required)? {
                errors.push(
                    CompilationError::at(token, CompilationErrorType::GenericConstraintNotSatisfied)
                        .with_detail(format!("`{}` does not implement `{}`", argument, required)),
                );
            }
        }
    }
    Ok(())
}

/// Checks every instantiation requested by the source against the
/// constraints of its definition
fn check_constraints(storage: &ParserStorage) -> Result<Vec<CompilationError>> {
    let mut errors = Vec::new();
    for request in storage.types() {
        if let Some(definition) = request.item.generic_definition() {
            check_arguments(
                definition.generic_parameters(),
                request.item.generic_arguments(),
                &request.item.substitution(),
                &request.token,
                &mut errors,
            )?;
        }
    }
    for request in storage.methods() {
        let definition = request.item.definition()?;
        check_arguments(
            definition.generic_parameters(),
            request.item.generic_arguments(),
            &request.item.substitution(),
            &request.token,
            &mut errors,
        )?;
    }
    Ok(errors)
}

//! Name resolution for type references and attributes

use super::diagnostics::{CompilationError, CompilationErrorType};
use super::literal::LiteralValue;
use super::storage::ParserStorage;
use super::syntax::{AttributeSyntax, FileSyntax, TypeName};
use crate::ir::representation::{BOOLEAN, FLOAT32, INT32, UINT32};
use crate::ir::{representation_of, AttributeTargets, NeslAssembly, NeslAttribute, Representation, TypeRef};
use crate::lexer::Token;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

type ParseResult<T> = std::result::Result<T, CompilationError>;

/// Full name a type keyword stands for
pub fn keyword_type(keyword: &str) -> Option<&'static str> {
    match keyword {
        "bool" => Some(BOOLEAN),
        "int" => Some(INT32),
        "uint" => Some(UINT32),
        "float" => Some(FLOAT32),
        _ => None,
    }
}

/// Everything a type reference can see at one place in a file
#[derive(Clone, Copy)]
pub(crate) struct TypeScope<'a> {
    pub assembly: &'a Arc<NeslAssembly>,
    pub storage: &'a ParserStorage,
    pub file: &'a FileSyntax,
    pub aliases: &'a HashMap<String, TypeRef>,
    pub type_parameters: &'a [TypeRef],
    pub method_parameters: &'a [TypeRef],
}

impl<'a> TypeScope<'a> {
    /// Same scope with the generic parameters of a type
    pub fn with_type_parameters(self, type_parameters: &'a [TypeRef]) -> Self {
        TypeScope {
            type_parameters,
            ..self
        }
    }

    /// Same scope with the generic parameters of a method
    pub fn with_method_parameters(self, method_parameters: &'a [TypeRef]) -> Self {
        TypeScope {
            method_parameters,
            ..self
        }
    }

    /// Resolves a written type reference, constructing generics on the way
    pub fn resolve(&self, name: &TypeName) -> ParseResult<TypeRef> {
        let arguments = name
            .arguments
            .iter()
            .map(|argument| self.resolve(argument))
            .collect::<ParseResult<Vec<_>>>()?;
        self.lookup(&name.segments, &arguments, &name.token)?
            .ok_or_else(|| {
                CompilationError::at(&name.token, CompilationErrorType::TypeNotFound)
                    .with_detail(name.dotted())
            })
    }

    /// Resolves `segments` with already resolved `arguments`; `None` if no
    /// type has that name
    pub fn lookup(
        &self,
        segments: &[String],
        arguments: &[TypeRef],
        token: &Token,
    ) -> ParseResult<Option<TypeRef>> {
        let (found, is_definition) = match self.find(segments) {
            Some(found) => found,
            None => return Ok(None),
        };

        let expected = if is_definition {
            found.generic_parameters().len()
        } else {
            0
        };
        if expected != arguments.len() {
            return Err(CompilationError::at(token, CompilationErrorType::InvalidGenericArgumentCount)
                .with_detail(format!("`{}` takes {} type arguments", found.full_name(), expected)));
        }
        if arguments.is_empty() {
            return Ok(Some(found));
        }

        self.storage
            .make_generic_type(&found, arguments, token)
            .map(Some)
            .map_err(|error| {
                CompilationError::at(token, CompilationErrorType::InvalidGenericArgumentCount)
                    .with_detail(error.to_string())
            })
    }

    /// Type named by `segments`; the flag tells whether generic arguments
    /// may still be applied to it
    fn find(&self, segments: &[String]) -> Option<(TypeRef, bool)> {
        let dotted = segments.join(".");

        if let [single] = segments {
            if let Some(full_name) = keyword_type(single) {
                return self.assembly.get_type(full_name).map(|ty| (ty, true));
            }
            let parameter = self
                .method_parameters
                .iter()
                .chain(self.type_parameters)
                .find(|parameter| parameter.name() == single.as_str());
            if let Some(parameter) = parameter {
                return Some((parameter.clone(), false));
            }
            if let Some(aliased) = self.aliases.get(single) {
                return Some((aliased.clone(), false));
            }
        }

        let mut namespace = self.file.namespace.as_str();
        loop {
            let candidate = if namespace.is_empty() {
                dotted.clone()
            } else {
                format!("{}.{}", namespace, dotted)
            };
            if let Some(ty) = self.assembly.get_type(&candidate) {
                return Some((ty, true));
            }
            if namespace.is_empty() {
                break;
            }
            namespace = namespace.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("");
        }

        for using in &self.file.usings {
            if let Some(ty) = self.assembly.get_type(&format!("{}.{}", using.namespace, dotted)) {
                using.used.store(true, Ordering::Relaxed);
                return Some((ty, true));
            }
        }
        None
    }

    /// Resolves and encodes one attribute application
    pub fn resolve_attribute(
        &self,
        syntax: &AttributeSyntax,
        target: AttributeTargets,
    ) -> ParseResult<NeslAttribute> {
        let mut suffixed = syntax.name.segments.clone();
        if let Some(last) = suffixed.last_mut() {
            last.push_str("Attribute");
        }
        let ty = self
            .find(&syntax.name.segments)
            .or_else(|| self.find(&suffixed))
            .map(|(ty, _)| ty)
            .ok_or_else(|| {
                CompilationError::at(&syntax.name.token, CompilationErrorType::TypeNotFound)
                    .with_detail(syntax.name.dotted())
            })?;

        let invalid = || CompilationError::at(&syntax.name.token, CompilationErrorType::InvalidAttributeArguments);
        let fields: Vec<_> = ty
            .fields()
            .map_err(|_| invalid())?
            .into_iter()
            .filter(|field| !field.is_static())
            .collect();
        if fields.len() != syntax.arguments.len() {
            return Err(invalid().with_detail(format!(
                "`{}` takes {} arguments",
                ty.full_name(),
                fields.len()
            )));
        }

        let mut bytes = Vec::new();
        for (field, argument) in fields.iter().zip(&syntax.arguments) {
            let kind = match representation_of(field.field_type()) {
                Some(Representation::Scalar(kind)) => kind,
                _ => return Err(invalid()),
            };
            let value = LiteralValue::from_syntax(argument)
                .map_err(|error| CompilationError::at(&argument.token, error))?;
            let encoded = value.encode(kind).ok_or_else(|| {
                CompilationError::at(&argument.token, CompilationErrorType::InvalidAttributeArguments)
            })?;
            bytes.extend_from_slice(&encoded);
        }

        Ok(NeslAttribute::create(ty.full_name(), target, bytes))
    }
}

//! Generic instantiations requested while parsing
//!
//! Every `Name<Args>` the passes resolve goes through [`ParserStorage`] so the
//! generic-construction pass can materialize the members of each
//! instantiation, and the final constraint check knows where the request was
//! written.

use crate::error::Result;
use crate::ir::{identity_key, MethodRef, TypeRef};
use crate::lexer::Token;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Instantiation together with the first place it was written
#[derive(Debug, Clone)]
pub struct Requested<T> {
    /// The constructed item
    pub item: T,
    /// Source location of the first request
    pub token: Token,
}

type InstantiationKey = (usize, Vec<usize>);

fn key<T>(definition: &std::sync::Arc<T>, arguments: &[TypeRef]) -> InstantiationKey {
    (
        identity_key(definition),
        arguments.iter().map(identity_key).collect(),
    )
}

/// Concurrent registry of generic instantiations, shared by all passes
#[derive(Default)]
pub struct ParserStorage {
    types: DashMap<InstantiationKey, Requested<TypeRef>>,
    methods: DashMap<InstantiationKey, Requested<MethodRef>>,
}

impl ParserStorage {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates `definition` with `arguments`, recording `token` on first use
    pub fn make_generic_type(
        &self,
        definition: &TypeRef,
        arguments: &[TypeRef],
        token: &Token,
    ) -> Result<TypeRef> {
        match self.types.entry(key(definition, arguments)) {
            Entry::Occupied(entry) => Ok(entry.get().item.clone()),
            Entry::Vacant(entry) => {
                let item = definition.make_generic(arguments)?;
                entry.insert(Requested {
                    item: item.clone(),
                    token: token.clone(),
                });
                Ok(item)
            }
        }
    }

    /// Instantiates the generic method `definition` with `arguments`
    pub fn make_generic_method(
        &self,
        definition: &MethodRef,
        arguments: &[TypeRef],
        token: &Token,
    ) -> Result<MethodRef> {
        match self.methods.entry(key(definition, arguments)) {
            Entry::Occupied(entry) => Ok(entry.get().item.clone()),
            Entry::Vacant(entry) => {
                let item = definition.make_generic(arguments)?;
                entry.insert(Requested {
                    item: item.clone(),
                    token: token.clone(),
                });
                Ok(item)
            }
        }
    }

    /// Type instantiations requested so far
    pub fn types(&self) -> Vec<Requested<TypeRef>> {
        self.types.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Method instantiations requested so far
    pub fn methods(&self) -> Vec<Requested<MethodRef>> {
        self.methods.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Number of distinct type instantiations
    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Modifiers, NeslAssemblyBuilder, TypeKind};
    use crate::lexer::lex;
    use std::sync::Arc;

    #[test]
    fn test_same_arguments_same_instance() {
        let builder = NeslAssemblyBuilder::new("A", "", Vec::new());
        let list = builder
            .define_type("A", "List", TypeKind::Struct, Modifiers::PUBLIC, &["T".to_string()])
            .unwrap();
        let item = builder
            .define_type("A", "Item", TypeKind::Struct, Modifiers::PUBLIC, &[])
            .unwrap();
        let tokens = lex("a.nesl", "List<Item> x").unwrap();

        let storage = ParserStorage::new();
        let first = storage.make_generic_type(&list, &[item.clone()], &tokens[0]).unwrap();
        let second = storage.make_generic_type(&list, &[item], &tokens[4]).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(storage.type_count(), 1);
        assert_eq!(storage.types()[0].token.column, 1);
    }

    #[test]
    fn test_concurrent_requests_agree() {
        let builder = NeslAssemblyBuilder::new("A", "", Vec::new());
        let pair = builder
            .define_type(
                "A",
                "Pair",
                TypeKind::Struct,
                Modifiers::PUBLIC,
                &["L".to_string(), "R".to_string()],
            )
            .unwrap();
        let item = builder
            .define_type("A", "Item", TypeKind::Struct, Modifiers::PUBLIC, &[])
            .unwrap();
        let token = lex("a.nesl", "x").unwrap().remove(0);
        let storage = ParserStorage::new();

        let made: Vec<TypeRef> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        storage
                            .make_generic_type(&pair, &[item.clone(), item.clone()], &token)
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(made.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}

//! Generic substitution
//!
//! Instantiation itself lives on [`NeslType::make_generic`] and
//! [`NeslMethod::make_generic`](super::NeslMethod::make_generic); this module
//! holds the parameter → argument maps and the structural rewriting of types
//! and IL bodies.

use super::assembly::NeslAssembly;
use super::types::{MethodRef, TypeRef};
use crate::error::{Error, Result};
use crate::il::{IlContainer, OpCode, CONTAINER_TYPE_BASE};
use std::sync::Arc;

/// Identity of an `Arc`-shared IR object, used as a cache key component
pub fn identity_key<T>(item: &Arc<T>) -> usize {
    Arc::as_ptr(item) as *const () as usize
}

/// Assembly that caches an instantiation: the participant that depends on
/// every other one. `None` when a participant is gone or no participant sees
/// all the others.
pub(crate) fn owning_assembly(
    participants: impl IntoIterator<Item = Option<Arc<NeslAssembly>>>,
) -> Option<Arc<NeslAssembly>> {
    let participants: Vec<Arc<NeslAssembly>> = participants.into_iter().collect::<Option<_>>()?;
    participants
        .iter()
        .find(|candidate| participants.iter().all(|other| candidate.depends_on(other)))
        .cloned()
}

/// Generic parameter → type argument map, compared by identity
#[derive(Debug, Clone, Default)]
pub struct SubstitutionMap {
    pairs: Vec<(TypeRef, TypeRef)>,
}

impl SubstitutionMap {
    /// Map from (parameter, argument) pairs
    pub fn from_pairs(pairs: impl IntoIterator<Item = (TypeRef, TypeRef)>) -> Self {
        SubstitutionMap {
            pairs: pairs.into_iter().collect(),
        }
    }

    /// This map plus `pairs`; later pairs win
    pub fn extended(&self, pairs: impl IntoIterator<Item = (TypeRef, TypeRef)>) -> Self {
        let mut extended = self.clone();
        for (parameter, argument) in pairs {
            extended.pairs.retain(|(existing, _)| !Arc::ptr_eq(existing, &parameter));
            extended.pairs.push((parameter, argument));
        }
        extended
    }

    /// Argument bound to `parameter`
    pub fn get(&self, parameter: &TypeRef) -> Option<&TypeRef> {
        self.pairs
            .iter()
            .find(|(existing, _)| Arc::ptr_eq(existing, parameter))
            .map(|(_, argument)| argument)
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Bound pairs
    pub fn pairs(&self) -> &[(TypeRef, TypeRef)] {
        &self.pairs
    }
}

/// Rewrites every generic parameter occurring in `ty`. Returns `ty` itself
/// when nothing changed.
pub fn substitute_type(ty: &TypeRef, map: &SubstitutionMap) -> Result<TypeRef> {
    if map.is_empty() {
        return Ok(ty.clone());
    }

    if ty.is_generic_parameter() {
        return Ok(map.get(ty).cloned().unwrap_or_else(|| ty.clone()));
    }

    let definition = match ty.generic_definition() {
        Some(definition) => definition,
        None => return Ok(ty.clone()),
    };

    let arguments = ty
        .generic_arguments()
        .iter()
        .map(|argument| substitute_type(argument, map))
        .collect::<Result<Vec<_>>>()?;

    let unchanged = arguments
        .iter()
        .zip(ty.generic_arguments())
        .all(|(new, old)| Arc::ptr_eq(new, old));
    if unchanged {
        Ok(ty.clone())
    } else {
        definition.make_generic(&arguments)
    }
}

/// Rebinds a call target read from a generic body to the arguments in
/// `map`. An abstract interface method whose interface got fully bound
/// resolves to the matching static method on one of the interface arguments.
pub fn substitute_method(method: &MethodRef, map: &SubstitutionMap) -> Result<MethodRef> {
    if map.is_empty() {
        return Ok(method.clone());
    }

    let owner = method.owner()?;
    let new_owner = substitute_type(&owner, map)?;
    let arguments = method
        .generic_arguments()
        .iter()
        .map(|argument| substitute_type(argument, map))
        .collect::<Result<Vec<_>>>()?;

    let owner_changed = !Arc::ptr_eq(&owner, &new_owner);
    let arguments_changed = arguments
        .iter()
        .zip(method.generic_arguments())
        .any(|(new, old)| !Arc::ptr_eq(new, old));
    if !owner_changed && !arguments_changed {
        return Ok(method.clone());
    }

    // the un-instantiated member sits at the same position on both owners
    let member = match method.source() {
        Some(source) if !arguments.is_empty() => source.clone(),
        _ => method.clone(),
    };
    let rebound = if owner_changed {
        let position = owner
            .methods()?
            .iter()
            .position(|candidate| Arc::ptr_eq(candidate, &member))
            .ok_or_else(|| {
                Error::invalid_operation(format!("`{}` is not a member of `{}`", member.full_name(), owner))
            })?;
        new_owner.methods()?.get(position).cloned().ok_or_else(|| {
            Error::invalid_operation(format!("`{}` has no member #{}", new_owner, position))
        })?
    } else {
        member
    };

    let rebound = if arguments.is_empty() {
        rebound
    } else {
        rebound.make_generic(&arguments)?
    };

    if rebound.is_abstract() && new_owner.is_interface() && new_owner.is_fully_constructed() {
        if let Some(implementation) = find_implementation(&rebound, &new_owner)? {
            return Ok(implementation);
        }
    }
    Ok(rebound)
}

fn find_implementation(abstract_method: &MethodRef, interface: &TypeRef) -> Result<Option<MethodRef>> {
    let parameters = abstract_method.parameter_types()?;
    let return_type = abstract_method.return_type()?;

    for candidate_owner in interface.generic_arguments() {
        if candidate_owner.is_interface() || !candidate_owner.implements(interface)? {
            continue;
        }
        for candidate in candidate_owner.get_methods(abstract_method.name())? {
            let candidate_parameters = candidate.parameter_types()?;
            let same_parameters = candidate_parameters.len() == parameters.len()
                && candidate_parameters
                    .iter()
                    .zip(&parameters)
                    .all(|(left, right)| Arc::ptr_eq(left, right));
            let same_return = match (candidate.return_type()?, &return_type) {
                (Some(left), Some(right)) => Arc::ptr_eq(&left, right),
                (None, None) => true,
                _ => false,
            };
            if candidate.is_static() && same_parameters && same_return {
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

/// Rewrites the type operand of every `DefVariable`. The container is
/// returned as is (same `Arc`) when no operand changed. Rewritten operands
/// point into the new container's own type table; the assembly's id table
/// is never extended.
pub fn substitute_il(container: &Arc<IlContainer>, map: &SubstitutionMap) -> Result<Arc<IlContainer>> {
    if map.is_empty() {
        return Ok(container.clone());
    }

    let mut local_types: Vec<TypeRef> = container.local_types().to_vec();
    let mut rewritten: Option<Vec<u8>> = None;

    for mut instruction in container.instructions() {
        if instruction.opcode() != OpCode::DefVariable {
            continue;
        }
        instruction.read_u32()?;
        let offset = instruction.offset();
        let old_id = instruction.read_u64()?;

        let old_type = container.get_type_by_id(old_id)?;
        let new_type = substitute_type(&old_type, map)?;
        if Arc::ptr_eq(&old_type, &new_type) {
            continue;
        }

        let index = match local_types.iter().position(|ty| Arc::ptr_eq(ty, &new_type)) {
            Some(index) => index,
            None => {
                local_types.push(new_type);
                local_types.len() - 1
            }
        };
        let new_id = CONTAINER_TYPE_BASE + index as u64;
        let tail = rewritten.get_or_insert_with(|| container.tail().to_vec());
        tail[offset..offset + 8].copy_from_slice(&new_id.to_le_bytes());
    }

    Ok(match rewritten {
        Some(tail) => Arc::new(IlContainer::with_local_types(
            Arc::downgrade(&container.assembly()?),
            tail,
            container.instruction_pairs().to_vec(),
            local_types,
        )),
        None => container.clone(),
    })
}

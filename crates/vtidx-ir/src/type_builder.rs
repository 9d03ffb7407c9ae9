// src/type_builder.rs
//
// Two-phase construction of mutually recursive heap types.
//
// Slots are reserved up front at the ids they will occupy once committed, so a
// definition can reference any slot (including itself or one filled later) before the
// batch is complete. `build` validates the whole batch and appends it to the arena in
// one step; nothing is written on failure.

use thiserror::Error;
use vtidx_identity::HeapTypeId;

use crate::type_arena::TypeArena;
use crate::types::{HeapType, HeapTypeDef, HeapTypeKind, Type};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeBuildError {
    #[error("type slot {slot} was never filled")]
    UnfilledSlot { slot: usize },

    #[error("arena grew from {expected} to {found} types while the builder was open")]
    ArenaChanged { expected: usize, found: usize },

    #[error("type slot {slot} references ${target}, which is outside the arena and the batch")]
    DanglingReference { slot: usize, target: u32 },

    #[error("supertype chain of slot {slot} is cyclic")]
    SupertypeCycle { slot: usize },

    #[error("slot {slot} ({sub_kind}) cannot subtype ${supertype} ({super_kind})")]
    IncompatibleSupertype {
        slot: usize,
        supertype: u32,
        sub_kind: &'static str,
        super_kind: &'static str,
    },
}

/// Builder for a closed batch of heap types.
#[derive(Debug)]
pub struct TypeBuilder {
    /// Id the first slot will receive; equal to the arena length at creation.
    base: u32,
    slots: Vec<Option<HeapTypeKind>>,
    supertypes: Vec<Option<HeapTypeId>>,
}

impl TypeBuilder {
    /// Reserve `count` slots after the current end of `arena`.
    pub fn new(arena: &TypeArena, count: usize) -> Self {
        Self {
            base: arena.len() as u32,
            slots: vec![None; count],
            supertypes: vec![None; count],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The id slot `slot` will have after `build`.
    #[inline]
    pub fn slot_id(&self, slot: usize) -> HeapTypeId {
        debug_assert!(slot < self.slots.len(), "slot {slot} out of range");
        HeapTypeId::new(self.base + slot as u32)
    }

    /// A forward reference to a (possibly unfilled) slot.
    #[inline]
    pub fn temp_heap_type(&self, slot: usize) -> HeapType {
        HeapType::Defined(self.slot_id(slot))
    }

    pub fn set_heap_type(&mut self, slot: usize, kind: HeapTypeKind) {
        self.slots[slot] = Some(kind);
    }

    pub fn set_supertype(&mut self, slot: usize, super_slot: usize) {
        let id = self.slot_id(super_slot);
        self.supertypes[slot] = Some(id);
    }

    fn slot_of(&self, id: HeapTypeId) -> Option<usize> {
        let index = id.index().checked_sub(self.base)? as usize;
        (index < self.slots.len()).then_some(index)
    }

    fn kind_of<'a>(&'a self, arena: &'a TypeArena, id: HeapTypeId) -> Option<&'a HeapTypeKind> {
        match self.slot_of(id) {
            Some(slot) => self.slots[slot].as_ref(),
            None => arena.try_get(id).map(|def| &def.kind),
        }
    }

    fn check_type(&self, arena: &TypeArena, slot: usize, ty: &Type) -> Result<(), TypeBuildError> {
        match ty {
            Type::Tuple(types) => types.iter().try_for_each(|t| self.check_type(arena, slot, t)),
            _ => match ty.heap_type().and_then(HeapType::defined) {
                Some(id) if self.kind_of(arena, id).is_none() => {
                    Err(TypeBuildError::DanglingReference {
                        slot,
                        target: id.index(),
                    })
                }
                _ => Ok(()),
            },
        }
    }

    fn check_supertypes(&self, arena: &TypeArena, slot: usize) -> Result<(), TypeBuildError> {
        let Some(super_id) = self.supertypes[slot] else {
            return Ok(());
        };
        // Chains through the batch must terminate within the batch size.
        let mut cur = Some(super_id);
        let mut steps = 0;
        while let Some(id) = cur {
            let Some(super_slot) = self.slot_of(id) else {
                break;
            };
            if super_slot == slot || steps > self.slots.len() {
                return Err(TypeBuildError::SupertypeCycle { slot });
            }
            cur = self.supertypes[super_slot];
            steps += 1;
        }

        let (Some(sub), Some(sup)) = (self.slots[slot].as_ref(), self.kind_of(arena, super_id))
        else {
            return Err(TypeBuildError::DanglingReference {
                slot,
                target: super_id.index(),
            });
        };
        let compatible = match (sub, sup) {
            (HeapTypeKind::Struct(sub), HeapTypeKind::Struct(sup)) => {
                sub.fields.len() >= sup.fields.len()
            }
            (HeapTypeKind::Array(_), HeapTypeKind::Array(_)) => true,
            (HeapTypeKind::Signature(sub), HeapTypeKind::Signature(sup)) => {
                sub.params.len() == sup.params.len() && sub.results.len() == sup.results.len()
            }
            _ => false,
        };
        if compatible {
            Ok(())
        } else {
            Err(TypeBuildError::IncompatibleSupertype {
                slot,
                supertype: super_id.index(),
                sub_kind: sub.kind_name(),
                super_kind: sup.kind_name(),
            })
        }
    }

    /// Validate and commit the batch. Returns the new ids in slot order.
    pub fn build(self, arena: &mut TypeArena) -> Result<Vec<HeapTypeId>, TypeBuildError> {
        if arena.len() != self.base as usize {
            return Err(TypeBuildError::ArenaChanged {
                expected: self.base as usize,
                found: arena.len(),
            });
        }

        for (slot, kind) in self.slots.iter().enumerate() {
            let Some(kind) = kind else {
                return Err(TypeBuildError::UnfilledSlot { slot });
            };
            match kind {
                HeapTypeKind::Signature(sig) => {
                    for ty in sig.params.iter().chain(sig.results.iter()) {
                        self.check_type(arena, slot, ty)?;
                    }
                }
                HeapTypeKind::Struct(s) => {
                    for field in &s.fields {
                        self.check_type(arena, slot, &field.ty)?;
                    }
                }
                HeapTypeKind::Array(a) => self.check_type(arena, slot, &a.element.ty)?,
            }
        }
        for slot in 0..self.slots.len() {
            self.check_supertypes(arena, slot)?;
        }

        let defs = self
            .slots
            .into_iter()
            .zip(self.supertypes)
            .filter_map(|(kind, supertype)| kind.map(|kind| HeapTypeDef { kind, supertype }))
            .collect();
        let ids = arena.extend(defs);
        tracing::trace!(count = ids.len(), "committed heap type batch");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, Signature, Struct};

    #[test]
    fn builds_self_referential_struct() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&arena, 1);
        let next = Type::Ref {
            heap_type: builder.temp_heap_type(0),
            nullability: crate::types::Nullability::Nullable,
        };
        builder.set_heap_type(0, HeapTypeKind::Struct(Struct::new([Field::new(next)])));
        let ids = builder.build(&mut arena).expect("build");

        assert_eq!(ids.len(), 1);
        let s = arena.struct_type(ids[0]).expect("struct");
        assert_eq!(s.fields[0].ty, Type::nullable(ids[0]));
    }

    #[test]
    fn builds_mutually_recursive_pair_after_existing_types() {
        let mut arena = TypeArena::new();
        let existing = arena.push_signature(Signature::new([], []));
        let mut builder = TypeBuilder::new(&arena, 2);
        let a = builder.temp_heap_type(0);
        let b = builder.temp_heap_type(1);
        builder.set_heap_type(
            0,
            HeapTypeKind::Struct(Struct::new([Field::new(Type::nullable(b))])),
        );
        builder.set_heap_type(
            1,
            HeapTypeKind::Signature(Signature::new([Type::nullable(a)], [Type::nullable(existing)])),
        );
        let ids = builder.build(&mut arena).expect("build");

        assert_eq!(ids, vec![HeapTypeId::new(1), HeapTypeId::new(2)]);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn unfilled_slot_is_rejected_without_committing() {
        let mut arena = TypeArena::new();
        let builder = TypeBuilder::new(&arena, 2);
        let err = builder.build(&mut arena).unwrap_err();
        assert_eq!(err, TypeBuildError::UnfilledSlot { slot: 0 });
        assert!(arena.is_empty());
    }

    #[test]
    fn arena_growth_invalidates_builder() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&arena, 1);
        builder.set_heap_type(0, HeapTypeKind::Struct(Struct::default()));
        arena.push_struct(vec![], None);
        assert!(matches!(
            builder.build(&mut arena),
            Err(TypeBuildError::ArenaChanged { expected: 0, found: 1 })
        ));
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&arena, 1);
        builder.set_heap_type(
            0,
            HeapTypeKind::Struct(Struct::new([Field::new(Type::nullable(HeapTypeId::new(9)))])),
        );
        assert!(matches!(
            builder.build(&mut arena),
            Err(TypeBuildError::DanglingReference { slot: 0, target: 9 })
        ));
    }

    #[test]
    fn supertype_cycle_is_rejected() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&arena, 2);
        builder.set_heap_type(0, HeapTypeKind::Struct(Struct::default()));
        builder.set_heap_type(1, HeapTypeKind::Struct(Struct::default()));
        builder.set_supertype(0, 1);
        builder.set_supertype(1, 0);
        assert!(matches!(
            builder.build(&mut arena),
            Err(TypeBuildError::SupertypeCycle { .. })
        ));
        assert!(arena.is_empty());
    }

    #[test]
    fn struct_subtype_must_keep_supertype_fields() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&arena, 2);
        builder.set_heap_type(
            0,
            HeapTypeKind::Struct(Struct::new([Field::new(Type::I32), Field::new(Type::I32)])),
        );
        builder.set_heap_type(1, HeapTypeKind::Struct(Struct::new([Field::new(Type::I32)])));
        builder.set_supertype(1, 0);
        assert!(matches!(
            builder.build(&mut arena),
            Err(TypeBuildError::IncompatibleSupertype { slot: 1, .. })
        ));
    }

    #[test]
    fn supertypes_are_committed() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&arena, 2);
        builder.set_heap_type(0, HeapTypeKind::Struct(Struct::new([Field::new(Type::I32)])));
        builder.set_heap_type(
            1,
            HeapTypeKind::Struct(Struct::new([Field::new(Type::I32), Field::new(Type::F32)])),
        );
        builder.set_supertype(1, 0);
        let ids = builder.build(&mut arena).expect("build");
        assert_eq!(arena.supertype(ids[1]), Some(ids[0]));
    }
}

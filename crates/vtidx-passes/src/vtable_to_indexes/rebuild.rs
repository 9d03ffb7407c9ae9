// src/vtable_to_indexes/rebuild.rs
//
// Type graph rebuild.
//
// Every collected heap type gets a slot in one `TypeBuilder` batch. References between
// types are redirected to the slots, so cycles resolve without a fixpoint; function
// reference fields of structs and arrays become `i32`. Nothing is committed here.

use rustc_hash::FxHashMap;
use vtidx_ir::{
    Array, CollectedTypes, Field, HeapType, HeapTypeId, HeapTypeKind, Module, Rtt, Signature,
    Struct, Type, TypeBuilder,
};

use crate::errors::VtableError;

/// Old heap type to new heap type, total over the collected types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeMapping {
    map: FxHashMap<HeapTypeId, HeapTypeId>,
}

impl TypeMapping {
    pub fn get(&self, old: HeapTypeId) -> Option<HeapTypeId> {
        self.map.get(&old).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (HeapTypeId, HeapTypeId)> + '_ {
        self.map.iter().map(|(&old, &new)| (old, new))
    }

    /// Map an id. Ids outside the mapping are returned unchanged.
    #[inline]
    pub fn id(&self, old: HeapTypeId) -> HeapTypeId {
        self.get(old).unwrap_or(old)
    }

    pub fn heap_type(&self, heap_type: HeapType) -> HeapType {
        match heap_type {
            HeapType::Defined(id) => HeapType::Defined(self.id(id)),
            basic => basic,
        }
    }

    /// Map a value type through ref, rtt and tuple wrappers.
    pub fn ty(&self, ty: &Type) -> Type {
        match ty {
            Type::Ref {
                heap_type,
                nullability,
            } => Type::Ref {
                heap_type: self.heap_type(*heap_type),
                nullability: *nullability,
            },
            Type::Rtt(rtt) => Type::Rtt(Rtt {
                depth: rtt.depth,
                heap_type: self.heap_type(rtt.heap_type),
            }),
            Type::Tuple(types) => Type::Tuple(types.iter().map(|t| self.ty(t)).collect()),
            basic => basic.clone(),
        }
    }
}

/// The filled builder and the mapping to its slot ids.
#[derive(Debug)]
pub(crate) struct RebuiltTypes {
    pub builder: TypeBuilder,
    pub mapping: TypeMapping,
    pub flagged_fields: usize,
}

struct Rebuilder<'a> {
    module: &'a Module,
    collected: &'a CollectedTypes,
    builder: &'a TypeBuilder,
    flagged_fields: usize,
}

impl Rebuilder<'_> {
    fn shape_error(&self, old: HeapTypeId, detail: impl Into<String>) -> VtableError {
        VtableError::UnsupportedShape {
            context: format!("type {}", self.module.type_name(old)),
            detail: detail.into(),
        }
    }

    fn heap_type(&self, owner: HeapTypeId, heap_type: HeapType) -> Result<HeapType, VtableError> {
        match heap_type {
            HeapType::Basic(_) => Ok(heap_type),
            HeapType::Defined(id) => match self.collected.index_of(id) {
                Some(slot) => Ok(self.builder.temp_heap_type(slot)),
                None => Err(self.shape_error(
                    owner,
                    format!("reference to uncollected heap type ${}", id.index()),
                )),
            },
        }
    }

    fn value_type(&self, owner: HeapTypeId, ty: &Type) -> Result<Type, VtableError> {
        match ty {
            Type::None | Type::Unreachable => {
                Err(self.shape_error(owner, format!("`{ty}` is not a storable value type")))
            }
            Type::Ref {
                heap_type,
                nullability,
            } => Ok(Type::Ref {
                heap_type: self.heap_type(owner, *heap_type)?,
                nullability: *nullability,
            }),
            Type::Rtt(rtt) => Ok(Type::Rtt(Rtt {
                depth: rtt.depth,
                heap_type: self.heap_type(owner, rtt.heap_type)?,
            })),
            Type::Tuple(types) => Ok(Type::Tuple(
                types
                    .iter()
                    .map(|t| self.value_type(owner, t))
                    .collect::<Result<_, _>>()?,
            )),
            Type::I32 | Type::I64 | Type::F32 | Type::F64 | Type::V128 => Ok(ty.clone()),
        }
    }

    fn field(&mut self, owner: HeapTypeId, field: &Field) -> Result<Field, VtableError> {
        if self.module.types.is_function_ref(&field.ty) {
            self.flagged_fields += 1;
            return Ok(Field {
                ty: Type::I32,
                packed: None,
                mutable: field.mutable,
            });
        }
        Ok(Field {
            ty: self.value_type(owner, &field.ty)?,
            packed: field.packed,
            mutable: field.mutable,
        })
    }

    fn kind(&mut self, old: HeapTypeId, kind: &HeapTypeKind) -> Result<HeapTypeKind, VtableError> {
        Ok(match kind {
            HeapTypeKind::Signature(sig) => HeapTypeKind::Signature(Signature {
                params: sig
                    .params
                    .iter()
                    .map(|t| self.value_type(old, t))
                    .collect::<Result<_, _>>()?,
                results: sig
                    .results
                    .iter()
                    .map(|t| self.value_type(old, t))
                    .collect::<Result<_, _>>()?,
            }),
            HeapTypeKind::Struct(s) => HeapTypeKind::Struct(Struct {
                fields: s
                    .fields
                    .iter()
                    .map(|f| self.field(old, f))
                    .collect::<Result<_, _>>()?,
            }),
            HeapTypeKind::Array(a) => HeapTypeKind::Array(Array {
                element: self.field(old, &a.element)?,
            }),
        })
    }
}

/// Plan the new type graph for `collected`.
pub(crate) fn rebuild_types(
    module: &Module,
    collected: &CollectedTypes,
) -> Result<RebuiltTypes, VtableError> {
    let arena = &module.types;
    let mut builder = TypeBuilder::new(arena, collected.len());
    let mut mapping = TypeMapping::default();
    for (slot, &old) in collected.types().iter().enumerate() {
        mapping.map.insert(old, builder.slot_id(slot));
    }

    let mut flagged_fields = 0;
    for (slot, &old) in collected.types().iter().enumerate() {
        let mut rebuilder = Rebuilder {
            module,
            collected,
            builder: &builder,
            flagged_fields: 0,
        };
        let Some(def) = arena.try_get(old) else {
            return Err(rebuilder.shape_error(old, "heap type is not defined in the module"));
        };
        let kind = rebuilder.kind(old, &def.kind)?;
        let super_slot = match def.supertype {
            Some(sup) => Some(
                collected
                    .index_of(sup)
                    .ok_or_else(|| rebuilder.shape_error(old, "supertype was not collected"))?,
            ),
            None => None,
        };
        flagged_fields += rebuilder.flagged_fields;

        builder.set_heap_type(slot, kind);
        if let Some(super_slot) = super_slot {
            builder.set_supertype(slot, super_slot);
        }
    }

    tracing::debug!(
        types = mapping.len(),
        flagged_fields,
        "planned rebuilt type graph"
    );
    Ok(RebuiltTypes {
        builder,
        mapping,
        flagged_fields,
    })
}

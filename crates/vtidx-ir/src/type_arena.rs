// src/type_arena.rs
//
// Nominal heap type storage using HeapTypeId handles.
//
// - HeapTypeId: u32 handle to a heap type definition (Copy, trivial Eq/Hash)
// - TypeArena: per-module storage; every push creates a new nominal type
// - Subtyping is declared per definition and walked through `ancestors`

use vtidx_identity::HeapTypeId;

use crate::types::{Array, Field, HeapType, HeapTypeDef, HeapTypeKind, Signature, Struct, Type};

/// Per-module heap type storage.
///
/// Unlike a structural interner, two identical definitions pushed twice are two
/// distinct types. Ids are dense and stable; definitions are never removed, so types
/// replaced by a rewrite simply become unreachable from the module.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TypeArena {
    defs: Vec<HeapTypeDef>,
}

impl std::fmt::Debug for TypeArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeArena")
            .field("types_count", &self.defs.len())
            .finish_non_exhaustive()
    }
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Declare a new nominal heap type.
    pub fn push(&mut self, def: HeapTypeDef) -> HeapTypeId {
        let id = HeapTypeId::new(self.defs.len() as u32);
        self.defs.push(def);
        id
    }

    pub fn push_signature(&mut self, sig: Signature) -> HeapTypeId {
        self.push(HeapTypeDef::new(HeapTypeKind::Signature(sig)))
    }

    pub fn push_struct(&mut self, fields: Vec<Field>, supertype: Option<HeapTypeId>) -> HeapTypeId {
        self.push(HeapTypeDef {
            kind: HeapTypeKind::Struct(Struct { fields }),
            supertype,
        })
    }

    pub fn push_array(&mut self, element: Field, supertype: Option<HeapTypeId>) -> HeapTypeId {
        self.push(HeapTypeDef {
            kind: HeapTypeKind::Array(Array { element }),
            supertype,
        })
    }

    /// Append a batch of definitions at once. Used by `TypeBuilder::build` after it has
    /// validated the whole batch.
    pub(crate) fn extend(&mut self, defs: Vec<HeapTypeDef>) -> Vec<HeapTypeId> {
        let base = self.defs.len() as u32;
        let count = defs.len() as u32;
        self.defs.extend(defs);
        (base..base + count).map(HeapTypeId::new).collect()
    }

    /// Get the definition for an id. Panics on ids from another arena.
    pub fn get(&self, id: HeapTypeId) -> &HeapTypeDef {
        &self.defs[id.as_usize()]
    }

    pub fn try_get(&self, id: HeapTypeId) -> Option<&HeapTypeDef> {
        self.defs.get(id.as_usize())
    }

    pub fn contains(&self, id: HeapTypeId) -> bool {
        id.as_usize() < self.defs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (HeapTypeId, &HeapTypeDef)> {
        self.defs
            .iter()
            .enumerate()
            .map(|(i, def)| (HeapTypeId::new(i as u32), def))
    }

    // ========================================================================
    // Shape accessors
    // ========================================================================

    pub fn signature(&self, id: HeapTypeId) -> Option<&Signature> {
        match &self.try_get(id)?.kind {
            HeapTypeKind::Signature(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn struct_type(&self, id: HeapTypeId) -> Option<&Struct> {
        match &self.try_get(id)?.kind {
            HeapTypeKind::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn array_type(&self, id: HeapTypeId) -> Option<&Array> {
        match &self.try_get(id)?.kind {
            HeapTypeKind::Array(a) => Some(a),
            _ => None,
        }
    }

    /// A struct field by index, or the element of an array (index 0).
    pub fn field(&self, id: HeapTypeId, index: u32) -> Option<&Field> {
        match &self.try_get(id)?.kind {
            HeapTypeKind::Struct(s) => s.fields.get(index as usize),
            HeapTypeKind::Array(a) if index == 0 => Some(&a.element),
            _ => None,
        }
    }

    /// Number of field slots: struct field count, 1 for arrays, 0 for signatures.
    pub fn field_count(&self, id: HeapTypeId) -> usize {
        match self.try_get(id).map(|def| &def.kind) {
            Some(HeapTypeKind::Struct(s)) => s.fields.len(),
            Some(HeapTypeKind::Array(_)) => 1,
            _ => 0,
        }
    }

    // ========================================================================
    // Subtyping
    // ========================================================================

    pub fn supertype(&self, id: HeapTypeId) -> Option<HeapTypeId> {
        self.try_get(id)?.supertype
    }

    /// Iterate the strict supertypes of `id`, nearest first.
    ///
    /// Stops early on a cyclic chain rather than looping; the builder rejects such chains.
    pub fn ancestors(&self, id: HeapTypeId) -> impl Iterator<Item = HeapTypeId> + '_ {
        let limit = self.defs.len();
        std::iter::successors(self.supertype(id), move |&cur| self.supertype(cur)).take(limit)
    }

    /// Nominal subtyping: `sub` is `sup` or declares it somewhere up its chain.
    pub fn is_subtype(&self, sub: HeapTypeId, sup: HeapTypeId) -> bool {
        sub == sup || self.ancestors(sub).any(|ancestor| ancestor == sup)
    }

    /// Depth of the supertype chain, used as the static depth of canonical RTTs.
    pub fn depth(&self, id: HeapTypeId) -> u32 {
        self.ancestors(id).count() as u32
    }

    /// Whether a value type is a reference to a function: either the abstract `func`
    /// heap type or a defined signature.
    pub fn is_function_ref(&self, ty: &Type) -> bool {
        match ty {
            Type::Ref { heap_type, .. } => self.is_function_heap_type(*heap_type),
            _ => false,
        }
    }

    pub fn is_function_heap_type(&self, heap_type: HeapType) -> bool {
        match heap_type {
            HeapType::Basic(basic) => basic == crate::types::BasicHeapType::Func,
            HeapType::Defined(id) => self.signature(id).is_some(),
        }
    }
}

// src/collect.rs
//
// Heap type collection: every defined heap type a module can reach.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use vtidx_identity::HeapTypeId;

use crate::module::Module;
use crate::type_arena::TypeArena;
use crate::types::{HeapType, HeapTypeKind, Type};
use crate::visit::{TypeField, heap_types_of};

/// Defined heap types reachable from a module, with a stable index for each.
///
/// Order is first discovery: function signatures and locals, then all code (global
/// initializers, element segments, function bodies), then declared global, table and
/// segment types, and finally whatever those reach through definitions and
/// supertypes. The order depends only on the module's contents, so repeated
/// collection over an unchanged module is identical.
#[derive(Debug, Clone, Default)]
pub struct CollectedTypes {
    types: Vec<HeapTypeId>,
    indices: HashMap<HeapTypeId, usize, FxBuildHasher>,
}

impl CollectedTypes {
    pub fn types(&self) -> &[HeapTypeId] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn index_of(&self, id: HeapTypeId) -> Option<usize> {
        self.indices.get(&id).copied()
    }

    pub fn contains(&self, id: HeapTypeId) -> bool {
        self.indices.contains_key(&id)
    }

    fn note(&mut self, id: HeapTypeId) -> bool {
        if self.indices.contains_key(&id) {
            return false;
        }
        self.indices.insert(id, self.types.len());
        self.types.push(id);
        true
    }

    fn note_heap_type(&mut self, heap_type: HeapType) {
        if let HeapType::Defined(id) = heap_type {
            self.note(id);
        }
    }

    fn note_type(&mut self, ty: &Type) {
        let mut found = Vec::new();
        heap_types_of(ty, &mut found);
        for heap_type in found {
            self.note_heap_type(heap_type);
        }
    }

    /// Close the set over definitions and supertypes. Ids missing from the arena are
    /// kept (so callers can report them) but not expanded.
    fn close(&mut self, arena: &TypeArena) {
        let mut next = 0;
        while next < self.types.len() {
            let id = self.types[next];
            next += 1;
            let Some(def) = arena.try_get(id) else {
                continue;
            };
            if let Some(supertype) = def.supertype {
                self.note(supertype);
            }
            match &def.kind {
                HeapTypeKind::Signature(sig) => {
                    for ty in sig.params.iter().chain(sig.results.iter()) {
                        self.note_type(ty);
                    }
                }
                HeapTypeKind::Struct(s) => {
                    for field in &s.fields {
                        self.note_type(&field.ty);
                    }
                }
                HeapTypeKind::Array(a) => self.note_type(&a.element.ty),
            }
        }
    }
}

/// Collect every defined heap type reachable from `module`.
pub fn collect_heap_types(module: &Module) -> CollectedTypes {
    let mut collected = CollectedTypes::default();

    for func in &module.functions {
        collected.note(func.sig);
        for local in &func.locals {
            collected.note_type(local);
        }
    }
    for (_, code) in module.code() {
        code.walk(&mut |expr| {
            collected.note_type(&expr.ty);
            expr.kind.for_each_type_field(|field| match field {
                TypeField::Type(ty) => collected.note_type(ty),
                TypeField::HeapType(heap_type) => collected.note_heap_type(*heap_type),
                TypeField::Signature(sig) => {
                    collected.note(*sig);
                }
            });
        });
    }
    for global in &module.globals {
        collected.note_type(&global.ty);
    }
    for table in &module.tables {
        collected.note_type(&table.elem_type);
    }
    for segment in &module.element_segments {
        collected.note_type(&segment.elem_type);
    }

    collected.close(&module.types);
    tracing::debug!(count = collected.len(), "collected heap types");
    collected
}

// src/vtable_to_indexes/validate.rs
//
// Input invariants for the vtable rewrite.
//
// A vtable field keeps one table across its whole subtype tree, so a subtype may not
// redeclare an inherited function-reference field with a different type, and every
// value stored into such a field must resolve to a known function (or null).

use vtidx_ir::{
    CollectedTypes, Expr, ExprKind, FunctionId, HeapTypeId, Module, TypeArena, print_type,
};

use crate::errors::VtableError;

/// One logical vtable field: the type that first declares it and its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub root: HeapTypeId,
    pub index: u32,
}

/// A value a vtable field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableEntry {
    Null,
    Func(FunctionId),
}

/// Whether field `index` of `id` holds a function reference.
pub(crate) fn is_flagged(arena: &TypeArena, id: HeapTypeId, index: u32) -> bool {
    arena
        .field(id, index)
        .is_some_and(|field| arena.is_function_ref(&field.ty))
}

/// The logical field behind field `index` of `id`: walk up while ancestors declare the
/// same function-reference field.
pub(crate) fn field_key(arena: &TypeArena, id: HeapTypeId, index: u32) -> FieldKey {
    let mut root = id;
    for ancestor in arena.ancestors(id) {
        if !is_flagged(arena, ancestor, index) {
            break;
        }
        root = ancestor;
    }
    FieldKey { root, index }
}

/// Field name from debug metadata, or its index.
pub(crate) fn field_label(module: &Module, id: HeapTypeId, index: u32) -> String {
    module
        .type_names
        .get(&id)
        .and_then(|names| names.field_names.get(&index))
        .cloned()
        .unwrap_or_else(|| index.to_string())
}

/// Reject subtypes that change an inherited function-reference field, or turn an
/// inherited plain field into one.
pub(crate) fn check_specializations(
    module: &Module,
    collected: &CollectedTypes,
) -> Result<(), VtableError> {
    let arena = &module.types;
    for &id in collected.types() {
        let Some(sup) = arena.supertype(id) else {
            continue;
        };
        for index in 0..arena.field_count(sup) as u32 {
            let sub_flagged = is_flagged(arena, id, index);
            let sup_flagged = is_flagged(arena, sup, index);
            if !sub_flagged && !sup_flagged {
                continue;
            }
            let Some(sup_field) = arena.field(sup, index) else {
                continue;
            };
            let sub_field = arena.field(id, index);
            if sub_field.map(|f| &f.ty) == Some(&sup_field.ty) {
                continue;
            }
            return Err(VtableError::InvalidSpecialization {
                subtype: module.type_name(id),
                supertype: module.type_name(sup),
                field: field_label(module, sup, index),
                expected: print_type(module, &sup_field.ty),
                found: sub_field.map_or_else(
                    || "nothing".to_string(),
                    |f| print_type(module, &f.ty),
                ),
            });
        }
    }
    Ok(())
}

/// Resolves expressions to constant table entries.
///
/// Immutable globals are resolved once up front, in declaration order, so a global can
/// forward an earlier one.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConstantResolver {
    globals: Vec<Option<TableEntry>>,
}

impl ConstantResolver {
    pub fn new(module: &Module) -> Self {
        let mut resolver = Self {
            globals: Vec::with_capacity(module.globals.len()),
        };
        for global in &module.globals {
            let entry = if global.mutable {
                None
            } else {
                resolver.resolve(&global.init)
            };
            resolver.globals.push(entry);
        }
        resolver
    }

    pub fn resolve(&self, expr: &Expr) -> Option<TableEntry> {
        match &expr.kind {
            ExprKind::RefFunc { func } => Some(TableEntry::Func(*func)),
            ExprKind::RefNull { .. } => Some(TableEntry::Null),
            // A cast of null would trap at run time; that is not a constant.
            ExprKind::RefAsNonNull { value } => match self.resolve(value)? {
                TableEntry::Null => None,
                entry => Some(entry),
            },
            ExprKind::GlobalGet { global } => self.globals.get(global.as_usize()).copied().flatten(),
            _ => None,
        }
    }
}

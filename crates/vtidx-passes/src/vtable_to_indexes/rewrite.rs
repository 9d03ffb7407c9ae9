// src/vtable_to_indexes/rewrite.rs
//
// Expression rewriting against a planned type graph and table set.
//
// Nodes are classified with their original types before anything below them changes:
// constant writes into vtable fields become `i32.const` indices, reads of vtable fields
// produce an index and, where a function reference is still wanted, a `table.get` of
// it. A `call_ref` whose target is such a read becomes a `call_indirect` on the index.

use smallvec::SmallVec;
use vtidx_ir::{Expr, ExprKind, Function, HeapType, HeapTypeId, Type, TypeSlot};

use super::rebuild::TypeMapping;
use super::tables::{DispatchTable, Synthesis};
use super::validate::ConstantResolver;

/// What the parent of a field read needs from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    /// A function reference, loaded from the table.
    Value,
    /// The raw table index.
    Index,
}

/// Constant operands to replace: operand position and table index.
type ConstantWrites = SmallVec<[(usize, u32); 4]>;

fn defined(ty: &Type) -> Option<HeapTypeId> {
    ty.heap_type().and_then(HeapType::defined)
}

/// Operand `position` of a writing node, numbered the way synthesis records it.
fn written_operand(kind: &mut ExprKind, position: usize) -> Option<&mut Expr> {
    match kind {
        ExprKind::StructNew { operands } => operands.get_mut(position),
        ExprKind::ArrayNewFixed { values } => values.get_mut(position),
        ExprKind::ArrayNew { init, .. } if position == 0 => init.as_deref_mut(),
        ExprKind::StructSet { value, .. } if position == 1 => Some(&mut **value),
        ExprKind::ArraySet { value, .. } if position == 2 => Some(&mut **value),
        _ => None,
    }
}

/// A `struct.new` with an unreachable operand never allocates, and its type no longer
/// says which fields the operands were meant for. Keep the operands that run, dropped,
/// up to the one that diverges.
fn unreachable_allocation(operands: Vec<Expr>) -> Expr {
    let mut list = Vec::with_capacity(operands.len());
    for operand in operands {
        if operand.ty.is_unreachable() {
            list.push(operand);
            break;
        }
        list.push(Expr::drop(operand));
    }
    Expr::block(None, list, Type::Unreachable)
}

pub(crate) struct Rewriter<'a> {
    pub mapping: &'a TypeMapping,
    pub resolver: &'a ConstantResolver,
    pub synthesis: &'a Synthesis,
}

impl Rewriter<'_> {
    /// Rewrite a function's signature, locals and body.
    pub fn rewrite_function(&self, func: &mut Function) {
        func.sig = self.mapping.id(func.sig);
        for local in &mut func.locals {
            *local = self.mapping.ty(local);
        }
        if let Some(body) = &mut func.body {
            self.rewrite_expr(body);
        }
    }

    pub fn rewrite_expr(&self, expr: &mut Expr) {
        self.rewrite(expr, ReadMode::Value);
    }

    fn constant_index(&self, heap_type: HeapTypeId, field: u32, value: &Expr) -> Option<u32> {
        if value.ty.is_unreachable() {
            return None;
        }
        let table = self.synthesis.slot(heap_type, field)?;
        self.resolver
            .resolve(value)
            .and_then(|entry| table.index_of(entry))
    }

    fn constant_writes(&self, expr: &Expr) -> ConstantWrites {
        let mut writes = ConstantWrites::new();
        let mut check = |heap_type: Option<HeapTypeId>, field: u32, position: usize, value: &Expr| {
            if let Some(index) = heap_type.and_then(|id| self.constant_index(id, field, value)) {
                writes.push((position, index));
            }
        };
        match &expr.kind {
            ExprKind::StructNew { operands } => {
                for (i, operand) in operands.iter().enumerate() {
                    check(defined(&expr.ty), i as u32, i, operand);
                }
            }
            ExprKind::ArrayNew {
                init: Some(init), ..
            } => check(defined(&expr.ty), 0, 0, &**init),
            ExprKind::ArrayNewFixed { values } => {
                for (i, value) in values.iter().enumerate() {
                    check(defined(&expr.ty), 0, i, value);
                }
            }
            ExprKind::StructSet {
                index,
                reference,
                value,
            } => check(defined(&reference.ty), *index, 1, &**value),
            ExprKind::ArraySet {
                reference, value, ..
            } => check(defined(&reference.ty), 0, 2, &**value),
            _ => {}
        }
        writes
    }

    /// The table behind a field read, if `expr` reads a vtable field.
    fn flagged_read(&self, expr: &Expr) -> Option<&DispatchTable> {
        match &expr.kind {
            ExprKind::StructGet {
                index, reference, ..
            } => self.synthesis.slot(defined(&reference.ty)?, *index),
            ExprKind::ArrayGet { reference, .. } => {
                self.synthesis.slot(defined(&reference.ty)?, 0)
            }
            _ => None,
        }
    }

    /// Table and signature for a `call_ref` that can dispatch through an index.
    fn indirect_call(&self, expr: &Expr) -> Option<(&DispatchTable, HeapTypeId)> {
        let ExprKind::CallRef { target, .. } = &expr.kind else {
            return None;
        };
        let table = self.flagged_read(target)?;
        Some((table, table.signature()?))
    }

    fn rewrite(&self, expr: &mut Expr, mode: ReadMode) {
        if expr.ty.is_unreachable() {
            if let ExprKind::StructNew { operands } = &mut expr.kind {
                *expr = unreachable_allocation(std::mem::take(operands));
            }
        }

        let read = self.flagged_read(expr);
        let call = self.indirect_call(expr);

        for (position, index) in self.constant_writes(expr) {
            if let Some(operand) = written_operand(&mut expr.kind, position) {
                *operand = Expr::i32_const(index as i32);
            }
        }

        match (&mut expr.kind, call) {
            (ExprKind::CallRef { target, operands }, Some(_)) => {
                self.rewrite(target, ReadMode::Index);
                for operand in operands {
                    self.rewrite(operand, ReadMode::Value);
                }
            }
            (kind, _) => kind.for_each_child_mut(|child| self.rewrite(child, ReadMode::Value)),
        }

        expr.ty = self.mapping.ty(&expr.ty);
        expr.kind.for_each_type_slot(|slot| match slot {
            TypeSlot::Type(ty) => *ty = self.mapping.ty(ty),
            TypeSlot::HeapType(heap_type) => *heap_type = self.mapping.heap_type(*heap_type),
            TypeSlot::Signature(sig) => *sig = self.mapping.id(*sig),
        });

        if let Some((table, signature)) = call {
            let kind = std::mem::replace(&mut expr.kind, ExprKind::Nop);
            if let ExprKind::CallRef { target, operands } = kind {
                expr.kind = ExprKind::CallIndirect {
                    table: table.table,
                    target,
                    operands,
                    signature: self.mapping.id(signature),
                };
            }
            return;
        }

        if let Some(table) = read {
            expr.ty = Type::I32;
            if mode == ReadMode::Value {
                let index = std::mem::replace(expr, Expr::nop());
                let loaded = Expr::table_get(table.table, index, self.mapping.ty(&table.elem_type()));
                *expr = if table.nullable {
                    loaded
                } else {
                    Expr::ref_as_non_null(loaded)
                };
            }
        }
    }
}

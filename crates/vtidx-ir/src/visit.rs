// src/visit.rs
//
// Per-kind field classification for expression nodes.
//
// Each `ExprKind` declares its children (in evaluation order) and its type-valued,
// heap-type-valued and signature-valued fields. The matches below are exhaustive with
// no wildcard arm, so a new kind cannot be added without deciding how passes see it.
// Each match is written once and expanded for both shared and mutable access; default
// binding modes pick `&` or `&mut` from the scrutinee.

use vtidx_identity::HeapTypeId;

use crate::expr::{Expr, ExprKind};
use crate::types::{HeapType, Type};

/// A mutable type-bearing field of an expression node.
#[derive(Debug)]
pub enum TypeSlot<'a> {
    Type(&'a mut Type),
    HeapType(&'a mut HeapType),
    Signature(&'a mut HeapTypeId),
}

/// A shared type-bearing field of an expression node.
#[derive(Debug, Clone, Copy)]
pub enum TypeField<'a> {
    Type(&'a Type),
    HeapType(&'a HeapType),
    Signature(&'a HeapTypeId),
}

macro_rules! match_type_fields {
    ($kind:expr, $f:ident, $slot:ident) => {
        match $kind {
            ExprKind::Select { annotation, .. } => {
                if let Some(ty) = annotation {
                    $f($slot::Type(ty));
                }
            }
            ExprKind::CallIndirect { signature, .. } => $f($slot::Signature(signature)),
            ExprKind::RefNull { heap_type } => $f($slot::HeapType(heap_type)),
            ExprKind::RefTest { target, .. } | ExprKind::RefCast { target, .. } => {
                $f($slot::HeapType(target))
            }
            ExprKind::Nop
            | ExprKind::Unreachable
            | ExprKind::Block { .. }
            | ExprKind::If { .. }
            | ExprKind::Loop { .. }
            | ExprKind::Break { .. }
            | ExprKind::Return { .. }
            | ExprKind::Drop { .. }
            | ExprKind::Const(_)
            | ExprKind::Binary { .. }
            | ExprKind::LocalGet { .. }
            | ExprKind::LocalSet { .. }
            | ExprKind::GlobalGet { .. }
            | ExprKind::GlobalSet { .. }
            | ExprKind::Call { .. }
            | ExprKind::CallRef { .. }
            | ExprKind::RefFunc { .. }
            | ExprKind::RefIsNull { .. }
            | ExprKind::RefAsNonNull { .. }
            | ExprKind::RefEq { .. }
            | ExprKind::RttCanon
            | ExprKind::RttSub { .. }
            | ExprKind::StructNew { .. }
            | ExprKind::StructNewDefault
            | ExprKind::StructGet { .. }
            | ExprKind::StructSet { .. }
            | ExprKind::ArrayNew { .. }
            | ExprKind::ArrayNewFixed { .. }
            | ExprKind::ArrayGet { .. }
            | ExprKind::ArraySet { .. }
            | ExprKind::ArrayLen { .. }
            | ExprKind::ArrayCopy { .. }
            | ExprKind::TableGet { .. }
            | ExprKind::TableSet { .. }
            | ExprKind::TableSize { .. }
            | ExprKind::TupleMake { .. }
            | ExprKind::TupleExtract { .. } => {}
        }
    };
}

macro_rules! match_children {
    ($kind:expr, $f:ident) => {
        match $kind {
            ExprKind::Nop
            | ExprKind::Unreachable
            | ExprKind::Const(_)
            | ExprKind::LocalGet { .. }
            | ExprKind::GlobalGet { .. }
            | ExprKind::RefNull { .. }
            | ExprKind::RefFunc { .. }
            | ExprKind::RttCanon
            | ExprKind::StructNewDefault
            | ExprKind::TableSize { .. } => {}
            ExprKind::Block { list, .. } => {
                for child in list {
                    $f(child);
                }
            }
            ExprKind::If {
                condition,
                if_true,
                if_false,
            } => {
                $f(condition);
                $f(if_true);
                if let Some(if_false) = if_false {
                    $f(if_false);
                }
            }
            ExprKind::Loop { body, .. } => $f(body),
            ExprKind::Break {
                value, condition, ..
            } => {
                if let Some(value) = value {
                    $f(value);
                }
                if let Some(condition) = condition {
                    $f(condition);
                }
            }
            ExprKind::Return { value } => {
                if let Some(value) = value {
                    $f(value);
                }
            }
            ExprKind::Drop { value }
            | ExprKind::LocalSet { value, .. }
            | ExprKind::GlobalSet { value, .. }
            | ExprKind::RefIsNull { value }
            | ExprKind::RefAsNonNull { value }
            | ExprKind::RefTest { value, .. }
            | ExprKind::RefCast { value, .. } => $f(value),
            ExprKind::Select {
                if_true,
                if_false,
                condition,
                ..
            } => {
                $f(if_true);
                $f(if_false);
                $f(condition);
            }
            ExprKind::Binary { left, right, .. } | ExprKind::RefEq { left, right } => {
                $f(left);
                $f(right);
            }
            ExprKind::Call { operands, .. }
            | ExprKind::StructNew { operands }
            | ExprKind::TupleMake { operands }
            | ExprKind::ArrayNewFixed { values: operands } => {
                for child in operands {
                    $f(child);
                }
            }
            ExprKind::CallIndirect {
                target, operands, ..
            }
            | ExprKind::CallRef { target, operands } => {
                for child in operands {
                    $f(child);
                }
                $f(target);
            }
            ExprKind::RttSub { parent } => $f(parent),
            ExprKind::StructGet { reference, .. } | ExprKind::ArrayLen { reference } => {
                $f(reference)
            }
            ExprKind::StructSet {
                reference, value, ..
            } => {
                $f(reference);
                $f(value);
            }
            ExprKind::ArrayNew { init, size } => {
                if let Some(init) = init {
                    $f(init);
                }
                $f(size);
            }
            ExprKind::ArrayGet {
                reference, index, ..
            } => {
                $f(reference);
                $f(index);
            }
            ExprKind::ArraySet {
                reference,
                index,
                value,
            } => {
                $f(reference);
                $f(index);
                $f(value);
            }
            ExprKind::ArrayCopy {
                dest_ref,
                dest_index,
                src_ref,
                src_index,
                length,
            } => {
                $f(dest_ref);
                $f(dest_index);
                $f(src_ref);
                $f(src_index);
                $f(length);
            }
            ExprKind::TableGet { index, .. } => $f(index),
            ExprKind::TableSet { index, value, .. } => {
                $f(index);
                $f(value);
            }
            ExprKind::TupleExtract { tuple, .. } => $f(tuple),
        }
    };
}

impl ExprKind {
    /// Hand every type-bearing field of this node to `f`. Children and the node's own
    /// result type are not included.
    pub fn for_each_type_slot(&mut self, mut f: impl FnMut(TypeSlot<'_>)) {
        match_type_fields!(self, f, TypeSlot)
    }

    pub fn for_each_type_field(&self, mut f: impl FnMut(TypeField<'_>)) {
        match_type_fields!(self, f, TypeField)
    }

    /// Visit direct children in evaluation order.
    pub fn for_each_child<'a>(&'a self, mut f: impl FnMut(&'a Expr)) {
        let mut visit = |child: &'a Expr| f(child);
        match_children!(self, visit)
    }

    /// Visit direct children mutably, in evaluation order.
    pub fn for_each_child_mut(&mut self, mut f: impl FnMut(&mut Expr)) {
        let mut visit = |child: &mut Expr| f(child);
        match_children!(self, visit)
    }
}

/// Push every heap type mentioned by `ty`, looking through tuples.
pub fn heap_types_of(ty: &Type, out: &mut Vec<HeapType>) {
    match ty {
        Type::Tuple(types) => types.iter().for_each(|t| heap_types_of(t, out)),
        _ => out.extend(ty.heap_type()),
    }
}

impl Expr {
    /// Post-order traversal: children first, in evaluation order, then the node.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        self.kind.for_each_child(|child| child.walk(f));
        f(self);
    }

    /// Post-order mutable traversal.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        self.kind.for_each_child_mut(|child| child.walk_mut(f));
        f(self);
    }

    /// Number of nodes in this tree.
    pub fn size(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, Literal};

    #[test]
    fn walk_is_post_order_in_evaluation_order() {
        let tree = Expr::binary(BinaryOp::AddI32, Expr::i32_const(1), Expr::i32_const(2));
        let mut seen = Vec::new();
        tree.walk(&mut |e| {
            seen.push(match &e.kind {
                ExprKind::Const(Literal::I32(v)) => v.to_string(),
                ExprKind::Binary { .. } => "add".to_string(),
                _ => "?".to_string(),
            })
        });
        assert_eq!(seen, vec!["1", "2", "add"]);
    }

    #[test]
    fn type_slots_cover_signature_fields() {
        let sig = HeapTypeId::new(4);
        let mut kind = ExprKind::CallIndirect {
            table: vtidx_identity::TableId::new(0),
            target: Box::new(Expr::i32_const(0)),
            operands: vec![],
            signature: sig,
        };
        let mut seen = 0;
        kind.for_each_type_slot(|slot| {
            if let TypeSlot::Signature(s) = slot {
                assert_eq!(*s, sig);
                *s = HeapTypeId::new(9);
                seen += 1;
            }
        });
        assert_eq!(seen, 1);
        assert!(matches!(
            kind,
            ExprKind::CallIndirect { signature, .. } if signature == HeapTypeId::new(9)
        ));
    }

    #[test]
    fn select_annotation_is_a_type_field() {
        let id = HeapTypeId::new(1);
        let kind = ExprKind::Select {
            if_true: Box::new(Expr::ref_null(id)),
            if_false: Box::new(Expr::ref_null(id)),
            condition: Box::new(Expr::i32_const(1)),
            annotation: Some(Type::nullable(id)),
        };
        let mut found = Vec::new();
        kind.for_each_type_field(|field| {
            if let TypeField::Type(ty) = field {
                heap_types_of(ty, &mut found);
            }
        });
        assert_eq!(found, vec![HeapType::Defined(id)]);
    }

    #[test]
    fn ref_null_heap_type_is_a_heap_type_field() {
        let mut kind = ExprKind::RefNull {
            heap_type: HeapType::Defined(HeapTypeId::new(2)),
        };
        kind.for_each_type_slot(|slot| {
            if let TypeSlot::HeapType(ht) = slot {
                *ht = HeapType::Defined(HeapTypeId::new(5));
            }
        });
        assert_eq!(
            kind,
            ExprKind::RefNull {
                heap_type: HeapType::Defined(HeapTypeId::new(5))
            }
        );
    }

    #[test]
    fn call_operands_precede_target() {
        let call = ExprKind::CallRef {
            target: Box::new(Expr::i32_const(0)),
            operands: vec![Expr::i32_const(1), Expr::i32_const(2)],
        };
        let mut order = Vec::new();
        call.for_each_child(|child| {
            if let ExprKind::Const(Literal::I32(v)) = child.kind {
                order.push(v);
            }
        });
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn walk_mut_rewrites_every_node() {
        let mut tree = Expr::seq(vec![Expr::drop(Expr::i32_const(1)), Expr::i32_const(2)]);
        tree.walk_mut(&mut |e| {
            if let ExprKind::Const(Literal::I32(v)) = &mut e.kind {
                *v += 10;
            }
        });
        let mut values = Vec::new();
        tree.walk(&mut |e| {
            if let ExprKind::Const(Literal::I32(v)) = e.kind {
                values.push(v);
            }
        });
        assert_eq!(values, vec![11, 12]);
        assert_eq!(tree.size(), 4);
    }
}

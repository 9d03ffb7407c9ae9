// src/expr.rs
//
// Typed expression trees.
//
// Every node carries its result type in `Expr::ty`. Node-specific data lives in the
// closed `ExprKind` union; `visit.rs` declares, per kind, which fields are children and
// which fields hold types, heap types or signatures.

use vtidx_identity::{FunctionId, GlobalId, HeapTypeId, TableId};

use crate::type_arena::TypeArena;
use crate::types::{HeapType, Nullability, Type};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Literal {
    pub fn ty(self) -> Type {
        match self {
            Literal::I32(_) => Type::I32,
            Literal::I64(_) => Type::I64,
            Literal::F32(_) => Type::F32,
            Literal::F64(_) => Type::F64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    AddI32,
    SubI32,
    MulI32,
    EqI32,
    NeI32,
    LtSI32,
    GtSI32,
    AddI64,
    MulI64,
    AddF64,
}

impl BinaryOp {
    pub fn result_type(self) -> Type {
        match self {
            BinaryOp::AddI32
            | BinaryOp::SubI32
            | BinaryOp::MulI32
            | BinaryOp::EqI32
            | BinaryOp::NeI32
            | BinaryOp::LtSI32
            | BinaryOp::GtSI32 => Type::I32,
            BinaryOp::AddI64 | BinaryOp::MulI64 => Type::I64,
            BinaryOp::AddF64 => Type::F64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::AddI32 => "i32.add",
            BinaryOp::SubI32 => "i32.sub",
            BinaryOp::MulI32 => "i32.mul",
            BinaryOp::EqI32 => "i32.eq",
            BinaryOp::NeI32 => "i32.ne",
            BinaryOp::LtSI32 => "i32.lt_s",
            BinaryOp::GtSI32 => "i32.gt_s",
            BinaryOp::AddI64 => "i64.add",
            BinaryOp::MulI64 => "i64.mul",
            BinaryOp::AddF64 => "f64.add",
        }
    }
}

/// A typed expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub ty: Type,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Nop,
    Unreachable,
    Block {
        label: Option<String>,
        list: Vec<Expr>,
    },
    If {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Option<Box<Expr>>,
    },
    Loop {
        label: String,
        body: Box<Expr>,
    },
    /// `br` / `br_if`: leaves the block (or restarts the loop) named `label`.
    Break {
        label: String,
        value: Option<Box<Expr>>,
        condition: Option<Box<Expr>>,
    },
    Return {
        value: Option<Box<Expr>>,
    },
    Drop {
        value: Box<Expr>,
    },
    /// `select`, with the optional `(result t)` annotation required for reference operands.
    Select {
        if_true: Box<Expr>,
        if_false: Box<Expr>,
        condition: Box<Expr>,
        annotation: Option<Type>,
    },
    Const(Literal),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    LocalGet {
        index: u32,
    },
    LocalSet {
        index: u32,
        value: Box<Expr>,
        tee: bool,
    },
    GlobalGet {
        global: GlobalId,
    },
    GlobalSet {
        global: GlobalId,
        value: Box<Expr>,
    },
    Call {
        target: FunctionId,
        operands: Vec<Expr>,
    },
    CallIndirect {
        table: TableId,
        target: Box<Expr>,
        operands: Vec<Expr>,
        signature: HeapTypeId,
    },
    CallRef {
        target: Box<Expr>,
        operands: Vec<Expr>,
    },
    RefNull {
        heap_type: HeapType,
    },
    RefFunc {
        func: FunctionId,
    },
    RefIsNull {
        value: Box<Expr>,
    },
    RefAsNonNull {
        value: Box<Expr>,
    },
    RefEq {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    RefTest {
        value: Box<Expr>,
        target: HeapType,
    },
    RefCast {
        value: Box<Expr>,
        target: HeapType,
    },
    /// Canonical RTT of the heap type named by the node's own `ty`.
    RttCanon,
    RttSub {
        parent: Box<Expr>,
    },
    /// Allocation of the struct type named by the node's `ty`, one operand per field.
    StructNew {
        operands: Vec<Expr>,
    },
    StructNewDefault,
    StructGet {
        index: u32,
        reference: Box<Expr>,
        signed: bool,
    },
    StructSet {
        index: u32,
        reference: Box<Expr>,
        value: Box<Expr>,
    },
    /// `array.new`; `init: None` is `array.new_default`.
    ArrayNew {
        init: Option<Box<Expr>>,
        size: Box<Expr>,
    },
    ArrayNewFixed {
        values: Vec<Expr>,
    },
    ArrayGet {
        reference: Box<Expr>,
        index: Box<Expr>,
        signed: bool,
    },
    ArraySet {
        reference: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    ArrayLen {
        reference: Box<Expr>,
    },
    ArrayCopy {
        dest_ref: Box<Expr>,
        dest_index: Box<Expr>,
        src_ref: Box<Expr>,
        src_index: Box<Expr>,
        length: Box<Expr>,
    },
    TableGet {
        table: TableId,
        index: Box<Expr>,
    },
    TableSet {
        table: TableId,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    TableSize {
        table: TableId,
    },
    TupleMake {
        operands: Vec<Expr>,
    },
    TupleExtract {
        tuple: Box<Expr>,
        index: u32,
    },
}

impl ExprKind {
    /// Whether this node allocates a struct or array.
    pub fn is_allocation(&self) -> bool {
        matches!(
            self,
            ExprKind::StructNew { .. }
                | ExprKind::StructNewDefault
                | ExprKind::ArrayNew { .. }
                | ExprKind::ArrayNewFixed { .. }
        )
    }
}

/// Defined heap type of a reference-typed operand, if it has one.
pub(crate) fn defined_heap_type(expr: &Expr) -> Option<HeapTypeId> {
    expr.ty.heap_type().and_then(HeapType::defined)
}

// ============================================================================
// Constructors
//
// Each constructor computes the node's result type. Only `binary` and
// `struct_new` propagate `unreachable` from their operands.
// ============================================================================

impl Expr {
    pub fn new(ty: Type, kind: ExprKind) -> Self {
        Self { ty, kind }
    }

    pub fn nop() -> Self {
        Self::new(Type::None, ExprKind::Nop)
    }

    pub fn unreachable() -> Self {
        Self::new(Type::Unreachable, ExprKind::Unreachable)
    }

    pub fn i32_const(value: i32) -> Self {
        Self::new(Type::I32, ExprKind::Const(Literal::I32(value)))
    }

    pub fn i64_const(value: i64) -> Self {
        Self::new(Type::I64, ExprKind::Const(Literal::I64(value)))
    }

    pub fn f64_const(value: f64) -> Self {
        Self::new(Type::F64, ExprKind::Const(Literal::F64(value)))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let ty = if left.ty.is_unreachable() || right.ty.is_unreachable() {
            Type::Unreachable
        } else {
            op.result_type()
        };
        Self::new(
            ty,
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    pub fn block(label: Option<&str>, list: Vec<Expr>, ty: Type) -> Self {
        Self::new(
            ty,
            ExprKind::Block {
                label: label.map(str::to_owned),
                list,
            },
        )
    }

    /// An unlabeled block typed by its last expression.
    pub fn seq(list: Vec<Expr>) -> Self {
        let ty = list.last().map_or(Type::None, |last| last.ty.clone());
        Self::block(None, list, ty)
    }

    pub fn if_else(condition: Expr, if_true: Expr, if_false: Option<Expr>, ty: Type) -> Self {
        Self::new(
            ty,
            ExprKind::If {
                condition: Box::new(condition),
                if_true: Box::new(if_true),
                if_false: if_false.map(Box::new),
            },
        )
    }

    pub fn drop(value: Expr) -> Self {
        Self::new(
            Type::None,
            ExprKind::Drop {
                value: Box::new(value),
            },
        )
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Self::new(
            Type::Unreachable,
            ExprKind::Return {
                value: value.map(Box::new),
            },
        )
    }

    pub fn local_get(index: u32, ty: Type) -> Self {
        Self::new(ty, ExprKind::LocalGet { index })
    }

    pub fn local_set(index: u32, value: Expr) -> Self {
        Self::new(
            Type::None,
            ExprKind::LocalSet {
                index,
                value: Box::new(value),
                tee: false,
            },
        )
    }

    pub fn local_tee(index: u32, value: Expr) -> Self {
        let ty = value.ty.clone();
        Self::new(
            ty,
            ExprKind::LocalSet {
                index,
                value: Box::new(value),
                tee: true,
            },
        )
    }

    pub fn global_get(global: GlobalId, ty: Type) -> Self {
        Self::new(ty, ExprKind::GlobalGet { global })
    }

    pub fn global_set(global: GlobalId, value: Expr) -> Self {
        Self::new(
            Type::None,
            ExprKind::GlobalSet {
                global,
                value: Box::new(value),
            },
        )
    }

    /// A direct call. `sig` is the callee's signature.
    pub fn call(arena: &TypeArena, target: FunctionId, sig: HeapTypeId, operands: Vec<Expr>) -> Self {
        let ty = arena
            .signature(sig)
            .map_or(Type::Unreachable, |sig| sig.result_type());
        Self::new(ty, ExprKind::Call { target, operands })
    }

    pub fn call_indirect(
        arena: &TypeArena,
        table: TableId,
        target: Expr,
        signature: HeapTypeId,
        operands: Vec<Expr>,
    ) -> Self {
        let ty = arena
            .signature(signature)
            .map_or(Type::Unreachable, |sig| sig.result_type());
        Self::new(
            ty,
            ExprKind::CallIndirect {
                table,
                target: Box::new(target),
                operands,
                signature,
            },
        )
    }

    /// A call through a function reference; the result comes from the target's signature.
    pub fn call_ref(arena: &TypeArena, target: Expr, operands: Vec<Expr>) -> Self {
        let ty = defined_heap_type(&target)
            .and_then(|id| arena.signature(id))
            .map_or(Type::Unreachable, |sig| sig.result_type());
        Self::new(
            ty,
            ExprKind::CallRef {
                target: Box::new(target),
                operands,
            },
        )
    }

    pub fn ref_null(heap_type: impl Into<HeapType>) -> Self {
        let heap_type = heap_type.into();
        Self::new(Type::nullable(heap_type), ExprKind::RefNull { heap_type })
    }

    /// `ref.func`, typed as a non-null reference to the function's signature.
    pub fn ref_func(func: FunctionId, sig: HeapTypeId) -> Self {
        Self::new(Type::non_null(sig), ExprKind::RefFunc { func })
    }

    pub fn ref_is_null(value: Expr) -> Self {
        Self::new(
            Type::I32,
            ExprKind::RefIsNull {
                value: Box::new(value),
            },
        )
    }

    pub fn ref_as_non_null(value: Expr) -> Self {
        let ty = match &value.ty {
            Type::Ref { heap_type, .. } => Type::non_null(*heap_type),
            other => other.clone(),
        };
        Self::new(
            ty,
            ExprKind::RefAsNonNull {
                value: Box::new(value),
            },
        )
    }

    pub fn ref_cast(value: Expr, target: impl Into<HeapType>) -> Self {
        let target = target.into();
        let nullability = value.ty.nullability().unwrap_or(Nullability::NonNullable);
        Self::new(
            Type::Ref {
                heap_type: target,
                nullability,
            },
            ExprKind::RefCast {
                value: Box::new(value),
                target,
            },
        )
    }

    pub fn ref_test(value: Expr, target: impl Into<HeapType>) -> Self {
        Self::new(
            Type::I32,
            ExprKind::RefTest {
                value: Box::new(value),
                target: target.into(),
            },
        )
    }

    pub fn rtt_canon(arena: &TypeArena, heap_type: HeapTypeId) -> Self {
        Self::new(
            Type::rtt(Some(arena.depth(heap_type)), heap_type),
            ExprKind::RttCanon,
        )
    }

    pub fn struct_new(heap_type: HeapTypeId, operands: Vec<Expr>) -> Self {
        let ty = if operands.iter().any(|op| op.ty.is_unreachable()) {
            Type::Unreachable
        } else {
            Type::non_null(heap_type)
        };
        Self::new(ty, ExprKind::StructNew { operands })
    }

    pub fn struct_new_default(heap_type: HeapTypeId) -> Self {
        Self::new(Type::non_null(heap_type), ExprKind::StructNewDefault)
    }

    /// `struct.get`; the result type is the field's declared type.
    pub fn struct_get(arena: &TypeArena, reference: Expr, index: u32) -> Self {
        let ty = defined_heap_type(&reference)
            .and_then(|id| arena.field(id, index))
            .map_or(Type::Unreachable, |field| field.ty.clone());
        Self::new(
            ty,
            ExprKind::StructGet {
                index,
                reference: Box::new(reference),
                signed: false,
            },
        )
    }

    pub fn struct_set(reference: Expr, index: u32, value: Expr) -> Self {
        Self::new(
            Type::None,
            ExprKind::StructSet {
                index,
                reference: Box::new(reference),
                value: Box::new(value),
            },
        )
    }

    pub fn array_new(heap_type: HeapTypeId, init: Option<Expr>, size: Expr) -> Self {
        Self::new(
            Type::non_null(heap_type),
            ExprKind::ArrayNew {
                init: init.map(Box::new),
                size: Box::new(size),
            },
        )
    }

    pub fn array_new_fixed(heap_type: HeapTypeId, values: Vec<Expr>) -> Self {
        Self::new(Type::non_null(heap_type), ExprKind::ArrayNewFixed { values })
    }

    pub fn array_get(arena: &TypeArena, reference: Expr, index: Expr) -> Self {
        let ty = defined_heap_type(&reference)
            .and_then(|id| arena.field(id, 0))
            .map_or(Type::Unreachable, |field| field.ty.clone());
        Self::new(
            ty,
            ExprKind::ArrayGet {
                reference: Box::new(reference),
                index: Box::new(index),
                signed: false,
            },
        )
    }

    pub fn array_set(reference: Expr, index: Expr, value: Expr) -> Self {
        Self::new(
            Type::None,
            ExprKind::ArraySet {
                reference: Box::new(reference),
                index: Box::new(index),
                value: Box::new(value),
            },
        )
    }

    pub fn array_len(reference: Expr) -> Self {
        Self::new(
            Type::I32,
            ExprKind::ArrayLen {
                reference: Box::new(reference),
            },
        )
    }

    pub fn table_get(table: TableId, index: Expr, elem_type: Type) -> Self {
        Self::new(
            elem_type,
            ExprKind::TableGet {
                table,
                index: Box::new(index),
            },
        )
    }

    pub fn tuple_make(operands: Vec<Expr>) -> Self {
        let ty = Type::Tuple(operands.iter().map(|op| op.ty.clone()).collect());
        Self::new(ty, ExprKind::TupleMake { operands })
    }

    pub fn tuple_extract(tuple: Expr, index: u32) -> Self {
        let ty = match &tuple.ty {
            Type::Tuple(types) => types.get(index as usize).cloned().unwrap_or(Type::Unreachable),
            _ => Type::Unreachable,
        };
        Self::new(
            ty,
            ExprKind::TupleExtract {
                tuple: Box::new(tuple),
                index,
            },
        )
    }
}

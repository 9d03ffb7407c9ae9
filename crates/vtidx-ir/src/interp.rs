// src/interp.rs
//
// Reference interpreter for modules.
//
// A tree-walking evaluator over `Expr`. It is not fast; it exists so that the behavior of
// a module can be compared before and after a transformation. Traps are ordinary errors.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use vtidx_identity::{FunctionId, HeapTypeId, TableId};

use crate::expr::{BinaryOp, Expr, ExprKind, Literal};
use crate::module::Module;
use crate::types::{BasicHeapType, Field, HeapType, PackedType, Type};

/// Maximum call depth before `Trap::StackOverflow`.
const MAX_CALL_DEPTH: usize = 512;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Trap {
    #[error("unreachable executed")]
    Unreachable,

    #[error("null reference")]
    NullReference,

    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: u32, len: u32 },

    #[error("uninitialized element {index} in table #{}", .table.index())]
    UninitializedElement { table: TableId, index: u32 },

    #[error("indirect call expected signature ${}, found ${}", .expected.index(), .found.index())]
    SignatureMismatch {
        expected: HeapTypeId,
        found: HeapTypeId,
    },

    #[error("cast failure")]
    CastFailure,

    #[error("call to imported function `{name}`")]
    ImportCalled { name: String },

    #[error("call stack exhausted")]
    StackOverflow,

    #[error("branch to unknown label `{0}`")]
    UnknownLabel(String),

    #[error("ill-typed module: {0}")]
    Malformed(&'static str),
}

/// A heap-allocated struct or array.
pub struct Object {
    pub heap_type: HeapTypeId,
    pub fields: RefCell<Vec<Value>>,
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Objects may be cyclic; print identity only.
        write!(f, "Object(${})", self.heap_type.index())
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Null,
    Func(FunctionId),
    Struct(Rc<Object>),
    Array(Rc<Object>),
    Rtt(HeapType),
    Tuple(Vec<Value>),
}

impl PartialEq for Value {
    /// Numbers compare by value, references by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Null, Value::Null) => true,
            (Value::Func(a), Value::Func(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) | (Value::Array(a), Value::Array(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Value::Rtt(a), Value::Rtt(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// The zero value of a type: numeric zero or null.
    pub fn default_of(ty: &Type) -> Value {
        match ty {
            Type::I32 => Value::I32(0),
            Type::I64 => Value::I64(0),
            Type::F32 => Value::F32(0.0),
            Type::F64 => Value::F64(0.0),
            Type::Tuple(types) => Value::Tuple(types.iter().map(Value::default_of).collect()),
            _ => Value::Null,
        }
    }

    pub fn as_i32(&self) -> Result<i32, Trap> {
        match self {
            Value::I32(v) => Ok(*v),
            _ => Err(Trap::Malformed("expected i32")),
        }
    }

    fn as_index(&self) -> Result<u32, Trap> {
        self.as_i32().map(|v| v as u32)
    }

    fn object(&self) -> Result<&Rc<Object>, Trap> {
        match self {
            Value::Struct(obj) | Value::Array(obj) => Ok(obj),
            Value::Null => Err(Trap::NullReference),
            _ => Err(Trap::Malformed("expected a struct or array reference")),
        }
    }
}

/// Non-local exits out of `eval`.
enum Control {
    Break { label: String, value: Option<Value> },
    Return(Option<Value>),
    Trap(Trap),
}

impl From<Trap> for Control {
    fn from(trap: Trap) -> Self {
        Control::Trap(trap)
    }
}

type Eval = Result<Option<Value>, Control>;

/// Evaluate an operand that must produce a value.
macro_rules! value {
    ($self:ident, $frame:ident, $expr:expr) => {
        $self
            .eval($frame, $expr)?
            .ok_or(Control::Trap(Trap::Malformed("operand produced no value")))?
    };
}

struct Frame {
    locals: Vec<Value>,
}

pub struct Interpreter<'m> {
    module: &'m Module,
    globals: Vec<Value>,
    tables: Vec<Vec<Value>>,
    depth: usize,
}

impl<'m> Interpreter<'m> {
    /// Instantiate: evaluate global initializers in order, then apply active element
    /// segments to their tables.
    pub fn new(module: &'m Module) -> Result<Self, Trap> {
        let mut interp = Self {
            module,
            globals: Vec::with_capacity(module.globals.len()),
            tables: module
                .tables
                .iter()
                .map(|table| vec![Value::Null; table.initial as usize])
                .collect(),
            depth: 0,
        };

        for global in &module.globals {
            let value = interp.eval_const(&global.init)?;
            interp.globals.push(value);
        }

        for segment in &module.element_segments {
            let (Some(table), Some(offset)) = (segment.table, &segment.offset) else {
                continue;
            };
            let offset = interp.eval_const(offset)?.as_index()?;
            let items = segment
                .items
                .iter()
                .map(|item| interp.eval_const(item))
                .collect::<Result<Vec<_>, _>>()?;
            let slots = interp
                .tables
                .get_mut(table.as_usize())
                .ok_or(Trap::Malformed("element segment names a missing table"))?;
            let len = slots.len() as u32;
            let end = offset as usize + items.len();
            if end > slots.len() {
                return Err(Trap::OutOfBounds { index: end as u32, len });
            }
            for (slot, item) in slots[offset as usize..end].iter_mut().zip(items) {
                *slot = item;
            }
        }

        tracing::trace!(
            globals = interp.globals.len(),
            tables = interp.tables.len(),
            "instantiated module"
        );
        Ok(interp)
    }

    /// Call a function with arguments, returning its results.
    pub fn call(&mut self, func: FunctionId, args: Vec<Value>) -> Result<Vec<Value>, Trap> {
        let result = self.invoke(func, args)?;
        Ok(match result {
            None => Vec::new(),
            Some(Value::Tuple(values)) => values,
            Some(value) => vec![value],
        })
    }

    pub fn global_value(&self, index: usize) -> Option<&Value> {
        self.globals.get(index)
    }

    pub fn table_contents(&self, table: TableId) -> Option<&[Value]> {
        self.tables.get(table.as_usize()).map(Vec::as_slice)
    }

    fn eval_const(&mut self, expr: &Expr) -> Result<Value, Trap> {
        let mut frame = Frame { locals: Vec::new() };
        match self.eval(&mut frame, expr) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(Trap::Malformed("initializer produced no value")),
            Err(Control::Trap(trap)) => Err(trap),
            Err(Control::Break { label, .. }) => Err(Trap::UnknownLabel(label)),
            Err(Control::Return(_)) => Err(Trap::Malformed("return in initializer")),
        }
    }

    fn invoke(&mut self, func: FunctionId, args: Vec<Value>) -> Result<Option<Value>, Trap> {
        let function = self
            .module
            .functions
            .get(func.as_usize())
            .ok_or(Trap::Malformed("call to a missing function"))?;
        let Some(body) = &function.body else {
            return Err(Trap::ImportCalled {
                name: function.name.clone(),
            });
        };
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Trap::StackOverflow);
        }

        let mut locals = args;
        locals.extend(function.locals.iter().map(Value::default_of));
        let mut frame = Frame { locals };

        self.depth += 1;
        let result = self.eval(&mut frame, body);
        self.depth -= 1;

        match result {
            Ok(value) | Err(Control::Return(value)) => Ok(value),
            Err(Control::Trap(trap)) => Err(trap),
            Err(Control::Break { label, .. }) => Err(Trap::UnknownLabel(label)),
        }
    }

    fn field_def(&self, heap_type: HeapTypeId, index: u32) -> Result<&'m Field, Trap> {
        self.module
            .types
            .field(heap_type, index)
            .ok_or(Trap::Malformed("field index out of range"))
    }

    /// Runtime heap type of a non-null reference value.
    fn runtime_heap_type(&self, value: &Value) -> Option<HeapTypeId> {
        match value {
            Value::Struct(obj) | Value::Array(obj) => Some(obj.heap_type),
            Value::Func(func) => self.module.functions.get(func.as_usize()).map(|f| f.sig),
            _ => None,
        }
    }

    fn ref_test(&self, value: &Value, target: HeapType) -> bool {
        match target {
            HeapType::Defined(id) => self
                .runtime_heap_type(value)
                .is_some_and(|actual| self.module.types.is_subtype(actual, id)),
            HeapType::Basic(BasicHeapType::Func) => matches!(value, Value::Func(_)),
            HeapType::Basic(BasicHeapType::Any | BasicHeapType::Eq) => {
                matches!(value, Value::Struct(_) | Value::Array(_))
            }
            HeapType::Basic(BasicHeapType::Data) => matches!(value, Value::Struct(_)),
            HeapType::Basic(BasicHeapType::Extern | BasicHeapType::I31) => false,
        }
    }

    fn table(&mut self, table: TableId) -> Result<&mut Vec<Value>, Trap> {
        self.tables
            .get_mut(table.as_usize())
            .ok_or(Trap::Malformed("missing table"))
    }

    fn eval_all(&mut self, frame: &mut Frame, exprs: &[Expr]) -> Result<Vec<Value>, Control> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(value!(self, frame, expr));
        }
        Ok(values)
    }

    fn eval(&mut self, frame: &mut Frame, expr: &Expr) -> Eval {
        let value = match &expr.kind {
            ExprKind::Nop => None,
            ExprKind::Unreachable => return Err(Trap::Unreachable.into()),
            ExprKind::Block { label, list } => {
                let mut last = None;
                for child in list {
                    match self.eval(frame, child) {
                        Ok(value) => last = value,
                        Err(Control::Break { label: target, value })
                            if label.as_deref() == Some(target.as_str()) =>
                        {
                            return Ok(value);
                        }
                        Err(other) => return Err(other),
                    }
                }
                last
            }
            ExprKind::If {
                condition,
                if_true,
                if_false,
            } => {
                if value!(self, frame, condition).as_i32()? != 0 {
                    self.eval(frame, if_true)?
                } else if let Some(if_false) = if_false {
                    self.eval(frame, if_false)?
                } else {
                    None
                }
            }
            ExprKind::Loop { label, body } => loop {
                match self.eval(frame, body) {
                    Err(Control::Break { label: target, .. }) if target == *label => continue,
                    other => break other?,
                }
            },
            ExprKind::Break {
                label,
                value,
                condition,
            } => {
                let value = match value {
                    Some(value) => Some(value!(self, frame, value)),
                    None => None,
                };
                if let Some(condition) = condition
                    && value!(self, frame, condition).as_i32()? == 0
                {
                    value
                } else {
                    return Err(Control::Break {
                        label: label.clone(),
                        value,
                    });
                }
            }
            ExprKind::Return { value } => {
                let value = match value {
                    Some(value) => Some(value!(self, frame, value)),
                    None => None,
                };
                return Err(Control::Return(value));
            }
            ExprKind::Drop { value } => {
                self.eval(frame, value)?;
                None
            }
            ExprKind::Select {
                if_true,
                if_false,
                condition,
                ..
            } => {
                let if_true = value!(self, frame, if_true);
                let if_false = value!(self, frame, if_false);
                if value!(self, frame, condition).as_i32()? != 0 {
                    Some(if_true)
                } else {
                    Some(if_false)
                }
            }
            ExprKind::Const(literal) => Some(match *literal {
                Literal::I32(v) => Value::I32(v),
                Literal::I64(v) => Value::I64(v),
                Literal::F32(v) => Value::F32(v),
                Literal::F64(v) => Value::F64(v),
            }),
            ExprKind::Binary { op, left, right } => {
                let left = value!(self, frame, left);
                let right = value!(self, frame, right);
                Some(binary(*op, left, right)?)
            }
            ExprKind::LocalGet { index } => Some(
                frame
                    .locals
                    .get(*index as usize)
                    .cloned()
                    .ok_or(Trap::Malformed("local index out of range"))?,
            ),
            ExprKind::LocalSet { index, value, tee } => {
                let value = value!(self, frame, value);
                let slot = frame
                    .locals
                    .get_mut(*index as usize)
                    .ok_or(Trap::Malformed("local index out of range"))?;
                *slot = value.clone();
                tee.then_some(value)
            }
            ExprKind::GlobalGet { global } => Some(
                self.globals
                    .get(global.as_usize())
                    .cloned()
                    .ok_or(Trap::Malformed("global read before initialization"))?,
            ),
            ExprKind::GlobalSet { global, value } => {
                let value = value!(self, frame, value);
                let slot = self
                    .globals
                    .get_mut(global.as_usize())
                    .ok_or(Trap::Malformed("missing global"))?;
                *slot = value;
                None
            }
            ExprKind::Call { target, operands } => {
                let args = self.eval_all(frame, operands)?;
                self.invoke(*target, args)?
            }
            ExprKind::CallIndirect {
                table,
                target,
                operands,
                signature,
            } => {
                let args = self.eval_all(frame, operands)?;
                let index = value!(self, frame, target).as_index()?;
                let slots = self.table(*table)?;
                let entry = slots.get(index as usize).cloned().ok_or(Trap::OutOfBounds {
                    index,
                    len: slots.len() as u32,
                })?;
                let func = match entry {
                    Value::Func(func) => func,
                    Value::Null => {
                        return Err(Trap::UninitializedElement {
                            table: *table,
                            index,
                        }
                        .into());
                    }
                    _ => return Err(Trap::Malformed("table element is not a function").into()),
                };
                let found = self.module.function(func).sig;
                if !self.module.types.is_subtype(found, *signature) {
                    return Err(Trap::SignatureMismatch {
                        expected: *signature,
                        found,
                    }
                    .into());
                }
                self.invoke(func, args)?
            }
            ExprKind::CallRef { target, operands } => {
                let args = self.eval_all(frame, operands)?;
                match value!(self, frame, target) {
                    Value::Func(func) => self.invoke(func, args)?,
                    Value::Null => return Err(Trap::NullReference.into()),
                    _ => return Err(Trap::Malformed("call_ref target is not a function").into()),
                }
            }
            ExprKind::RefNull { .. } => Some(Value::Null),
            ExprKind::RefFunc { func } => Some(Value::Func(*func)),
            ExprKind::RefIsNull { value } => {
                let value = value!(self, frame, value);
                Some(Value::I32(matches!(value, Value::Null) as i32))
            }
            ExprKind::RefAsNonNull { value } => match value!(self, frame, value) {
                Value::Null => return Err(Trap::NullReference.into()),
                value => Some(value),
            },
            ExprKind::RefEq { left, right } => {
                let left = value!(self, frame, left);
                let right = value!(self, frame, right);
                Some(Value::I32((left == right) as i32))
            }
            ExprKind::RefTest { value, target } => {
                let value = value!(self, frame, value);
                Some(Value::I32(self.ref_test(&value, *target) as i32))
            }
            ExprKind::RefCast { value, target } => {
                let value = value!(self, frame, value);
                let null_ok = expr.ty.nullability().is_some_and(|n| n.is_nullable());
                match value {
                    Value::Null if null_ok => Some(Value::Null),
                    Value::Null => return Err(Trap::CastFailure.into()),
                    value if self.ref_test(&value, *target) => Some(value),
                    _ => return Err(Trap::CastFailure.into()),
                }
            }
            ExprKind::RttCanon => Some(Value::Rtt(rtt_heap_type(expr)?)),
            ExprKind::RttSub { parent } => {
                self.eval(frame, parent)?;
                Some(Value::Rtt(rtt_heap_type(expr)?))
            }
            ExprKind::StructNew { operands } => {
                let heap_type = allocated_type(expr)?;
                let fields = self.eval_all(frame, operands)?;
                Some(Value::Struct(Rc::new(Object {
                    heap_type,
                    fields: RefCell::new(fields),
                })))
            }
            ExprKind::StructNewDefault => {
                let heap_type = allocated_type(expr)?;
                let fields = self
                    .module
                    .types
                    .struct_type(heap_type)
                    .ok_or(Trap::Malformed("struct.new_default of a non-struct"))?
                    .fields
                    .iter()
                    .map(|field| Value::default_of(&field.ty))
                    .collect();
                Some(Value::Struct(Rc::new(Object {
                    heap_type,
                    fields: RefCell::new(fields),
                })))
            }
            ExprKind::StructGet {
                index,
                reference,
                signed,
            } => {
                let reference = value!(self, frame, reference);
                let obj = reference.object()?;
                let field = self.field_def(obj.heap_type, *index)?;
                let value = obj
                    .fields
                    .borrow()
                    .get(*index as usize)
                    .cloned()
                    .ok_or(Trap::Malformed("field index out of range"))?;
                Some(unpack(field, value, *signed))
            }
            ExprKind::StructSet {
                index,
                reference,
                value,
            } => {
                let reference = value!(self, frame, reference);
                let value = value!(self, frame, value);
                let obj = reference.object()?;
                let mut fields = obj.fields.borrow_mut();
                let slot = fields
                    .get_mut(*index as usize)
                    .ok_or(Trap::Malformed("field index out of range"))?;
                *slot = value;
                None
            }
            ExprKind::ArrayNew { init, size } => {
                let heap_type = allocated_type(expr)?;
                let init = match init {
                    Some(init) => value!(self, frame, init),
                    None => Value::default_of(&self.field_def(heap_type, 0)?.ty),
                };
                let size = value!(self, frame, size).as_index()?;
                Some(Value::Array(Rc::new(Object {
                    heap_type,
                    fields: RefCell::new(vec![init; size as usize]),
                })))
            }
            ExprKind::ArrayNewFixed { values } => {
                let heap_type = allocated_type(expr)?;
                let values = self.eval_all(frame, values)?;
                Some(Value::Array(Rc::new(Object {
                    heap_type,
                    fields: RefCell::new(values),
                })))
            }
            ExprKind::ArrayGet {
                reference,
                index,
                signed,
            } => {
                let reference = value!(self, frame, reference);
                let index = value!(self, frame, index).as_index()?;
                let obj = reference.object()?;
                let field = self.field_def(obj.heap_type, 0)?;
                let elements = obj.fields.borrow();
                let value = elements.get(index as usize).cloned().ok_or(Trap::OutOfBounds {
                    index,
                    len: elements.len() as u32,
                })?;
                Some(unpack(field, value, *signed))
            }
            ExprKind::ArraySet {
                reference,
                index,
                value,
            } => {
                let reference = value!(self, frame, reference);
                let index = value!(self, frame, index).as_index()?;
                let value = value!(self, frame, value);
                let obj = reference.object()?;
                let mut elements = obj.fields.borrow_mut();
                let len = elements.len() as u32;
                let slot = elements
                    .get_mut(index as usize)
                    .ok_or(Trap::OutOfBounds { index, len })?;
                *slot = value;
                None
            }
            ExprKind::ArrayLen { reference } => {
                let reference = value!(self, frame, reference);
                let len = reference.object()?.fields.borrow().len();
                Some(Value::I32(len as i32))
            }
            ExprKind::ArrayCopy {
                dest_ref,
                dest_index,
                src_ref,
                src_index,
                length,
            } => {
                let dest_ref = value!(self, frame, dest_ref);
                let dest_index = value!(self, frame, dest_index).as_index()? as usize;
                let src_ref = value!(self, frame, src_ref);
                let src_index = value!(self, frame, src_index).as_index()? as usize;
                let length = value!(self, frame, length).as_index()? as usize;

                // Copy out first: source and destination may be the same array.
                let copied: Vec<Value> = {
                    let src = src_ref.object()?.fields.borrow();
                    let end = src_index + length;
                    if end > src.len() {
                        return Err(Trap::OutOfBounds {
                            index: end as u32,
                            len: src.len() as u32,
                        }
                        .into());
                    }
                    src[src_index..end].to_vec()
                };
                let mut dest = dest_ref.object()?.fields.borrow_mut();
                let end = dest_index + length;
                if end > dest.len() {
                    return Err(Trap::OutOfBounds {
                        index: end as u32,
                        len: dest.len() as u32,
                    }
                    .into());
                }
                dest[dest_index..end].clone_from_slice(&copied);
                None
            }
            ExprKind::TableGet { table, index } => {
                let index = value!(self, frame, index).as_index()?;
                let slots = self.table(*table)?;
                Some(slots.get(index as usize).cloned().ok_or(Trap::OutOfBounds {
                    index,
                    len: slots.len() as u32,
                })?)
            }
            ExprKind::TableSet {
                table,
                index,
                value,
            } => {
                let index = value!(self, frame, index).as_index()?;
                let value = value!(self, frame, value);
                let slots = self.table(*table)?;
                let len = slots.len() as u32;
                let slot = slots
                    .get_mut(index as usize)
                    .ok_or(Trap::OutOfBounds { index, len })?;
                *slot = value;
                None
            }
            ExprKind::TableSize { table } => Some(Value::I32(self.table(*table)?.len() as i32)),
            ExprKind::TupleMake { operands } => Some(Value::Tuple(self.eval_all(frame, operands)?)),
            ExprKind::TupleExtract { tuple, index } => match value!(self, frame, tuple) {
                Value::Tuple(mut values) if (*index as usize) < values.len() => {
                    Some(values.swap_remove(*index as usize))
                }
                _ => return Err(Trap::Malformed("tuple.extract of a non-tuple").into()),
            },
        };
        Ok(value)
    }
}

fn allocated_type(expr: &Expr) -> Result<HeapTypeId, Trap> {
    expr.ty
        .heap_type()
        .and_then(HeapType::defined)
        .ok_or(Trap::Malformed("allocation without a defined result type"))
}

fn rtt_heap_type(expr: &Expr) -> Result<HeapType, Trap> {
    match &expr.ty {
        Type::Rtt(rtt) => Ok(rtt.heap_type),
        _ => Err(Trap::Malformed("rtt expression without an rtt type")),
    }
}

/// Apply packed-field extension on read.
fn unpack(field: &Field, value: Value, signed: bool) -> Value {
    match (field.packed, value) {
        (Some(PackedType::I8), Value::I32(v)) if signed => Value::I32(v as i8 as i32),
        (Some(PackedType::I8), Value::I32(v)) => Value::I32(v & 0xff),
        (Some(PackedType::I16), Value::I32(v)) if signed => Value::I32(v as i16 as i32),
        (Some(PackedType::I16), Value::I32(v)) => Value::I32(v & 0xffff),
        (_, value) => value,
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, Trap> {
    Ok(match (op, left, right) {
        (BinaryOp::AddI32, Value::I32(a), Value::I32(b)) => Value::I32(a.wrapping_add(b)),
        (BinaryOp::SubI32, Value::I32(a), Value::I32(b)) => Value::I32(a.wrapping_sub(b)),
        (BinaryOp::MulI32, Value::I32(a), Value::I32(b)) => Value::I32(a.wrapping_mul(b)),
        (BinaryOp::EqI32, Value::I32(a), Value::I32(b)) => Value::I32((a == b) as i32),
        (BinaryOp::NeI32, Value::I32(a), Value::I32(b)) => Value::I32((a != b) as i32),
        (BinaryOp::LtSI32, Value::I32(a), Value::I32(b)) => Value::I32((a < b) as i32),
        (BinaryOp::GtSI32, Value::I32(a), Value::I32(b)) => Value::I32((a > b) as i32),
        (BinaryOp::AddI64, Value::I64(a), Value::I64(b)) => Value::I64(a.wrapping_add(b)),
        (BinaryOp::MulI64, Value::I64(a), Value::I64(b)) => Value::I64(a.wrapping_mul(b)),
        (BinaryOp::AddF64, Value::F64(a), Value::F64(b)) => Value::F64(a + b),
        _ => return Err(Trap::Malformed("binary operand types")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ElementSegment, Table};
    use crate::types::Signature;

    fn speak_module() -> (Module, HeapTypeId, FunctionId, FunctionId) {
        let mut module = Module::new();
        let speak = module.add_signature("speak", Signature::new([], [Type::I32]));
        let meow = module.add_function("meow", speak, vec![], Some(Expr::i32_const(1)));
        let bark = module.add_function("bark", speak, vec![], Some(Expr::i32_const(2)));
        (module, speak, meow, bark)
    }

    #[test]
    fn call_ref_through_struct_field() {
        let (mut module, speak, _meow, bark) = speak_module();
        let animal = module.types.push_struct(vec![Field::new(Type::non_null(speak))], None);
        let main_sig = module.add_signature("main", Signature::new([], [Type::I32]));
        let obj = Expr::struct_new(animal, vec![Expr::ref_func(bark, speak)]);
        let body = Expr::call_ref(&module.types, Expr::struct_get(&module.types, obj, 0), vec![]);
        let main = module.add_function("main", main_sig, vec![], Some(body));

        let mut interp = Interpreter::new(&module).unwrap();
        assert_eq!(interp.call(main, vec![]).unwrap(), vec![Value::I32(2)]);
    }

    #[test]
    fn call_indirect_checks_signature() {
        let (mut module, speak, meow, _bark) = speak_module();
        let other = module.add_signature("other", Signature::new([Type::I32], [Type::I32]));
        let table = module.add_table(Table {
            name: "t".into(),
            elem_type: Type::nullable(HeapType::FUNC),
            initial: 2,
            maximum: None,
        });
        module.add_element_segment(ElementSegment {
            name: "e".into(),
            table: Some(table),
            offset: Some(Expr::i32_const(0)),
            elem_type: Type::nullable(HeapType::FUNC),
            items: vec![Expr::ref_func(meow, speak)],
        });
        let ok = Expr::call_indirect(&module.types, table, Expr::i32_const(0), speak, vec![]);
        let bad = Expr::call_indirect(
            &module.types,
            table,
            Expr::i32_const(0),
            other,
            vec![Expr::i32_const(5)],
        );
        let empty = Expr::call_indirect(&module.types, table, Expr::i32_const(1), speak, vec![]);
        let main_sig = module.add_signature("main", Signature::new([], [Type::I32]));
        let f_ok = module.add_function("ok", main_sig, vec![], Some(ok));
        let f_bad = module.add_function("bad", main_sig, vec![], Some(bad));
        let f_empty = module.add_function("empty", main_sig, vec![], Some(empty));

        let mut interp = Interpreter::new(&module).unwrap();
        assert_eq!(interp.call(f_ok, vec![]).unwrap(), vec![Value::I32(1)]);
        assert_eq!(
            interp.call(f_bad, vec![]),
            Err(Trap::SignatureMismatch {
                expected: other,
                found: speak
            })
        );
        assert_eq!(
            interp.call(f_empty, vec![]),
            Err(Trap::UninitializedElement { table, index: 1 })
        );
    }

    #[test]
    fn loops_and_branches() {
        // sum = 0; i = 0; loop { i += 1; sum += i; br_if loop (i < 10) }; sum
        let mut module = Module::new();
        let sig = module.add_signature("sum", Signature::new([], [Type::I32]));
        let get = |i| Expr::local_get(i, Type::I32);
        let body = Expr::seq(vec![
            Expr::new(
                Type::None,
                ExprKind::Loop {
                    label: "again".into(),
                    body: Box::new(Expr::seq(vec![
                        Expr::local_set(1, Expr::binary(BinaryOp::AddI32, get(1), Expr::i32_const(1))),
                        Expr::local_set(0, Expr::binary(BinaryOp::AddI32, get(0), get(1))),
                        Expr::new(
                            Type::None,
                            ExprKind::Break {
                                label: "again".into(),
                                value: None,
                                condition: Some(Box::new(Expr::binary(
                                    BinaryOp::LtSI32,
                                    get(1),
                                    Expr::i32_const(10),
                                ))),
                            },
                        ),
                    ])),
                },
            ),
            get(0),
        ]);
        let f = module.add_function("sum", sig, vec![Type::I32, Type::I32], Some(body));
        let mut interp = Interpreter::new(&module).unwrap();
        assert_eq!(interp.call(f, vec![]).unwrap(), vec![Value::I32(55)]);
    }

    #[test]
    fn globals_initialize_in_order() {
        let (mut module, speak, meow, _) = speak_module();
        let first = module.add_global("first", Type::non_null(speak), false, Expr::ref_func(meow, speak));
        module.add_global("second", Type::non_null(speak), false, Expr::global_get(first, Type::non_null(speak)));
        let interp = Interpreter::new(&module).unwrap();
        assert_eq!(interp.global_value(1), Some(&Value::Func(meow)));
    }

    #[test]
    fn null_struct_access_traps() {
        let mut module = Module::new();
        let s = module.types.push_struct(vec![Field::new(Type::I32)], None);
        let sig = module.add_signature("f", Signature::new([], [Type::I32]));
        let body = Expr::struct_get(&module.types, Expr::ref_null(s), 0);
        let f = module.add_function("f", sig, vec![], Some(body));
        let mut interp = Interpreter::new(&module).unwrap();
        assert_eq!(interp.call(f, vec![]), Err(Trap::NullReference));
    }

    #[test]
    fn packed_fields_extend_on_read() {
        let mut module = Module::new();
        let s = module.types.push_struct(vec![Field::packed(PackedType::I8, true)], None);
        let sig = module.add_signature("f", Signature::new([], [Type::I32]));
        let obj = Expr::struct_new(s, vec![Expr::i32_const(0x1ff)]);
        let mut get = Expr::struct_get(&module.types, obj, 0);
        if let ExprKind::StructGet { signed, .. } = &mut get.kind {
            *signed = true;
        }
        let f = module.add_function("f", sig, vec![], Some(get));
        let mut interp = Interpreter::new(&module).unwrap();
        assert_eq!(interp.call(f, vec![]).unwrap(), vec![Value::I32(-1)]);
    }

    #[test]
    fn imports_cannot_be_called() {
        let (mut module, speak, ..) = speak_module();
        let ext = module.add_function("ext", speak, vec![], None);
        let mut interp = Interpreter::new(&module).unwrap();
        assert_eq!(
            interp.call(ext, vec![]),
            Err(Trap::ImportCalled { name: "ext".into() })
        );
    }
}

// src/types.rs
//
// Value types and heap type definitions.
//
// A `Type` is what an expression, local, global or field holds. Reference and RTT
// types point at a `HeapType`, which is either one of the basic abstract heap types
// or a nominal definition stored in the `TypeArena` under a `HeapTypeId`.

use std::fmt;

use smallvec::SmallVec;
use vtidx_identity::HeapTypeId;

/// SmallVec for type lists - inline up to 4 (covers most params and results)
pub type TypeList = SmallVec<[Type; 4]>;

/// Abstract heap types that need no arena entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicHeapType {
    Func,
    Extern,
    Any,
    Eq,
    I31,
    Data,
}

impl BasicHeapType {
    pub fn name(self) -> &'static str {
        match self {
            BasicHeapType::Func => "func",
            BasicHeapType::Extern => "extern",
            BasicHeapType::Any => "any",
            BasicHeapType::Eq => "eq",
            BasicHeapType::I31 => "i31",
            BasicHeapType::Data => "data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapType {
    Basic(BasicHeapType),
    Defined(HeapTypeId),
}

impl HeapType {
    pub const FUNC: HeapType = HeapType::Basic(BasicHeapType::Func);

    /// The arena id, for defined heap types.
    #[inline]
    pub fn defined(self) -> Option<HeapTypeId> {
        match self {
            HeapType::Defined(id) => Some(id),
            HeapType::Basic(_) => None,
        }
    }

    #[inline]
    pub fn is_basic(self) -> bool {
        matches!(self, HeapType::Basic(_))
    }
}

impl From<HeapTypeId> for HeapType {
    fn from(id: HeapTypeId) -> Self {
        HeapType::Defined(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nullability {
    Nullable,
    NonNullable,
}

impl Nullability {
    #[inline]
    pub fn is_nullable(self) -> bool {
        self == Nullability::Nullable
    }
}

/// Run-time type descriptor for a heap type.
///
/// `depth` is the length of the supertype chain when known statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rtt {
    pub depth: Option<u32>,
    pub heap_type: HeapType,
}

/// A value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// No value (the type of statements).
    None,
    /// The type of code that never completes normally.
    Unreachable,
    I32,
    I64,
    F32,
    F64,
    V128,
    Ref {
        heap_type: HeapType,
        nullability: Nullability,
    },
    Rtt(Rtt),
    /// Multi-value; heap allocated since `Type` is recursive here.
    Tuple(Vec<Type>),
}

impl Type {
    pub fn nullable(heap_type: impl Into<HeapType>) -> Self {
        Type::Ref {
            heap_type: heap_type.into(),
            nullability: Nullability::Nullable,
        }
    }

    pub fn non_null(heap_type: impl Into<HeapType>) -> Self {
        Type::Ref {
            heap_type: heap_type.into(),
            nullability: Nullability::NonNullable,
        }
    }

    pub fn rtt(depth: Option<u32>, heap_type: impl Into<HeapType>) -> Self {
        Type::Rtt(Rtt {
            depth,
            heap_type: heap_type.into(),
        })
    }

    /// Basic types carry no heap type reference and map to themselves under any rewrite.
    #[inline]
    pub fn is_basic(&self) -> bool {
        matches!(
            self,
            Type::None
                | Type::Unreachable
                | Type::I32
                | Type::I64
                | Type::F32
                | Type::F64
                | Type::V128
        )
    }

    #[inline]
    pub fn is_ref(&self) -> bool {
        matches!(self, Type::Ref { .. })
    }

    #[inline]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Type::Unreachable)
    }

    /// Whether a value of this type exists at run time (excludes `none` and `unreachable`).
    #[inline]
    pub fn is_concrete(&self) -> bool {
        !matches!(self, Type::None | Type::Unreachable)
    }

    /// The heap type referenced by a ref or rtt type.
    pub fn heap_type(&self) -> Option<HeapType> {
        match self {
            Type::Ref { heap_type, .. } => Some(*heap_type),
            Type::Rtt(rtt) => Some(rtt.heap_type),
            _ => None,
        }
    }

    pub fn nullability(&self) -> Option<Nullability> {
        match self {
            Type::Ref { nullability, .. } => Some(*nullability),
            _ => None,
        }
    }

    /// Builds the canonical type for a list of results: `none`, a single type, or a tuple.
    pub fn from_results(results: &[Type]) -> Type {
        match results {
            [] => Type::None,
            [single] => single.clone(),
            many => Type::Tuple(many.to_vec()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackedType {
    I8,
    I16,
}

/// A struct field or array element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub ty: Type,
    pub packed: Option<PackedType>,
    pub mutable: bool,
}

impl Field {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            packed: None,
            mutable: false,
        }
    }

    pub fn mutable(ty: Type) -> Self {
        Self {
            ty,
            packed: None,
            mutable: true,
        }
    }

    pub fn packed(packed: PackedType, mutable: bool) -> Self {
        Self {
            ty: Type::I32,
            packed: Some(packed),
            mutable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    pub params: TypeList,
    pub results: TypeList,
}

impl Signature {
    pub fn new(
        params: impl IntoIterator<Item = Type>,
        results: impl IntoIterator<Item = Type>,
    ) -> Self {
        Self {
            params: params.into_iter().collect(),
            results: results.into_iter().collect(),
        }
    }

    /// The type a call to this signature evaluates to.
    pub fn result_type(&self) -> Type {
        Type::from_results(&self.results)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Struct {
    pub fields: Vec<Field>,
}

impl Struct {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Array {
    pub element: Field,
}

/// The shape of a nominal heap type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeapTypeKind {
    Signature(Signature),
    Struct(Struct),
    Array(Array),
}

impl HeapTypeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HeapTypeKind::Signature(_) => "func",
            HeapTypeKind::Struct(_) => "struct",
            HeapTypeKind::Array(_) => "array",
        }
    }
}

/// A nominal heap type definition as stored in the arena.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeapTypeDef {
    pub kind: HeapTypeKind,
    pub supertype: Option<HeapTypeId>,
}

impl HeapTypeDef {
    pub fn new(kind: HeapTypeKind) -> Self {
        Self {
            kind,
            supertype: None,
        }
    }

    pub fn with_supertype(kind: HeapTypeKind, supertype: HeapTypeId) -> Self {
        Self {
            kind,
            supertype: Some(supertype),
        }
    }
}

impl fmt::Display for Nullability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nullability::Nullable => f.write_str("null "),
            Nullability::NonNullable => Ok(()),
        }
    }
}

impl fmt::Display for HeapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapType::Basic(basic) => f.write_str(basic.name()),
            HeapType::Defined(id) => write!(f, "${}", id.index()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::None => f.write_str("none"),
            Type::Unreachable => f.write_str("unreachable"),
            Type::I32 => f.write_str("i32"),
            Type::I64 => f.write_str("i64"),
            Type::F32 => f.write_str("f32"),
            Type::F64 => f.write_str("f64"),
            Type::V128 => f.write_str("v128"),
            Type::Ref {
                heap_type,
                nullability,
            } => write!(f, "(ref {nullability}{heap_type})"),
            Type::Rtt(Rtt { depth, heap_type }) => match depth {
                Some(depth) => write!(f, "(rtt {depth} {heap_type})"),
                None => write!(f, "(rtt {heap_type})"),
            },
            Type::Tuple(types) => {
                f.write_str("(tuple")?;
                for ty in types {
                    write!(f, " {ty}")?;
                }
                f.write_str(")")
            }
        }
    }
}

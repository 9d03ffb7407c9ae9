// src/module.rs
//
// The module: owner of heap types, functions, globals, tables and element segments.

use std::fmt;

use rustc_hash::FxHashMap;
use vtidx_identity::{ElemSegmentId, FunctionId, GlobalId, HeapTypeId, TableId};

use crate::expr::Expr;
use crate::type_arena::TypeArena;
use crate::types::{Signature, Type};

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    /// Signature heap type; parameters occupy the first local indices.
    pub sig: HeapTypeId,
    /// Additional locals after the parameters.
    pub locals: Vec<Type>,
    /// `None` for imported functions.
    pub body: Option<Expr>,
}

impl Function {
    pub fn is_import(&self) -> bool {
        self.body.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    pub init: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub elem_type: Type,
    pub initial: u32,
    pub maximum: Option<u32>,
}

/// An element segment. Active segments name a table and an offset expression;
/// passive ones have neither.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSegment {
    pub name: String,
    pub table: Option<TableId>,
    pub offset: Option<Expr>,
    pub elem_type: Type,
    pub items: Vec<Expr>,
}

/// Human-readable names attached to a heap type (debug metadata).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeNames {
    pub name: String,
    pub field_names: FxHashMap<u32, String>,
}

impl TypeNames {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_names: FxHashMap::default(),
        }
    }
}

/// Who owns a piece of code: a function body or a module-level initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CodeOwner {
    Global(GlobalId),
    ElementSegment(ElemSegmentId),
    Function(FunctionId),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub types: TypeArena,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub tables: Vec<Table>,
    pub element_segments: Vec<ElementSegment>,
    pub type_names: FxHashMap<HeapTypeId, TypeNames>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    pub fn add_signature(&mut self, name: &str, sig: Signature) -> HeapTypeId {
        let id = self.types.push_signature(sig);
        self.set_type_name(id, name);
        id
    }

    pub fn set_type_name(&mut self, id: HeapTypeId, name: &str) {
        self.type_names.entry(id).or_default().name = name.to_owned();
    }

    pub fn set_field_name(&mut self, id: HeapTypeId, field: u32, name: &str) {
        self.type_names
            .entry(id)
            .or_default()
            .field_names
            .insert(field, name.to_owned());
    }

    pub fn add_function(
        &mut self,
        name: &str,
        sig: HeapTypeId,
        locals: Vec<Type>,
        body: Option<Expr>,
    ) -> FunctionId {
        let id = FunctionId::new(self.functions.len() as u32);
        self.functions.push(Function {
            name: name.to_owned(),
            sig,
            locals,
            body,
        });
        id
    }

    pub fn add_global(&mut self, name: &str, ty: Type, mutable: bool, init: Expr) -> GlobalId {
        let id = GlobalId::new(self.globals.len() as u32);
        self.globals.push(Global {
            name: name.to_owned(),
            ty,
            mutable,
            init,
        });
        id
    }

    pub fn add_table(&mut self, table: Table) -> TableId {
        let id = TableId::new(self.tables.len() as u32);
        self.tables.push(table);
        id
    }

    pub fn add_element_segment(&mut self, segment: ElementSegment) -> ElemSegmentId {
        let id = ElemSegmentId::new(self.element_segments.len() as u32);
        self.element_segments.push(segment);
        id
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.as_usize()]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FunctionId::new(i as u32))
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.as_usize()]
    }

    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.as_usize()]
    }

    pub fn table_by_name(&self, name: &str) -> Option<TableId> {
        self.tables
            .iter()
            .position(|t| t.name == name)
            .map(|i| TableId::new(i as u32))
    }

    /// Parameter types followed by declared locals.
    pub fn local_types(&self, id: FunctionId) -> Vec<Type> {
        let func = self.function(id);
        let mut types: Vec<Type> = self
            .types
            .signature(func.sig)
            .map(|sig| sig.params.to_vec())
            .unwrap_or_default();
        types.extend(func.locals.iter().cloned());
        types
    }

    /// Display name for a heap type: its debug name, or `$<index>`.
    pub fn type_name(&self, id: HeapTypeId) -> String {
        match self.type_names.get(&id) {
            Some(names) if !names.name.is_empty() => names.name.clone(),
            _ => format!("${}", id.index()),
        }
    }

    pub fn owner_name(&self, owner: CodeOwner) -> String {
        match owner {
            CodeOwner::Global(id) => format!("global {}", self.global(id).name),
            CodeOwner::ElementSegment(id) => {
                format!("elem {}", self.element_segments[id.as_usize()].name)
            }
            CodeOwner::Function(id) => format!("function {}", self.function(id).name),
        }
    }

    /// Every piece of code in the module with its owner, in declaration order:
    /// global initializers, element segment offsets and items, then function bodies.
    pub fn code(&self) -> Vec<(CodeOwner, &Expr)> {
        let mut code = Vec::new();
        for (i, global) in self.globals.iter().enumerate() {
            code.push((CodeOwner::Global(GlobalId::new(i as u32)), &global.init));
        }
        for (i, segment) in self.element_segments.iter().enumerate() {
            let owner = CodeOwner::ElementSegment(ElemSegmentId::new(i as u32));
            code.extend(segment.offset.iter().map(|offset| (owner, offset)));
            code.extend(segment.items.iter().map(|item| (owner, item)));
        }
        for (i, func) in self.functions.iter().enumerate() {
            if let Some(body) = &func.body {
                code.push((CodeOwner::Function(FunctionId::new(i as u32)), body));
            }
        }
        code
    }
}

impl fmt::Display for CodeOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeOwner::Global(id) => write!(f, "global #{}", id.index()),
            CodeOwner::ElementSegment(id) => write!(f, "elem #{}", id.index()),
            CodeOwner::Function(id) => write!(f, "function #{}", id.index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_get_dense_ids() {
        let mut module = Module::new();
        let sig = module.add_signature("void", Signature::default());
        let a = module.add_function("a", sig, vec![], Some(Expr::nop()));
        let b = module.add_function("b", sig, vec![], None);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert!(module.function(b).is_import());
        assert_eq!(module.function_by_name("b"), Some(b));
    }

    #[test]
    fn local_types_start_with_params() {
        let mut module = Module::new();
        let sig = module.add_signature("f", Signature::new([Type::I32, Type::F64], []));
        let f = module.add_function("f", sig, vec![Type::I64], Some(Expr::nop()));
        assert_eq!(module.local_types(f), vec![Type::I32, Type::F64, Type::I64]);
    }

    #[test]
    fn type_name_falls_back_to_index() {
        let mut module = Module::new();
        let named = module.add_signature("named", Signature::default());
        let anon = module.types.push_struct(vec![], None);
        assert_eq!(module.type_name(named), "named");
        assert_eq!(module.type_name(anon), "$1");
    }

    #[test]
    fn code_is_listed_in_declaration_order() {
        let mut module = Module::new();
        let sig = module.add_signature("void", Signature::default());
        module.add_function("f", sig, vec![], Some(Expr::nop()));
        module.add_global("g", Type::I32, false, Expr::i32_const(1));
        let owners: Vec<_> = module.code().into_iter().map(|(owner, _)| owner).collect();
        assert_eq!(
            owners,
            vec![
                CodeOwner::Global(GlobalId::new(0)),
                CodeOwner::Function(FunctionId::new(0)),
            ]
        );
    }
}

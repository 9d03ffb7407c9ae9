// src/vtable_to_indexes/tables.rs
//
// Dispatch table synthesis.
//
// Every flagged field gets a table keyed by its root declaring type. Writes are scanned
// in module code order (globals, element segments, functions; post-order within each),
// and each distinct constant is appended the first time it is seen. A field that is
// default-initialized anywhere has `Null` pinned at index 0 so the i32 default keeps
// meaning null.

use rustc_hash::{FxHashMap, FxHashSet};
use vtidx_ir::{
    CodeOwner, CollectedTypes, Expr, ExprKind, GlobalId, HeapType, HeapTypeId, Module, TableId,
    Type,
};

use super::validate::{ConstantResolver, FieldKey, TableEntry, field_key, field_label, is_flagged};
use crate::config::PassOptions;
use crate::errors::VtableError;

/// The table behind one logical vtable field.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchTable {
    pub name: String,
    pub key: FieldKey,
    /// Heap type of the field's function references, before the rebuild.
    pub heap_type: HeapType,
    /// Whether the original field admitted null.
    pub nullable: bool,
    /// Id the table receives when the plan is applied.
    pub table: TableId,
    entries: Vec<TableEntry>,
    positions: FxHashMap<TableEntry, u32>,
    /// Element segment items matching `entries`, typed before the rebuild.
    items: Vec<Expr>,
}

impl DispatchTable {
    fn new(name: String, key: FieldKey, heap_type: HeapType, nullable: bool, table: TableId) -> Self {
        Self {
            name,
            key,
            heap_type,
            nullable,
            table,
            entries: Vec::new(),
            positions: FxHashMap::default(),
            items: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index_of(&self, entry: TableEntry) -> Option<u32> {
        self.positions.get(&entry).copied()
    }

    /// The field's signature, when it names a defined one.
    pub fn signature(&self) -> Option<HeapTypeId> {
        self.heap_type.defined()
    }

    /// Element type of the table, before the rebuild.
    pub fn elem_type(&self) -> Type {
        Type::nullable(self.heap_type)
    }

    /// Items of the element segment that fills the table.
    pub(crate) fn items(&self) -> &[Expr] {
        &self.items
    }

    /// Index of `entry`, appending it first if it is new. `None` when the entry names a
    /// function the module does not have.
    fn intern(&mut self, module: &Module, entry: TableEntry) -> Option<u32> {
        if let Some(&index) = self.positions.get(&entry) {
            return Some(index);
        }
        let item = match entry {
            TableEntry::Null => Expr::ref_null(self.heap_type),
            TableEntry::Func(func) => {
                let sig = module.functions.get(func.as_usize())?.sig;
                Expr::ref_func(func, sig)
            }
        };
        let index = self.entries.len() as u32;
        self.entries.push(entry);
        self.positions.insert(entry, index);
        self.items.push(item);
        Some(index)
    }
}

/// A constant stored into a vtable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantReferenceSite {
    pub owner: CodeOwner,
    /// Post-order position of the writing expression within its owner's code.
    pub position: usize,
    /// Operand position within the writing expression.
    pub operand: usize,
    /// Static type written to, before the rebuild.
    pub heap_type: HeapTypeId,
    pub field: u32,
    pub key: FieldKey,
    pub entry: TableEntry,
    pub index: u32,
}

/// Tables plus the flagged `(type, field)` slots that read and write them.
#[derive(Debug, Clone, Default)]
pub(crate) struct Synthesis {
    pub tables: Vec<DispatchTable>,
    pub sites: Vec<ConstantReferenceSite>,
    /// Flagged `(type, field)` pairs to their table in `tables`.
    pub slots: FxHashMap<(HeapTypeId, u32), usize>,
}

impl Synthesis {
    pub fn slot(&self, heap_type: HeapTypeId, field: u32) -> Option<&DispatchTable> {
        self.slots
            .get(&(heap_type, field))
            .map(|&table| &self.tables[table])
    }
}

struct PendingWrite {
    owner: CodeOwner,
    position: usize,
    operand: usize,
    heap_type: HeapTypeId,
    field: u32,
    table: usize,
    entry: TableEntry,
}

struct Scanner<'a> {
    module: &'a Module,
    resolver: &'a ConstantResolver,
    slots: &'a FxHashMap<(HeapTypeId, u32), usize>,
    owner: CodeOwner,
    position: usize,
    writes: Vec<PendingWrite>,
    defaulted: FxHashSet<usize>,
    error: Option<VtableError>,
}

fn defined(ty: &Type) -> Option<HeapTypeId> {
    ty.heap_type().and_then(HeapType::defined)
}

impl Scanner<'_> {
    fn fail(&mut self, error: VtableError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn non_constant(&self, heap_type: HeapTypeId, field: u32, operand: usize) -> VtableError {
        VtableError::NonConstantWrite {
            type_name: self.module.type_name(heap_type),
            field: field_label(self.module, heap_type, field),
            location: self.module.owner_name(self.owner),
            position: self.position,
            operand,
        }
    }

    fn write(&mut self, heap_type: HeapTypeId, field: u32, operand: usize, value: &Expr) {
        let Some(&table) = self.slots.get(&(heap_type, field)) else {
            return;
        };
        // A write whose value never arrives never happens.
        if value.ty.is_unreachable() {
            return;
        }
        match self.resolver.resolve(value) {
            Some(entry) => {
                tracing::trace!(
                    owner = %self.owner,
                    position = self.position,
                    field,
                    ?entry,
                    "constant vtable write"
                );
                self.writes.push(PendingWrite {
                    owner: self.owner,
                    position: self.position,
                    operand,
                    heap_type,
                    field,
                    table,
                    entry,
                });
            }
            None => {
                let error = self.non_constant(heap_type, field, operand);
                self.fail(error);
            }
        }
    }

    fn default_init(&mut self, heap_type: HeapTypeId, field: u32) {
        if let Some(&table) = self.slots.get(&(heap_type, field)) {
            self.defaulted.insert(table);
        }
    }

    fn check_read(&mut self, reference: &Expr, field: u32) {
        let Some(heap_type) = defined(&reference.ty) else {
            return;
        };
        if is_flagged(&self.module.types, heap_type, field)
            && !self.slots.contains_key(&(heap_type, field))
        {
            self.fail(VtableError::MissingDispatchTable {
                type_name: self.module.type_name(heap_type),
                field: field_label(self.module, heap_type, field),
            });
        }
    }

    fn visit(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::StructNew { operands } => {
                if let Some(id) = defined(&expr.ty) {
                    for (i, operand) in operands.iter().enumerate() {
                        self.write(id, i as u32, i, operand);
                    }
                }
            }
            ExprKind::StructNewDefault => {
                if let Some(id) = defined(&expr.ty) {
                    for i in 0..self.module.types.field_count(id) as u32 {
                        self.default_init(id, i);
                    }
                }
            }
            ExprKind::ArrayNew { init, .. } => {
                if let Some(id) = defined(&expr.ty) {
                    match init {
                        Some(init) => self.write(id, 0, 0, init),
                        None => self.default_init(id, 0),
                    }
                }
            }
            ExprKind::ArrayNewFixed { values } => {
                if let Some(id) = defined(&expr.ty) {
                    for (i, value) in values.iter().enumerate() {
                        self.write(id, 0, i, value);
                    }
                }
            }
            ExprKind::StructSet {
                index,
                reference,
                value,
            } => {
                if let Some(id) = defined(&reference.ty) {
                    self.write(id, *index, 1, value);
                }
            }
            ExprKind::ArraySet {
                reference, value, ..
            } => {
                if let Some(id) = defined(&reference.ty) {
                    self.write(id, 0, 2, value);
                }
            }
            ExprKind::ArrayCopy {
                dest_ref, src_ref, ..
            } => {
                let (Some(dest), Some(src)) = (defined(&dest_ref.ty), defined(&src_ref.ty)) else {
                    return;
                };
                let Some(dest_table) = self.slots.get(&(dest, 0)) else {
                    return;
                };
                // Indices only keep their meaning within one table.
                if self.slots.get(&(src, 0)) != Some(dest_table) {
                    let error = self.non_constant(dest, 0, 2);
                    self.fail(error);
                }
            }
            ExprKind::StructGet {
                index, reference, ..
            } => self.check_read(reference, *index),
            ExprKind::ArrayGet { reference, .. } => self.check_read(reference, 0),
            _ => {}
        }
    }
}

/// `<prefix>$<Type>$<field>`, suffixed with `$1`, `$2`, ... when a table of that name
/// already exists. Debug names need not be unique.
fn table_name(
    module: &Module,
    prefix: &str,
    key: FieldKey,
    taken: &mut FxHashSet<String>,
) -> String {
    let type_name = module.type_name(key.root);
    let base = format!(
        "{prefix}${}${}",
        type_name.trim_start_matches('$'),
        field_label(module, key.root, key.index)
    );
    let mut name = base.clone();
    let mut suffix = 0;
    while taken.contains(&name) {
        suffix += 1;
        name = format!("{base}${suffix}");
    }
    taken.insert(name.clone());
    name
}

/// Create one table per logical field and fill it from every constant write.
pub(crate) fn synthesize(
    module: &Module,
    collected: &CollectedTypes,
    resolver: &ConstantResolver,
    options: &PassOptions,
) -> Result<Synthesis, VtableError> {
    let arena = &module.types;
    let mut synthesis = Synthesis::default();
    let mut by_key: FxHashMap<FieldKey, usize> = FxHashMap::default();
    let table_base = module.tables.len();
    let mut taken: FxHashSet<String> = module.tables.iter().map(|t| t.name.clone()).collect();

    for &id in collected.types() {
        for index in 0..arena.field_count(id) as u32 {
            if !is_flagged(arena, id, index) {
                continue;
            }
            let key = field_key(arena, id, index);
            let table = match by_key.get(&key) {
                Some(&table) => table,
                None => {
                    let Some(Type::Ref {
                        heap_type,
                        nullability,
                    }) = arena.field(key.root, index).map(|f| &f.ty)
                    else {
                        return Err(VtableError::MissingDispatchTable {
                            type_name: module.type_name(id),
                            field: field_label(module, id, index),
                        });
                    };
                    let table = synthesis.tables.len();
                    synthesis.tables.push(DispatchTable::new(
                        table_name(module, &options.table_prefix, key, &mut taken),
                        key,
                        *heap_type,
                        nullability.is_nullable(),
                        TableId::new((table_base + table) as u32),
                    ));
                    by_key.insert(key, table);
                    table
                }
            };
            synthesis.slots.insert((id, index), table);
        }
    }

    let mut scanner = Scanner {
        module,
        resolver,
        slots: &synthesis.slots,
        owner: CodeOwner::Global(GlobalId::new(0)),
        position: 0,
        writes: Vec::new(),
        defaulted: FxHashSet::default(),
        error: None,
    };
    let mut last_owner = None;
    for (owner, code) in module.code() {
        if last_owner != Some(owner) {
            last_owner = Some(owner);
            scanner.owner = owner;
            scanner.position = 0;
        }
        code.walk(&mut |expr| {
            scanner.visit(expr);
            scanner.position += 1;
        });
        if let Some(error) = scanner.error.take() {
            return Err(error);
        }
    }
    let Scanner {
        writes, defaulted, ..
    } = scanner;

    for (i, table) in synthesis.tables.iter_mut().enumerate() {
        if defaulted.contains(&i) {
            table.intern(module, TableEntry::Null);
        }
    }
    for write in writes {
        let table = &mut synthesis.tables[write.table];
        let Some(index) = table.intern(module, write.entry) else {
            return Err(VtableError::UnsupportedShape {
                context: module.owner_name(write.owner),
                detail: format!(
                    "expression {} stores {:?}, which is not a function of this module",
                    write.position, write.entry
                ),
            });
        };
        synthesis.sites.push(ConstantReferenceSite {
            owner: write.owner,
            position: write.position,
            operand: write.operand,
            heap_type: write.heap_type,
            field: write.field,
            key: table.key,
            entry: write.entry,
            index,
        });
    }

    for table in &synthesis.tables {
        if table.is_empty() {
            tracing::warn!(table = %table.name, "vtable field is never written");
        } else {
            tracing::debug!(table = %table.name, entries = table.len(), "synthesized dispatch table");
        }
    }
    Ok(synthesis)
}

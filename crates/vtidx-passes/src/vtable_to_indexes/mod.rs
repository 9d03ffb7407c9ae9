// src/vtable_to_indexes/mod.rs
//
// Turns function-reference fields of structs and arrays into i32 indices into
// per-field dispatch tables.
//
// The pass runs in two phases. `plan` reads the module and does every check: it
// collects heap types, rejects bad specializations, fills a `TypeBuilder` with the new
// graph and synthesizes the tables. `VtablePlan::apply` commits: it builds the types,
// rewrites function bodies in parallel, then fixes up module-level code and appends the
// tables. Anything that can fail fails before the module is touched.

mod rebuild;
mod rewrite;
mod tables;
mod validate;

use rustc_hash::FxHashMap;
use vtidx_ir::{
    CollectedTypes, ElementSegment, Expr, HeapTypeId, Module, Table, TypeBuilder,
    collect_heap_types,
};

pub use rebuild::TypeMapping;
pub use tables::{ConstantReferenceSite, DispatchTable};
pub use validate::{FieldKey, TableEntry};

use rewrite::Rewriter;
use tables::Synthesis;
use validate::ConstantResolver;

use crate::config::PassOptions;
use crate::errors::{PassError, VtableError};
use crate::runner::{Pass, for_each_function};

/// Everything needed to commit the transformation, computed without touching the module.
#[derive(Debug)]
pub struct VtablePlan {
    collected: CollectedTypes,
    builder: TypeBuilder,
    mapping: TypeMapping,
    resolver: ConstantResolver,
    synthesis: Synthesis,
    table_base: usize,
}

/// Validate `module` and plan the transformation.
pub fn plan(module: &Module, options: &PassOptions) -> Result<VtablePlan, VtableError> {
    let collected = collect_heap_types(module);
    validate::check_specializations(module, &collected)?;
    let rebuilt = rebuild::rebuild_types(module, &collected)?;
    let resolver = ConstantResolver::new(module);
    let synthesis = tables::synthesize(module, &collected, &resolver, options)?;
    tracing::debug!(
        types = collected.len(),
        flagged_fields = rebuilt.flagged_fields,
        tables = synthesis.tables.len(),
        sites = synthesis.sites.len(),
        "planned vtable rewrite"
    );
    Ok(VtablePlan {
        collected,
        builder: rebuilt.builder,
        mapping: rebuilt.mapping,
        resolver,
        synthesis,
        table_base: module.tables.len(),
    })
}

impl VtablePlan {
    pub fn mapping(&self) -> &TypeMapping {
        &self.mapping
    }

    pub fn tables(&self) -> &[DispatchTable] {
        &self.synthesis.tables
    }

    pub fn sites(&self) -> &[ConstantReferenceSite] {
        &self.synthesis.sites
    }

    /// Heap types the plan covers, in rebuild order.
    pub fn types(&self) -> &[HeapTypeId] {
        self.collected.types()
    }

    /// Commit the plan. `module` must be the module it was made from.
    pub fn apply(self, module: &mut Module, options: &PassOptions) -> Result<VtableReport, VtableError> {
        let VtablePlan {
            builder,
            mapping,
            resolver,
            synthesis,
            table_base,
            ..
        } = self;

        if module.tables.len() != table_base {
            return Err(VtableError::UnsupportedShape {
                context: "module".to_string(),
                detail: format!(
                    "planned against {table_base} tables, found {}",
                    module.tables.len()
                ),
            });
        }
        builder.build(&mut module.types)?;

        let Module {
            functions,
            globals,
            tables,
            element_segments,
            type_names,
            ..
        } = module;
        let rewriter = Rewriter {
            mapping: &mapping,
            resolver: &resolver,
            synthesis: &synthesis,
        };

        for_each_function(functions, options.parallelism, |_, func| {
            rewriter.rewrite_function(func)
        });

        for global in globals.iter_mut() {
            global.ty = mapping.ty(&global.ty);
            rewriter.rewrite_expr(&mut global.init);
        }
        for table in tables.iter_mut() {
            table.elem_type = mapping.ty(&table.elem_type);
        }
        for segment in element_segments.iter_mut() {
            segment.elem_type = mapping.ty(&segment.elem_type);
            if let Some(offset) = &mut segment.offset {
                rewriter.rewrite_expr(offset);
            }
            for item in &mut segment.items {
                rewriter.rewrite_expr(item);
            }
        }

        for dispatch in &synthesis.tables {
            debug_assert_eq!(dispatch.table.as_usize(), tables.len());
            let elem_type = mapping.ty(&dispatch.elem_type());
            let size = dispatch.len() as u32;
            tables.push(Table {
                name: dispatch.name.clone(),
                elem_type: elem_type.clone(),
                initial: size,
                maximum: Some(size),
            });
            if dispatch.is_empty() {
                continue;
            }
            let items = dispatch
                .items()
                .iter()
                .map(|item| {
                    let mut item = item.clone();
                    rewriter.rewrite_expr(&mut item);
                    item
                })
                .collect();
            element_segments.push(ElementSegment {
                name: dispatch.name.clone(),
                table: Some(dispatch.table),
                offset: Some(Expr::i32_const(0)),
                elem_type,
                items,
            });
        }

        let carried: Vec<_> = mapping
            .iter()
            .filter_map(|(old, new)| type_names.get(&old).map(|names| (new, names.clone())))
            .collect();
        type_names.extend(carried);

        Ok(VtableReport {
            mapping,
            slots: synthesis.slots,
            tables: synthesis.tables,
            sites: synthesis.sites,
        })
    }
}

/// What a committed run did.
#[derive(Debug, Clone, Default)]
pub struct VtableReport {
    mapping: TypeMapping,
    slots: FxHashMap<(HeapTypeId, u32), usize>,
    tables: Vec<DispatchTable>,
    sites: Vec<ConstantReferenceSite>,
}

impl VtableReport {
    pub fn mapping(&self) -> &TypeMapping {
        &self.mapping
    }

    pub fn tables(&self) -> &[DispatchTable] {
        &self.tables
    }

    pub fn sites(&self) -> &[ConstantReferenceSite] {
        &self.sites
    }

    /// The table behind field `field` of the pre-transformation type `heap_type`.
    pub fn table_for(&self, heap_type: HeapTypeId, field: u32) -> Option<&DispatchTable> {
        self.slots
            .get(&(heap_type, field))
            .map(|&index| &self.tables[index])
    }

    pub fn table_by_name(&self, name: &str) -> Option<&DispatchTable> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// Plan and apply in one step. On error the module is unchanged.
#[tracing::instrument(skip_all, fields(functions = module.functions.len()))]
pub fn vtable_to_indexes(module: &mut Module, options: &PassOptions) -> Result<VtableReport, VtableError> {
    let report = plan(module, options)?.apply(module, options)?;
    tracing::info!(
        types = report.mapping.len(),
        tables = report.tables.len(),
        sites = report.sites.len(),
        "vtable fields now hold table indices"
    );
    Ok(report)
}

/// `vtable_to_indexes` as a runner pass. The last report is kept for inspection.
#[derive(Debug, Default)]
pub struct VtableToIndexes {
    report: Option<VtableReport>,
}

impl VtableToIndexes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> Option<&VtableReport> {
        self.report.as_ref()
    }

    pub fn into_report(self) -> Option<VtableReport> {
        self.report
    }
}

impl Pass for VtableToIndexes {
    fn name(&self) -> &'static str {
        "vtable-to-indexes"
    }

    fn run(&mut self, module: &mut Module, options: &PassOptions) -> Result<(), PassError> {
        self.report = Some(vtable_to_indexes(module, options)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use vtidx_ir::{ExprKind, Field, FunctionId, Signature, Type};

    use super::*;
    use crate::config::Parallelism;

    fn animal_module() -> (Module, HeapTypeId, HeapTypeId) {
        let mut module = Module::new();
        let speak = module.add_signature("speak", Signature::new([], [Type::I32]));
        let animal = module
            .types
            .push_struct(vec![Field::new(Type::non_null(speak))], None);
        module.set_type_name(animal, "Animal");
        module.set_field_name(animal, 0, "speak");
        let meow = module.add_function("meow", speak, vec![], Some(Expr::i32_const(1)));
        module.add_global(
            "cat",
            Type::non_null(animal),
            false,
            Expr::struct_new(animal, vec![Expr::ref_func(meow, speak)]),
        );
        (module, speak, animal)
    }

    fn sequential() -> PassOptions {
        PassOptions::default().with_parallelism(Parallelism::Sequential)
    }

    #[test]
    fn apply_appends_table_and_segment() {
        let (mut module, speak, animal) = animal_module();
        let report = vtable_to_indexes(&mut module, &sequential()).unwrap();

        assert_eq!(module.tables.len(), 1);
        let table = &module.tables[0];
        assert_eq!(table.name, "vtable$Animal$speak");
        assert_eq!(table.initial, 1);
        assert_eq!(table.elem_type, Type::nullable(report.mapping().id(speak)));

        assert_eq!(module.element_segments.len(), 1);
        let segment = &module.element_segments[0];
        assert_eq!(segment.offset, Some(Expr::i32_const(0)));
        assert!(matches!(segment.items[0].kind, ExprKind::RefFunc { .. }));

        let new_animal = report.mapping().id(animal);
        assert_eq!(module.type_name(new_animal), "Animal");
        assert_eq!(module.globals[0].ty, Type::non_null(new_animal));
        assert!(report.table_for(animal, 0).is_some());
        assert!(report.table_for(new_animal, 0).is_none());
    }

    #[test]
    fn stale_plan_is_refused_without_changes() {
        let (mut module, _, _) = animal_module();
        let planned = plan(&module, &sequential()).unwrap();
        module.add_table(Table {
            name: "late".into(),
            elem_type: Type::nullable(vtidx_ir::HeapType::FUNC),
            initial: 0,
            maximum: None,
        });
        let before = module.clone();
        let err = planned.apply(&mut module, &sequential()).unwrap_err();
        assert!(matches!(err, VtableError::UnsupportedShape { .. }));
        assert_eq!(module, before);
    }

    #[test]
    fn unknown_function_is_refused_before_commit() {
        let (mut module, speak, animal) = animal_module();
        module.add_global(
            "ghost",
            Type::non_null(animal),
            false,
            Expr::struct_new(animal, vec![Expr::ref_func(FunctionId::new(99), speak)]),
        );
        assert!(plan(&module, &sequential()).is_err());

        let before = module.clone();
        let err = vtable_to_indexes(&mut module, &sequential()).unwrap_err();
        match err {
            VtableError::UnsupportedShape { context, detail } => {
                assert_eq!(context, "global ghost");
                assert!(detail.starts_with("expression 1 stores"), "{detail}");
            }
            other => panic!("expected unsupported shape, got {other:?}"),
        }
        assert_eq!(module, before);
    }

    #[test]
    fn plan_exposes_tables_before_commit() {
        let (module, _, animal) = animal_module();
        let planned = plan(&module, &sequential()).unwrap();
        assert_eq!(planned.tables().len(), 1);
        assert_eq!(planned.sites().len(), 1);
        assert!(planned.types().contains(&animal));
        assert!(planned.mapping().get(animal).is_some());
    }

    #[test]
    fn pass_keeps_its_report() {
        let (mut module, _, _) = animal_module();
        let mut pass = VtableToIndexes::new();
        assert_eq!(pass.name(), "vtable-to-indexes");
        pass.run(&mut module, &sequential()).unwrap();
        let report = pass.into_report().unwrap();
        assert!(report.table_by_name("vtable$Animal$speak").is_some());
    }
}

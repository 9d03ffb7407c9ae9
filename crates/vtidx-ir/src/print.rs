// src/print.rs
//
// S-expression text form of a module, for the CLI and for tests.
//
// The output resembles the WebAssembly text format but is not meant to be parsed back.

use std::fmt::Write;

use vtidx_identity::HeapTypeId;

use crate::expr::{Expr, ExprKind, Literal};
use crate::module::Module;
use crate::types::{Field, HeapType, HeapTypeKind, PackedType, Rtt, Type};

const INDENT: &str = "  ";

pub fn print_module(module: &Module) -> String {
    let mut printer = Printer {
        module,
        out: String::new(),
        depth: 1,
    };
    printer.module();
    printer.out
}

/// Print a single expression using the module's names.
pub fn print_expr(module: &Module, expr: &Expr) -> String {
    let mut printer = Printer {
        module,
        out: String::new(),
        depth: 0,
    };
    printer.expr(expr);
    printer.out
}

/// Print a value type using the module's type names.
pub fn print_type(module: &Module, ty: &Type) -> String {
    let printer = Printer {
        module,
        out: String::new(),
        depth: 0,
    };
    printer.type_name(ty)
}

struct Printer<'m> {
    module: &'m Module,
    out: String,
    depth: usize,
}

impl<'m> Printer<'m> {
    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn heap_type_name(&self, heap_type: HeapType) -> String {
        match heap_type {
            HeapType::Basic(basic) => basic.name().to_owned(),
            HeapType::Defined(id) => self.id_name(id),
        }
    }

    fn id_name(&self, id: HeapTypeId) -> String {
        let name = self.module.type_name(id);
        if name.starts_with('$') { name } else { format!("${name}") }
    }

    fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Ref {
                heap_type,
                nullability,
            } => format!("(ref {nullability}{})", self.heap_type_name(*heap_type)),
            Type::Rtt(Rtt { depth, heap_type }) => match depth {
                Some(depth) => format!("(rtt {depth} {})", self.heap_type_name(*heap_type)),
                None => format!("(rtt {})", self.heap_type_name(*heap_type)),
            },
            Type::Tuple(types) => {
                let parts: Vec<_> = types.iter().map(|t| self.type_name(t)).collect();
                format!("(tuple {})", parts.join(" "))
            }
            basic => basic.to_string(),
        }
    }

    fn field(&self, owner: HeapTypeId, index: u32, field: &Field) -> String {
        let ty = match field.packed {
            Some(PackedType::I8) => "i8".to_owned(),
            Some(PackedType::I16) => "i16".to_owned(),
            None => self.type_name(&field.ty),
        };
        let ty = if field.mutable { format!("(mut {ty})") } else { ty };
        match self
            .module
            .type_names
            .get(&owner)
            .and_then(|names| names.field_names.get(&index))
        {
            Some(name) => format!("(field ${name} {ty})"),
            None => format!("(field {ty})"),
        }
    }

    fn module(&mut self) {
        let module = self.module;
        self.out.push_str("(module");
        let reachable = crate::collect::collect_heap_types(module);
        let mut ids: Vec<HeapTypeId> = reachable.types().to_vec();
        ids.sort();
        for id in ids {
            let Some(def) = module.types.try_get(id) else {
                continue;
            };
            let body = match &def.kind {
                HeapTypeKind::Signature(sig) => {
                    let mut text = String::from("(func");
                    if !sig.params.is_empty() {
                        let params: Vec<_> = sig.params.iter().map(|t| self.type_name(t)).collect();
                        let _ = write!(text, " (param {})", params.join(" "));
                    }
                    if !sig.results.is_empty() {
                        let results: Vec<_> =
                            sig.results.iter().map(|t| self.type_name(t)).collect();
                        let _ = write!(text, " (result {})", results.join(" "));
                    }
                    text.push(')');
                    text
                }
                HeapTypeKind::Struct(s) => {
                    let fields: Vec<_> = s
                        .fields
                        .iter()
                        .enumerate()
                        .map(|(i, f)| self.field(id, i as u32, f))
                        .collect();
                    if fields.is_empty() {
                        "(struct)".to_owned()
                    } else {
                        format!("(struct {})", fields.join(" "))
                    }
                }
                HeapTypeKind::Array(a) => format!("(array {})", self.field(id, 0, &a.element)),
            };
            let sub = def
                .supertype
                .map(|sup| format!(" (sub {})", self.id_name(sup)))
                .unwrap_or_default();
            self.newline();
            let _ = write!(self.out, "(type {} {body}{sub})", self.id_name(id));
        }

        for table in &module.tables {
            self.newline();
            let max = table.maximum.map(|m| format!(" {m}")).unwrap_or_default();
            let _ = write!(
                self.out,
                "(table ${} {}{max} {})",
                table.name,
                table.initial,
                self.type_name(&table.elem_type)
            );
        }

        for segment in &module.element_segments {
            self.newline();
            let _ = write!(
                self.out,
                "(elem ${} {}",
                segment.name,
                self.type_name(&segment.elem_type)
            );
            if let Some(table) = segment.table {
                let _ = write!(self.out, " (table ${})", self.module.table(table).name);
            }
            self.depth += 1;
            if let Some(offset) = &segment.offset {
                self.newline();
                self.out.push_str("(offset ");
                self.expr(offset);
                self.out.push(')');
            }
            for item in &segment.items {
                self.newline();
                self.expr(item);
            }
            self.depth -= 1;
            self.out.push(')');
        }

        for global in &module.globals {
            self.newline();
            let ty = self.type_name(&global.ty);
            let ty = if global.mutable { format!("(mut {ty})") } else { ty };
            let _ = write!(self.out, "(global ${} {ty}", global.name);
            self.depth += 1;
            self.newline();
            self.expr(&global.init);
            self.depth -= 1;
            self.out.push(')');
        }

        for func in &module.functions {
            self.newline();
            let _ = write!(
                self.out,
                "(func ${} (type {})",
                func.name,
                self.id_name(func.sig)
            );
            if !func.locals.is_empty() {
                let locals: Vec<_> = func.locals.iter().map(|t| self.type_name(t)).collect();
                let _ = write!(self.out, " (local {})", locals.join(" "));
            }
            match &func.body {
                Some(body) => {
                    self.depth += 1;
                    self.newline();
                    self.expr(body);
                    self.depth -= 1;
                }
                None => self.out.push_str(" (import)"),
            }
            self.out.push(')');
        }
        self.out.push_str("\n)\n");
    }

    /// Print `(head children...)`, with children on their own lines when present.
    fn node(&mut self, head: String, children: Vec<&Expr>) {
        self.out.push('(');
        self.out.push_str(&head);
        self.depth += 1;
        for child in children {
            self.newline();
            self.expr(child);
        }
        self.depth -= 1;
        self.out.push(')');
    }

    fn expr(&mut self, expr: &Expr) {
        let mut children = Vec::new();
        expr.kind.for_each_child(|child| children.push(child));
        let head = match &expr.kind {
            ExprKind::Nop => "nop".to_owned(),
            ExprKind::Unreachable => "unreachable".to_owned(),
            ExprKind::Block { label, .. } => match label {
                Some(label) => format!("block ${label} {}", self.type_name(&expr.ty)),
                None => format!("block {}", self.type_name(&expr.ty)),
            },
            ExprKind::If { .. } => format!("if {}", self.type_name(&expr.ty)),
            ExprKind::Loop { label, .. } => format!("loop ${label}"),
            ExprKind::Break { label, condition, .. } => {
                let op = if condition.is_some() { "br_if" } else { "br" };
                format!("{op} ${label}")
            }
            ExprKind::Return { .. } => "return".to_owned(),
            ExprKind::Drop { .. } => "drop".to_owned(),
            ExprKind::Select { annotation, .. } => match annotation {
                Some(ty) => format!("select (result {})", self.type_name(ty)),
                None => "select".to_owned(),
            },
            ExprKind::Const(literal) => match literal {
                Literal::I32(v) => format!("i32.const {v}"),
                Literal::I64(v) => format!("i64.const {v}"),
                Literal::F32(v) => format!("f32.const {v}"),
                Literal::F64(v) => format!("f64.const {v}"),
            },
            ExprKind::Binary { op, .. } => op.name().to_owned(),
            ExprKind::LocalGet { index } => format!("local.get {index}"),
            ExprKind::LocalSet { index, tee, .. } => {
                let op = if *tee { "local.tee" } else { "local.set" };
                format!("{op} {index}")
            }
            ExprKind::GlobalGet { global } => {
                format!("global.get ${}", self.module.global(*global).name)
            }
            ExprKind::GlobalSet { global, .. } => {
                format!("global.set ${}", self.module.global(*global).name)
            }
            ExprKind::Call { target, .. } => {
                format!("call ${}", self.module.function(*target).name)
            }
            ExprKind::CallIndirect {
                table, signature, ..
            } => format!(
                "call_indirect ${} (type {})",
                self.module.table(*table).name,
                self.id_name(*signature)
            ),
            ExprKind::CallRef { .. } => "call_ref".to_owned(),
            ExprKind::RefNull { heap_type } => format!("ref.null {}", self.heap_type_name(*heap_type)),
            ExprKind::RefFunc { func } => format!("ref.func ${}", self.module.function(*func).name),
            ExprKind::RefIsNull { .. } => "ref.is_null".to_owned(),
            ExprKind::RefAsNonNull { .. } => "ref.as_non_null".to_owned(),
            ExprKind::RefEq { .. } => "ref.eq".to_owned(),
            ExprKind::RefTest { target, .. } => format!("ref.test {}", self.heap_type_name(*target)),
            ExprKind::RefCast { target, .. } => format!("ref.cast {}", self.heap_type_name(*target)),
            ExprKind::RttCanon => format!("rtt.canon {}", self.type_name(&expr.ty)),
            ExprKind::RttSub { .. } => format!("rtt.sub {}", self.type_name(&expr.ty)),
            ExprKind::StructNew { .. } => format!("struct.new {}", self.type_name(&expr.ty)),
            ExprKind::StructNewDefault => format!("struct.new_default {}", self.type_name(&expr.ty)),
            ExprKind::StructGet { index, signed, .. } => {
                let op = if *signed { "struct.get_s" } else { "struct.get" };
                format!("{op} {index} {}", self.type_name(&expr.ty))
            }
            ExprKind::StructSet { index, .. } => format!("struct.set {index}"),
            ExprKind::ArrayNew { init, .. } => {
                let op = if init.is_some() { "array.new" } else { "array.new_default" };
                format!("{op} {}", self.type_name(&expr.ty))
            }
            ExprKind::ArrayNewFixed { values } => {
                format!("array.new_fixed {} {}", self.type_name(&expr.ty), values.len())
            }
            ExprKind::ArrayGet { signed, .. } => {
                let op = if *signed { "array.get_s" } else { "array.get" };
                format!("{op} {}", self.type_name(&expr.ty))
            }
            ExprKind::ArraySet { .. } => "array.set".to_owned(),
            ExprKind::ArrayLen { .. } => "array.len".to_owned(),
            ExprKind::ArrayCopy { .. } => "array.copy".to_owned(),
            ExprKind::TableGet { table, .. } => {
                format!("table.get ${}", self.module.table(*table).name)
            }
            ExprKind::TableSet { table, .. } => {
                format!("table.set ${}", self.module.table(*table).name)
            }
            ExprKind::TableSize { table } => {
                format!("table.size ${}", self.module.table(*table).name)
            }
            ExprKind::TupleMake { .. } => "tuple.make".to_owned(),
            ExprKind::TupleExtract { index, .. } => format!("tuple.extract {index}"),
        };
        self.node(head, children);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Signature;

    #[test]
    fn prints_named_types_and_functions() {
        let mut module = Module::new();
        let sig = module.add_signature("speak", Signature::new([], [Type::I32]));
        let animal = module.types.push_struct(vec![Field::new(Type::non_null(sig))], None);
        module.set_type_name(animal, "Animal");
        module.set_field_name(animal, 0, "speak");
        let meow = module.add_function("meow", sig, vec![], Some(Expr::i32_const(1)));
        module.add_global(
            "cat",
            Type::non_null(animal),
            false,
            Expr::struct_new(animal, vec![Expr::ref_func(meow, sig)]),
        );

        let text = print_module(&module);
        assert!(text.contains("(type $Animal (struct (field $speak (ref $speak))))"));
        assert!(text.contains("(func $meow (type $speak)"));
        assert!(text.contains("(struct.new (ref $Animal)"));
        assert!(text.contains("(ref.func $meow)"));
    }

    #[test]
    fn prints_subtypes_and_imports() {
        let mut module = Module::new();
        let sig = module.add_signature("void", Signature::default());
        let base = module.types.push_struct(vec![], None);
        let derived = module.types.push_struct(vec![], Some(base));
        module.set_type_name(base, "Base");
        module.set_type_name(derived, "Derived");
        module.add_function("ext", sig, vec![Type::nullable(derived)], None);

        let text = print_module(&module);
        assert!(text.contains("(type $Derived (struct) (sub $Base))"));
        assert!(text.contains("(func $ext (type $void) (local (ref null $Derived)) (import))"));
    }

    #[test]
    fn prints_single_expression() {
        let module = Module::new();
        let text = print_expr(&module, &Expr::drop(Expr::i32_const(7)));
        assert_eq!(text, "(drop\n  (i32.const 7))");
    }

    #[test]
    fn prints_types_by_name() {
        let mut module = Module::new();
        let sig = module.add_signature("speak", Signature::default());
        assert_eq!(print_type(&module, &Type::nullable(sig)), "(ref null $speak)");
        assert_eq!(print_type(&module, &Type::F64), "f64");
    }
}

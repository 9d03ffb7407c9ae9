// src/commands/demo.rs
//! `vtidx demo`: run the vtable rewrite on a small sample and show what changed.

use std::io::{IsTerminal, Write};
use std::process::ExitCode;

use vtidx_ir::{
    BinaryOp, Expr, Field, HeapTypeId, Interpreter, Module, Signature, Trap, Type, Value,
    print_module,
};
use vtidx_passes::{
    ConfigError, Parallelism, PassError, PassOptions, TableEntry, VtableReport, vtable_to_indexes,
};

use crate::cli::ColorMode;
use crate::errors::{CliError, render_to_stderr};

/// Flags given to `vtidx demo`.
#[derive(Debug, Clone, Default)]
pub struct DemoOptions {
    pub threads: Option<Parallelism>,
    pub table_prefix: Option<String>,
    pub run: bool,
}

impl DemoOptions {
    /// Apply command line overrides on top of `base`.
    pub fn resolve(&self, base: PassOptions) -> Result<PassOptions, ConfigError> {
        let mut options = base;
        if let Some(threads) = self.threads {
            options = options.with_parallelism(threads);
        }
        if let Some(prefix) = &self.table_prefix {
            options = options.with_table_prefix(prefix.clone())?;
        }
        Ok(options)
    }
}

/// Results of the sample's `main` before and after the rewrite, when it was run.
#[derive(Debug, Default)]
pub struct DemoSummary {
    pub tables: usize,
    pub before: Option<Vec<Value>>,
    pub after: Option<Vec<Value>>,
}

impl DemoSummary {
    pub fn agrees(&self) -> bool {
        self.before == self.after
    }
}

/// The sample: `Animal { speak, legs }` with subtype `Dog`, one instance of each in
/// globals, and a `main` that dispatches through both.
pub fn sample_module() -> Module {
    let mut module = Module::new();
    let speak = HeapTypeId::new(module.types.len() as u32);
    let animal = HeapTypeId::new(speak.index() + 1);
    module.add_signature("speak", Signature::new([Type::nullable(animal)], [Type::I32]));
    module.types.push_struct(
        vec![Field::new(Type::non_null(speak)), Field::new(Type::I32)],
        None,
    );
    let dog = module.types.push_struct(
        vec![Field::new(Type::non_null(speak)), Field::new(Type::I32)],
        Some(animal),
    );
    module.set_type_name(animal, "Animal");
    module.set_type_name(dog, "Dog");
    module.set_field_name(animal, 0, "speak");
    module.set_field_name(animal, 1, "legs");

    let this = || Expr::local_get(0, Type::nullable(animal));
    let meow = module.add_function("meow", speak, vec![], Some(Expr::i32_const(1)));
    let legs = Expr::struct_get(&module.types, this(), 1);
    let bark = module.add_function(
        "bark",
        speak,
        vec![],
        Some(Expr::binary(BinaryOp::AddI32, Expr::i32_const(2), legs)),
    );

    let cat = module.add_global(
        "cat",
        Type::non_null(animal),
        false,
        Expr::struct_new(animal, vec![Expr::ref_func(meow, speak), Expr::i32_const(4)]),
    );
    let rex = module.add_global(
        "rex",
        Type::non_null(dog),
        false,
        Expr::struct_new(dog, vec![Expr::ref_func(bark, speak), Expr::i32_const(4)]),
    );

    let speak_of_sig = module.add_signature(
        "speak_of",
        Signature::new([Type::nullable(animal)], [Type::I32]),
    );
    let target = Expr::struct_get(&module.types, this(), 0);
    let body = Expr::call_ref(&module.types, target, vec![this()]);
    let speak_of = module.add_function("speak_of", speak_of_sig, vec![], Some(body));

    let main_sig = module.add_signature("main", Signature::new([], [Type::I32]));
    let call = |module: &Module, global, ty| {
        let arg = Expr::global_get(global, ty);
        Expr::call(&module.types, speak_of, speak_of_sig, vec![arg])
    };
    let body = Expr::binary(
        BinaryOp::AddI32,
        Expr::binary(
            BinaryOp::MulI32,
            call(&module, cat, Type::non_null(animal)),
            Expr::i32_const(100),
        ),
        call(&module, rex, Type::non_null(dog)),
    );
    module.add_function("main", main_sig, vec![], Some(body));
    module
}

fn evaluate(module: &Module) -> Result<Vec<Value>, Trap> {
    let main = module
        .function_by_name("main")
        .ok_or(Trap::Malformed("sample has no main"))?;
    Interpreter::new(module)?.call(main, Vec::new())
}

fn write_tables(out: &mut impl Write, module: &Module, report: &VtableReport) -> std::io::Result<()> {
    writeln!(out, ";; dispatch tables")?;
    for table in report.tables() {
        let entries: Vec<String> = table
            .entries()
            .iter()
            .enumerate()
            .map(|(i, entry)| match entry {
                TableEntry::Null => format!("{i} => null"),
                TableEntry::Func(func) => format!("{i} => {}", module.function(*func).name),
            })
            .collect();
        writeln!(out, ";;   ${} [{}]", table.name, entries.join(", "))?;
    }
    Ok(())
}

/// Print the sample, rewrite it, print the result and compare evaluations.
#[tracing::instrument(skip_all, fields(run = run))]
pub fn write_demo(
    out: &mut impl Write,
    options: &PassOptions,
    run: bool,
) -> Result<DemoSummary, CliError> {
    let mut module = sample_module();
    writeln!(out, ";; before")?;
    writeln!(out, "{}", print_module(&module))?;

    let before = if run { Some(evaluate(&module)?) } else { None };
    let report = vtable_to_indexes(&mut module, options).map_err(PassError::from)?;

    writeln!(out, ";; after")?;
    writeln!(out, "{}", print_module(&module))?;
    write_tables(out, &module, &report)?;

    let after = if run { Some(evaluate(&module)?) } else { None };
    if let (Some(before), Some(after)) = (&before, &after) {
        writeln!(out, ";; main: {before:?} before, {after:?} after")?;
    }
    Ok(DemoSummary {
        tables: report.tables().len(),
        before,
        after,
    })
}

pub fn run_demo(options: &DemoOptions, color: ColorMode) -> ExitCode {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = PassOptions::from_env()
        .and_then(|base| options.resolve(base))
        .map_err(CliError::from)
        .and_then(|pass_options| write_demo(&mut out, &pass_options, options.run));

    match result {
        Ok(summary) if summary.agrees() => ExitCode::SUCCESS,
        Ok(summary) => {
            tracing::error!(?summary, "results differ after the rewrite");
            eprintln!("error: results differ after the rewrite");
            ExitCode::FAILURE
        }
        Err(err) => {
            render_to_stderr(&err, color.enabled(std::io::stderr().is_terminal()));
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_results_agree() {
        let options = PassOptions::default().with_parallelism(Parallelism::Sequential);
        let mut out = Vec::new();
        let summary = write_demo(&mut out, &options, true).unwrap();

        assert!(summary.agrees());
        assert_eq!(summary.before, Some(vec![Value::I32(106)]));
        assert_eq!(summary.tables, 1);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(";;   $vtable$Animal$speak [0 => meow, 1 => bark]"));
        assert!(text.contains("call_indirect $vtable$Animal$speak"));
    }

    #[test]
    fn no_run_skips_evaluation() {
        let mut out = Vec::new();
        let summary = write_demo(&mut out, &PassOptions::default(), false).unwrap();
        assert!(summary.before.is_none());
        assert!(summary.agrees());
    }

    #[test]
    fn flags_override_base_options() {
        let flags = DemoOptions {
            threads: Some(Parallelism::Sequential),
            table_prefix: Some("slots".into()),
            run: true,
        };
        let options = flags.resolve(PassOptions::default()).unwrap();
        assert_eq!(options.parallelism, Parallelism::Sequential);
        assert_eq!(options.table_prefix, "slots");

        let bad = DemoOptions {
            table_prefix: Some(String::new()),
            ..DemoOptions::default()
        };
        assert!(bad.resolve(PassOptions::default()).is_err());
    }
}

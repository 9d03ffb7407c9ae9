// src/runner.rs
//
// Pass scheduling: run passes in order, and fan function bodies out over threads.

use vtidx_ir::{Function, FunctionId, Module};

use crate::config::{Parallelism, PassOptions};
use crate::errors::PassError;

/// A module-to-module transformation.
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Transform `module` in place. On error the module must be left unchanged.
    fn run(&mut self, module: &mut Module, options: &PassOptions) -> Result<(), PassError>;
}

/// Runs a sequence of passes over a module, stopping at the first failure.
pub struct PassRunner {
    options: PassOptions,
    passes: Vec<Box<dyn Pass>>,
}

impl PassRunner {
    pub fn new(options: PassOptions) -> Self {
        Self {
            options,
            passes: Vec::new(),
        }
    }

    pub fn add(&mut self, pass: impl Pass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn options(&self) -> &PassOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn run(&mut self, module: &mut Module) -> Result<(), PassError> {
        for pass in &mut self.passes {
            let span = tracing::info_span!("pass", name = pass.name());
            let _enter = span.enter();
            pass.run(module, &self.options)?;
            tracing::debug!(functions = module.functions.len(), "pass complete");
        }
        Ok(())
    }
}

/// Call `f` on every function, in parallel according to `parallelism`, and join before
/// returning. Each call gets exclusive access to one function and nothing else.
pub fn for_each_function<F>(functions: &mut [Function], parallelism: Parallelism, f: F)
where
    F: Fn(FunctionId, &mut Function) + Sync,
{
    let threads = parallelism.thread_count().min(functions.len());
    if threads <= 1 {
        for (i, func) in functions.iter_mut().enumerate() {
            f(FunctionId::new(i as u32), func);
        }
        return;
    }

    let chunk_size = functions.len().div_ceil(threads);
    tracing::trace!(threads, chunk_size, "parallel function walk");
    let f = &f;
    std::thread::scope(|scope| {
        for (chunk_index, chunk) in functions.chunks_mut(chunk_size).enumerate() {
            scope.spawn(move || {
                let base = chunk_index * chunk_size;
                for (offset, func) in chunk.iter_mut().enumerate() {
                    f(FunctionId::new((base + offset) as u32), func);
                }
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::Mutex;

    use vtidx_ir::{Expr, Signature, Type};

    use super::*;
    use crate::errors::VtableError;

    fn module_with(count: usize) -> Module {
        let mut module = Module::new();
        let sig = module.add_signature("f", Signature::new([], [Type::I32]));
        for i in 0..count {
            module.add_function(&format!("f{i}"), sig, vec![], Some(Expr::i32_const(0)));
        }
        module
    }

    #[test]
    fn every_function_is_visited_once_with_its_id() {
        for parallelism in [
            Parallelism::Sequential,
            Parallelism::Auto,
            Parallelism::Threads(NonZeroUsize::new(3).unwrap()),
        ] {
            let mut module = module_with(10);
            let seen = Mutex::new(Vec::new());
            for_each_function(&mut module.functions, parallelism, |id, func| {
                func.body = Some(Expr::i32_const(id.index() as i32));
                seen.lock().unwrap().push(id.index());
            });
            let mut seen = seen.into_inner().unwrap();
            seen.sort();
            assert_eq!(seen, (0..10).collect::<Vec<_>>());
            for (i, func) in module.functions.iter().enumerate() {
                assert_eq!(func.body, Some(Expr::i32_const(i as i32)));
            }
        }
    }

    #[test]
    fn empty_function_list_is_fine() {
        let mut functions: Vec<Function> = Vec::new();
        for_each_function(&mut functions, Parallelism::Auto, |_, _| unreachable!());
    }

    struct Rename;

    impl Pass for Rename {
        fn name(&self) -> &'static str {
            "rename"
        }

        fn run(&mut self, module: &mut Module, _: &PassOptions) -> Result<(), PassError> {
            for func in &mut module.functions {
                func.name.push_str("_renamed");
            }
            Ok(())
        }
    }

    struct Fail;

    impl Pass for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn run(&mut self, _: &mut Module, _: &PassOptions) -> Result<(), PassError> {
            Err(VtableError::UnsupportedShape {
                context: "test".into(),
                detail: "always fails".into(),
            }
            .into())
        }
    }

    #[test]
    fn runner_stops_at_first_failure() {
        let mut module = module_with(1);
        let mut runner = PassRunner::new(PassOptions::default());
        runner.add(Rename).add(Fail).add(Rename);
        assert_eq!(runner.len(), 3);
        assert!(runner.run(&mut module).is_err());
        assert_eq!(module.functions[0].name, "f0_renamed");
    }
}

// src/lib.rs
//
// Module passes for vtidx.

pub mod config;
pub mod errors;
pub mod runner;
pub mod vtable_to_indexes;

pub use config::{ConfigError, Parallelism, PassOptions};
pub use errors::{PassError, VtableError};
pub use runner::{Pass, PassRunner, for_each_function};
pub use vtable_to_indexes::{
    ConstantReferenceSite, DispatchTable, FieldKey, TableEntry, TypeMapping, VtablePlan,
    VtableReport, VtableToIndexes, plan, vtable_to_indexes,
};

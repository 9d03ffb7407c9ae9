// src/errors.rs
//! Pass errors (E4xxx).
//!
//! Every error here is raised while a pass is planning, before the module is touched.
//! A module handed back with an error is exactly the module that was passed in.

#![allow(unused_assignments)] // False positives from thiserror derive

use miette::Diagnostic;
use thiserror::Error;
use vtidx_ir::TypeBuildError;

use crate::config::ConfigError;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum VtableError {
    #[error("unsupported shape in {context}: {detail}")]
    #[diagnostic(code(E4001))]
    UnsupportedShape { context: String, detail: String },

    #[error(
        "field {field} of {type_name} is written with a non-constant function reference in {location} (expression {position}, operand {operand})"
    )]
    #[diagnostic(
        code(E4002),
        help("vtable fields may only hold ref.func, ref.null, or an immutable global bound to one")
    )]
    NonConstantWrite {
        type_name: String,
        field: String,
        location: String,
        /// Post-order position of the writing expression within `location`.
        position: usize,
        operand: usize,
    },

    #[error("{subtype} redeclares field {field} of {supertype} as {found}, expected {expected}")]
    #[diagnostic(
        code(E4003),
        help("a subtype may reuse an inherited vtable field unchanged or append new fields")
    )]
    InvalidSpecialization {
        subtype: String,
        supertype: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("field {field} of {type_name} is read as a vtable slot but has no dispatch table")]
    #[diagnostic(code(E4004), help("this is an internal error in the vtable planner"))]
    MissingDispatchTable { type_name: String, field: String },

    #[error("rebuilt type graph is invalid: {0}")]
    #[diagnostic(code(E4005))]
    TypeBuild(#[from] TypeBuildError),
}

/// Any error a pass can return.
#[derive(Error, Debug, Diagnostic)]
pub enum PassError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Vtable(#[from] VtableError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = VtableError::NonConstantWrite {
            type_name: "Animal".into(),
            field: "speak".into(),
            location: "function main".into(),
            position: 2,
            operand: 0,
        };
        assert_eq!(err.code().map(|c| c.to_string()), Some("E4002".to_string()));
        assert_eq!(
            err.to_string(),
            "field speak of Animal is written with a non-constant function reference in function main (expression 2, operand 0)"
        );
    }

    #[test]
    fn pass_error_is_transparent() {
        let err: PassError = VtableError::MissingDispatchTable {
            type_name: "Dog".into(),
            field: "0".into(),
        }
        .into();
        assert_eq!(err.code().map(|c| c.to_string()), Some("E4004".to_string()));
        assert!(err.to_string().starts_with("field 0 of Dog"));
    }

    #[test]
    fn type_build_errors_convert() {
        let err: VtableError = TypeBuildError::UnfilledSlot { slot: 3 }.into();
        assert!(matches!(err, VtableError::TypeBuild(_)));
        assert_eq!(err.code().map(|c| c.to_string()), Some("E4005".to_string()));
    }
}

// src/commands/mod.rs
pub mod demo;
pub mod version;

//! Sable Bytecode Definitions
//!
//! This crate provides the stack-based bytecode instruction set and the
//! type/method metadata model shared between the front end and the
//! ahead-of-time compiler backend.

#![warn(rust_2018_idioms)]

pub mod opcode;
pub mod types;

pub use opcode::{BcFamily, BcOpcode};
pub use types::{
    FieldDesc, FieldId, MethodDesc, MethodId, RegistryError, TypeDesc, TypeId, TypeKind,
    TypeRegistry,
};

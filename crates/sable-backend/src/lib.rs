//! Sable AOT compiler middle tier
//!
//! This crate is the target-independent middle end of the Sable
//! ahead-of-time compiler. It owns:
//! - the operand model and instruction graph (`ir`), an arena-allocated
//!   def/use graph mutated in place through a context cursor
//! - the bytecode-to-IR lowering pass (`lower`), which encodes layout
//!   and dispatch decisions as graph rewrites
//! - the work-list optimization engine (`opt`), an ordered battery of
//!   local rules driven to a fixed point
//! - the live-range handoff to the register allocator (`regalloc`)
//! - the per-routine stage driver and parallel batch entry (`pipeline`)
//!
//! Type layout and linking stay external: lowering consults the
//! `TypeLayout` trait for sizes, offsets, and dispatch slots, and emits
//! string literals and helper references through a `SymbolSink`.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod ir;
pub mod layout;
pub mod lower;
pub mod metrics;
pub mod opt;
pub mod pipeline;
pub mod regalloc;
pub mod symbols;

pub use error::CompileError;
pub use ir::{
    BasicBlock, BlockId, ConditionCode, Context, InstructionNode, IrFunction, IrOp, IrType,
    NodeId, OpSize, Opcode, OperandId, OperandTable,
};
pub use layout::TypeLayout;
pub use metrics::OptStats;
pub use pipeline::{compile_batch, BatchResult, CompiledRoutine, CompilerOptions, MethodCompiler};
pub use regalloc::{LiveInterval, LiveRange, SlotIndex};
pub use symbols::{MemorySymbolSink, RuntimeHelper, SymbolSink};

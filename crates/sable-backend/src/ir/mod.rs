//! Operand model and instruction graph for the Sable middle tier

pub mod block;
pub mod context;
pub mod display;
pub mod instr;
pub mod operand;
pub mod types;

pub use block::{BasicBlock, BlockId, IrFunction};
pub use context::Context;
pub use instr::{ConditionCode, InstructionNode, IrOp, NodeId, Opcode, Sentinel};
pub use operand::{ConstValue, OperandData, OperandId, OperandKind, OperandTable, SymbolKind};
pub use types::{IrType, OpSize};

//! Operand model with def/use bookkeeping
//!
//! Operands live in an arena (`OperandTable`) and are addressed by
//! `OperandId`, so the cyclic operand↔instruction references of the graph
//! reduce to plain integer ids. Every instruction slot that reads or
//! writes a tracked operand is mirrored in that operand's `uses`/`defs`
//! vector (one entry per slot), and every slot mutation goes through the
//! table so the two stay in sync. List removal is a position scan plus
//! `swap_remove`.

use sable_bytecode::{FieldId, MethodId};

use super::instr::NodeId;
use super::types::IrType;

/// Identifier of an operand in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperandId(pub u32);

impl std::fmt::Display for OperandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "o{}", self.0)
    }
}

/// Constant payloads
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    /// Integer bits, masked to the operand's width at creation
    Int(u64),
    Float32(f32),
    Float64(f64),
    /// String literal: linker symbol name plus the literal data
    Str { symbol: String, data: String },
}

/// What a symbol operand names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A callable method
    Method,
    /// A read-only data symbol
    Data,
}

/// Operand kinds
#[derive(Debug, Clone, PartialEq)]
pub enum OperandKind {
    /// Unbounded virtual register, resolved by register allocation
    VirtualRegister,
    /// Pre-colored physical register
    PhysicalRegister { reg: u16 },
    /// Routine-local stack slot
    StackLocal { slot: u32, pinned: bool },
    /// Incoming parameter
    Parameter { index: u32 },
    /// Immediate constant
    Constant(ConstValue),
    /// Linker symbol
    Symbol {
        name: String,
        kind: SymbolKind,
        method: Option<MethodId>,
    },
    /// Static field reference
    FieldRef(FieldId),
    /// Memory reference produced late in compilation
    Memory { offset: i64 },
}

/// An operand plus its def/use bookkeeping
#[derive(Debug, Clone)]
pub struct OperandData {
    pub kind: OperandKind,
    pub ty: IrType,
    /// Instruction nodes that write this operand, in insertion order
    pub defs: Vec<NodeId>,
    /// Instruction nodes that read this operand, one entry per slot
    pub uses: Vec<NodeId>,
}

/// Arena of operands for one routine
#[derive(Debug, Default)]
pub struct OperandTable {
    operands: Vec<OperandData>,
    next_stack_slot: u32,
}

impl OperandTable {
    pub fn new() -> Self {
        OperandTable::default()
    }

    fn push(&mut self, kind: OperandKind, ty: IrType) -> OperandId {
        let id = OperandId(self.operands.len() as u32);
        self.operands.push(OperandData {
            kind,
            ty,
            defs: Vec::new(),
            uses: Vec::new(),
        });
        id
    }

    /// Allocate a fresh virtual register
    pub fn virtual_register(&mut self, ty: IrType) -> OperandId {
        self.push(OperandKind::VirtualRegister, ty)
    }

    /// Allocate a routine-local stack slot
    pub fn stack_local(&mut self, ty: IrType, pinned: bool) -> OperandId {
        let slot = self.next_stack_slot;
        self.next_stack_slot += 1;
        self.push(OperandKind::StackLocal { slot, pinned }, ty)
    }

    /// Create a parameter operand
    pub fn parameter(&mut self, ty: IrType, index: u32) -> OperandId {
        self.push(OperandKind::Parameter { index }, ty)
    }

    /// Create a pre-colored physical register operand
    pub fn physical_register(&mut self, ty: IrType, reg: u16) -> OperandId {
        self.push(OperandKind::PhysicalRegister { reg }, ty)
    }

    /// Create an integer constant, masked to the width of `ty`
    pub fn const_int(&mut self, ty: IrType, value: u64, pointer_size: u32) -> OperandId {
        let masked = value & ty.width_mask(pointer_size);
        self.push(OperandKind::Constant(ConstValue::Int(masked)), ty)
    }

    pub fn const_f32(&mut self, value: f32) -> OperandId {
        self.push(OperandKind::Constant(ConstValue::Float32(value)), IrType::F32)
    }

    pub fn const_f64(&mut self, value: f64) -> OperandId {
        self.push(OperandKind::Constant(ConstValue::Float64(value)), IrType::F64)
    }

    /// Create a string-literal constant carrying its symbol name and data
    pub fn string_literal(&mut self, symbol: String, data: String) -> OperandId {
        self.push(
            OperandKind::Constant(ConstValue::Str { symbol, data }),
            IrType::ObjectRef,
        )
    }

    /// Create a symbol operand naming a method
    pub fn method_symbol(&mut self, name: String, method: MethodId) -> OperandId {
        self.push(
            OperandKind::Symbol {
                name,
                kind: SymbolKind::Method,
                method: Some(method),
            },
            IrType::FunctionPtr,
        )
    }

    /// Create a symbol operand for a runtime helper routine
    pub fn runtime_symbol(&mut self, name: String) -> OperandId {
        self.push(
            OperandKind::Symbol {
                name,
                kind: SymbolKind::Method,
                method: None,
            },
            IrType::FunctionPtr,
        )
    }

    /// Create a symbol operand naming a read-only data symbol
    pub fn data_symbol(&mut self, name: String) -> OperandId {
        self.push(
            OperandKind::Symbol {
                name,
                kind: SymbolKind::Data,
                method: None,
            },
            IrType::UnmanagedPtr,
        )
    }

    /// Create a static field reference operand
    pub fn field_ref(&mut self, field: FieldId, ty: IrType) -> OperandId {
        self.push(OperandKind::FieldRef(field), ty)
    }

    pub fn get(&self, id: OperandId) -> &OperandData {
        &self.operands[id.0 as usize]
    }

    pub fn ty(&self, id: OperandId) -> &IrType {
        &self.operands[id.0 as usize].ty
    }

    /// Replace the semantic type of an operand
    pub fn set_ty(&mut self, id: OperandId, ty: IrType) {
        self.operands[id.0 as usize].ty = ty;
    }

    pub fn len(&self) -> usize {
        self.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    /// Iterate all operand ids
    pub fn ids(&self) -> impl Iterator<Item = OperandId> {
        (0..self.operands.len() as u32).map(OperandId)
    }

    // ===== Kind queries =====

    pub fn is_virtual_register(&self, id: OperandId) -> bool {
        matches!(self.get(id).kind, OperandKind::VirtualRegister)
    }

    pub fn is_stack_local(&self, id: OperandId) -> bool {
        matches!(self.get(id).kind, OperandKind::StackLocal { .. })
    }

    pub fn is_pinned(&self, id: OperandId) -> bool {
        matches!(self.get(id).kind, OperandKind::StackLocal { pinned: true, .. })
    }

    pub fn is_parameter(&self, id: OperandId) -> bool {
        matches!(self.get(id).kind, OperandKind::Parameter { .. })
    }

    pub fn is_constant(&self, id: OperandId) -> bool {
        matches!(self.get(id).kind, OperandKind::Constant(_))
    }

    pub fn is_symbol(&self, id: OperandId) -> bool {
        matches!(self.get(id).kind, OperandKind::Symbol { .. })
    }

    pub fn is_field_ref(&self, id: OperandId) -> bool {
        matches!(self.get(id).kind, OperandKind::FieldRef(_))
    }

    /// Integer constant bits, masked to the operand width
    pub fn const_u64(&self, id: OperandId) -> Option<u64> {
        match &self.get(id).kind {
            OperandKind::Constant(ConstValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Integer constant sign-extended from the operand width to 64 bits
    pub fn const_i64(&self, id: OperandId, pointer_size: u32) -> Option<i64> {
        let bits = self.const_u64(id)?;
        let width = self.ty(id).width_bits(pointer_size);
        Some(sign_extend(bits, width))
    }

    pub fn is_constant_zero(&self, id: OperandId) -> bool {
        self.const_u64(id) == Some(0)
    }

    pub fn is_constant_one(&self, id: OperandId) -> bool {
        self.const_u64(id) == Some(1)
    }

    /// Whether def/use lists are maintained for this operand
    ///
    /// Constants, symbols, and field references are immutable values; only
    /// register-like operands carry bookkeeping.
    pub fn is_tracked(&self, id: OperandId) -> bool {
        matches!(
            self.get(id).kind,
            OperandKind::VirtualRegister
                | OperandKind::StackLocal { .. }
                | OperandKind::Parameter { .. }
        )
    }

    // ===== Def/use maintenance (called by the graph layer only) =====

    pub(crate) fn record_use(&mut self, id: OperandId, node: NodeId) {
        if self.is_tracked(id) {
            self.operands[id.0 as usize].uses.push(node);
        }
    }

    pub(crate) fn forget_use(&mut self, id: OperandId, node: NodeId) {
        if self.is_tracked(id) {
            let uses = &mut self.operands[id.0 as usize].uses;
            if let Some(pos) = uses.iter().position(|&n| n == node) {
                uses.swap_remove(pos);
            } else {
                debug_assert!(false, "use of {id} by {node:?} was not recorded");
            }
        }
    }

    pub(crate) fn record_def(&mut self, id: OperandId, node: NodeId) {
        if self.is_tracked(id) {
            self.operands[id.0 as usize].defs.push(node);
        }
    }

    pub(crate) fn forget_def(&mut self, id: OperandId, node: NodeId) {
        if self.is_tracked(id) {
            let defs = &mut self.operands[id.0 as usize].defs;
            if let Some(pos) = defs.iter().position(|&n| n == node) {
                defs.swap_remove(pos);
            } else {
                debug_assert!(false, "def of {id} by {node:?} was not recorded");
            }
        }
    }
}

fn sign_extend(bits: u64, width: u32) -> i64 {
    match width {
        8 => bits as u8 as i8 as i64,
        16 => bits as u16 as i16 as i64,
        32 => bits as u32 as i32 as i64,
        _ => bits as i64,
    }
}

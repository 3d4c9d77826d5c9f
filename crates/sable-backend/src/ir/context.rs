//! Mutation cursor over a single instruction node
//!
//! Both the lowering pass and the optimizer rewrite the graph exclusively
//! through this cursor, which routes every slot change through the graph
//! layer so def/use lists and block edges never go stale.

use super::block::{BlockId, IrFunction};
use super::instr::{ConditionCode, InstructionNode, NodeId, Opcode};
use super::operand::OperandId;
use super::types::OpSize;

/// A cursor positioned on one instruction node
pub struct Context<'a> {
    pub func: &'a mut IrFunction,
    node: NodeId,
}

impl<'a> Context<'a> {
    /// Position a cursor on an existing node
    pub fn on(func: &'a mut IrFunction, node: NodeId) -> Self {
        Context { func, node }
    }

    /// Position a cursor on a fresh node appended to `block`
    pub fn append_to_block(func: &'a mut IrFunction, block: BlockId) -> Self {
        let node = func.append_node(block);
        Context { func, node }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn node(&self) -> &InstructionNode {
        self.func.node(self.node)
    }

    pub fn block(&self) -> BlockId {
        self.node().block
    }

    /// Move the cursor to another node
    pub fn goto(&mut self, node: NodeId) {
        self.node = node;
    }

    // ===== Whole-instruction rewrites =====

    /// Replace the node with a new instruction, dropping all old slots
    pub fn set_instruction(
        &mut self,
        op: impl Into<Opcode>,
        result: Option<OperandId>,
        operands: &[OperandId],
    ) {
        self.func.clear_slots(self.node);
        self.func.node_mut(self.node).opcode = op.into();
        if let Some(r) = result {
            self.func.push_result(self.node, r);
        }
        for &operand in operands {
            self.func.push_operand(self.node, operand);
        }
    }

    /// `set_instruction` plus a condition code
    pub fn set_instruction_cc(
        &mut self,
        op: impl Into<Opcode>,
        condition: ConditionCode,
        result: Option<OperandId>,
        operands: &[OperandId],
    ) {
        self.set_instruction(op, result, operands);
        self.func.node_mut(self.node).condition = Some(condition);
    }

    /// Swap the opcode while keeping every slot in place
    pub fn replace_opcode_only(&mut self, op: impl Into<Opcode>) {
        self.func.node_mut(self.node).opcode = op.into();
    }

    /// Rewrite the node to the empty tombstone
    pub fn empty(&mut self) {
        self.func.clear_slots(self.node);
        self.func.node_mut(self.node).opcode = Opcode::Empty;
    }

    // ===== Neighborhood =====

    /// Insert a new instruction after the cursor and advance onto it
    pub fn append_instruction(
        &mut self,
        op: impl Into<Opcode>,
        result: Option<OperandId>,
        operands: &[OperandId],
    ) -> &mut Self {
        let new = self.func.insert_node_after(self.node);
        self.node = new;
        self.set_instruction(op, result, operands);
        self
    }

    /// `append_instruction` plus a condition code
    pub fn append_instruction_cc(
        &mut self,
        op: impl Into<Opcode>,
        condition: ConditionCode,
        result: Option<OperandId>,
        operands: &[OperandId],
    ) -> &mut Self {
        self.append_instruction(op, result, operands);
        self.func.node_mut(self.node).condition = Some(condition);
        self
    }

    /// Insert a finished instruction before the cursor position; the
    /// cursor does not move
    pub fn insert_before_instruction(
        &mut self,
        op: impl Into<Opcode>,
        result: Option<OperandId>,
        operands: &[OperandId],
    ) -> NodeId {
        let new = self.func.insert_node_before(self.node);
        let here = self.node;
        self.node = new;
        self.set_instruction(op, result, operands);
        self.node = here;
        new
    }

    /// Split the current block after the cursor node; returns the block
    /// that now holds the following instructions
    pub fn split_after(&mut self) -> BlockId {
        self.func.split_after(self.node)
    }

    // ===== Slot and tag mutation =====

    pub fn set_operand(&mut self, index: usize, op: OperandId) {
        self.func.set_operand_slot(self.node, index, op);
    }

    pub fn push_operand(&mut self, op: OperandId) {
        self.func.push_operand(self.node, op);
    }

    /// Set or replace the single result slot
    pub fn set_result(&mut self, op: OperandId) {
        if self.node().result_count() == 0 {
            self.func.push_result(self.node, op);
        } else {
            self.func.set_result_slot(self.node, 0, op);
        }
    }

    pub fn set_result_at(&mut self, index: usize, op: OperandId) {
        self.func.set_result_slot(self.node, index, op);
    }

    pub fn set_condition(&mut self, cc: ConditionCode) {
        self.func.node_mut(self.node).condition = Some(cc);
    }

    pub fn set_size(&mut self, size: OpSize) {
        self.func.node_mut(self.node).size = size;
    }

    pub fn set_branch_targets(&mut self, targets: Vec<BlockId>) {
        self.func.set_branch_targets(self.node, targets);
    }

    pub fn add_branch_target(&mut self, target: BlockId) {
        self.func.add_branch_target(self.node, target);
    }

    pub fn set_invoke_method(&mut self, method: sable_bytecode::MethodId) {
        self.func.node_mut(self.node).invoke_method = Some(method);
    }

    pub fn set_field(&mut self, field: sable_bytecode::FieldId) {
        self.func.node_mut(self.node).field = Some(field);
    }

    pub fn set_bc_type(&mut self, ty: sable_bytecode::TypeId) {
        self.func.node_mut(self.node).bc_type = Some(ty);
    }

    /// Record the source block for the most recently pushed phi operand
    pub fn push_phi_block(&mut self, block: BlockId) {
        let node = self.func.node_mut(self.node);
        node.phi_blocks.push(block);
        debug_assert_eq!(node.phi_blocks.len(), node.operand_count());
    }

    /// Drop the phi operand flowing in from `pred`, if present
    pub fn remove_phi_source(&mut self, pred: BlockId) {
        let index = self
            .node()
            .phi_blocks
            .iter()
            .position(|&b| b == pred);
        if let Some(index) = index {
            self.func.remove_operand_slot(self.node, index);
            self.func.node_mut(self.node).phi_blocks.remove(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instr::IrOp;
    use crate::ir::types::IrType;

    fn setup() -> (IrFunction, BlockId) {
        let mut func = IrFunction::new("ctx", 4);
        let block = func.create_block();
        func.add_head_block(block);
        (func, block)
    }

    #[test]
    fn test_set_instruction_wires_def_use() {
        let (mut func, block) = setup();
        let a = func.operands.virtual_register(IrType::I32);
        let b = func.operands.virtual_register(IrType::I32);
        let r = func.operands.virtual_register(IrType::I32);

        let n = {
            let mut ctx = Context::append_to_block(&mut func, block);
            ctx.set_instruction(IrOp::AddSigned, Some(r), &[a, b]);
            ctx.node_id()
        };

        assert_eq!(func.operands.get(a).uses, vec![n]);
        assert_eq!(func.operands.get(b).uses, vec![n]);
        assert_eq!(func.operands.get(r).defs, vec![n]);
        func.validate().unwrap();
    }

    #[test]
    fn test_rewrite_releases_old_slots() {
        let (mut func, block) = setup();
        let a = func.operands.virtual_register(IrType::I32);
        let b = func.operands.virtual_register(IrType::I32);
        let r = func.operands.virtual_register(IrType::I32);

        let mut ctx = Context::append_to_block(&mut func, block);
        ctx.set_instruction(IrOp::AddSigned, Some(r), &[a, b]);
        ctx.set_instruction(IrOp::Move, Some(r), &[a]);
        let n = ctx.node_id();

        assert_eq!(func.operands.get(a).uses, vec![n]);
        assert!(func.operands.get(b).uses.is_empty());
        func.validate().unwrap();
    }

    #[test]
    fn test_empty_is_tombstone() {
        let (mut func, block) = setup();
        let a = func.operands.virtual_register(IrType::I32);
        let r = func.operands.virtual_register(IrType::I32);

        let mut ctx = Context::append_to_block(&mut func, block);
        ctx.set_instruction(IrOp::Move, Some(r), &[a]);
        let n = ctx.node_id();
        ctx.empty();

        assert!(func.node(n).is_empty());
        assert!(func.operands.get(a).uses.is_empty());
        assert!(func.operands.get(r).defs.is_empty());
        // the tombstone stays linked
        assert_eq!(func.block_instrs(block), vec![n]);
        func.validate().unwrap();
    }

    #[test]
    fn test_append_advances_cursor() {
        let (mut func, block) = setup();
        let mut ctx = Context::append_to_block(&mut func, block);
        ctx.set_instruction(IrOp::Nop, None, &[]);
        let first = ctx.node_id();
        ctx.append_instruction(IrOp::Break, None, &[]);
        let second = ctx.node_id();

        assert_ne!(first, second);
        assert_eq!(func.block_instrs(block), vec![first, second]);
    }

    #[test]
    fn test_insert_before_keeps_cursor() {
        let (mut func, block) = setup();
        let mut ctx = Context::append_to_block(&mut func, block);
        ctx.set_instruction(IrOp::Return, None, &[]);
        let ret = ctx.node_id();
        let before = ctx.insert_before_instruction(IrOp::Nop, None, &[]);

        assert_eq!(ctx.node_id(), ret);
        assert_eq!(func.block_instrs(block), vec![before, ret]);
    }

    #[test]
    fn test_phi_source_removal() {
        let (mut func, block) = setup();
        let p0 = func.create_block();
        let p1 = func.create_block();
        let a = func.operands.virtual_register(IrType::I32);
        let b = func.operands.virtual_register(IrType::I32);
        let r = func.operands.virtual_register(IrType::I32);

        let mut ctx = Context::append_to_block(&mut func, block);
        ctx.set_instruction(IrOp::Phi, Some(r), &[]);
        ctx.push_operand(a);
        ctx.push_phi_block(p0);
        ctx.push_operand(b);
        ctx.push_phi_block(p1);
        let n = ctx.node_id();

        ctx.remove_phi_source(p0);
        let node = func.node(n);
        assert_eq!(node.operand_count(), 1);
        assert_eq!(node.operand(0), b);
        assert_eq!(node.phi_blocks, vec![p1]);
        assert!(func.operands.get(a).uses.is_empty());
        func.validate().unwrap();
    }

    #[test]
    fn test_branch_targets_update_edges() {
        let (mut func, block) = setup();
        let target = func.create_block();
        let mut ctx = Context::append_to_block(&mut func, block);
        ctx.set_instruction(IrOp::Jmp, None, &[]);
        ctx.set_branch_targets(vec![target]);

        assert_eq!(func.block(block).successors, vec![target]);
        assert_eq!(func.block(target).predecessors, vec![block]);
    }
}

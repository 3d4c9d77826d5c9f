//! Stack-local promotion
//!
//! A single-definition, non-pinned stack local of register-storable type
//! whose address is never taken behaves exactly like a virtual register,
//! so it becomes one. Promotion runs before the main sweep and again in
//! the outer loop, because other rewrites keep exposing new candidates.

use super::Optimizer;
use crate::ir::{Context, IrOp, IrType, OpSize, OperandId};

impl Optimizer<'_> {
    /// Promote every eligible declared local; true if anything changed
    pub(super) fn promote_local_variables(&mut self) -> bool {
        let mut change = false;

        for local in self.func.locals.clone() {
            if !self.func.operands.is_stack_local(local) {
                continue;
            }
            if self.func.operands.is_parameter(local) || self.func.operands.is_pinned(local) {
                continue;
            }
            if self.func.operands.get(local).defs.len() != 1 {
                continue;
            }
            if !Self::promotable_type(self.func.operands.ty(local)) {
                continue;
            }
            if self.promotion_blocked_by_address_of(local) {
                continue;
            }

            let stack_ty = self.func.operands.ty(local).stack_type();
            let replacement = self.func.operands.virtual_register(stack_ty);
            self.replace_register(local, replacement);

            self.stats.locals_promoted += 1;
            self.bump();
            change = true;
        }

        change
    }

    /// Types the register file can hold directly
    fn promotable_type(ty: &IrType) -> bool {
        match ty {
            IrType::ValueType(_) => false,
            IrType::Array(_) | IrType::ObjectRef => true,
            _ => ty.is_integer() || ty.is_float() || ty.is_pointer(),
        }
    }

    fn promotion_blocked_by_address_of(&self, local: OperandId) -> bool {
        self.func
            .operands
            .get(local)
            .uses
            .iter()
            .any(|&node| self.func.node(node).is(IrOp::AddressOf))
    }

    /// Rewrite every use and definition of `old` to `new`, converting
    /// zero-extended moves that only existed for the memory slot into
    /// plain moves
    fn replace_register(&mut self, old: OperandId, new: OperandId) {
        for node in self.func.operands.get(old).uses.clone() {
            self.add_node_usages_to_worklist(node);
            for index in 0..self.func.node(node).operand_count() {
                if self.func.node(node).operand(index) == old {
                    let mut ctx = Context::on(self.func, node);
                    ctx.set_operand(index, new);
                    if ctx.node().is(IrOp::ZeroExtendedMove) {
                        ctx.replace_opcode_only(IrOp::Move);
                        ctx.set_size(OpSize::None);
                    }
                }
            }
            self.add_to_worklist(node);
        }

        for node in self.func.operands.get(old).defs.clone() {
            self.add_node_usages_to_worklist(node);
            for index in 0..self.func.node(node).result_count() {
                if self.func.node(node).results()[index] == old {
                    let mut ctx = Context::on(self.func, node);
                    ctx.set_result_at(index, new);
                    if ctx.node().is(IrOp::ZeroExtendedMove) {
                        ctx.replace_opcode_only(IrOp::Move);
                        ctx.set_size(OpSize::None);
                    }
                }
            }
            self.add_to_worklist(node);
        }
    }
}

//! The ordered local rewrite rules
//!
//! Every rule is predicate-then-rewrite over one node: arity, kind, and
//! constancy guards first, then an in-place rewrite through the context
//! cursor, the work-list enqueue, and the counters. Rules never unlink
//! nodes; a removed instruction becomes a tombstone.

use super::Optimizer;
use crate::ir::{ConditionCode, Context, IrOp, IrType, NodeId, OperandId};

impl Optimizer<'_> {
    // ===== Shared predicates =====

    fn is_vreg(&self, op: OperandId) -> bool {
        self.func.operands.is_virtual_register(op)
    }

    fn single_def(&self, op: OperandId) -> bool {
        self.func.operands.get(op).defs.len() == 1
    }

    /// Whether any reader of `op` takes its address
    fn contains_address_of(&self, op: OperandId) -> bool {
        self.func
            .operands
            .get(op)
            .uses
            .iter()
            .any(|&n| self.func.node(n).is(IrOp::AddressOf))
    }

    fn const_for(&mut self, like: OperandId, value: u64) -> OperandId {
        let ty = self.func.operands.ty(like).clone();
        let pointer_size = self.func.pointer_size;
        self.func.operands.const_int(ty, value, pointer_size)
    }

    fn const_bits(&self, op: OperandId) -> Option<u64> {
        self.func.operands.const_u64(op)
    }

    fn const_signed(&self, op: OperandId) -> Option<i64> {
        self.func.operands.const_i64(op, self.func.pointer_size)
    }

    /// Representation compatibility for copy propagation: pointer
    /// categories must match exactly, integers must share a width class,
    /// value types never propagate
    fn can_copy_propagate(&self, a: OperandId, b: OperandId) -> bool {
        let a = self.func.operands.ty(a).clone();
        let b = self.func.operands.ty(b).clone();
        let pointer_size = self.func.pointer_size;

        let width = |ty: &IrType| ty.width_bits(pointer_size);
        let fixed_int = |ty: &IrType| {
            matches!(
                ty,
                IrType::I8
                    | IrType::I16
                    | IrType::I32
                    | IrType::I64
                    | IrType::U8
                    | IrType::U16
                    | IrType::U32
                    | IrType::U64
            )
        };
        let native = |ty: &IrType| {
            matches!(ty, IrType::IntPtr | IrType::UIntPtr | IrType::UnmanagedPtr)
        };

        match (&a, &b) {
            (IrType::ObjectRef, IrType::ObjectRef) => true,
            (IrType::UnmanagedPtr, IrType::UnmanagedPtr) => true,
            (IrType::ManagedPtr, IrType::ManagedPtr) => true,
            (IrType::FunctionPtr, IrType::FunctionPtr) => true,
            (IrType::Array(ea), IrType::Array(eb)) => ea == eb,
            (IrType::F32, IrType::F32) => true,
            (IrType::F64, IrType::F64) => true,
            (IrType::ValueType(_), _) | (_, IrType::ValueType(_)) => false,
            _ if fixed_int(&a) && fixed_int(&b) && width(&a) == width(&b) => true,
            // native integers interchange with pointer-width integers
            _ if native(&a) && fixed_int(&b) && width(&b) == pointer_size * 8 => true,
            _ if native(&b) && fixed_int(&a) && width(&a) == pointer_size * 8 => true,
            _ if native(&a) && native(&b) => true,
            _ => a == b,
        }
    }

    fn is_power_of_two(value: u64) -> bool {
        value != 0 && (value & (value - 1)) == 0
    }

    fn power_of_two_shift(value: u64) -> u32 {
        value.trailing_zeros()
    }

    // ===== 1. Constant propagation =====

    /// Substitute a single-definition move-from-constant into every use
    /// site (address-of sites excluded)
    pub(super) fn simple_constant_propagation(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::Move) {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.is_vreg(result) || !self.single_def(result) {
            return;
        }
        let source = self.func.node(node).operand(0);
        if !self.func.operands.is_constant(source) {
            return;
        }

        for use_node in self.func.operands.get(result).uses.clone() {
            if self.func.node(use_node).is(IrOp::AddressOf) {
                continue;
            }
            let mut propagated = false;
            for index in 0..self.func.node(use_node).operand_count() {
                if self.func.node(use_node).operand(index) == result {
                    self.add_operand_usage_to_worklist(result);
                    Context::on(self.func, use_node).set_operand(index, source);
                    self.stats.constant_propagation += 1;
                    self.bump();
                    propagated = true;
                }
            }
            if propagated {
                self.add_to_worklist(use_node);
            }
        }
    }

    // ===== 2. Copy propagation =====

    pub(super) fn simple_forward_copy_propagation(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::Move) {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.is_vreg(result) || !self.single_def(result) {
            return;
        }
        let source = self.func.node(node).operand(0);
        if self.func.operands.is_constant(source)
            || !self.is_vreg(source)
            || !self.single_def(source)
        {
            return;
        }
        // across a pointer-category or width mismatch the move is a
        // representation change, not a copy
        if !self.can_copy_propagate(result, source) {
            return;
        }
        if self.contains_address_of(result) {
            return;
        }

        self.add_node_usages_to_worklist(node);

        for use_node in self.func.operands.get(result).uses.clone() {
            for index in 0..self.func.node(use_node).operand_count() {
                if self.func.node(use_node).operand(index) == result {
                    Context::on(self.func, use_node).set_operand(index, source);
                    self.stats.copy_propagation += 1;
                    self.bump();
                }
            }
        }
        debug_assert!(self.func.operands.get(result).uses.is_empty());

        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).empty();
        self.stats.instructions_removed += 1;
        self.bump();
    }

    // ===== 3. Dead code =====

    pub(super) fn dead_code_elimination(&mut self, node: NodeId) {
        if self.func.node(node).result_count() != 1 {
            return;
        }
        let result = self.func.node(node).result().expect("checked above");
        if !self.is_vreg(result) || !self.single_def(result) {
            return;
        }
        // calls stay: the callee may have side effects
        if self.func.node(node).is(IrOp::Call) {
            return;
        }

        // a self-move goes regardless of the use count
        if self.func.node(node).is(IrOp::Move) {
            let source = self.func.node(node).operand(0);
            if self.is_vreg(source) && source == result {
                self.add_node_usages_to_worklist(node);
                Context::on(self.func, node).empty();
                self.stats.instructions_removed += 1;
                self.stats.dead_code += 1;
                self.bump();
                return;
            }
        }

        if !self.func.operands.get(result).uses.is_empty() {
            return;
        }

        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).empty();
        self.stats.instructions_removed += 1;
        self.stats.dead_code += 1;
        self.bump();
    }

    // ===== 4. Integer constant folding =====

    /// Fold two-constant integer arithmetic as unsigned 64-bit values,
    /// reinterpreted at the result width; signed division and remainder
    /// use the signed representations. Division or remainder by a
    /// constant zero is never folded, so the runtime trap survives.
    pub(super) fn constant_folding_integer_operations(&mut self, node: NodeId) {
        let Some(op) = self.func.node(node).ir_op() else {
            return;
        };
        if !op.is_foldable_integer_op() {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.is_vreg(result) {
            return;
        }
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        let (Some(bits_a), Some(bits_b)) = (self.const_bits(a), self.const_bits(b)) else {
            return;
        };

        if (op.is_div() || op.is_rem()) && bits_b == 0 {
            return;
        }

        let signed_a = self.const_signed(a).expect("integer constant");
        let signed_b = self.const_signed(b).expect("integer constant");

        let value = match op {
            IrOp::AddSigned | IrOp::AddUnsigned => bits_a.wrapping_add(bits_b),
            IrOp::SubSigned | IrOp::SubUnsigned => bits_a.wrapping_sub(bits_b),
            IrOp::MulSigned | IrOp::MulUnsigned => bits_a.wrapping_mul(bits_b),
            IrOp::LogicalAnd => bits_a & bits_b,
            IrOp::LogicalOr => bits_a | bits_b,
            IrOp::LogicalXor => bits_a ^ bits_b,
            IrOp::DivUnsigned => bits_a / bits_b,
            IrOp::DivSigned => signed_a.wrapping_div(signed_b) as u64,
            IrOp::RemUnsigned => bits_a % bits_b,
            IrOp::RemSigned => signed_a.wrapping_rem(signed_b) as u64,
            IrOp::ShiftLeft => bits_a << (bits_b & 63),
            IrOp::ShiftRight => bits_a >> (bits_b & 63),
            IrOp::ArithmeticShiftRight => (signed_a >> (bits_b & 63)) as u64,
            _ => return,
        };

        let constant = self.const_for(result, value);
        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[constant]);
        self.stats.constant_folding_integer_ops += 1;
        self.bump();
    }

    // ===== 5. Canonical operand order =====

    pub(super) fn constant_move_to_right(&mut self, node: NodeId) {
        let Some(op) = self.func.node(node).ir_op() else {
            return;
        };
        let commutative = op.is_add()
            || op.is_mul()
            || matches!(op, IrOp::LogicalAnd | IrOp::LogicalOr | IrOp::LogicalXor);
        if !commutative {
            return;
        }
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        if self.func.operands.is_constant(b) || !self.func.operands.is_constant(a) {
            return;
        }

        self.add_node_usages_to_worklist(node);
        let mut ctx = Context::on(self.func, node);
        ctx.set_operand(0, b);
        ctx.set_operand(1, a);
        self.stats.constant_move_to_right += 1;
        self.bump();
    }

    // ===== 6–11. Arithmetic simplifications =====

    pub(super) fn arithmetic_simplification_subtraction(&mut self, node: NodeId) {
        let Some(op) = self.func.node(node).ir_op() else {
            return;
        };
        if !op.is_sub() {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.is_vreg(result) {
            return;
        }
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        if a != b {
            return;
        }

        let zero = self.const_for(result, 0);
        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[zero]);
        self.stats.arith_simpl_subtraction += 1;
        self.bump();
    }

    pub(super) fn arithmetic_simplification_multiplication(&mut self, node: NodeId) {
        let Some(op) = self.func.node(node).ir_op() else {
            return;
        };
        if !op.is_mul() {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.is_vreg(result) {
            return;
        }
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        let Some(factor) = self.const_bits(b) else {
            return;
        };

        if factor == 0 {
            let zero = self.const_for(result, 0);
            self.add_node_usages_to_worklist(node);
            Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[zero]);
            self.stats.arith_simpl_multiplication += 1;
            self.bump();
            return;
        }
        if factor == 1 {
            self.add_node_usages_to_worklist(node);
            Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[a]);
            self.stats.arith_simpl_multiplication += 1;
            self.bump();
            return;
        }
        if Self::is_power_of_two(factor) {
            let shift = Self::power_of_two_shift(factor);
            if shift < 32 {
                let shift_op = self.const_for(b, shift as u64);
                self.add_node_usages_to_worklist(node);
                Context::on(self.func, node).set_instruction(
                    IrOp::ShiftLeft,
                    Some(result),
                    &[a, shift_op],
                );
                self.stats.arith_simpl_multiplication += 1;
                self.bump();
            }
        }
    }

    pub(super) fn arithmetic_simplification_division(&mut self, node: NodeId) {
        let Some(op) = self.func.node(node).ir_op() else {
            return;
        };
        if !op.is_div() {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.is_vreg(result) {
            return;
        }
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        let Some(divisor) = self.const_bits(b) else {
            return;
        };
        if divisor == 0 {
            // the runtime trap must survive
            return;
        }

        if self.const_bits(a) == Some(0) {
            let zero = self.const_for(result, 0);
            self.add_node_usages_to_worklist(node);
            Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[zero]);
            self.stats.arith_simpl_division += 1;
            self.bump();
            return;
        }
        if divisor == 1 {
            self.add_node_usages_to_worklist(node);
            Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[a]);
            self.stats.arith_simpl_division += 1;
            self.bump();
            return;
        }
        if op == IrOp::DivUnsigned && Self::is_power_of_two(divisor) {
            let shift = Self::power_of_two_shift(divisor);
            if shift < 32 {
                let shift_op = self.const_for(b, shift as u64);
                self.add_node_usages_to_worklist(node);
                Context::on(self.func, node).set_instruction(
                    IrOp::ShiftRight,
                    Some(result),
                    &[a, shift_op],
                );
                self.stats.arith_simpl_division += 1;
                self.bump();
            }
        }
    }

    pub(super) fn arithmetic_simplification_addition_and_subtraction(&mut self, node: NodeId) {
        let Some(op) = self.func.node(node).ir_op() else {
            return;
        };
        if !op.is_add_or_sub() {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.is_vreg(result) {
            return;
        }
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        // only when the other side is non-constant, so full folding wins
        if self.func.operands.is_constant(a) || self.const_bits(b) != Some(0) {
            return;
        }

        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[a]);
        self.stats.arith_simpl_add_sub += 1;
        self.bump();
    }

    pub(super) fn arithmetic_simplification_logical_operators(&mut self, node: NodeId) {
        let Some(op) = self.func.node(node).ir_op() else {
            return;
        };
        if !matches!(op, IrOp::LogicalAnd | IrOp::LogicalOr) {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.is_vreg(result) {
            return;
        }
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        let Some(mask) = self.const_bits(b) else {
            return;
        };

        if op == IrOp::LogicalOr {
            if mask == 0 {
                self.add_node_usages_to_worklist(node);
                Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[a]);
                self.stats.arith_simpl_logical += 1;
                self.bump();
            }
            return;
        }

        if mask == 0 {
            let zero = self.const_for(result, 0);
            self.add_node_usages_to_worklist(node);
            Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[zero]);
            self.stats.arith_simpl_logical += 1;
            self.bump();
            return;
        }

        let result_ty = self.func.operands.ty(result).clone();
        if result_ty.is_integer() && mask == result_ty.width_mask(self.func.pointer_size) {
            self.add_node_usages_to_worklist(node);
            Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[a]);
            self.stats.arith_simpl_logical += 1;
            self.bump();
        }
    }

    pub(super) fn arithmetic_simplification_shift_operators(&mut self, node: NodeId) {
        let Some(op) = self.func.node(node).ir_op() else {
            return;
        };
        if !op.is_shift() {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.is_vreg(result) {
            return;
        }
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        if self.const_bits(b).is_none() {
            return;
        }

        if self.const_bits(b) == Some(0) || self.const_bits(a) == Some(0) {
            self.add_node_usages_to_worklist(node);
            Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[a]);
            self.stats.arith_simpl_shift += 1;
            self.bump();
        }
    }

    // ===== 12. Zero-extension of a register value =====

    pub(super) fn reduce_zero_extended_move(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::ZeroExtendedMove) {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        let source = self.func.node(node).operand(0);
        if !self.is_vreg(source) || !self.is_vreg(result) {
            return;
        }

        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[source]);
        self.stats.reduce_zero_extended_move += 1;
        self.bump();
    }

    // ===== 13–15, 17–18. Chain folding through single-use results =====

    /// `(x op c1) op c2` with a single intermediate use: the second node
    /// becomes a move and the constants combine on the first
    fn fold_constant_chain(
        &mut self,
        node: NodeId,
        accepts: fn(IrOp) -> bool,
        combine: fn(IrOp, IrOp, u64, u64) -> Option<u64>,
        count: fn(&mut crate::metrics::OptStats),
    ) {
        let Some(op) = self.func.node(node).ir_op() else {
            return;
        };
        if !accepts(op) {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.is_vreg(result) || !self.single_def(result) {
            return;
        }
        let c1 = self.func.node(node).operand(1);
        if self.const_bits(c1).is_none() {
            return;
        }
        let uses = &self.func.operands.get(result).uses;
        if uses.len() != 1 {
            return;
        }
        let node2 = uses[0];
        let Some(op2) = self.func.node(node2).ir_op() else {
            return;
        };
        if !accepts(op2) || node2 == node {
            return;
        }
        let Some(result2) = self.func.node(node2).result() else {
            return;
        };
        if !self.is_vreg(result2) {
            return;
        }
        let c2 = self.func.node(node2).operand(1);
        if self.const_bits(c2).is_none() {
            return;
        }
        // the chained value must feed the first operand slot
        if self.func.node(node2).operand(0) != result {
            return;
        }

        let Some(combined) =
            combine(op, op2, self.const_bits(c1).unwrap(), self.const_bits(c2).unwrap())
        else {
            return;
        };

        self.add_node_usages_to_worklist(node2);
        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node2).set_instruction(IrOp::Move, Some(result2), &[result]);
        let constant = self.const_for(c1, combined);
        Context::on(self.func, node).set_operand(1, constant);
        count(&mut self.stats);
        self.bump();
    }

    pub(super) fn constant_folding_addition_and_subtraction(&mut self, node: NodeId) {
        self.fold_constant_chain(
            node,
            IrOp::is_add_or_sub,
            |op, op2, c1, c2| {
                let mixed = (op.is_add() && op2.is_sub()) || (op.is_sub() && op2.is_add());
                Some(if mixed {
                    c1.wrapping_sub(c2)
                } else {
                    c1.wrapping_add(c2)
                })
            },
            |stats| stats.constant_folding_add_sub_chain += 1,
        );
    }

    pub(super) fn constant_folding_multiplication(&mut self, node: NodeId) {
        self.fold_constant_chain(
            node,
            IrOp::is_mul,
            |_, _, c1, c2| Some(c1.wrapping_mul(c2)),
            |stats| stats.constant_folding_mul_chain += 1,
        );
    }

    pub(super) fn constant_folding_division(&mut self, node: NodeId) {
        self.fold_constant_chain(
            node,
            IrOp::is_div,
            |_, _, c1, c2| {
                // successive divisors multiply; a zero anywhere keeps the trap
                if c1 == 0 || c2 == 0 {
                    return None;
                }
                match c1.checked_mul(c2) {
                    Some(combined) if combined != 0 => Some(combined),
                    _ => None,
                }
            },
            |stats| stats.constant_folding_div_chain += 1,
        );
    }

    pub(super) fn constant_folding_logical_or(&mut self, node: NodeId) {
        self.fold_constant_chain(
            node,
            |op| op == IrOp::LogicalOr,
            |_, _, c1, c2| Some(c1 | c2),
            |stats| stats.constant_folding_or_chain += 1,
        );
    }

    pub(super) fn constant_folding_logical_and(&mut self, node: NodeId) {
        self.fold_constant_chain(
            node,
            |op| op == IrOp::LogicalAnd,
            |_, _, c1, c2| Some(c1 & c2),
            |stats| stats.constant_folding_and_chain += 1,
        );
    }

    // ===== 16. Compare folding =====

    pub(super) fn constant_folding_integer_compare(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::IntegerCompare) {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.is_vreg(result) {
            return;
        }
        let Some(cc) = self.func.node(node).condition else {
            return;
        };
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        let (Some(bits_a), Some(bits_b)) = (self.const_bits(a), self.const_bits(b)) else {
            return;
        };
        if !self.func.operands.ty(a).is_integer() || !self.func.operands.ty(b).is_integer() {
            return;
        }

        let signed_a = self.const_signed(a).expect("integer constant");
        let signed_b = self.const_signed(b).expect("integer constant");
        let outcome = cc.evaluate((bits_a, bits_b), (signed_a, signed_b));

        let constant = self.const_for(result, outcome as u64);
        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[constant]);
        self.stats.constant_folding_compare += 1;
        self.bump();
    }

    // ===== 19–20. Compare combination =====

    /// For an equality test of a single-use compare result against zero,
    /// pick the operand being tested
    fn zero_tested_compare_source(&self, node: NodeId) -> Option<OperandId> {
        let n = self.func.node(node);
        let cc = n.condition?;
        if !matches!(cc, ConditionCode::Equal | ConditionCode::NotEqual) {
            return None;
        }
        let a = n.operand(0);
        let b = n.operand(1);
        let a_zero = self.func.operands.is_constant_zero(a);
        let b_zero = self.func.operands.is_constant_zero(b);
        let operand = if self.is_vreg(a) && b_zero {
            a
        } else if self.is_vreg(b) && a_zero {
            b
        } else {
            return None;
        };
        let data = self.func.operands.get(operand);
        if data.uses.len() != 1 || data.defs.len() != 1 {
            return None;
        }
        Some(operand)
    }

    fn adopt_inner_compare(&mut self, node: NodeId, operand: OperandId) {
        let node2 = self.func.operands.get(operand).defs[0];
        let cc = self.func.node(node).condition.expect("guarded");
        let inner_cc = self.func.node(node2).condition.expect("compare has a condition");
        let adopted = if cc == ConditionCode::NotEqual {
            inner_cc
        } else {
            inner_cc.opposite()
        };
        let a = self.func.node(node2).operand(0);
        let b = self.func.node(node2).operand(1);

        self.add_node_usages_to_worklist(node2);
        self.add_node_usages_to_worklist(node);
        {
            let mut ctx = Context::on(self.func, node);
            ctx.set_condition(adopted);
            ctx.set_operand(0, a);
            ctx.set_operand(1, b);
        }
        Context::on(self.func, node2).empty();
        self.stats.instructions_removed += 1;
        self.bump();
    }

    /// A branch on "compare != 0" branches on the compare itself
    pub(super) fn combine_integer_compare_branch(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::IntegerCompareBranch) {
            return;
        }
        let Some(operand) = self.zero_tested_compare_source(node) else {
            return;
        };
        let node2 = self.func.operands.get(operand).defs[0];
        if !self.func.node(node2).is(IrOp::IntegerCompare) {
            return;
        }
        self.adopt_inner_compare(node, operand);
        self.stats.combine_compare_branch += 1;
    }

    /// A compare of a compare result against zero folds into one compare
    pub(super) fn fold_integer_compare(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::IntegerCompare) {
            return;
        }
        let Some(operand) = self.zero_tested_compare_source(node) else {
            return;
        };
        let node2 = self.func.operands.get(operand).defs[0];
        if !self.func.node(node2).is(IrOp::IntegerCompare) {
            return;
        }
        self.adopt_inner_compare(node, operand);
        self.stats.fold_compare += 1;
    }

    // ===== 21–22. Branch folding =====

    /// A compare-branch in a block with a single successor decides nothing
    pub(super) fn remove_useless_integer_compare_branch(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::IntegerCompareBranch) {
            return;
        }
        let block = self.func.node(node).block;
        if self.func.block(block).successors.len() != 1 {
            return;
        }

        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).empty();
        self.stats.instructions_removed += 1;
        self.stats.remove_useless_compare_branch += 1;
        self.bump();
    }

    pub(super) fn fold_integer_compare_branch(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::IntegerCompareBranch) {
            return;
        }
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        let (Some(bits_a), Some(bits_b)) = (self.const_bits(a), self.const_bits(b)) else {
            return;
        };
        let Some(next) = self.func.next_instr(node) else {
            return;
        };
        if !self.func.node(next).is(IrOp::Jmp) {
            return;
        }
        let (Some(&branch_target), Some(&jmp_target)) = (
            self.func.node(node).branch_targets.first(),
            self.func.node(next).branch_targets.first(),
        ) else {
            return;
        };

        if branch_target == jmp_target {
            // both edges agree, the test is useless
            self.add_node_usages_to_worklist(node);
            Context::on(self.func, node).empty();
            self.stats.instructions_removed += 1;
            self.stats.fold_compare_branch += 1;
            self.bump();
            return;
        }

        let Some(cc) = self.func.node(node).condition else {
            return;
        };
        let signed_a = self.const_signed(a).unwrap_or(bits_a as i64);
        let signed_b = self.const_signed(b).unwrap_or(bits_b as i64);
        let taken = cc.evaluate((bits_a, bits_b), (signed_a, signed_b));

        let (not_taken, not_used) = if taken {
            let mut ctx = Context::on(self.func, node);
            ctx.set_instruction(IrOp::Jmp, None, &[]);
            ctx.set_branch_targets(vec![branch_target]);
            (jmp_target, next)
        } else {
            (branch_target, node)
        };

        self.add_node_usages_to_worklist(not_used);
        Context::on(self.func, not_used).empty();
        self.stats.instructions_removed += 1;
        self.stats.fold_compare_branch += 1;
        self.bump();

        self.check_and_clear_empty_block(not_taken);
    }

    /// A block that just lost its last predecessor (and is not an entry
    /// block) is emptied, and phi operands flowing out of it are dropped
    fn check_and_clear_empty_block(&mut self, block: crate::ir::BlockId) {
        if !self.func.block(block).predecessors.is_empty() || self.func.is_head_block(block) {
            return;
        }

        self.stats.blocks_removed += 1;
        let next_blocks = self.func.block(block).successors.clone();
        self.func.empty_block(block);

        for succ in next_blocks {
            for instr in self.func.block_instrs(succ) {
                if self.func.node(instr).is(IrOp::Phi) {
                    self.add_node_usages_to_worklist(instr);
                    Context::on(self.func, instr).remove_phi_source(block);
                    self.add_to_worklist(instr);
                }
            }
        }
    }

    // ===== 23–25. Extension cleanup =====

    pub(super) fn reduce_truncation_and_expansion(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::ZeroExtendedMove) {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        let source = self.func.node(node).operand(0);
        if !self.is_vreg(source) || !self.is_vreg(result) {
            return;
        }
        {
            let result_data = self.func.operands.get(result);
            if result_data.uses.len() != 1 || result_data.defs.len() != 1 {
                return;
            }
            let source_data = self.func.operands.get(source);
            if source_data.uses.len() != 1 || source_data.defs.len() != 1 {
                return;
            }
        }
        let node2 = self.func.operands.get(source).defs[0];
        if !self.func.node(node2).is(IrOp::Move) {
            return;
        }
        let node2_source = self.func.node(node2).operand(0);
        if self.func.operands.ty(node2_source) != self.func.operands.ty(result) {
            return;
        }

        // the truncating move now writes the expanded register directly
        self.add_node_usages_to_worklist(node2);
        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node2).set_result(result);
        Context::on(self.func, node).empty();
        self.stats.reduce_truncation_expansion += 1;
        self.stats.instructions_removed += 1;
        self.bump();
    }

    pub(super) fn simplify_extended_move_with_constant(&mut self, node: NodeId) {
        let n = self.func.node(node);
        if !n.is(IrOp::ZeroExtendedMove) && !n.is(IrOp::SignExtendedMove) {
            return;
        }
        let Some(result) = n.result() else {
            return;
        };
        if !self.is_vreg(result) || !self.single_def(result) {
            return;
        }
        let source = self.func.node(node).operand(0);
        if !self.func.operands.is_constant(source) {
            return;
        }
        let Some(bits) = self.const_bits(source) else {
            return;
        };

        let source_ty = self.func.operands.ty(source).clone();
        let is_zero_extend = self.func.node(node).is(IrOp::ZeroExtendedMove);
        let result_ty = self.func.operands.ty(result).clone();

        let value = if is_zero_extend && result_ty.is_unsigned_int() && source_ty.is_signed_int() {
            // reinterpret the signed payload as unsigned bits
            self.const_signed(source).expect("integer constant") as u64
        } else {
            bits
        };

        let constant = self.const_for(result, value);
        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[constant]);
        self.stats.simplify_extended_move_constant += 1;
        self.bump();
    }

    pub(super) fn simplify_extended_move(&mut self, node: NodeId) {
        let n = self.func.node(node);
        if !n.is(IrOp::ZeroExtendedMove) && !n.is(IrOp::SignExtendedMove) {
            return;
        }
        let Some(result) = n.result() else {
            return;
        };
        let source = n.operand(0);
        if !self.is_vreg(result) || !self.is_vreg(source) {
            return;
        }

        let pointer_bits = self.func.pointer_size * 8;
        let result_ty = self.func.operands.ty(result).clone();
        let source_ty = self.func.operands.ty(source).clone();
        let full_width = |ty: &IrType| {
            ty.is_integer() && ty.width_bits(self.func.pointer_size) == pointer_bits
        };
        // an extension between native-width registers moves nothing
        let no_op = (full_width(&result_ty) && full_width(&source_ty))
            || (full_width(&result_ty)
                && matches!(source_ty, IrType::IntPtr | IrType::UIntPtr))
            || (full_width(&source_ty)
                && matches!(result_ty, IrType::IntPtr | IrType::UIntPtr));
        if !no_op {
            return;
        }

        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[source]);
        self.stats.simplify_extended_move += 1;
        self.bump();
    }

    // ===== 26. Load/store offset folding =====

    pub(super) fn fold_load_store_offsets(&mut self, node: NodeId) {
        let Some(op) = self.func.node(node).ir_op() else {
            return;
        };
        if !op.is_load() && op != IrOp::Store {
            return;
        }
        let base = self.func.node(node).operand(0);
        let offset = self.func.node(node).operand(1);
        if self.const_bits(offset).is_none() || !self.is_vreg(base) {
            return;
        }
        {
            let base_data = self.func.operands.get(base);
            if base_data.uses.len() != 1 || base_data.defs.len() != 1 {
                return;
            }
        }
        let node2 = self.func.operands.get(base).defs[0];
        let Some(op2) = self.func.node(node2).ir_op() else {
            return;
        };
        if !op2.is_add_or_sub() {
            return;
        }
        let addend = self.func.node(node2).operand(1);
        if self.const_bits(addend).is_none() {
            return;
        }

        let node_offset = self.const_signed(offset).expect("constant offset");
        let node2_offset = self.const_signed(addend).expect("constant addend");
        let combined = if op2.is_add() {
            node2_offset.wrapping_add(node_offset)
        } else {
            node_offset.wrapping_sub(node2_offset)
        };

        let new_base = self.func.node(node2).operand(0);
        let constant = self.const_for(offset, combined as u64);

        self.add_node_usages_to_worklist(node);
        self.add_node_usages_to_worklist(node2);
        {
            let mut ctx = Context::on(self.func, node);
            ctx.set_operand(0, new_base);
            ctx.set_operand(1, constant);
        }
        Context::on(self.func, node2).empty();
        self.stats.fold_load_store_offsets += 1;
        self.stats.instructions_removed += 1;
        self.bump();
    }

    // ===== 27–29. Phi cleanup =====

    pub(super) fn constant_folding_phi(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::Phi) {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.single_def(result) || !self.func.operands.ty(result).is_integer() {
            return;
        }
        if self.func.node(node).operand_count() == 0 {
            return;
        }
        let first = self.func.node(node).operand(0);
        let Some(first_bits) = self.const_bits(first) else {
            return;
        };
        for index in 0..self.func.node(node).operand_count() {
            let operand = self.func.node(node).operand(index);
            match self.const_bits(operand) {
                Some(bits) if bits == first_bits => {}
                _ => return,
            }
        }

        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[first]);
        self.stats.constant_folding_phi += 1;
        self.bump();
    }

    pub(super) fn simplify_phi(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::Phi) {
            return;
        }
        if self.func.node(node).operand_count() != 1 {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.single_def(result) {
            return;
        }
        let source = self.func.node(node).operand(0);

        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[source]);
        self.stats.simplify_phi += 1;
        self.bump();
    }

    pub(super) fn dead_code_elimination_phi(&mut self, node: NodeId) {
        if !self.func.node(node).is(IrOp::Phi) {
            return;
        }
        let Some(result) = self.func.node(node).result() else {
            return;
        };
        if !self.single_def(result) {
            return;
        }
        if self
            .func
            .operands
            .get(result)
            .uses
            .iter()
            .any(|&use_node| use_node != node)
        {
            return;
        }

        self.add_node_usages_to_worklist(node);
        Context::on(self.func, node).empty();
        self.stats.dead_code_phi += 1;
        self.bump();
    }
}

//! Bytecode-to-IR lowering
//!
//! One traversal over the instruction graph, visiting every non-empty
//! bytecode node exactly once in block order and rewriting it in place to
//! an equivalent IR node or sequence. Layout-sensitive decisions (field
//! offsets, dispatch slots, boxing) are delegated to the type/layout
//! collaborator; string literals and runtime helpers go through the
//! symbol sink.

mod convert;
mod object;

use sable_bytecode::{BcOpcode, MethodId};

use crate::error::CompileError;
use crate::ir::{
    ConditionCode, Context, IrFunction, IrOp, IrType, NodeId, OpSize, OperandId,
};
use crate::layout::TypeLayout;
use crate::symbols::{RuntimeHelper, SymbolSink};

/// The lowering pass for one routine
pub struct Lowering<'a> {
    pub(crate) func: &'a mut IrFunction,
    pub(crate) layout: &'a dyn TypeLayout,
    pub(crate) symbols: &'a mut dyn SymbolSink,
    pub(crate) routine: String,
}

/// Lower every bytecode node of `func` in place
pub fn run(
    func: &mut IrFunction,
    layout: &dyn TypeLayout,
    symbols: &mut dyn SymbolSink,
) -> Result<(), CompileError> {
    let routine = func.name.clone();
    let mut lowering = Lowering {
        func,
        layout,
        symbols,
        routine,
    };
    lowering.run()
}

impl Lowering<'_> {
    fn run(&mut self) -> Result<(), CompileError> {
        // Snapshot the bytecode nodes up front: lowering inserts IR nodes
        // and splits blocks, but never creates new bytecode nodes.
        let mut worklist = Vec::new();
        for block in self.func.block_ids() {
            for node in self.func.block_instrs(block) {
                if self.func.node(node).bc_op().is_some() {
                    worklist.push(node);
                }
            }
        }
        for node in worklist {
            if self.func.node(node).is_empty() {
                continue;
            }
            self.dispatch(node)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, node: NodeId) -> Result<(), CompileError> {
        let op = match self.func.node(node).bc_op() {
            Some(op) => op,
            None => return Ok(()),
        };

        if op.is_unsupported() {
            return Err(CompileError::unsupported(&self.routine, op.mnemonic()));
        }
        if op.is_invalid_at_lowering() {
            return Err(CompileError::invalid_state(
                &self.routine,
                format!("{op} must not reach lowering"),
            ));
        }

        match op {
            BcOpcode::Nop => {
                Context::on(self.func, node).set_instruction(IrOp::Nop, None, &[]);
            }
            BcOpcode::Break => {
                Context::on(self.func, node).set_instruction(IrOp::Break, None, &[]);
            }
            // the front end resolves stack traffic; nothing remains here
            BcOpcode::Dup | BcOpcode::Pop => {
                Context::on(self.func, node).empty();
            }

            BcOpcode::LoadArg | BcOpcode::LoadLocal | BcOpcode::LoadConst => {
                self.lower_load_move(node);
            }
            BcOpcode::LoadArgAddress | BcOpcode::LoadLocalAddress => {
                Context::on(self.func, node).replace_opcode_only(IrOp::AddressOf);
            }
            BcOpcode::StoreLocal | BcOpcode::StoreArg => {
                let result = self.result_of(node)?;
                let value = self.func.node(node).operand(0);
                Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[value]);
            }

            BcOpcode::LoadString => self.lower_load_string(node)?,
            BcOpcode::LoadIndirect => self.lower_load_indirect(node)?,
            BcOpcode::StoreIndirect => self.lower_store_indirect(node)?,
            BcOpcode::LoadField => self.lower_load_field(node)?,
            BcOpcode::LoadFieldAddress => self.lower_load_field_address(node)?,
            BcOpcode::StoreField => self.lower_store_field(node)?,
            BcOpcode::LoadStaticField => self.lower_load_static_field(node)?,
            BcOpcode::LoadStaticFieldAddress => {
                let result = self.result_of(node)?;
                let field = self.field_of(node)?;
                let ty = self.layout.ir_type_of(self.layout.field_type(field));
                let field_op = self.func.operands.field_ref(field, ty);
                Context::on(self.func, node).set_instruction(
                    IrOp::AddressOf,
                    Some(result),
                    &[field_op],
                );
            }
            BcOpcode::StoreStaticField => self.lower_store_static_field(node)?,
            BcOpcode::LoadFunction => {
                let result = self.result_of(node)?;
                let method = self.invoke_method_of(node)?;
                let name = self.layout.method_full_name(method);
                let symbol = self.func.operands.method_symbol(name, method);
                Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[symbol]);
            }
            BcOpcode::LoadVirtualFunction => {
                let result = self.result_of(node)?;
                let receiver = self.func.node(node).operand(0);
                self.replace_with_helper_call(
                    node,
                    RuntimeHelper::GetVirtualFunctionPtr,
                    Some(result),
                    &[receiver],
                );
            }
            BcOpcode::LoadToken => self.lower_load_token(node)?,
            BcOpcode::LoadLength => self.lower_load_length(node)?,
            BcOpcode::LoadElement => self.lower_load_element(node)?,
            BcOpcode::LoadElementAddress => self.lower_load_element_address(node)?,
            BcOpcode::StoreElement => self.lower_store_element(node)?,

            BcOpcode::Add => self.lower_arith_by_type(node, IrOp::AddFloat, IrOp::AddSigned, IrOp::AddUnsigned)?,
            BcOpcode::Sub => self.lower_arith_by_type(node, IrOp::SubFloat, IrOp::SubSigned, IrOp::SubUnsigned)?,
            BcOpcode::Mul => self.lower_arith_by_type(node, IrOp::MulFloat, IrOp::MulSigned, IrOp::MulUnsigned)?,
            BcOpcode::Div => self.lower_arith_by_type(node, IrOp::DivFloat, IrOp::DivSigned, IrOp::DivUnsigned)?,
            BcOpcode::Rem => self.lower_arith_by_type(node, IrOp::RemFloat, IrOp::RemSigned, IrOp::RemUnsigned)?,
            BcOpcode::DivUnsigned => self.lower_binary(node, IrOp::DivUnsigned)?,
            BcOpcode::RemUnsigned => self.lower_binary(node, IrOp::RemUnsigned)?,
            BcOpcode::And => self.lower_binary(node, IrOp::LogicalAnd)?,
            BcOpcode::Or => self.lower_binary(node, IrOp::LogicalOr)?,
            BcOpcode::Xor => self.lower_binary(node, IrOp::LogicalXor)?,
            BcOpcode::Shl => self.lower_binary(node, IrOp::ShiftLeft)?,
            BcOpcode::Shr => self.lower_binary(node, IrOp::ArithmeticShiftRight)?,
            BcOpcode::ShrUnsigned => self.lower_binary(node, IrOp::ShiftRight)?,
            BcOpcode::Not => {
                let result = self.result_of(node)?;
                let operand = self.func.node(node).operand(0);
                Context::on(self.func, node).set_instruction(
                    IrOp::LogicalNot,
                    Some(result),
                    &[operand],
                );
            }
            BcOpcode::Neg => self.lower_neg(node)?,

            BcOpcode::Compare => self.lower_compare(node)?,
            BcOpcode::Branch => {
                Context::on(self.func, node).replace_opcode_only(IrOp::Jmp);
            }
            BcOpcode::BranchTrue => self.lower_unary_branch(node, ConditionCode::NotEqual)?,
            BcOpcode::BranchFalse => self.lower_unary_branch(node, ConditionCode::Equal)?,
            BcOpcode::CompareBranch => self.lower_compare_branch(node)?,
            BcOpcode::Switch => {
                Context::on(self.func, node).replace_opcode_only(IrOp::Switch);
            }
            BcOpcode::Return => {
                Context::on(self.func, node).replace_opcode_only(IrOp::Return);
            }

            BcOpcode::Call => self.lower_call(node)?,
            BcOpcode::CallVirtual => self.lower_call_virtual(node)?,
            BcOpcode::CallIndirect => self.lower_call_indirect(node)?,

            BcOpcode::NewObject => self.lower_new_object(node)?,
            BcOpcode::NewArray => self.lower_new_array(node)?,
            BcOpcode::Box => self.lower_box(node)?,
            BcOpcode::Unbox | BcOpcode::UnboxAny => self.lower_unbox(node)?,
            BcOpcode::CastClass => {
                Context::on(self.func, node).replace_opcode_only(IrOp::Move);
            }
            BcOpcode::IsInstance => self.lower_is_instance(node)?,
            BcOpcode::InitObject => self.lower_init_object(node)?,
            BcOpcode::SizeOf => {
                let result = self.result_of(node)?;
                let ty = self.bc_type_of(node)?;
                let size = if self.layout.ir_type_of(ty).is_pointer() {
                    self.layout.pointer_size()
                } else {
                    self.layout.type_size(ty)
                };
                let size_op = self.iconst(size as u64);
                Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[size_op]);
            }
            BcOpcode::CopyBlock => {
                let operands: Vec<_> = self.func.node(node).operands().to_vec();
                self.replace_with_helper_call(node, RuntimeHelper::MemoryCopy, None, &operands);
            }
            BcOpcode::InitBlock => {
                let operands: Vec<_> = self.func.node(node).operands().to_vec();
                self.replace_with_helper_call(node, RuntimeHelper::MemorySet, None, &operands);
            }

            BcOpcode::Convert => {
                let mut ctx = Context::on(self.func, node);
                convert::lower_conversion(&mut ctx, node, &self.routine)?;
            }

            // handled by the guards above
            BcOpcode::ArgList
            | BcOpcode::LocalAlloc
            | BcOpcode::RefAnyType
            | BcOpcode::RefAnyValue
            | BcOpcode::MakeRefAny
            | BcOpcode::CopyObject
            | BcOpcode::Prefix
            | BcOpcode::Leave
            | BcOpcode::EndFinally
            | BcOpcode::EndFilter
            | BcOpcode::Throw
            | BcOpcode::Rethrow => unreachable!("classified earlier"),
        }
        Ok(())
    }

    // ===== Small shared pieces =====

    pub(crate) fn vreg(&mut self, ty: IrType) -> OperandId {
        self.func.operands.virtual_register(ty)
    }

    /// 32-bit integer constant, the default immediate width
    pub(crate) fn iconst(&mut self, value: u64) -> OperandId {
        let pointer_size = self.func.pointer_size;
        self.func.operands.const_int(IrType::I32, value, pointer_size)
    }

    pub(crate) fn typed_const(&mut self, ty: IrType, value: u64) -> OperandId {
        let pointer_size = self.func.pointer_size;
        self.func.operands.const_int(ty, value, pointer_size)
    }

    pub(crate) fn result_of(&self, node: NodeId) -> Result<OperandId, CompileError> {
        self.func.node(node).result().ok_or_else(|| {
            CompileError::invalid_state(&self.routine, "instruction requires a result operand")
        })
    }

    pub(crate) fn field_of(&self, node: NodeId) -> Result<sable_bytecode::FieldId, CompileError> {
        self.func.node(node).field.ok_or_else(|| {
            CompileError::invalid_state(&self.routine, "instruction carries no field token")
        })
    }

    pub(crate) fn bc_type_of(&self, node: NodeId) -> Result<sable_bytecode::TypeId, CompileError> {
        self.func.node(node).bc_type.ok_or_else(|| {
            CompileError::invalid_state(&self.routine, "instruction carries no type token")
        })
    }

    pub(crate) fn invoke_method_of(&self, node: NodeId) -> Result<MethodId, CompileError> {
        self.func.node(node).invoke_method.ok_or_else(|| {
            CompileError::invalid_state(&self.routine, "call carries no method token")
        })
    }

    /// Pick the move form for a plain load from `source_ty`
    fn move_op_for(source_ty: &IrType) -> IrOp {
        if source_ty.must_sign_extend_on_load() {
            IrOp::SignExtendedMove
        } else if source_ty.must_zero_extend_on_load() {
            IrOp::ZeroExtendedMove
        } else {
            IrOp::Move
        }
    }

    /// Pick the load form for a memory access of `element_ty`
    pub(crate) fn load_op_for(element_ty: &IrType) -> IrOp {
        if element_ty.must_sign_extend_on_load() {
            IrOp::LoadSignExtended
        } else if element_ty.must_zero_extend_on_load() {
            IrOp::LoadZeroExtended
        } else {
            IrOp::Load
        }
    }

    fn lower_load_move(&mut self, node: NodeId) {
        let source = self.func.node(node).operand(0);
        let Some(result) = self.func.node(node).result() else {
            // a load whose value the front end dropped
            Context::on(self.func, node).empty();
            return;
        };
        let source_ty = self.func.operands.ty(source).clone();
        let op = Self::move_op_for(&source_ty);
        let size = OpSize::from_type(&source_ty);
        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(op, Some(result), &[source]);
        ctx.set_size(size);
    }

    fn lower_binary(&mut self, node: NodeId, op: IrOp) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        Context::on(self.func, node).set_instruction(op, Some(result), &[a, b]);
        Ok(())
    }

    fn lower_arith_by_type(
        &mut self,
        node: NodeId,
        float_op: IrOp,
        signed_op: IrOp,
        unsigned_op: IrOp,
    ) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let result_ty = self.func.operands.ty(result).clone();
        let op = if result_ty.is_float() {
            float_op
        } else if result_ty.is_unsigned_int() {
            unsigned_op
        } else {
            signed_op
        };
        self.lower_binary(node, op)
    }

    fn lower_neg(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let operand = self.func.node(node).operand(0);
        let ty = self.func.operands.ty(operand).clone();
        if ty.is_unsigned_int() {
            let zero = self.typed_const(ty, 0);
            Context::on(self.func, node).set_instruction(
                IrOp::SubUnsigned,
                Some(result),
                &[zero, operand],
            );
        } else if ty == IrType::F32 {
            let minus_one = self.func.operands.const_f32(-1.0);
            Context::on(self.func, node).set_instruction(
                IrOp::MulFloat,
                Some(result),
                &[minus_one, operand],
            );
        } else if ty == IrType::F64 {
            let minus_one = self.func.operands.const_f64(-1.0);
            Context::on(self.func, node).set_instruction(
                IrOp::MulFloat,
                Some(result),
                &[minus_one, operand],
            );
        } else {
            let minus_one = self.typed_const(ty, u64::MAX);
            Context::on(self.func, node).set_instruction(
                IrOp::MulSigned,
                Some(result),
                &[minus_one, operand],
            );
        }
        Ok(())
    }

    fn condition_of(&self, node: NodeId) -> Result<ConditionCode, CompileError> {
        self.func.node(node).condition.ok_or_else(|| {
            CompileError::invalid_state(&self.routine, "comparison carries no condition code")
        })
    }

    fn lower_compare(&mut self, node: NodeId) -> Result<(), CompileError> {
        let cc = self.condition_of(node)?;
        let result = self.result_of(node)?;
        let a = self.func.node(node).operand(0);
        let b = self.func.node(node).operand(1);
        let op = if self.func.operands.ty(a).is_float() {
            IrOp::FloatCompare
        } else {
            IrOp::IntegerCompare
        };
        Context::on(self.func, node).set_instruction_cc(op, cc, Some(result), &[a, b]);
        Ok(())
    }

    fn branch_target_of(&self, node: NodeId) -> Result<crate::ir::BlockId, CompileError> {
        self.func
            .node(node)
            .branch_targets
            .first()
            .copied()
            .ok_or_else(|| {
                CompileError::invalid_state(&self.routine, "branch carries no target block")
            })
    }

    fn lower_unary_branch(
        &mut self,
        node: NodeId,
        cc: ConditionCode,
    ) -> Result<(), CompileError> {
        let target = self.branch_target_of(node)?;
        let first = self.func.node(node).operand(0);
        let zero = self.iconst(0);
        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction_cc(IrOp::IntegerCompareBranch, cc, None, &[first, zero]);
        ctx.add_branch_target(target);
        Ok(())
    }

    fn lower_compare_branch(&mut self, node: NodeId) -> Result<(), CompileError> {
        let cc = self.condition_of(node)?;
        let target = self.branch_target_of(node)?;
        let first = self.func.node(node).operand(0);
        let second = self.func.node(node).operand(1);

        if self.func.operands.ty(first).is_float() {
            let compared = self.vreg(IrType::I32);
            let one = self.iconst(1);
            let mut ctx = Context::on(self.func, node);
            ctx.set_instruction_cc(IrOp::FloatCompare, cc, Some(compared), &[first, second]);
            ctx.append_instruction_cc(
                IrOp::IntegerCompareBranch,
                ConditionCode::Equal,
                None,
                &[compared, one],
            );
            ctx.add_branch_target(target);
        } else {
            let mut ctx = Context::on(self.func, node);
            ctx.set_instruction_cc(IrOp::IntegerCompareBranch, cc, None, &[first, second]);
            ctx.add_branch_target(target);
        }
        Ok(())
    }

    /// Rewrite the node into a call to a runtime helper
    pub(crate) fn replace_with_helper_call(
        &mut self,
        node: NodeId,
        helper: RuntimeHelper,
        result: Option<OperandId>,
        args: &[OperandId],
    ) {
        let symbol = self
            .func
            .operands
            .runtime_symbol(helper.symbol_name().to_string());
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(symbol);
        operands.extend_from_slice(args);
        Context::on(self.func, node).set_instruction(IrOp::Call, result, &operands);
    }

    /// Rewrite the node into a direct call through a method symbol
    pub(crate) fn process_invoke(
        &mut self,
        node: NodeId,
        method: MethodId,
        callee: OperandId,
        result: Option<OperandId>,
        args: &[OperandId],
    ) {
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend_from_slice(args);
        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(IrOp::Call, result, &operands);
        ctx.set_invoke_method(method);
    }

    /// Materialize the runtime type handle for `ty` ahead of `node`
    pub(crate) fn runtime_type_handle(
        &mut self,
        node: NodeId,
        ty: sable_bytecode::TypeId,
    ) -> OperandId {
        let symbol_name = format!(
            "{}{}",
            self.layout.type_name(ty),
            crate::symbols::TYPE_DEFINITION_SUFFIX
        );
        let symbol = self.func.operands.data_symbol(symbol_name);
        let handle = self.vreg(IrType::UnmanagedPtr);
        Context::on(self.func, node).insert_before_instruction(
            IrOp::Move,
            Some(handle),
            &[symbol],
        );
        handle
    }

    fn lower_call_indirect(&mut self, node: NodeId) -> Result<(), CompileError> {
        let operands: Vec<_> = self.func.node(node).operands().to_vec();
        let Some((&callee, args)) = operands.split_last() else {
            return Err(CompileError::invalid_state(
                &self.routine,
                "indirect call without a target operand",
            ));
        };
        let result = self.func.node(node).result();
        let args = args.to_vec();
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(callee);
        all.extend_from_slice(&args);
        Context::on(self.func, node).set_instruction(IrOp::Call, result, &all);
        Ok(())
    }
}

#[cfg(test)]
mod tests;

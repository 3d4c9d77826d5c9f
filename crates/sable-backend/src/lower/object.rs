//! Object, field, array, call, and boxing lowering
//!
//! Everything here encodes a memory-layout decision as graph rewrites:
//! field offsets become address arithmetic, virtual dispatch becomes
//! pointer chasing through the type descriptor, array accesses gain
//! synthesized bounds-check blocks, and value types get boxed or
//! stack-allocated as the call shape demands.

use sable_bytecode::TypeId;

use super::Lowering;
use crate::error::CompileError;
use crate::ir::{ConditionCode, Context, IrOp, IrType, NodeId, OpSize, OperandId};
use crate::layout::aligned_type_size;
use crate::symbols::{string_literal_bytes, LinkRequest, RuntimeHelper, TYPE_DEFINITION_SUFFIX};

/// Pointer-sized fields in the type descriptor before the method table
const METHOD_TABLE_HEADER_SLOTS: u32 = 14;
/// Offset of the code pointer within a method descriptor, in pointer words
const METHOD_POINTER_SLOT: u32 = 4;
/// Offset of the interface slot table within the type descriptor
const INTERFACE_SLOT_TABLE_SLOT: u32 = 11;
/// Pointer words in the array header before the length field
const ARRAY_LENGTH_SLOT: u32 = 2;
/// Pointer words in the array header before the element data
const ARRAY_DATA_SLOT: u32 = 3;

impl Lowering<'_> {
    // ===== String literals =====

    pub(super) fn lower_load_string(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let literal = self.func.node(node).operand(0);

        let (symbol_name, data) = match &self.func.operands.get(literal).kind {
            crate::ir::OperandKind::Constant(crate::ir::ConstValue::Str { symbol, data }) => {
                (symbol.clone(), data.clone())
            }
            _ => {
                return Err(CompileError::invalid_state(
                    &self.routine,
                    "ldstr operand is not a string literal",
                ))
            }
        };

        Context::on(self.func, node).set_instruction(IrOp::Move, Some(result), &[literal]);

        let pointer_size = self.func.pointer_size;
        let bytes = string_literal_bytes(&data, pointer_size);
        self.symbols.define_rodata(&symbol_name, pointer_size, &bytes);
        // identical literals share one emission but each reference re-links
        self.symbols.link_absolute(LinkRequest {
            within: symbol_name,
            offset: 0,
            target: format!("System.String{}", TYPE_DEFINITION_SUFFIX),
        });
        Ok(())
    }

    // ===== Indirect and field access =====

    pub(super) fn lower_load_indirect(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let source = self.func.node(node).operand(0);
        let ty = self.bc_type_of(node)?;
        let element_ty = self.layout.ir_type_of(ty);
        let op = Self::load_op_for(&element_ty);
        let size = OpSize::from_type(&element_ty);
        let zero = self.iconst(0);
        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(op, Some(result), &[source, zero]);
        ctx.set_size(size);
        ctx.set_bc_type(ty);
        Ok(())
    }

    pub(super) fn lower_store_indirect(&mut self, node: NodeId) -> Result<(), CompileError> {
        let base = self.func.node(node).operand(0);
        let value = self.func.node(node).operand(1);
        let ty = self.bc_type_of(node)?;
        let element_ty = self.layout.ir_type_of(ty);
        let size = OpSize::from_type(&element_ty);
        let op = if self.layout.is_compound(ty) {
            IrOp::CompoundStore
        } else {
            IrOp::Store
        };
        let zero = self.iconst(0);
        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(op, None, &[base, zero, value]);
        ctx.set_size(size);
        ctx.set_bc_type(ty);
        Ok(())
    }

    /// Give a non-pointer value-type base an address: route it through a
    /// stack local and take that local's address
    fn address_of_value_base(&mut self, node: NodeId, base: OperandId) -> OperandId {
        let base_ty = self.func.operands.ty(base).clone();
        let mut local = base;
        if !self.func.operands.is_stack_local(local) {
            let slot = self.func.operands.stack_local(base_ty, false);
            Context::on(self.func, node).insert_before_instruction(
                IrOp::Move,
                Some(slot),
                &[local],
            );
            local = slot;
        }
        let pointer = self.vreg(IrType::ManagedPtr);
        Context::on(self.func, node).insert_before_instruction(
            IrOp::AddressOf,
            Some(pointer),
            &[local],
        );
        pointer
    }

    pub(super) fn lower_load_field(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let mut object = self.func.node(node).operand(0);
        let field = self.field_of(node)?;

        let object_ty = self.func.operands.ty(object).clone();
        if !object_ty.is_pointer() && matches!(object_ty, IrType::ValueType(_)) {
            object = self.address_of_value_base(node, object);
        }

        let field_ty = self.layout.ir_type_of(self.layout.field_type(field));
        let offset = self.layout.field_offset(field);
        let offset_op = self.iconst(offset as u64);
        let op = Self::load_op_for(&field_ty);
        let size = OpSize::from_type(&field_ty);

        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(op, Some(result), &[object, offset_op]);
        ctx.set_size(size);
        ctx.set_field(field);
        Ok(())
    }

    pub(super) fn lower_load_field_address(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let object = self.func.node(node).operand(0);
        let field = self.field_of(node)?;
        let offset = self.layout.field_offset(field);
        let offset_op = self.iconst(offset as u64);
        Context::on(self.func, node).set_instruction(
            IrOp::AddUnsigned,
            Some(result),
            &[object, offset_op],
        );
        Ok(())
    }

    pub(super) fn lower_store_field(&mut self, node: NodeId) -> Result<(), CompileError> {
        let object = self.func.node(node).operand(0);
        let value = self.func.node(node).operand(1);
        let field = self.field_of(node)?;

        let field_ty = self.layout.ir_type_of(self.layout.field_type(field));
        let offset = self.layout.field_offset(field);
        let offset_op = self.iconst(offset as u64);
        let size = OpSize::from_type(&field_ty);
        let temp = self.vreg(field_ty);

        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(IrOp::Move, Some(temp), &[value]);
        ctx.append_instruction(IrOp::Store, None, &[object, offset_op, temp]);
        ctx.set_size(size);
        ctx.set_field(field);
        Ok(())
    }

    pub(super) fn lower_load_static_field(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let field = self.field_of(node)?;
        let field_ty = self.layout.ir_type_of(self.layout.field_type(field));
        let field_op = self.func.operands.field_ref(field, field_ty.clone());
        let op = Self::load_op_for(&field_ty);
        let size = OpSize::from_type(&field_ty);
        let zero = self.iconst(0);
        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(op, Some(result), &[field_op, zero]);
        ctx.set_size(size);
        ctx.set_field(field);
        Ok(())
    }

    pub(super) fn lower_store_static_field(&mut self, node: NodeId) -> Result<(), CompileError> {
        let value = self.func.node(node).operand(0);
        let field = self.field_of(node)?;
        let field_ty = self.layout.ir_type_of(self.layout.field_type(field));
        let field_op = self.func.operands.field_ref(field, field_ty.clone());
        let size = OpSize::from_type(&field_ty);
        let zero = self.iconst(0);
        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(IrOp::Store, None, &[field_op, zero, value]);
        ctx.set_size(size);
        ctx.set_field(field);
        Ok(())
    }

    pub(super) fn lower_load_token(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let symbol = if let Some(ty) = self.func.node(node).bc_type {
            let name = format!("{}{}", self.layout.type_name(ty), TYPE_DEFINITION_SUFFIX);
            self.func.operands.data_symbol(name)
        } else if let Some(field) = self.func.node(node).field {
            let name = format!("field#{}$fielddef", field.0);
            self.func.operands.data_symbol(name)
        } else {
            return Err(CompileError::invalid_state(
                &self.routine,
                "ldtoken carries neither a type nor a field token",
            ));
        };
        let handle = self.vreg(IrType::UnmanagedPtr);
        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(IrOp::Move, Some(handle), &[symbol]);
        ctx.append_instruction(IrOp::Move, Some(result), &[handle]);
        Ok(())
    }

    // ===== Arrays =====

    pub(super) fn lower_load_length(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let array = self.func.node(node).operand(0);
        let pointer_size = self.func.pointer_size;
        let address = self.vreg(IrType::ManagedPtr);
        let offset = self.iconst((pointer_size * ARRAY_LENGTH_SLOT) as u64);
        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(IrOp::Move, Some(address), &[array]);
        ctx.append_instruction(IrOp::Load, Some(result), &[address, offset]);
        Ok(())
    }

    /// Insert the bounds check ahead of `node`: load the length, compare
    /// unsigned against the index, branch to a synthesized trap block
    fn add_array_bounds_check(&mut self, node: NodeId, array: OperandId, index: OperandId) {
        let pointer_size = self.func.pointer_size;
        let check = self.func.insert_node_before(node);
        let next_block = self.func.split_after(check);
        let trap_block = self.func.create_block();

        let length = self.vreg(IrType::U32);
        let length_offset = self.iconst((pointer_size * ARRAY_LENGTH_SLOT) as u64);
        let mut ctx = Context::on(self.func, check);
        ctx.set_instruction(IrOp::Load, Some(length), &[array, length_offset]);
        ctx.append_instruction_cc(
            IrOp::IntegerCompareBranch,
            ConditionCode::UnsignedGreaterOrEqual,
            None,
            &[index, length],
        );
        ctx.add_branch_target(trap_block);
        ctx.append_instruction(IrOp::Jmp, None, &[]);
        ctx.add_branch_target(next_block);

        let trap_symbol = self
            .func
            .operands
            .runtime_symbol(RuntimeHelper::ThrowIndexOutOfRange.symbol_name().to_string());
        let mut trap_ctx = Context::append_to_block(self.func, trap_block);
        trap_ctx.set_instruction(IrOp::Call, None, &[trap_symbol]);
    }

    /// Element size with alignment rounding
    fn array_element_size(&self, element: TypeId) -> u32 {
        let size = self.layout.type_size(element);
        let alignment = self.layout.type_alignment(element);
        crate::layout::align_up(size, alignment)
    }

    /// Compute `array + data_offset` ahead of `node`
    fn load_array_base_address(&mut self, node: NodeId, array: OperandId) -> OperandId {
        let pointer_size = self.func.pointer_size;
        let address = self.vreg(IrType::ManagedPtr);
        let offset = self.iconst((pointer_size * ARRAY_DATA_SLOT) as u64);
        Context::on(self.func, node).insert_before_instruction(
            IrOp::AddSigned,
            Some(address),
            &[array, offset],
        );
        address
    }

    /// Compute `index * element_size` ahead of `node`
    fn array_element_offset(
        &mut self,
        node: NodeId,
        element: TypeId,
        index: OperandId,
    ) -> OperandId {
        let element_size = self.array_element_size(element);
        let offset = self.vreg(IrType::I32);
        let size_op = self.iconst(element_size as u64);
        Context::on(self.func, node).insert_before_instruction(
            IrOp::MulSigned,
            Some(offset),
            &[index, size_op],
        );
        offset
    }

    fn array_element_type(&self, node: NodeId) -> Result<TypeId, CompileError> {
        self.func.node(node).bc_type.ok_or_else(|| {
            CompileError::invalid_state(&self.routine, "array access carries no element type token")
        })
    }

    pub(super) fn lower_load_element(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let array = self.func.node(node).operand(0);
        let index = self.func.node(node).operand(1);
        let element = self.array_element_type(node)?;

        self.add_array_bounds_check(node, array, index);

        let element_ty = self.layout.ir_type_of(element);
        let op = Self::load_op_for(&element_ty);
        let size = OpSize::from_type(&element_ty);

        let base = self.load_array_base_address(node, array);
        let offset = self.array_element_offset(node, element, index);
        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(op, Some(result), &[base, offset]);
        ctx.set_size(size);
        Ok(())
    }

    pub(super) fn lower_load_element_address(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let array = self.func.node(node).operand(0);
        let index = self.func.node(node).operand(1);
        let element = self.array_element_type(node)?;

        self.add_array_bounds_check(node, array, index);

        let base = self.load_array_base_address(node, array);
        let offset = self.array_element_offset(node, element, index);
        Context::on(self.func, node).set_instruction(
            IrOp::AddSigned,
            Some(result),
            &[base, offset],
        );
        Ok(())
    }

    pub(super) fn lower_store_element(&mut self, node: NodeId) -> Result<(), CompileError> {
        let array = self.func.node(node).operand(0);
        let index = self.func.node(node).operand(1);
        let value = self.func.node(node).operand(2);
        let element = self.array_element_type(node)?;

        self.add_array_bounds_check(node, array, index);

        let element_ty = self.layout.ir_type_of(element);
        let size = OpSize::from_type(&element_ty);
        let base = self.load_array_base_address(node, array);
        let offset = self.array_element_offset(node, element, index);
        let mut ctx = Context::on(self.func, node);
        ctx.set_instruction(IrOp::Store, None, &[base, offset, value]);
        ctx.set_size(size);
        Ok(())
    }

    // ===== Calls =====

    /// Box or pointer-adjust a value-type receiver of a virtual method
    ///
    /// A callee that overrides a root-type method accepts the adjusted
    /// value pointer directly; anything else needs the value boxed.
    fn adjust_value_type_receiver(&mut self, node: NodeId, method: sable_bytecode::MethodId) {
        let receiver = self.func.node(node).operand(0);
        let declaring = self.layout.method_declaring_type(method);
        let pointer_size = self.func.pointer_size;

        if self.layout.overrides_root_method(method) {
            let adjust = self.iconst((pointer_size * 2) as u64);
            Context::on(self.func, node).insert_before_instruction(
                IrOp::SubSigned,
                Some(receiver),
                &[receiver, adjust],
            );
        } else {
            let type_size = aligned_type_size(self.layout, declaring);
            let boxed = self.vreg(IrType::ObjectRef);
            let handle = self.runtime_type_handle(node, declaring);
            let symbol = self
                .func
                .operands
                .runtime_symbol(RuntimeHelper::Box.symbol_name().to_string());
            let size_op = self.iconst(type_size as u64);
            let mut ctx = Context::on(self.func, node);
            ctx.insert_before_instruction(
                IrOp::Call,
                Some(boxed),
                &[symbol, handle, receiver, size_op],
            );
            ctx.set_operand(0, boxed);
        }
    }

    fn receiver_is_value_pointer(&self, node: NodeId, method: sable_bytecode::MethodId) -> bool {
        if self.func.node(node).operand_count() == 0 {
            return false;
        }
        let receiver = self.func.node(node).operand(0);
        let declaring = self.layout.method_declaring_type(method);
        self.layout.method_is_virtual(method)
            && self.layout.is_value_type(declaring)
            && matches!(
                self.func.operands.ty(receiver),
                IrType::ManagedPtr | IrType::UnmanagedPtr
            )
    }

    pub(super) fn lower_call(&mut self, node: NodeId) -> Result<(), CompileError> {
        let method = self.invoke_method_of(node)?;

        // the root object constructor calling itself terminates the chain
        let callee_name = self.layout.method_full_name(method);
        if callee_name == "System.Object::.ctor" && self.routine == callee_name {
            Context::on(self.func, node).empty();
            return Ok(());
        }

        if self.receiver_is_value_pointer(node, method) {
            self.adjust_value_type_receiver(node, method);
        }

        let result = self.func.node(node).result();
        let args: Vec<_> = self.func.node(node).operands().to_vec();
        let name = self.layout.method_full_name(method);
        let symbol = self.func.operands.method_symbol(name, method);
        self.process_invoke(node, method, symbol, result, &args);
        Ok(())
    }

    pub(super) fn lower_call_virtual(&mut self, node: NodeId) -> Result<(), CompileError> {
        let method = self.invoke_method_of(node)?;
        if !self.layout.method_is_virtual(method) {
            return self.lower_call(node);
        }

        let result = self.func.node(node).result();
        let args: Vec<_> = self.func.node(node).operands().to_vec();
        let this_ptr = *args.first().ok_or_else(|| {
            CompileError::invalid_state(&self.routine, "virtual call without a receiver")
        })?;

        let pointer_size = self.func.pointer_size;
        let declaring = self.layout.method_declaring_type(method);
        let type_descriptor = self.vreg(IrType::UnmanagedPtr);
        let method_descriptor = self.vreg(IrType::UnmanagedPtr);
        let method_ptr = self.vreg(IrType::UnmanagedPtr);

        let method_pointer_offset = self.iconst((pointer_size * METHOD_POINTER_SLOT) as u64);
        let zero = self.iconst(0);

        if !self.layout.is_interface(declaring) {
            let slot = self.layout.method_table_slot(method);
            let descriptor_offset = self
                .iconst((pointer_size * (slot + METHOD_TABLE_HEADER_SLOTS)) as u64);

            let mut ctx = Context::on(self.func, node);
            ctx.set_instruction(IrOp::Load, Some(type_descriptor), &[this_ptr, zero]);
            ctx.set_size(OpSize::Native);
            ctx.append_instruction(
                IrOp::Load,
                Some(method_descriptor),
                &[type_descriptor, descriptor_offset],
            );
            ctx.set_size(OpSize::Native);
            ctx.append_instruction(
                IrOp::Load,
                Some(method_ptr),
                &[method_descriptor, method_pointer_offset],
            );
            ctx.set_size(OpSize::Native);
            ctx.append_instruction(IrOp::Nop, None, &[]);
            let call_node = ctx.node_id();
            self.process_invoke(call_node, method, method_ptr, result, &args);
        } else {
            let interface_slot = self.layout.interface_slot(declaring);
            let slot = self.layout.method_table_slot(method);

            let slot_table_offset =
                self.iconst((pointer_size * INTERFACE_SLOT_TABLE_SLOT) as u64);
            let method_table_offset =
                self.iconst((pointer_size * (1 + interface_slot)) as u64);
            let descriptor_offset = self.iconst((pointer_size * (2 + slot)) as u64);

            let interface_slot_ptr = self.vreg(IrType::UnmanagedPtr);
            let interface_method_table = self.vreg(IrType::UnmanagedPtr);

            let mut ctx = Context::on(self.func, node);
            ctx.set_instruction(IrOp::Load, Some(type_descriptor), &[this_ptr, zero]);
            ctx.set_size(OpSize::Native);
            ctx.append_instruction(
                IrOp::Load,
                Some(interface_slot_ptr),
                &[type_descriptor, slot_table_offset],
            );
            ctx.set_size(OpSize::Native);
            ctx.append_instruction(
                IrOp::Load,
                Some(interface_method_table),
                &[interface_slot_ptr, method_table_offset],
            );
            ctx.set_size(OpSize::Native);
            ctx.append_instruction(
                IrOp::Load,
                Some(method_descriptor),
                &[interface_method_table, descriptor_offset],
            );
            ctx.set_size(OpSize::Native);
            ctx.append_instruction(
                IrOp::Load,
                Some(method_ptr),
                &[method_descriptor, method_pointer_offset],
            );
            ctx.set_size(OpSize::Native);
            ctx.append_instruction(IrOp::Nop, None, &[]);
            let call_node = ctx.node_id();
            self.process_invoke(call_node, method, method_ptr, result, &args);
        }
        Ok(())
    }

    // ===== Allocation and boxing =====

    pub(super) fn lower_new_object(&mut self, node: NodeId) -> Result<(), CompileError> {
        let ctor = self.invoke_method_of(node)?;
        let class_type = self.layout.method_declaring_type(ctor);
        let this_reference = self.result_of(node)?;
        let args: Vec<_> = self.func.node(node).operands().to_vec();

        let this_value = if self.layout.is_compound(class_type) {
            // stack-allocate: no heap traffic for compound value types
            let local = self
                .func
                .operands
                .stack_local(IrType::ValueType(class_type), false);
            let pointer = self.vreg(IrType::ManagedPtr);
            Context::on(self.func, node).insert_before_instruction(
                IrOp::AddressOf,
                Some(pointer),
                &[local],
            );

            // later uses of the constructed value read the stack local
            let mut cursor = self.func.next_instr(node);
            while let Some(current) = cursor {
                if !self.func.node(current).is_empty() {
                    for index in 0..self.func.node(current).operand_count() {
                        if self.func.node(current).operand(index) == this_reference {
                            Context::on(self.func, current).set_operand(index, local);
                        }
                    }
                }
                cursor = self.func.next_instr(current);
            }
            pointer
        } else {
            let size = self.layout.type_size(class_type);
            let handle = self.runtime_type_handle(node, class_type);
            let symbol = self
                .func
                .operands
                .runtime_symbol(RuntimeHelper::AllocateObject.symbol_name().to_string());
            let size_op = self.iconst(size as u64);
            Context::on(self.func, node).insert_before_instruction(
                IrOp::Call,
                Some(this_reference),
                &[symbol, handle, size_op],
            );
            this_reference
        };

        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(this_value);
        operands.extend_from_slice(&args);
        let name = self.layout.method_full_name(ctor);
        let symbol = self.func.operands.method_symbol(name, ctor);
        self.process_invoke(node, ctor, symbol, None, &operands);
        Ok(())
    }

    pub(super) fn lower_new_array(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let length = self.func.node(node).operand(0);
        let array_type = self.bc_type_of(node)?;
        let element = self.layout.element_type(array_type).ok_or_else(|| {
            CompileError::invalid_state(&self.routine, "newarr on a non-array type")
        })?;

        let element_size = self.array_element_size(element);
        let handle = self.runtime_type_handle(node, array_type);
        let size_op = self.iconst(element_size as u64);
        self.replace_with_helper_call(
            node,
            RuntimeHelper::AllocateArray,
            Some(result),
            &[handle, size_op, length],
        );
        Ok(())
    }

    fn box_helper_for(&self, ty: TypeId, aligned_size: u32) -> RuntimeHelper {
        match self.layout.ir_type_of(ty) {
            IrType::F32 => RuntimeHelper::BoxFloat32,
            IrType::F64 => RuntimeHelper::BoxFloat64,
            _ if aligned_size <= 4 => RuntimeHelper::Box32,
            _ if aligned_size == 8 => RuntimeHelper::Box64,
            _ => RuntimeHelper::Box,
        }
    }

    fn unbox_helper_for(aligned_size: u32) -> RuntimeHelper {
        if aligned_size <= 4 {
            RuntimeHelper::Unbox32
        } else if aligned_size == 8 {
            RuntimeHelper::Unbox64
        } else {
            RuntimeHelper::Unbox
        }
    }

    pub(super) fn lower_box(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let value = self.func.node(node).operand(0);
        let ty = self.bc_type_of(node)?;

        if !self.layout.is_value_type(ty) {
            Context::on(self.func, node).replace_opcode_only(IrOp::Move);
            return Ok(());
        }

        let size = aligned_type_size(self.layout, ty);
        let helper = self.box_helper_for(ty, size);
        let handle = self.runtime_type_handle(node, ty);

        if helper == RuntimeHelper::Box {
            // generic boxing goes through the value's address
            let address = self.vreg(IrType::ManagedPtr);
            Context::on(self.func, node).insert_before_instruction(
                IrOp::AddressOf,
                Some(address),
                &[value],
            );
            let size_op = self.iconst(size as u64);
            self.replace_with_helper_call(node, helper, Some(result), &[handle, address, size_op]);
        } else {
            self.replace_with_helper_call(node, helper, Some(result), &[handle, value]);
        }
        Ok(())
    }

    pub(super) fn lower_unbox(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let value = self.func.node(node).operand(0);
        let ty = self.bc_type_of(node)?;

        if !self.layout.is_value_type(ty) {
            Context::on(self.func, node).replace_opcode_only(IrOp::Move);
            return Ok(());
        }

        let size = aligned_type_size(self.layout, ty);
        let helper = Self::unbox_helper_for(size);
        let temp = self.vreg(IrType::ManagedPtr);

        if helper == RuntimeHelper::Unbox {
            let local = self.func.operands.stack_local(IrType::ValueType(ty), false);
            let address = self.vreg(IrType::ManagedPtr);
            Context::on(self.func, node).insert_before_instruction(
                IrOp::AddressOf,
                Some(address),
                &[local],
            );
            let size_op = self.iconst(size as u64);
            self.replace_with_helper_call(node, helper, Some(temp), &[value, address, size_op]);
        } else {
            self.replace_with_helper_call(node, helper, Some(temp), &[value]);
        }

        // the helper hands back a pointer to the payload
        let value_ty = self.layout.ir_type_of(ty);
        let zero = self.iconst(0);
        let mut ctx = Context::on(self.func, node);
        ctx.append_instruction(IrOp::Load, Some(result), &[temp, zero]);
        ctx.set_size(OpSize::from_type(&value_ty));
        Ok(())
    }

    pub(super) fn lower_is_instance(&mut self, node: NodeId) -> Result<(), CompileError> {
        let result = self.result_of(node)?;
        let reference = self.func.node(node).operand(0);
        let class_type = self.bc_type_of(node)?;

        if !self.layout.is_interface(class_type) {
            let handle = self.runtime_type_handle(node, class_type);
            self.replace_with_helper_call(
                node,
                RuntimeHelper::IsInstanceOfType,
                Some(result),
                &[handle, reference],
            );
        } else {
            let slot = self.layout.interface_slot(class_type);
            let slot_op = self.iconst(slot as u64);
            self.replace_with_helper_call(
                node,
                RuntimeHelper::IsInstanceOfInterfaceType,
                Some(result),
                &[slot_op, reference],
            );
        }
        Ok(())
    }

    pub(super) fn lower_init_object(&mut self, node: NodeId) -> Result<(), CompileError> {
        let pointer = self.func.node(node).operand(0);
        let ty = self.bc_type_of(node)?;
        let size = self.layout.type_size(ty);
        let zero = self.iconst(0);
        let size_op = self.iconst(size as u64);
        self.replace_with_helper_call(
            node,
            RuntimeHelper::MemorySet,
            None,
            &[pointer, zero, size_op],
        );
        Ok(())
    }
}

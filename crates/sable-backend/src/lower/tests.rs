//! Lowering tests: graphs are built by hand the way the front end would,
//! then lowered against a small metadata registry.

use sable_bytecode::{BcOpcode, TypeKind, TypeRegistry};

use super::run;
use crate::ir::{
    BlockId, ConditionCode, Context, IrFunction, IrOp, IrType, NodeId, OpSize, Opcode, OperandId,
};
use crate::symbols::MemorySymbolSink;

struct Fixture {
    registry: TypeRegistry,
    func: IrFunction,
    block: BlockId,
    sink: MemorySymbolSink,
}

impl Fixture {
    fn new() -> Self {
        let registry = TypeRegistry::new(4);
        let mut func = IrFunction::new("Demo::routine", 4);
        let block = func.create_block();
        func.add_head_block(block);
        Fixture {
            registry,
            func,
            block,
            sink: MemorySymbolSink::new(),
        }
    }

    fn bc(&mut self, op: BcOpcode, result: Option<OperandId>, operands: &[OperandId]) -> NodeId {
        let mut ctx = Context::append_to_block(&mut self.func, self.block);
        ctx.set_instruction(op, result, operands);
        ctx.node_id()
    }

    fn lower(&mut self) -> Result<(), crate::error::CompileError> {
        run(&mut self.func, &self.registry, &mut self.sink)
    }

    fn ops_in(&self, block: BlockId) -> Vec<Opcode> {
        self.func
            .block_instrs(block)
            .into_iter()
            .map(|n| self.func.node(n).opcode)
            .filter(|op| *op != Opcode::Empty)
            .collect()
    }
}

#[test]
fn test_load_local_plain_move() {
    let mut f = Fixture::new();
    let local = f.func.operands.stack_local(IrType::I32, false);
    let dest = f.func.operands.virtual_register(IrType::I32);
    let n = f.bc(BcOpcode::LoadLocal, Some(dest), &[local]);

    f.lower().unwrap();
    let node = f.func.node(n);
    assert!(node.is(IrOp::Move));
    assert_eq!(node.size, OpSize::Size32);
    f.func.validate().unwrap();
}

#[test]
fn test_load_local_sub_word_extends() {
    let mut f = Fixture::new();
    let signed = f.func.operands.stack_local(IrType::I8, false);
    let unsigned = f.func.operands.stack_local(IrType::U16, false);
    let d1 = f.func.operands.virtual_register(IrType::I32);
    let d2 = f.func.operands.virtual_register(IrType::I32);
    let n1 = f.bc(BcOpcode::LoadLocal, Some(d1), &[signed]);
    let n2 = f.bc(BcOpcode::LoadLocal, Some(d2), &[unsigned]);

    f.lower().unwrap();
    assert!(f.func.node(n1).is(IrOp::SignExtendedMove));
    assert_eq!(f.func.node(n1).size, OpSize::Size8);
    assert!(f.func.node(n2).is(IrOp::ZeroExtendedMove));
    assert_eq!(f.func.node(n2).size, OpSize::Size16);
}

#[test]
fn test_store_local_is_move() {
    let mut f = Fixture::new();
    let local = f.func.operands.stack_local(IrType::I32, false);
    let value = f.func.operands.virtual_register(IrType::I32);
    let n = f.bc(BcOpcode::StoreLocal, Some(local), &[value]);

    f.lower().unwrap();
    assert!(f.func.node(n).is(IrOp::Move));
    assert_eq!(f.func.node(n).result(), Some(local));
}

#[test]
fn test_field_load_offset_and_extension() {
    let mut f = Fixture::new();
    let i16t = f.registry.register_type("i16", TypeKind::I16, None).unwrap();
    let object = f.registry.object_type();
    let node_ty = f.registry.register_type("Node", TypeKind::Class, Some(object)).unwrap();
    let field = f.registry.add_field(node_ty, "val", i16t, false);

    let obj = f.func.operands.virtual_register(IrType::ObjectRef);
    let dest = f.func.operands.virtual_register(IrType::I32);
    let n = f.bc(BcOpcode::LoadField, Some(dest), &[obj]);
    Context::on(&mut f.func, n).set_field(field);

    f.lower().unwrap();
    let node = f.func.node(n);
    assert!(node.is(IrOp::LoadSignExtended));
    // two-pointer header on the 32-bit target
    assert_eq!(f.func.operands.const_u64(node.operand(1)), Some(8));
    assert_eq!(node.size, OpSize::Size16);
}

#[test]
fn test_field_load_through_value_base_inserts_address_of() {
    // scenario: loading a field via a non-pointer value-type local that
    // lacks a preceding address-of goes through a fresh stack local
    let mut f = Fixture::new();
    let i32t = f.registry.register_type("i32", TypeKind::I32, None).unwrap();
    let pair = f.registry.register_type("Pair", TypeKind::Struct, None).unwrap();
    let field = f.registry.add_field(pair, "x", i32t, false);

    // the base is a value-typed virtual register, not a stack local
    let base = f.func.operands.virtual_register(IrType::ValueType(pair));
    let dest = f.func.operands.virtual_register(IrType::I32);
    let n = f.bc(BcOpcode::LoadField, Some(dest), &[base]);
    Context::on(&mut f.func, n).set_field(field);

    f.lower().unwrap();

    let ops = f.ops_in(f.block);
    assert_eq!(
        ops,
        vec![
            Opcode::Ir(IrOp::Move),      // spill the value into a stack local
            Opcode::Ir(IrOp::AddressOf), // take its address
            Opcode::Ir(IrOp::Load),
        ]
    );
    // the load now goes through the managed pointer, not the raw value
    let load = f.func.node(n);
    assert_eq!(*f.func.operands.ty(load.operand(0)), IrType::ManagedPtr);
    f.func.validate().unwrap();
}

#[test]
fn test_field_load_through_value_stack_local_skips_spill() {
    let mut f = Fixture::new();
    let i32t = f.registry.register_type("i32", TypeKind::I32, None).unwrap();
    let pair = f.registry.register_type("Pair", TypeKind::Struct, None).unwrap();
    let field = f.registry.add_field(pair, "x", i32t, false);

    let base = f.func.operands.stack_local(IrType::ValueType(pair), false);
    let dest = f.func.operands.virtual_register(IrType::I32);
    let n = f.bc(BcOpcode::LoadField, Some(dest), &[base]);
    Context::on(&mut f.func, n).set_field(field);

    f.lower().unwrap();
    let ops = f.ops_in(f.block);
    assert_eq!(ops, vec![Opcode::Ir(IrOp::AddressOf), Opcode::Ir(IrOp::Load)]);
}

#[test]
fn test_store_field_goes_through_temp() {
    let mut f = Fixture::new();
    let i32t = f.registry.register_type("i32", TypeKind::I32, None).unwrap();
    let object = f.registry.object_type();
    let node_ty = f.registry.register_type("Node", TypeKind::Class, Some(object)).unwrap();
    let field = f.registry.add_field(node_ty, "val", i32t, false);

    let obj = f.func.operands.virtual_register(IrType::ObjectRef);
    let value = f.func.operands.virtual_register(IrType::I32);
    let n = f.bc(BcOpcode::StoreField, None, &[obj, value]);
    Context::on(&mut f.func, n).set_field(field);

    f.lower().unwrap();
    // move into a temp, then the store
    assert!(f.func.node(n).is(IrOp::Move));
    let store = f.func.next_instr(n).unwrap();
    assert!(f.func.node(store).is(IrOp::Store));
    assert_eq!(f.func.node(store).operand(0), obj);
    assert_eq!(f.func.node(store).operand_count(), 3);
    f.func.validate().unwrap();
}

#[test]
fn test_array_load_synthesizes_bounds_check() {
    let mut f = Fixture::new();
    let i32t = f.registry.register_type("i32", TypeKind::I32, None).unwrap();

    let array = f.func.operands.virtual_register(IrType::Array(Box::new(IrType::I32)));
    let index = f.func.operands.virtual_register(IrType::I32);
    let dest = f.func.operands.virtual_register(IrType::I32);
    let n = f.bc(BcOpcode::LoadElement, Some(dest), &[array, index]);
    Context::on(&mut f.func, n).set_bc_type(i32t);

    f.lower().unwrap();

    // entry block: length load, unsigned compare-branch, jmp
    let entry_ops = f.ops_in(f.block);
    assert_eq!(
        entry_ops,
        vec![
            Opcode::Ir(IrOp::Load),
            Opcode::Ir(IrOp::IntegerCompareBranch),
            Opcode::Ir(IrOp::Jmp),
        ]
    );
    let check = f.func.block_instrs(f.block)[1];
    assert_eq!(
        f.func.node(check).condition,
        Some(ConditionCode::UnsignedGreaterOrEqual)
    );

    // the access itself moved into the fallthrough block
    let access_block = f.func.node(n).block;
    assert_ne!(access_block, f.block);
    let access_ops = f.ops_in(access_block);
    assert_eq!(
        access_ops,
        vec![
            Opcode::Ir(IrOp::AddSigned),  // array data base
            Opcode::Ir(IrOp::MulSigned),  // index * element size
            Opcode::Ir(IrOp::Load),
        ]
    );

    // the trap block calls the out-of-range helper
    let trap_block = f.func.node(check).branch_targets[0];
    let trap_ops = f.ops_in(trap_block);
    assert_eq!(trap_ops, vec![Opcode::Ir(IrOp::Call)]);
    assert_eq!(f.func.block(trap_block).predecessors, vec![f.block]);

    // length at 2 pointer words, data at 3
    let length_load = f.func.block_instrs(f.block)[0];
    assert_eq!(
        f.func.operands.const_u64(f.func.node(length_load).operand(1)),
        Some(8)
    );
    let base = f.func.block_instrs(access_block)[0];
    assert_eq!(
        f.func.operands.const_u64(f.func.node(base).operand(1)),
        Some(12)
    );
    f.func.validate().unwrap();
}

#[test]
fn test_virtual_call_pointer_chase() {
    let mut f = Fixture::new();
    let object = f.registry.object_type();
    let base = f.registry.register_type("Base", TypeKind::Class, Some(object)).unwrap();
    let _m0 = f.registry.add_method(base, "first", true, false, None);
    let m1 = f.registry.add_method(base, "second", true, false, None);

    let recv = f.func.operands.virtual_register(IrType::ObjectRef);
    let result = f.func.operands.virtual_register(IrType::I32);
    let n = f.bc(BcOpcode::CallVirtual, Some(result), &[recv]);
    Context::on(&mut f.func, n).set_invoke_method(m1);

    f.lower().unwrap();

    let ops = f.ops_in(f.block);
    assert_eq!(
        ops,
        vec![
            Opcode::Ir(IrOp::Load), // type descriptor
            Opcode::Ir(IrOp::Load), // method descriptor
            Opcode::Ir(IrOp::Load), // code pointer
            Opcode::Ir(IrOp::Call),
        ]
    );

    // method descriptor offset: (slot 1 + 14 header slots) * 4 bytes
    let nodes = f.func.block_instrs(f.block);
    let live: Vec<_> = nodes.iter().filter(|&&x| !f.func.node(x).is_empty()).collect();
    let mdef = f.func.node(*live[1]);
    assert_eq!(f.func.operands.const_u64(mdef.operand(1)), Some(60));
    // code pointer at 4 pointer words into the method descriptor
    let mptr = f.func.node(*live[2]);
    assert_eq!(f.func.operands.const_u64(mptr.operand(1)), Some(16));

    // the call goes through the loaded code pointer, receiver still first arg
    let call = f.func.node(*live[3]);
    assert!(call.is(IrOp::Call));
    assert_eq!(call.operand(0), mptr.result().unwrap());
    assert_eq!(call.operand(1), recv);
    assert_eq!(call.invoke_method, Some(m1));
    f.func.validate().unwrap();
}

#[test]
fn test_interface_call_extra_indirection() {
    let mut f = Fixture::new();
    let iface = f.registry.register_type("IThing", TypeKind::Interface, None).unwrap();
    let m = f.registry.add_method(iface, "go", true, false, None);

    let recv = f.func.operands.virtual_register(IrType::ObjectRef);
    let n = f.bc(BcOpcode::CallVirtual, None, &[recv]);
    Context::on(&mut f.func, n).set_invoke_method(m);

    f.lower().unwrap();

    let ops = f.ops_in(f.block);
    assert_eq!(
        ops,
        vec![
            Opcode::Ir(IrOp::Load), // type descriptor
            Opcode::Ir(IrOp::Load), // interface slot table
            Opcode::Ir(IrOp::Load), // interface method table
            Opcode::Ir(IrOp::Load), // method descriptor
            Opcode::Ir(IrOp::Load), // code pointer
            Opcode::Ir(IrOp::Call),
        ]
    );

    let nodes = f.func.block_instrs(f.block);
    let live: Vec<_> = nodes.iter().filter(|&&x| !f.func.node(x).is_empty()).collect();
    // interface slot table at 11 pointer words
    assert_eq!(
        f.func.operands.const_u64(f.func.node(*live[1]).operand(1)),
        Some(44)
    );
    // slot 0 interface: method table at (1 + 0) pointer words
    assert_eq!(
        f.func.operands.const_u64(f.func.node(*live[2]).operand(1)),
        Some(4)
    );
}

#[test]
fn test_new_object_reference_type_allocates() {
    let mut f = Fixture::new();
    let object = f.registry.object_type();
    let node_ty = f.registry.register_type("Node", TypeKind::Class, Some(object)).unwrap();
    let ctor = f.registry.add_method(node_ty, ".ctor", false, false, None);

    let result = f.func.operands.virtual_register(IrType::ObjectRef);
    let n = f.bc(BcOpcode::NewObject, Some(result), &[]);
    Context::on(&mut f.func, n).set_invoke_method(ctor);

    f.lower().unwrap();

    let ops = f.ops_in(f.block);
    assert_eq!(
        ops,
        vec![
            Opcode::Ir(IrOp::Move), // type handle
            Opcode::Ir(IrOp::Call), // AllocateObject
            Opcode::Ir(IrOp::Call), // the constructor
        ]
    );
    // the ctor call receives the allocated reference as its receiver
    let ctor_call = f.func.node(n);
    assert_eq!(ctor_call.operand(1), result);
    assert_eq!(ctor_call.result(), None);
    f.func.validate().unwrap();
}

#[test]
fn test_new_object_compound_uses_stack_slot() {
    let mut f = Fixture::new();
    let i32t = f.registry.register_type("i32", TypeKind::I32, None).unwrap();
    let pair = f.registry.register_type("Pair", TypeKind::Struct, None).unwrap();
    f.registry.add_field(pair, "x", i32t, false);
    let ctor = f.registry.add_method(pair, ".ctor", false, false, None);

    let result = f.func.operands.virtual_register(IrType::ValueType(pair));
    let n = f.bc(BcOpcode::NewObject, Some(result), &[]);
    Context::on(&mut f.func, n).set_invoke_method(ctor);

    // a later use of the constructed value
    let sink = f.func.operands.virtual_register(IrType::ValueType(pair));
    let use_node = f.bc(BcOpcode::StoreLocal, Some(sink), &[result]);

    f.lower().unwrap();

    // no heap allocation call, only address-of + ctor call
    let ops = f.ops_in(f.block);
    assert_eq!(
        ops,
        vec![
            Opcode::Ir(IrOp::AddressOf),
            Opcode::Ir(IrOp::Call),
            Opcode::Ir(IrOp::Move),
        ]
    );
    // the later use now reads the stack local, not the old register
    let rewritten = f.func.node(use_node).operand(0);
    assert!(f.func.operands.is_stack_local(rewritten));
    f.func.validate().unwrap();
}

#[test]
fn test_box_variants_by_size() {
    let mut f = Fixture::new();
    let i32t = f.registry.register_type("i32", TypeKind::I32, None).unwrap();
    let i64t = f.registry.register_type("i64", TypeKind::I64, None).unwrap();
    let f32t = f.registry.register_type("f32", TypeKind::F32, None).unwrap();

    let cases = [
        (i32t, "Box32"),
        (i64t, "Box64"),
        (f32t, "BoxFloat32"),
    ];
    for (ty, expected) in cases {
        let value_ty = ir_ty(&f.registry, ty);
        let value = f.func.operands.virtual_register(value_ty);
        let result = f.func.operands.virtual_register(IrType::ObjectRef);
        let n = f.bc(BcOpcode::Box, Some(result), &[value]);
        Context::on(&mut f.func, n).set_bc_type(ty);
        f.lower().unwrap();

        let call = f.func.node(n);
        assert!(call.is(IrOp::Call), "boxing {expected}");
        let callee = call.operand(0);
        let name = match &f.func.operands.get(callee).kind {
            crate::ir::OperandKind::Symbol { name, .. } => name.clone(),
            other => panic!("expected symbol callee, got {other:?}"),
        };
        assert!(name.ends_with(expected), "{name} should end with {expected}");
        // result lands in the fresh destination register
        assert_eq!(call.result(), Some(result));
    }
}

#[test]
fn test_box_generic_goes_through_address() {
    let mut f = Fixture::new();
    let i64t = f.registry.register_type("i64", TypeKind::I64, None).unwrap();
    let big = f.registry.register_type("Big", TypeKind::Struct, None).unwrap();
    f.registry.add_field(big, "a", i64t, false);
    f.registry.add_field(big, "b", i64t, false);

    let value = f.func.operands.stack_local(IrType::ValueType(big), false);
    let result = f.func.operands.virtual_register(IrType::ObjectRef);
    let n = f.bc(BcOpcode::Box, Some(result), &[value]);
    Context::on(&mut f.func, n).set_bc_type(big);

    f.lower().unwrap();
    let ops = f.ops_in(f.block);
    assert_eq!(
        ops,
        vec![
            Opcode::Ir(IrOp::Move),      // type handle
            Opcode::Ir(IrOp::AddressOf), // address of the value
            Opcode::Ir(IrOp::Call),
        ]
    );
    // generic box carries (handle, address, size)
    assert_eq!(f.func.node(n).operand_count(), 4);
}

#[test]
fn test_box_reference_type_degrades_to_move() {
    let mut f = Fixture::new();
    let object = f.registry.object_type();
    let value = f.func.operands.virtual_register(IrType::ObjectRef);
    let result = f.func.operands.virtual_register(IrType::ObjectRef);
    let n = f.bc(BcOpcode::Box, Some(result), &[value]);
    Context::on(&mut f.func, n).set_bc_type(object);

    f.lower().unwrap();
    assert!(f.func.node(n).is(IrOp::Move));
}

#[test]
fn test_unbox_loads_through_payload_pointer() {
    let mut f = Fixture::new();
    let i32t = f.registry.register_type("i32", TypeKind::I32, None).unwrap();

    let boxed = f.func.operands.virtual_register(IrType::ObjectRef);
    let result = f.func.operands.virtual_register(IrType::I32);
    let n = f.bc(BcOpcode::UnboxAny, Some(result), &[boxed]);
    Context::on(&mut f.func, n).set_bc_type(i32t);

    f.lower().unwrap();
    assert!(f.func.node(n).is(IrOp::Call));
    let load = f.func.next_instr(n).unwrap();
    assert!(f.func.node(load).is(IrOp::Load));
    assert_eq!(f.func.node(load).result(), Some(result));
    assert_eq!(f.func.node(load).size, OpSize::Size32);
}

#[test]
fn test_load_string_emits_interned_symbol() {
    let mut f = Fixture::new();
    let lit1 = f
        .func
        .operands
        .string_literal("$str$greeting".to_string(), "hey".to_string());
    let d1 = f.func.operands.virtual_register(IrType::ObjectRef);
    f.bc(BcOpcode::LoadString, Some(d1), &[lit1]);

    let lit2 = f
        .func
        .operands
        .string_literal("$str$greeting".to_string(), "hey".to_string());
    let d2 = f.func.operands.virtual_register(IrType::ObjectRef);
    f.bc(BcOpcode::LoadString, Some(d2), &[lit2]);

    f.lower().unwrap();

    // one emission, two link requests
    assert_eq!(f.sink.symbol_count(), 1);
    let (_, bytes) = f.sink.symbol("$str$greeting").unwrap();
    // 3 pointer words + 3 UTF-16 units
    assert_eq!(bytes.len(), 12 + 6);
    assert_eq!(f.sink.links().len(), 2);
    assert!(f.sink.links()[0].target.contains("System.String"));
}

#[test]
fn test_conversion_dispatches_to_table() {
    let mut f = Fixture::new();
    let src = f.func.operands.virtual_register(IrType::I32);
    let dest = f.func.operands.virtual_register(IrType::I8);
    let n = f.bc(BcOpcode::Convert, Some(dest), &[src]);
    f.lower().unwrap();
    assert!(f.func.node(n).is(IrOp::LogicalAnd));
}

#[test]
fn test_unsupported_opcode_fails_routine() {
    let mut f = Fixture::new();
    f.bc(BcOpcode::LocalAlloc, None, &[]);
    let err = f.lower().unwrap_err();
    assert!(!err.is_defect());
    assert!(err.to_string().contains("localloc"));
    assert_eq!(err.routine(), "Demo::routine");
}

#[test]
fn test_invalid_state_opcode_is_defect() {
    let mut f = Fixture::new();
    f.bc(BcOpcode::Leave, None, &[]);
    let err = f.lower().unwrap_err();
    assert!(err.is_defect());
}

#[test]
fn test_unary_branch_compares_against_zero() {
    let mut f = Fixture::new();
    let target = f.func.create_block();
    let cond = f.func.operands.virtual_register(IrType::I32);
    let n = f.bc(BcOpcode::BranchTrue, None, &[cond]);
    Context::on(&mut f.func, n).add_branch_target(target);

    f.lower().unwrap();
    let node = f.func.node(n);
    assert!(node.is(IrOp::IntegerCompareBranch));
    assert_eq!(node.condition, Some(ConditionCode::NotEqual));
    assert!(f.func.operands.is_constant_zero(node.operand(1)));
    assert_eq!(node.branch_targets, vec![target]);
    assert_eq!(f.func.block(f.block).successors, vec![target]);
}

#[test]
fn test_float_compare_branch_goes_through_boolean() {
    let mut f = Fixture::new();
    let target = f.func.create_block();
    let a = f.func.operands.virtual_register(IrType::F64);
    let b = f.func.operands.virtual_register(IrType::F64);
    let n = f.bc(BcOpcode::CompareBranch, None, &[a, b]);
    {
        let mut ctx = Context::on(&mut f.func, n);
        ctx.set_condition(ConditionCode::LessThan);
        ctx.add_branch_target(target);
    }

    f.lower().unwrap();
    assert!(f.func.node(n).is(IrOp::FloatCompare));
    let branch = f.func.next_instr(n).unwrap();
    let branch_node = f.func.node(branch);
    assert!(branch_node.is(IrOp::IntegerCompareBranch));
    assert_eq!(branch_node.condition, Some(ConditionCode::Equal));
    assert!(f.func.operands.is_constant_one(branch_node.operand(1)));
    assert_eq!(branch_node.branch_targets, vec![target]);
}

#[test]
fn test_value_receiver_adjust_when_overriding_root() {
    let mut f = Fixture::new();
    let object = f.registry.object_type();
    let value_type = f.registry.type_by_name("System.ValueType").unwrap();
    let to_string = f.registry.add_method(object, "ToString", true, false, None);
    let wrapper = f
        .registry
        .register_type("Wrapper", TypeKind::Struct, Some(value_type))
        .unwrap();
    let own = f.registry.add_method(wrapper, "ToString", true, false, Some(to_string));

    let recv = f.func.operands.virtual_register(IrType::ManagedPtr);
    let result = f.func.operands.virtual_register(IrType::ObjectRef);
    let n = f.bc(BcOpcode::Call, Some(result), &[recv]);
    Context::on(&mut f.func, n).set_invoke_method(own);

    f.lower().unwrap();
    let ops = f.ops_in(f.block);
    assert_eq!(ops, vec![Opcode::Ir(IrOp::SubSigned), Opcode::Ir(IrOp::Call)]);
    // adjusted by two pointer words
    let adjust = f.func.block_instrs(f.block)[0];
    assert_eq!(f.func.operands.const_u64(f.func.node(adjust).operand(1)), Some(8));
}

#[test]
fn test_value_receiver_boxed_when_not_overriding() {
    let mut f = Fixture::new();
    let value_type = f.registry.type_by_name("System.ValueType").unwrap();
    let wrapper = f
        .registry
        .register_type("Wrapper", TypeKind::Struct, Some(value_type))
        .unwrap();
    let i32t = f.registry.register_type("i32", TypeKind::I32, None).unwrap();
    f.registry.add_field(wrapper, "x", i32t, false);
    let own = f.registry.add_method(wrapper, "Fresh", true, false, None);

    let recv = f.func.operands.virtual_register(IrType::ManagedPtr);
    let n = f.bc(BcOpcode::Call, None, &[recv]);
    Context::on(&mut f.func, n).set_invoke_method(own);

    f.lower().unwrap();
    let ops = f.ops_in(f.block);
    assert_eq!(
        ops,
        vec![
            Opcode::Ir(IrOp::Move), // type handle
            Opcode::Ir(IrOp::Call), // Box
            Opcode::Ir(IrOp::Call), // the invocation, now on the boxed value
        ]
    );
    f.func.validate().unwrap();
}

fn ir_ty(registry: &TypeRegistry, ty: sable_bytecode::TypeId) -> IrType {
    use crate::layout::TypeLayout;
    registry.ir_type_of(ty)
}

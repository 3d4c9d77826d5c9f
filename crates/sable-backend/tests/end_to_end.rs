//! End-to-end checks through the public API: a front-end-shaped graph in,
//! an allocator-ready routine out.

use parking_lot::Mutex;
use sable_backend::pipeline::compile_batch;
use sable_backend::{
    CompilerOptions, ConditionCode, Context, IrFunction, IrOp, IrType, MemorySymbolSink,
    MethodCompiler,
};
use sable_bytecode::{BcOpcode, TypeKind, TypeRegistry};

fn registry() -> TypeRegistry {
    TypeRegistry::new(4)
}

/// if (a < b) return 1; else return 0;  with constant inputs
fn branching_routine(name: &str, a: i32, b: i32) -> IrFunction {
    let mut func = IrFunction::new(name, 4);
    let entry = func.create_block();
    let then_block = func.create_block();
    let else_block = func.create_block();
    func.add_head_block(entry);

    let lhs = func.operands.const_int(IrType::I32, a as u64, 4);
    let rhs = func.operands.const_int(IrType::I32, b as u64, 4);

    let mut ctx = Context::append_to_block(&mut func, entry);
    ctx.set_instruction(BcOpcode::CompareBranch, None, &[lhs, rhs]);
    ctx.set_condition(ConditionCode::LessThan);
    ctx.add_branch_target(then_block);
    ctx.append_instruction(BcOpcode::Branch, None, &[]);
    ctx.add_branch_target(else_block);

    let one = func.operands.const_int(IrType::I32, 1, 4);
    let mut ctx = Context::append_to_block(&mut func, then_block);
    ctx.set_instruction(BcOpcode::Return, None, &[one]);

    let zero = func.operands.const_int(IrType::I32, 0, 4);
    let mut ctx = Context::append_to_block(&mut func, else_block);
    ctx.set_instruction(BcOpcode::Return, None, &[zero]);

    func
}

#[test]
fn test_branch_resolves_statically_true() {
    let registry = registry();
    let mut sink = MemorySymbolSink::new();
    let options = CompilerOptions::default();

    let compiled = MethodCompiler::new(branching_routine("Demo::taken", 1, 2), &registry, &options)
        .compile(&mut sink)
        .unwrap();
    compiled.func.validate().unwrap();

    // 1 < 2: the branch resolved to an unconditional jump to the then
    // block, and the else block went dead
    let entry = compiled.func.head_blocks()[0];
    let live: Vec<_> = compiled
        .func
        .block_instrs(entry)
        .into_iter()
        .filter(|&n| !compiled.func.node(n).is_empty())
        .collect();
    assert_eq!(live.len(), 1);
    let jump = compiled.func.node(live[0]);
    assert!(jump.is(IrOp::Jmp));

    let target = jump.branch_targets[0];
    let target_live: Vec<_> = compiled
        .func
        .block_instrs(target)
        .into_iter()
        .filter(|&n| !compiled.func.node(n).is_empty())
        .collect();
    assert_eq!(target_live.len(), 1);
    let ret = compiled.func.node(target_live[0]);
    assert!(ret.is(IrOp::Return));
    assert_eq!(compiled.func.operands.const_u64(ret.operand(0)), Some(1));
}

#[test]
fn test_branch_resolves_statically_false() {
    let registry = registry();
    let mut sink = MemorySymbolSink::new();
    let options = CompilerOptions::default();

    let compiled = MethodCompiler::new(branching_routine("Demo::nottaken", 5, 2), &registry, &options)
        .compile(&mut sink)
        .unwrap();

    let entry = compiled.func.head_blocks()[0];
    let live: Vec<_> = compiled
        .func
        .block_instrs(entry)
        .into_iter()
        .filter(|&n| !compiled.func.node(n).is_empty())
        .collect();
    assert_eq!(live.len(), 1);
    let jump = compiled.func.node(live[0]);
    assert!(jump.is(IrOp::Jmp));
    let target = jump.branch_targets[0];
    let ret_node = compiled
        .func
        .block_instrs(target)
        .into_iter()
        .find(|&n| !compiled.func.node(n).is_empty())
        .unwrap();
    let ret = compiled.func.node(ret_node);
    assert_eq!(compiled.func.operands.const_u64(ret.operand(0)), Some(0));
}

#[test]
fn test_field_access_routine_compiles_to_valid_graph() {
    let mut registry = registry();
    let i32t = registry.register_type("i32", TypeKind::I32, None).unwrap();
    let object = registry.object_type();
    let node_ty = registry
        .register_type("Node", TypeKind::Class, Some(object))
        .unwrap();
    let field = registry.add_field(node_ty, "value", i32t, false);

    let mut func = IrFunction::new("Node::get", 4);
    let block = func.create_block();
    func.add_head_block(block);
    let this_param = func.operands.parameter(IrType::ObjectRef, 0);
    func.params.push(this_param);
    let loaded = func.operands.virtual_register(IrType::I32);
    let mut ctx = Context::append_to_block(&mut func, block);
    ctx.set_instruction(BcOpcode::LoadField, Some(loaded), &[this_param]);
    ctx.set_field(field);
    ctx.append_instruction(BcOpcode::Return, None, &[loaded]);

    let mut sink = MemorySymbolSink::new();
    let options = CompilerOptions::default();
    let compiled = MethodCompiler::new(func, &registry, &options)
        .compile(&mut sink)
        .unwrap();
    compiled.func.validate().unwrap();

    // a load at the field's offset, feeding the return
    let load = compiled
        .func
        .block_instrs(block)
        .into_iter()
        .find(|&n| compiled.func.node(n).is(IrOp::Load))
        .expect("field load survives");
    assert_eq!(
        compiled.func.operands.const_u64(compiled.func.node(load).operand(1)),
        Some(8)
    );
    // and it carries a live range for the allocator
    assert!(!compiled.live_ranges.is_empty());
}

#[test]
fn test_batch_reports_per_routine_outcomes() {
    let registry = registry();
    let sink = Mutex::new(MemorySymbolSink::new());
    let options = CompilerOptions::default();

    let mut bad = IrFunction::new("Demo::bad", 4);
    let block = bad.create_block();
    bad.add_head_block(block);
    Context::append_to_block(&mut bad, block).set_instruction(BcOpcode::ArgList, None, &[]);

    let batch = compile_batch(
        vec![branching_routine("Demo::ok", 1, 2), bad],
        &registry,
        &sink,
        &options,
    );

    assert!(batch.routines[0].is_ok());
    let err = batch.routines[1].as_ref().unwrap_err();
    assert_eq!(err.routine(), "Demo::bad");
    assert!(err.to_string().contains("arglist"));
}

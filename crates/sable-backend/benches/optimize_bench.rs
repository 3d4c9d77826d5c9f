//! Optimizer throughput on a constant-heavy routine

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use sable_backend::opt::{self, OptimizerOptions};
use sable_backend::{Context, IrFunction, IrOp, IrType};

/// A long straight-line chain of constant moves and additions
fn chain_routine(length: usize) -> IrFunction {
    let mut func = IrFunction::new("bench", 4);
    let block = func.create_block();
    func.add_head_block(block);

    let mut acc = func.operands.virtual_register(IrType::I32);
    let seed = func.operands.const_int(IrType::I32, 1, 4);
    let mut ctx = Context::append_to_block(&mut func, block);
    ctx.set_instruction(IrOp::Move, Some(acc), &[seed]);

    for step in 0..length {
        let increment = func.operands.const_int(IrType::I32, step as u64, 4);
        let next = func.operands.virtual_register(IrType::I32);
        let mut ctx = Context::append_to_block(&mut func, block);
        ctx.set_instruction(IrOp::AddSigned, Some(next), &[acc, increment]);
        acc = next;
    }

    let mut ctx = Context::append_to_block(&mut func, block);
    ctx.set_instruction(IrOp::Return, None, &[acc]);
    func
}

fn bench_optimize(c: &mut Criterion) {
    for length in [16usize, 256] {
        c.bench_function(&format!("optimize_chain_{length}"), |b| {
            b.iter_batched(
                || chain_routine(length),
                |mut func| {
                    opt::run(&mut func, &OptimizerOptions::default());
                    func
                },
                BatchSize::SmallInput,
            )
        });
    }
}

criterion_group!(benches, bench_optimize);
criterion_main!(benches);

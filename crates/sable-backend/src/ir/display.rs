//! Pretty-printing for the instruction graph
//!
//! Dump format used in debugging and test assertions.

use std::fmt;

use super::block::IrFunction;
use super::instr::{NodeId, Opcode};
use super::operand::{ConstValue, OperandId, OperandKind};

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "routine @{} {{", self.name)?;
        for block_id in self.block_ids() {
            let block = self.block(block_id);
            writeln!(f, "  {}:", block_id)?;
            if !block.predecessors.is_empty() {
                write!(f, "    ; preds:")?;
                for pred in &block.predecessors {
                    write!(f, " {}", pred)?;
                }
                writeln!(f)?;
            }
            for node_id in self.block_instrs(block_id) {
                if self.node(node_id).is_empty() {
                    continue;
                }
                writeln!(f, "    {}", InstrDisplay { func: self, node: node_id })?;
            }
        }
        writeln!(f, "}}")
    }
}

struct InstrDisplay<'a> {
    func: &'a IrFunction,
    node: NodeId,
}

impl fmt::Display for InstrDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.func.node(self.node);

        for (i, &result) in node.results().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", OperandDisplay { func: self.func, op: result })?;
        }
        if node.result_count() > 0 {
            write!(f, " = ")?;
        }

        match node.opcode {
            Opcode::Empty => write!(f, "<empty>")?,
            Opcode::Bc(op) => write!(f, "{}", op)?,
            Opcode::Ir(op) => write!(f, "{}", op.mnemonic())?,
        }
        if let Some(cc) = node.condition {
            write!(f, ".{}", cc.mnemonic())?;
        }

        for (i, &operand) in node.operands().iter().enumerate() {
            if i == 0 {
                write!(f, " ")?;
            } else {
                write!(f, ", ")?;
            }
            write!(f, "{}", OperandDisplay { func: self.func, op: operand })?;
        }

        for &target in &node.branch_targets {
            write!(f, " -> {}", target)?;
        }
        Ok(())
    }
}

struct OperandDisplay<'a> {
    func: &'a IrFunction,
    op: OperandId,
}

impl fmt::Display for OperandDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.func.operands.get(self.op);
        match &data.kind {
            OperandKind::VirtualRegister => write!(f, "v{} [{}]", self.op.0, data.ty),
            OperandKind::PhysicalRegister { reg } => write!(f, "r{}", reg),
            OperandKind::StackLocal { slot, .. } => write!(f, "stack{} [{}]", slot, data.ty),
            OperandKind::Parameter { index } => write!(f, "param{} [{}]", index, data.ty),
            OperandKind::Constant(value) => match value {
                ConstValue::Int(v) => write!(f, "const {} [{}]", v, data.ty),
                ConstValue::Float32(v) => write!(f, "const {} [f32]", v),
                ConstValue::Float64(v) => write!(f, "const {} [f64]", v),
                ConstValue::Str { symbol, .. } => write!(f, "str @{}", symbol),
            },
            OperandKind::Symbol { name, .. } => write!(f, "@{}", name),
            OperandKind::FieldRef(field) => write!(f, "field#{}", field.0),
            OperandKind::Memory { offset } => write!(f, "[mem{:+}]", offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::context::Context;
    use crate::ir::instr::{ConditionCode, IrOp};
    use crate::ir::types::IrType;

    #[test]
    fn test_dump_contains_instructions() {
        let mut func = IrFunction::new("dump", 4);
        let block = func.create_block();
        func.add_head_block(block);

        let three = func.operands.const_int(IrType::I32, 3, 4);
        let five = func.operands.const_int(IrType::I32, 5, 4);
        let dst = func.operands.virtual_register(IrType::I32);
        let mut ctx = Context::append_to_block(&mut func, block);
        ctx.set_instruction(IrOp::AddSigned, Some(dst), &[three, five]);

        let dump = format!("{}", func);
        assert!(dump.contains("routine @dump"));
        assert!(dump.contains("add.s"));
        assert!(dump.contains("const 3"));
        assert!(dump.contains("const 5"));
    }

    #[test]
    fn test_dump_hides_tombstones_and_shows_targets() {
        let mut func = IrFunction::new("dump2", 4);
        let b0 = func.create_block();
        let b1 = func.create_block();
        func.add_head_block(b0);

        let a = func.operands.const_int(IrType::I32, 1, 4);
        let b = func.operands.const_int(IrType::I32, 2, 4);
        let mut ctx = Context::append_to_block(&mut func, b0);
        ctx.set_instruction_cc(IrOp::IntegerCompareBranch, ConditionCode::Equal, None, &[a, b]);
        ctx.set_branch_targets(vec![b1]);
        ctx.append_instruction(IrOp::Nop, None, &[]);
        ctx.empty();

        let dump = format!("{}", func);
        assert!(dump.contains("ibranch.eq"));
        assert!(dump.contains("-> bb1"));
        assert!(!dump.contains("<empty>"));
        assert!(dump.contains("; preds: bb0"));
    }
}

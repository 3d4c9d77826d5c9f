//! Width-conversion selection
//!
//! Conversions are driven by a compile-time 2-D table indexed by the
//! destination and source width classes. Each entry picks a plain move,
//! an extending move, a mask-and-move (for truncating narrowings), or an
//! integer/float conversion; absent entries are conversions the design
//! declares impossible.

use crate::error::CompileError;
use crate::ir::{Context, IrOp, IrType, NodeId, OpSize};

/// Width classes, in table order
const I1: usize = 0;
const I2: usize = 1;
const I4: usize = 2;
const I8: usize = 3;
const U1: usize = 4;
const U2: usize = 5;
const U4: usize = 6;
const U8: usize = 7;
const R4: usize = 8;
const R8: usize = 9;
const I: usize = 10;
const U: usize = 11;
const PTR: usize = 12;

/// What a table entry tells the lowering to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conv {
    Move,
    SignExtend,
    ZeroExtend,
    /// Truncating narrowing: mask with the destination width
    Mask,
    IntToFloat,
    FloatToInt,
}

use Conv::*;

/// Conversion selection table: `CONV_TABLE[dest][source]`
#[rustfmt::skip]
const CONV_TABLE: [[Option<Conv>; 13]; 13] = [
    /*           I1               I2               I4               I8               U1               U2               U4               U8               R4                R8                I                U                Ptr       */
    /* I1  */ [Some(Move),       Some(Mask),      Some(Mask),      Some(Mask),      Some(Move),      Some(Mask),      Some(Mask),      Some(Mask),      Some(FloatToInt), Some(FloatToInt), Some(Mask),      Some(Mask),      Some(Mask)],
    /* I2  */ [Some(SignExtend), Some(Move),      Some(Mask),      Some(Mask),      Some(ZeroExtend),Some(Move),      Some(Mask),      Some(Mask),      Some(FloatToInt), Some(FloatToInt), Some(Mask),      Some(Mask),      Some(Mask)],
    /* I4  */ [Some(SignExtend), Some(SignExtend),Some(Move),      Some(Mask),      Some(ZeroExtend),Some(ZeroExtend),Some(Move),      Some(Mask),      Some(FloatToInt), Some(FloatToInt), Some(Mask),      Some(Mask),      Some(Mask)],
    /* I8  */ [Some(SignExtend), Some(SignExtend),Some(SignExtend),Some(Move),      Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(Move),      Some(FloatToInt), Some(FloatToInt), Some(Mask),      Some(Mask),      Some(Mask)],
    /* U1  */ [Some(Move),       Some(Mask),      Some(Mask),      Some(Mask),      Some(Move),      Some(Mask),      Some(Mask),      Some(Mask),      Some(FloatToInt), Some(FloatToInt), Some(Mask),      Some(Mask),      Some(Mask)],
    /* U2  */ [Some(ZeroExtend), Some(Move),      Some(Mask),      Some(Mask),      Some(ZeroExtend),Some(Move),      Some(Mask),      Some(Mask),      Some(FloatToInt), Some(FloatToInt), Some(Mask),      Some(Mask),      Some(Mask)],
    /* U4  */ [Some(ZeroExtend), Some(ZeroExtend),Some(Move),      Some(Mask),      Some(ZeroExtend),Some(ZeroExtend),Some(Move),      Some(Mask),      Some(FloatToInt), Some(FloatToInt), Some(Mask),      Some(Mask),      Some(Mask)],
    /* U8  */ [Some(ZeroExtend), Some(ZeroExtend),Some(ZeroExtend),Some(Move),      Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(Move),      Some(FloatToInt), Some(FloatToInt), Some(Mask),      Some(Mask),      Some(Mask)],
    /* R4  */ [Some(IntToFloat), Some(IntToFloat),Some(IntToFloat),Some(IntToFloat),Some(IntToFloat),Some(IntToFloat),Some(IntToFloat),Some(IntToFloat),Some(Move),       Some(Move),       Some(IntToFloat),Some(IntToFloat),None      ],
    /* R8  */ [Some(IntToFloat), Some(IntToFloat),Some(IntToFloat),Some(IntToFloat),Some(IntToFloat),Some(IntToFloat),Some(IntToFloat),Some(IntToFloat),Some(Move),       Some(Move),       Some(IntToFloat),Some(IntToFloat),None      ],
    /* I   */ [Some(SignExtend), Some(SignExtend),Some(SignExtend),Some(Move),      Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(FloatToInt), Some(FloatToInt), Some(Move),      Some(Move),      Some(Move)],
    /* U   */ [Some(ZeroExtend), Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(Move),      Some(FloatToInt), Some(FloatToInt), Some(Move),      Some(Move),      Some(Move)],
    /* Ptr */ [Some(ZeroExtend), Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),Some(ZeroExtend),None,             None,             Some(Move),      Some(Move),      Some(Move)],
];

/// Width class of an operand type; `platform32` folds native integers
/// into the 32-bit rows
fn width_class(ty: &IrType, platform32: bool) -> Option<usize> {
    Some(match ty {
        IrType::Char => U2,
        IrType::I8 => I1,
        IrType::I16 => I2,
        IrType::I32 => I4,
        IrType::I64 => I8,
        IrType::U8 => U1,
        IrType::U16 => U2,
        IrType::U32 => U4,
        IrType::U64 => U8,
        IrType::F32 => R4,
        IrType::F64 => R8,
        IrType::IntPtr => {
            if platform32 {
                I4
            } else {
                I
            }
        }
        IrType::UIntPtr => {
            if platform32 {
                U4
            } else {
                U
            }
        }
        IrType::ManagedPtr
        | IrType::UnmanagedPtr
        | IrType::FunctionPtr
        | IrType::ObjectRef
        | IrType::Array(_) => PTR,
        IrType::Bool | IrType::ValueType(_) => return None,
    })
}

/// Truncation mask for a destination type; zero means "mask is a no-op"
fn narrowing_mask(dest: &IrType) -> u64 {
    match dest {
        IrType::I8 | IrType::U8 => 0xFF,
        IrType::I16 | IrType::U16 | IrType::Char => 0xFFFF,
        IrType::I32 | IrType::U32 => 0xFFFF_FFFF,
        IrType::I64 | IrType::U64 => 0,
        _ => 0xFFFF_FFFF,
    }
}

/// Lower a conversion node in place
///
/// `routine` is the identity used when the conversion is impossible,
/// which is an internal invariant failure rather than a missing feature.
pub(super) fn lower_conversion(
    ctx: &mut Context<'_>,
    node: NodeId,
    routine: &str,
) -> Result<(), CompileError> {
    ctx.goto(node);
    let dest = ctx.node().result().ok_or_else(|| {
        CompileError::invalid_state(routine, "conversion without a result operand")
    })?;
    let source = ctx.node().operand(0);
    let dest_ty = ctx.func.operands.ty(dest).clone();
    let source_ty = ctx.func.operands.ty(source).clone();
    let pointer_size = ctx.func.pointer_size;
    let platform32 = pointer_size == 4;

    let dest_class = width_class(&dest_ty, platform32).ok_or_else(|| {
        CompileError::invalid_state(routine, format!("no width class for {dest_ty}"))
    })?;
    let source_class = width_class(&source_ty, platform32).ok_or_else(|| {
        CompileError::invalid_state(routine, format!("no width class for {source_ty}"))
    })?;

    let conv = CONV_TABLE[dest_class][source_class].ok_or_else(|| {
        CompileError::invalid_state(
            routine,
            format!("impossible conversion {source_ty} -> {dest_ty}"),
        )
    })?;

    match conv {
        Move => ctx.set_instruction(IrOp::Move, Some(dest), &[source]),
        SignExtend => {
            ctx.set_instruction(IrOp::SignExtendedMove, Some(dest), &[source]);
            ctx.set_size(OpSize::from_type(&source_ty));
        }
        ZeroExtend => {
            ctx.set_instruction(IrOp::ZeroExtendedMove, Some(dest), &[source]);
            ctx.set_size(OpSize::from_type(&source_ty));
        }
        IntToFloat => ctx.set_instruction(IrOp::IntegerToFloat, Some(dest), &[source]),
        FloatToInt => ctx.set_instruction(IrOp::FloatToInteger, Some(dest), &[source]),
        Mask => {
            let mask = narrowing_mask(&dest_ty);
            if mask == 0 {
                // widening to 64 bits loses nothing
                ctx.set_instruction(IrOp::Move, Some(dest), &[source]);
            } else if source_ty.width_bits(pointer_size) == 64 {
                // mask operates at 32 bits, so narrow through a temporary
                let temp = ctx.func.operands.virtual_register(dest_ty.clone());
                let mask_op = ctx.func.operands.const_int(IrType::U32, mask, pointer_size);
                ctx.set_instruction(IrOp::Move, Some(temp), &[source]);
                ctx.append_instruction(IrOp::LogicalAnd, Some(dest), &[temp, mask_op]);
            } else if mask == source_ty.width_mask(pointer_size)
                && source_ty.is_integer()
            {
                // provably a no-op narrowing
                ctx.set_instruction(IrOp::Move, Some(dest), &[source]);
            } else {
                let mask_op = ctx.func.operands.const_int(IrType::U32, mask, pointer_size);
                ctx.set_instruction(IrOp::LogicalAnd, Some(dest), &[source, mask_op]);
            }
        }
    }
    Ok(())
}

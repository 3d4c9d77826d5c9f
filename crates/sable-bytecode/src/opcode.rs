//! Bytecode opcodes for the Sable runtime
//!
//! The instruction set is stack-based. By the time the backend sees a
//! routine, the front end has already resolved the evaluation stack into
//! operand slots on the instruction graph, so the opcodes here carry no
//! encoding details; they identify the operation family and variant that
//! the lowering pass dispatches on.
//!
//! Opcodes are organized into categories:
//! - Stack manipulation
//! - Loads and stores (arguments, locals, fields, indirection)
//! - Arithmetic, logic, and shifts
//! - Comparison and branching
//! - Calls and object/array operations
//! - Conversions
//! - Deliberately-unsupported and invalid-at-this-stage opcodes

/// Bytecode opcode enumeration
///
/// Comparison opcodes (`Compare`, `CompareBranch`) read their condition
/// from the instruction node's condition-code field rather than carrying
/// it here; arithmetic opcodes pick their signed/unsigned/float IR form
/// from the operand types during lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BcOpcode {
    // ===== Stack manipulation =====
    /// No operation
    Nop,
    /// Debugger breakpoint
    Break,
    /// Duplicate top stack value (resolved away by the front end)
    Dup,
    /// Discard top stack value
    Pop,

    // ===== Loads =====
    /// Load an argument
    LoadArg,
    /// Load the address of an argument
    LoadArgAddress,
    /// Load a local variable
    LoadLocal,
    /// Load the address of a local variable
    LoadLocalAddress,
    /// Load a constant
    LoadConst,
    /// Load a string literal
    LoadString,
    /// Indirect load through a pointer (ldind/ldobj)
    LoadIndirect,
    /// Load an instance field
    LoadField,
    /// Load the address of an instance field
    LoadFieldAddress,
    /// Load a static field
    LoadStaticField,
    /// Load the address of a static field
    LoadStaticFieldAddress,
    /// Load a function pointer for a method
    LoadFunction,
    /// Load a function pointer for a virtual method
    LoadVirtualFunction,
    /// Load a metadata token (type or field handle)
    LoadToken,
    /// Load the length of an array
    LoadLength,
    /// Load an array element
    LoadElement,
    /// Load the address of an array element
    LoadElementAddress,

    // ===== Stores =====
    /// Store to a local variable
    StoreLocal,
    /// Store to an argument
    StoreArg,
    /// Indirect store through a pointer (stind/stobj)
    StoreIndirect,
    /// Store to an instance field
    StoreField,
    /// Store to a static field
    StoreStaticField,
    /// Store to an array element
    StoreElement,

    // ===== Arithmetic, logic, shifts =====
    Add,
    Sub,
    Mul,
    Div,
    DivUnsigned,
    Rem,
    RemUnsigned,
    And,
    Or,
    Xor,
    Not,
    Neg,
    Shl,
    Shr,
    ShrUnsigned,

    // ===== Comparison and branching =====
    /// Two-operand comparison producing a boolean (condition on the node)
    Compare,
    /// Unconditional branch
    Branch,
    /// Branch if the single operand is non-zero
    BranchTrue,
    /// Branch if the single operand is zero
    BranchFalse,
    /// Two-operand compare-and-branch (condition on the node)
    CompareBranch,
    /// Multi-way branch on an integer selector
    Switch,

    // ===== Calls =====
    /// Direct call
    Call,
    /// Virtual or interface call
    CallVirtual,
    /// Indirect call through a function pointer
    CallIndirect,
    /// Return from the routine
    Return,

    // ===== Object and array operations =====
    /// Allocate and construct an object
    NewObject,
    /// Allocate a one-dimensional array
    NewArray,
    /// Box a value type
    Box,
    /// Unbox to a managed pointer
    Unbox,
    /// Unbox to a value
    UnboxAny,
    /// Downcast, trapping on failure
    CastClass,
    /// Type test producing a reference or null
    IsInstance,
    /// Zero-initialize a value type through a pointer
    InitObject,
    /// Push the byte size of a type
    SizeOf,
    /// Copy a block of memory (cpblk)
    CopyBlock,
    /// Fill a block of memory (initblk)
    InitBlock,

    // ===== Conversions =====
    /// Numeric/pointer width or representation conversion
    Convert,

    // ===== Known limitations (abort the routine, batch continues) =====
    /// Variadic argument list handle
    ArgList,
    /// Stack allocation
    LocalAlloc,
    /// Typed-reference type extraction
    RefAnyType,
    /// Typed-reference value extraction
    RefAnyValue,
    /// Typed-reference construction
    MakeRefAny,
    /// Object copy through pointers
    CopyObject,
    /// Opcode prefix form
    Prefix,

    // ===== Never legal at this stage (compiler defect if seen) =====
    /// Exception-handler exit (removed by the protected-region pass)
    Leave,
    /// End of a finally handler
    EndFinally,
    /// End of an exception filter
    EndFilter,
    /// Raise an exception (rewritten before lowering)
    Throw,
    /// Re-raise the in-flight exception
    Rethrow,
}

/// Coarse opcode family used for dispatch and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BcFamily {
    Stack,
    Load,
    Store,
    Arithmetic,
    Comparison,
    Branch,
    Call,
    Object,
    Conversion,
    Unsupported,
    InvalidState,
}

impl BcOpcode {
    /// The family this opcode belongs to
    pub fn family(self) -> BcFamily {
        use BcOpcode::*;
        match self {
            Nop | Break | Dup | Pop => BcFamily::Stack,

            LoadArg | LoadArgAddress | LoadLocal | LoadLocalAddress | LoadConst | LoadString
            | LoadIndirect | LoadField | LoadFieldAddress | LoadStaticField
            | LoadStaticFieldAddress | LoadFunction | LoadVirtualFunction | LoadToken
            | LoadLength | LoadElement | LoadElementAddress => BcFamily::Load,

            StoreLocal | StoreArg | StoreIndirect | StoreField | StoreStaticField
            | StoreElement => BcFamily::Store,

            Add | Sub | Mul | Div | DivUnsigned | Rem | RemUnsigned | And | Or | Xor | Not
            | Neg | Shl | Shr | ShrUnsigned => BcFamily::Arithmetic,

            Compare => BcFamily::Comparison,

            Branch | BranchTrue | BranchFalse | CompareBranch | Switch => BcFamily::Branch,

            Call | CallVirtual | CallIndirect | Return => BcFamily::Call,

            NewObject | NewArray | Box | Unbox | UnboxAny | CastClass | IsInstance
            | InitObject | SizeOf | CopyBlock | InitBlock => BcFamily::Object,

            Convert => BcFamily::Conversion,

            ArgList | LocalAlloc | RefAnyType | RefAnyValue | MakeRefAny | CopyObject
            | Prefix => BcFamily::Unsupported,

            Leave | EndFinally | EndFilter | Throw | Rethrow => BcFamily::InvalidState,
        }
    }

    /// Whether the backend refuses this opcode as a known limitation
    pub fn is_unsupported(self) -> bool {
        self.family() == BcFamily::Unsupported
    }

    /// Whether this opcode can never legally reach the lowering stage
    pub fn is_invalid_at_lowering(self) -> bool {
        self.family() == BcFamily::InvalidState
    }

    /// Mnemonic used in graph dumps
    pub fn mnemonic(self) -> &'static str {
        use BcOpcode::*;
        match self {
            Nop => "bc.nop",
            Break => "bc.break",
            Dup => "bc.dup",
            Pop => "bc.pop",
            LoadArg => "bc.ldarg",
            LoadArgAddress => "bc.ldarga",
            LoadLocal => "bc.ldloc",
            LoadLocalAddress => "bc.ldloca",
            LoadConst => "bc.ldc",
            LoadString => "bc.ldstr",
            LoadIndirect => "bc.ldind",
            LoadField => "bc.ldfld",
            LoadFieldAddress => "bc.ldflda",
            LoadStaticField => "bc.ldsfld",
            LoadStaticFieldAddress => "bc.ldsflda",
            LoadFunction => "bc.ldftn",
            LoadVirtualFunction => "bc.ldvirtftn",
            LoadToken => "bc.ldtoken",
            LoadLength => "bc.ldlen",
            LoadElement => "bc.ldelem",
            LoadElementAddress => "bc.ldelema",
            StoreLocal => "bc.stloc",
            StoreArg => "bc.starg",
            StoreIndirect => "bc.stind",
            StoreField => "bc.stfld",
            StoreStaticField => "bc.stsfld",
            StoreElement => "bc.stelem",
            Add => "bc.add",
            Sub => "bc.sub",
            Mul => "bc.mul",
            Div => "bc.div",
            DivUnsigned => "bc.div.un",
            Rem => "bc.rem",
            RemUnsigned => "bc.rem.un",
            And => "bc.and",
            Or => "bc.or",
            Xor => "bc.xor",
            Not => "bc.not",
            Neg => "bc.neg",
            Shl => "bc.shl",
            Shr => "bc.shr",
            ShrUnsigned => "bc.shr.un",
            Compare => "bc.cmp",
            Branch => "bc.br",
            BranchTrue => "bc.brtrue",
            BranchFalse => "bc.brfalse",
            CompareBranch => "bc.bcmp",
            Switch => "bc.switch",
            Call => "bc.call",
            CallVirtual => "bc.callvirt",
            CallIndirect => "bc.calli",
            Return => "bc.ret",
            NewObject => "bc.newobj",
            NewArray => "bc.newarr",
            Box => "bc.box",
            Unbox => "bc.unbox",
            UnboxAny => "bc.unbox.any",
            CastClass => "bc.castclass",
            IsInstance => "bc.isinst",
            InitObject => "bc.initobj",
            SizeOf => "bc.sizeof",
            CopyBlock => "bc.cpblk",
            InitBlock => "bc.initblk",
            Convert => "bc.conv",
            ArgList => "bc.arglist",
            LocalAlloc => "bc.localloc",
            RefAnyType => "bc.refanytype",
            RefAnyValue => "bc.refanyval",
            MakeRefAny => "bc.mkrefany",
            CopyObject => "bc.cpobj",
            Prefix => "bc.prefix",
            Leave => "bc.leave",
            EndFinally => "bc.endfinally",
            EndFilter => "bc.endfilter",
            Throw => "bc.throw",
            Rethrow => "bc.rethrow",
        }
    }
}

impl std::fmt::Display for BcOpcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_families() {
        assert_eq!(BcOpcode::LoadField.family(), BcFamily::Load);
        assert_eq!(BcOpcode::StoreElement.family(), BcFamily::Store);
        assert_eq!(BcOpcode::Add.family(), BcFamily::Arithmetic);
        assert_eq!(BcOpcode::CompareBranch.family(), BcFamily::Branch);
        assert_eq!(BcOpcode::NewObject.family(), BcFamily::Object);
    }

    #[test]
    fn test_unsupported_classification() {
        for op in [
            BcOpcode::ArgList,
            BcOpcode::LocalAlloc,
            BcOpcode::RefAnyType,
            BcOpcode::MakeRefAny,
            BcOpcode::CopyObject,
            BcOpcode::Prefix,
        ] {
            assert!(op.is_unsupported(), "{op} should be unsupported");
            assert!(!op.is_invalid_at_lowering());
        }
    }

    #[test]
    fn test_invalid_state_classification() {
        for op in [BcOpcode::Leave, BcOpcode::EndFinally, BcOpcode::Throw] {
            assert!(op.is_invalid_at_lowering(), "{op} should be invalid here");
            assert!(!op.is_unsupported());
        }
    }

    #[test]
    fn test_mnemonics_unique() {
        use rustc_hash::FxHashSet;
        let all = [
            BcOpcode::Nop,
            BcOpcode::LoadArg,
            BcOpcode::LoadLocal,
            BcOpcode::LoadField,
            BcOpcode::StoreField,
            BcOpcode::Add,
            BcOpcode::Compare,
            BcOpcode::CompareBranch,
            BcOpcode::Call,
            BcOpcode::CallVirtual,
            BcOpcode::NewObject,
            BcOpcode::Convert,
            BcOpcode::Leave,
        ];
        let set: FxHashSet<&str> = all.iter().map(|o| o.mnemonic()).collect();
        assert_eq!(set.len(), all.len());
    }
}

//! Semantic types and size tags for IR operands
//!
//! `IrType` is the operand-level view of the type system: enough to pick
//! signed/unsigned/float instruction forms, width masks, and pointer
//! categories, without dragging full metadata through the graph.

use sable_bytecode::TypeId;

/// Semantic type of an operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Char,
    /// Native-width signed integer
    IntPtr,
    /// Native-width unsigned integer
    UIntPtr,
    /// Pointer into the managed heap (interior or by-ref)
    ManagedPtr,
    /// Raw unmanaged pointer
    UnmanagedPtr,
    /// Reference to a heap object
    ObjectRef,
    /// Compound value type, identified by its metadata type
    ValueType(TypeId),
    /// Array reference with element type
    Array(Box<IrType>),
    /// Code pointer
    FunctionPtr,
}

impl IrType {
    /// Whether this is a signed integer (native width included)
    pub fn is_signed_int(&self) -> bool {
        matches!(
            self,
            IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64 | IrType::IntPtr
        )
    }

    /// Whether this is an unsigned integer (native width included)
    pub fn is_unsigned_int(&self) -> bool {
        matches!(
            self,
            IrType::U8 | IrType::U16 | IrType::U32 | IrType::U64 | IrType::UIntPtr
        )
    }

    /// Whether integer arithmetic applies (bool and char count)
    pub fn is_integer(&self) -> bool {
        self.is_signed_int() || self.is_unsigned_int() || matches!(self, IrType::Bool | IrType::Char)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    /// Whether this is any pointer category
    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            IrType::ManagedPtr | IrType::UnmanagedPtr | IrType::FunctionPtr
        )
    }

    /// Whether values of this type fit a register
    pub fn is_register_storable(&self) -> bool {
        !matches!(self, IrType::ValueType(_))
    }

    /// Width in bits, with native types resolved against `pointer_size`
    /// (bytes)
    pub fn width_bits(&self, pointer_size: u32) -> u32 {
        match self {
            IrType::I8 | IrType::U8 | IrType::Bool => 8,
            IrType::I16 | IrType::U16 | IrType::Char => 16,
            IrType::I32 | IrType::U32 | IrType::F32 => 32,
            IrType::I64 | IrType::U64 | IrType::F64 => 64,
            _ => pointer_size * 8,
        }
    }

    /// Mask selecting the value bits of this width
    pub fn width_mask(&self, pointer_size: u32) -> u64 {
        match self.width_bits(pointer_size) {
            8 => 0xFF,
            16 => 0xFFFF,
            32 => 0xFFFF_FFFF,
            _ => u64::MAX,
        }
    }

    /// The type a value of this type has on the evaluation stack
    ///
    /// Sub-word integers widen to 32 bits; everything else is unchanged.
    pub fn stack_type(&self) -> IrType {
        match self {
            IrType::I8 | IrType::I16 | IrType::Bool | IrType::Char => IrType::I32,
            IrType::U8 | IrType::U16 => IrType::U32,
            other => other.clone(),
        }
    }

    /// Loads of these types sign-extend
    pub fn must_sign_extend_on_load(&self) -> bool {
        matches!(self, IrType::I8 | IrType::I16)
    }

    /// Loads of these types zero-extend
    pub fn must_zero_extend_on_load(&self) -> bool {
        matches!(self, IrType::U8 | IrType::U16 | IrType::Char | IrType::Bool)
    }
}

impl std::fmt::Display for IrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::U8 => write!(f, "u8"),
            IrType::U16 => write!(f, "u16"),
            IrType::U32 => write!(f, "u32"),
            IrType::U64 => write!(f, "u64"),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::Bool => write!(f, "bool"),
            IrType::Char => write!(f, "char"),
            IrType::IntPtr => write!(f, "isize"),
            IrType::UIntPtr => write!(f, "usize"),
            IrType::ManagedPtr => write!(f, "mptr"),
            IrType::UnmanagedPtr => write!(f, "uptr"),
            IrType::ObjectRef => write!(f, "obj"),
            IrType::ValueType(id) => write!(f, "val#{}", id.0),
            IrType::Array(elem) => write!(f, "{}[]", elem),
            IrType::FunctionPtr => write!(f, "fnptr"),
        }
    }
}

/// Byte-size tag carried by loads, stores, and extended moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpSize {
    /// No explicit size
    #[default]
    None,
    Size8,
    Size16,
    Size32,
    Size64,
    /// Pointer-sized on the target
    Native,
}

impl OpSize {
    /// Size tag for a type, native kinds mapping to `Native`
    pub fn from_type(ty: &IrType) -> OpSize {
        match ty {
            IrType::I8 | IrType::U8 | IrType::Bool => OpSize::Size8,
            IrType::I16 | IrType::U16 | IrType::Char => OpSize::Size16,
            IrType::I32 | IrType::U32 | IrType::F32 => OpSize::Size32,
            IrType::I64 | IrType::U64 | IrType::F64 => OpSize::Size64,
            _ => OpSize::Native,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(IrType::I16.is_signed_int());
        assert!(IrType::UIntPtr.is_unsigned_int());
        assert!(IrType::Char.is_integer());
        assert!(!IrType::F32.is_integer());
        assert!(IrType::ManagedPtr.is_pointer());
        assert!(!IrType::ObjectRef.is_pointer());
    }

    #[test]
    fn test_widths() {
        assert_eq!(IrType::I8.width_bits(4), 8);
        assert_eq!(IrType::IntPtr.width_bits(4), 32);
        assert_eq!(IrType::IntPtr.width_bits(8), 64);
        assert_eq!(IrType::U16.width_mask(4), 0xFFFF);
        assert_eq!(IrType::U64.width_mask(4), u64::MAX);
    }

    #[test]
    fn test_stack_type_widening() {
        assert_eq!(IrType::I8.stack_type(), IrType::I32);
        assert_eq!(IrType::Char.stack_type(), IrType::I32);
        assert_eq!(IrType::U16.stack_type(), IrType::U32);
        assert_eq!(IrType::I64.stack_type(), IrType::I64);
        assert_eq!(IrType::ObjectRef.stack_type(), IrType::ObjectRef);
    }

    #[test]
    fn test_load_extension_rules() {
        assert!(IrType::I8.must_sign_extend_on_load());
        assert!(IrType::I16.must_sign_extend_on_load());
        assert!(IrType::U8.must_zero_extend_on_load());
        assert!(IrType::Bool.must_zero_extend_on_load());
        assert!(!IrType::I32.must_sign_extend_on_load());
        assert!(!IrType::I32.must_zero_extend_on_load());
    }

    #[test]
    fn test_size_tags() {
        assert_eq!(OpSize::from_type(&IrType::U8), OpSize::Size8);
        assert_eq!(OpSize::from_type(&IrType::F64), OpSize::Size64);
        assert_eq!(OpSize::from_type(&IrType::ObjectRef), OpSize::Native);
    }
}

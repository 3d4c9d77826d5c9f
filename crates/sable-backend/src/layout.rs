//! Type/layout collaborator interface
//!
//! The middle tier never computes layout itself; every pointer-arithmetic
//! or dispatch decision during lowering consults this trait. The metadata
//! registry from `sable-bytecode` is the production implementation.

use sable_bytecode::{FieldId, MethodId, TypeId, TypeKind, TypeRegistry};

use crate::ir::IrType;

/// Layout and dispatch queries consumed by the lowering pass
pub trait TypeLayout {
    /// Native pointer size in bytes
    fn pointer_size(&self) -> u32;

    /// Byte size of a value of this type
    fn type_size(&self, ty: TypeId) -> u32;

    /// Natural alignment of this type
    fn type_alignment(&self, ty: TypeId) -> u32;

    /// Byte offset of an instance field within its declaring type
    fn field_offset(&self, field: FieldId) -> u32;

    /// Whether this type is a compound value type
    fn is_compound(&self, ty: TypeId) -> bool;

    /// Whether this type is an interface
    fn is_interface(&self, ty: TypeId) -> bool;

    /// Whether this type is a value type
    fn is_value_type(&self, ty: TypeId) -> bool;

    /// Method-table slot index of a virtual method
    fn method_table_slot(&self, method: MethodId) -> u32;

    /// Interface-slot index of an interface type
    fn interface_slot(&self, interface: TypeId) -> u32;

    /// Whether the method is virtual
    fn method_is_virtual(&self, method: MethodId) -> bool;

    /// Whether the method's declaring interface is used for its dispatch
    fn method_declaring_type(&self, method: MethodId) -> TypeId;

    /// Whether a value-type method overrides a root-type declaration
    /// (receiver is pointer-adjusted instead of boxed)
    fn overrides_root_method(&self, method: MethodId) -> bool;

    /// Routine identity for diagnostics
    fn method_full_name(&self, method: MethodId) -> String;

    /// Fully-qualified type name, used to derive descriptor symbol names
    fn type_name(&self, ty: TypeId) -> String;

    /// Declared type of a field
    fn field_type(&self, field: FieldId) -> TypeId;

    /// Element type of an array type
    fn element_type(&self, ty: TypeId) -> Option<TypeId>;

    /// Operand-level view of a metadata type
    fn ir_type_of(&self, ty: TypeId) -> IrType;
}

/// Round `size` up to `alignment` (a power of two)
pub fn align_up(size: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (size + alignment - 1) & !(alignment - 1)
}

/// Type size rounded up to pointer alignment, as boxing and stack slots
/// see it
pub fn aligned_type_size(layout: &dyn TypeLayout, ty: TypeId) -> u32 {
    align_up(layout.type_size(ty), layout.pointer_size())
}

impl TypeLayout for TypeRegistry {
    fn pointer_size(&self) -> u32 {
        TypeRegistry::pointer_size(self)
    }

    fn type_size(&self, ty: TypeId) -> u32 {
        TypeRegistry::type_size(self, ty)
    }

    fn type_alignment(&self, ty: TypeId) -> u32 {
        TypeRegistry::type_alignment(self, ty)
    }

    fn field_offset(&self, field: FieldId) -> u32 {
        TypeRegistry::field_offset(self, field)
    }

    fn is_compound(&self, ty: TypeId) -> bool {
        TypeRegistry::is_compound(self, ty)
    }

    fn is_interface(&self, ty: TypeId) -> bool {
        self.type_desc(ty).kind == TypeKind::Interface
    }

    fn is_value_type(&self, ty: TypeId) -> bool {
        self.type_desc(ty).kind.is_value_type()
    }

    fn method_table_slot(&self, method: MethodId) -> u32 {
        TypeRegistry::method_table_slot(self, method)
    }

    fn interface_slot(&self, interface: TypeId) -> u32 {
        TypeRegistry::interface_slot(self, interface)
    }

    fn method_is_virtual(&self, method: MethodId) -> bool {
        self.method_desc(method).is_virtual
    }

    fn method_declaring_type(&self, method: MethodId) -> TypeId {
        self.method_desc(method).declaring
    }

    fn overrides_root_method(&self, method: MethodId) -> bool {
        TypeRegistry::overrides_root_method(self, method)
    }

    fn method_full_name(&self, method: MethodId) -> String {
        TypeRegistry::method_full_name(self, method)
    }

    fn type_name(&self, ty: TypeId) -> String {
        self.type_desc(ty).name.clone()
    }

    fn field_type(&self, field: FieldId) -> TypeId {
        self.field_desc(field).ty
    }

    fn element_type(&self, ty: TypeId) -> Option<TypeId> {
        match self.type_desc(ty).kind {
            TypeKind::Array { element } => Some(element),
            TypeKind::Pointer { pointee } | TypeKind::ByRef { pointee } => Some(pointee),
            _ => None,
        }
    }

    fn ir_type_of(&self, ty: TypeId) -> IrType {
        match &self.type_desc(ty).kind {
            TypeKind::I8 => IrType::I8,
            TypeKind::I16 => IrType::I16,
            TypeKind::I32 => IrType::I32,
            TypeKind::I64 => IrType::I64,
            TypeKind::U8 => IrType::U8,
            TypeKind::U16 => IrType::U16,
            TypeKind::U32 => IrType::U32,
            TypeKind::U64 => IrType::U64,
            TypeKind::F32 => IrType::F32,
            TypeKind::F64 => IrType::F64,
            TypeKind::Bool => IrType::Bool,
            TypeKind::Char => IrType::Char,
            TypeKind::IntPtr => IrType::IntPtr,
            TypeKind::UIntPtr => IrType::UIntPtr,
            TypeKind::Class | TypeKind::Interface => IrType::ObjectRef,
            TypeKind::Struct => IrType::ValueType(ty),
            TypeKind::Array { element } => IrType::Array(Box::new(self.ir_type_of(*element))),
            TypeKind::Pointer { .. } => IrType::UnmanagedPtr,
            TypeKind::ByRef { .. } => IrType::ManagedPtr,
            TypeKind::FunctionPointer => IrType::FunctionPtr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(1, 4), 4);
        assert_eq!(align_up(4, 4), 4);
        assert_eq!(align_up(5, 4), 8);
        assert_eq!(align_up(9, 8), 16);
    }

    #[test]
    fn test_registry_implements_layout() {
        let mut registry = TypeRegistry::new(4);
        let i32t = registry.register_type("i32", TypeKind::I32, None).unwrap();
        let s = registry.register_type("Pair", TypeKind::Struct, None).unwrap();
        registry.add_field(s, "x", i32t, false);
        registry.add_field(s, "y", i32t, false);

        let layout: &dyn TypeLayout = &registry;
        assert_eq!(layout.pointer_size(), 4);
        assert_eq!(layout.type_size(s), 8);
        assert!(layout.is_compound(s));
        assert_eq!(layout.ir_type_of(i32t), IrType::I32);
        assert_eq!(layout.ir_type_of(s), IrType::ValueType(s));
        assert_eq!(aligned_type_size(layout, s), 8);
    }

    #[test]
    fn test_array_ir_type() {
        let mut registry = TypeRegistry::new(4);
        let u8t = registry.register_type("u8", TypeKind::U8, None).unwrap();
        let arr = registry
            .register_type("u8[]", TypeKind::Array { element: u8t }, None)
            .unwrap();
        let layout: &dyn TypeLayout = &registry;
        assert_eq!(layout.ir_type_of(arr), IrType::Array(Box::new(IrType::U8)));
        assert_eq!(layout.element_type(arr), Some(u8t));
    }
}

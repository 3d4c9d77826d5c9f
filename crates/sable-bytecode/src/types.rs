//! Type and method metadata for compiled modules
//!
//! The registry is the concrete implementation behind the backend's layout
//! queries: type sizes and alignment, field byte offsets, compound
//! classification, method-table slots, and interface slots. The front end
//! populates it from module metadata; the backend only reads it.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

/// Identifier of a registered field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldId(pub u32);

/// Identifier of a registered method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId(pub u32);

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A type name was registered twice
    #[error("duplicate type name: {0}")]
    DuplicateType(String),
    /// Lookup by name failed
    #[error("unknown type name: {0}")]
    UnknownType(String),
}

/// The shape of a registered type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
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
    /// Reference (class) type
    Class,
    /// User-defined value type
    Struct,
    /// Interface type
    Interface,
    /// One-dimensional array of `element`
    Array { element: TypeId },
    /// Unmanaged pointer to `pointee`
    Pointer { pointee: TypeId },
    /// Managed pointer to `pointee`
    ByRef { pointee: TypeId },
    /// Raw code pointer
    FunctionPointer,
}

impl TypeKind {
    /// Whether values of this kind live on the managed heap
    pub fn is_reference(&self) -> bool {
        matches!(self, TypeKind::Class | TypeKind::Interface | TypeKind::Array { .. })
    }

    /// Whether this is a value type (scalar or struct)
    pub fn is_value_type(&self) -> bool {
        !self.is_reference()
            && !matches!(
                self,
                TypeKind::Pointer { .. } | TypeKind::ByRef { .. } | TypeKind::FunctionPointer
            )
    }
}

/// A registered type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDesc {
    /// Fully-qualified name
    pub name: String,
    pub kind: TypeKind,
    /// Base type, if any
    pub base: Option<TypeId>,
    /// Instance fields in declaration order
    pub fields: Vec<FieldId>,
    /// Methods in declaration order
    pub methods: Vec<MethodId>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeId>,
}

/// A registered field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDesc {
    pub name: String,
    /// Declaring type
    pub owner: TypeId,
    /// Field type
    pub ty: TypeId,
    pub is_static: bool,
}

/// A registered method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDesc {
    pub name: String,
    /// Declaring type
    pub declaring: TypeId,
    pub is_virtual: bool,
    pub is_static: bool,
    /// The base-type declaration this method overrides, if any
    pub overrides: Option<MethodId>,
}

/// Type, field, and method metadata for one compilation
///
/// Layout rules: classes carry a two-pointer object header (type
/// descriptor, sync word) ahead of their fields; structs start at offset
/// zero. Field offsets are assigned in declaration order with natural
/// alignment. Virtual methods occupy method-table slots base-first, with
/// overrides reusing the slot of the overridden declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRegistry {
    types: Vec<TypeDesc>,
    fields: Vec<FieldDesc>,
    methods: Vec<MethodDesc>,
    /// Native pointer size in bytes (4 or 8)
    pointer_size: u32,
    #[serde(skip)]
    by_name: FxHashMap<String, TypeId>,
    /// Interface registration order, which fixes interface slots
    interface_order: Vec<TypeId>,
}

/// Names of the root types whose virtual methods value types may override
const ROOT_TYPE_NAMES: [&str; 3] = ["System.Object", "System.ValueType", "System.Enum"];

impl TypeRegistry {
    /// Create a registry with the core types pre-registered
    pub fn new(pointer_size: u32) -> Self {
        debug_assert!(pointer_size == 4 || pointer_size == 8);
        let mut registry = TypeRegistry {
            types: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            pointer_size,
            by_name: FxHashMap::default(),
            interface_order: Vec::new(),
        };

        let object = registry
            .register_type("System.Object", TypeKind::Class, None)
            .expect("fresh registry");
        registry
            .register_type("System.ValueType", TypeKind::Class, Some(object))
            .expect("fresh registry");
        registry
            .register_type("System.Enum", TypeKind::Class, Some(object))
            .expect("fresh registry");
        registry
            .register_type("System.String", TypeKind::Class, Some(object))
            .expect("fresh registry");
        registry
    }

    /// Native pointer size in bytes
    pub fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    /// The root object type
    pub fn object_type(&self) -> TypeId {
        TypeId(0)
    }

    /// Register a type; name must be unique
    pub fn register_type(
        &mut self,
        name: &str,
        kind: TypeKind,
        base: Option<TypeId>,
    ) -> Result<TypeId, RegistryError> {
        if self.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateType(name.to_string()));
        }
        let id = TypeId(self.types.len() as u32);
        if kind == TypeKind::Interface {
            self.interface_order.push(id);
        }
        self.types.push(TypeDesc {
            name: name.to_string(),
            kind,
            base,
            fields: Vec::new(),
            methods: Vec::new(),
            interfaces: Vec::new(),
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add an instance or static field to a type
    pub fn add_field(&mut self, owner: TypeId, name: &str, ty: TypeId, is_static: bool) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(FieldDesc {
            name: name.to_string(),
            owner,
            ty,
            is_static,
        });
        self.types[owner.0 as usize].fields.push(id);
        id
    }

    /// Add a method to a type
    pub fn add_method(
        &mut self,
        declaring: TypeId,
        name: &str,
        is_virtual: bool,
        is_static: bool,
        overrides: Option<MethodId>,
    ) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(MethodDesc {
            name: name.to_string(),
            declaring,
            is_virtual,
            is_static,
            overrides,
        });
        self.types[declaring.0 as usize].methods.push(id);
        id
    }

    /// Declare that `ty` implements `interface`
    pub fn add_interface(&mut self, ty: TypeId, interface: TypeId) {
        self.types[ty.0 as usize].interfaces.push(interface);
    }

    pub fn type_desc(&self, id: TypeId) -> &TypeDesc {
        &self.types[id.0 as usize]
    }

    pub fn field_desc(&self, id: FieldId) -> &FieldDesc {
        &self.fields[id.0 as usize]
    }

    pub fn method_desc(&self, id: MethodId) -> &MethodDesc {
        &self.methods[id.0 as usize]
    }

    /// Look a type up by its fully-qualified name
    pub fn type_by_name(&self, name: &str) -> Result<TypeId, RegistryError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::UnknownType(name.to_string()))
    }

    /// Routine identity string used in diagnostics: `Type::method`
    pub fn method_full_name(&self, id: MethodId) -> String {
        let m = self.method_desc(id);
        format!("{}::{}", self.type_desc(m.declaring).name, m.name)
    }

    // ===== Layout queries =====

    /// Byte size of a value of this type
    ///
    /// For classes this is the instance size used by the allocator
    /// (header included); references themselves are pointer-sized.
    pub fn type_size(&self, id: TypeId) -> u32 {
        match &self.type_desc(id).kind {
            TypeKind::I8 | TypeKind::U8 | TypeKind::Bool => 1,
            TypeKind::I16 | TypeKind::U16 | TypeKind::Char => 2,
            TypeKind::I32 | TypeKind::U32 | TypeKind::F32 => 4,
            TypeKind::I64 | TypeKind::U64 | TypeKind::F64 => 8,
            TypeKind::IntPtr
            | TypeKind::UIntPtr
            | TypeKind::Pointer { .. }
            | TypeKind::ByRef { .. }
            | TypeKind::FunctionPointer
            | TypeKind::Array { .. }
            | TypeKind::Interface => self.pointer_size,
            TypeKind::Class => {
                let mut size = self.pointer_size * 2;
                for &field in &self.instance_fields(id) {
                    let fd = self.field_desc(field);
                    let fsize = self.type_size(fd.ty);
                    let align = self.type_alignment(fd.ty);
                    size = align_up(size, align) + fsize;
                }
                align_up(size, self.pointer_size)
            }
            TypeKind::Struct => {
                let mut size = 0;
                for &field in &self.instance_fields(id) {
                    let fd = self.field_desc(field);
                    let fsize = self.type_size(fd.ty);
                    let align = self.type_alignment(fd.ty);
                    size = align_up(size, align) + fsize;
                }
                size.max(1)
            }
        }
    }

    /// Natural alignment of a value of this type
    pub fn type_alignment(&self, id: TypeId) -> u32 {
        match &self.type_desc(id).kind {
            TypeKind::Struct => self
                .instance_fields(id)
                .iter()
                .map(|&f| self.type_alignment(self.field_desc(f).ty))
                .max()
                .unwrap_or(1),
            _ => self.type_size(id).min(self.pointer_size).max(1),
        }
    }

    /// Byte offset of an instance field within its declaring type
    pub fn field_offset(&self, id: FieldId) -> u32 {
        let fd = self.field_desc(id);
        let owner = self.type_desc(fd.owner);
        let mut offset = if owner.kind == TypeKind::Class {
            self.pointer_size * 2
        } else {
            0
        };
        for &field in &self.instance_fields(fd.owner) {
            let cur = self.field_desc(field);
            let align = self.type_alignment(cur.ty);
            offset = align_up(offset, align);
            if field == id {
                return offset;
            }
            offset += self.type_size(cur.ty);
        }
        debug_assert!(false, "field {id:?} not declared on its owner");
        offset
    }

    /// Whether this type is a compound value type (lives in memory, not a
    /// single register)
    pub fn is_compound(&self, id: TypeId) -> bool {
        self.type_desc(id).kind == TypeKind::Struct
    }

    /// Method-table slot of a virtual method
    ///
    /// Slots are assigned base-first in declaration order; an override
    /// reuses the slot of the declaration it overrides.
    pub fn method_table_slot(&self, id: MethodId) -> u32 {
        let m = self.method_desc(id);
        if let Some(overridden) = m.overrides {
            return self.method_table_slot(overridden);
        }
        let mut chain = Vec::new();
        let mut cur = Some(m.declaring);
        while let Some(ty) = cur {
            chain.push(ty);
            cur = self.type_desc(ty).base;
        }
        let mut slot = 0;
        for &ty in chain.iter().rev() {
            for &method in &self.type_desc(ty).methods {
                let md = self.method_desc(method);
                if !md.is_virtual || md.overrides.is_some() {
                    continue;
                }
                if method == id {
                    return slot;
                }
                slot += 1;
            }
        }
        debug_assert!(false, "method {id:?} is not in any method table");
        slot
    }

    /// Interface slot of an interface type (registration order)
    pub fn interface_slot(&self, id: TypeId) -> u32 {
        self.interface_order
            .iter()
            .position(|&t| t == id)
            .map(|p| p as u32)
            .unwrap_or_else(|| {
                debug_assert!(false, "type {id:?} is not an interface");
                0
            })
    }

    /// Whether a virtual method overrides a declaration on one of the
    /// root types (`Object`, `ValueType`, `Enum`)
    ///
    /// Value-type receivers of such calls get their pointer adjusted
    /// instead of being boxed.
    pub fn overrides_root_method(&self, id: MethodId) -> bool {
        let m = self.method_desc(id);
        if m.overrides.is_none() {
            return false;
        }
        let declaring = self.type_desc(m.declaring);
        let Some(base) = declaring.base else {
            return false;
        };
        ROOT_TYPE_NAMES.contains(&self.type_desc(base).name.as_str())
    }

    fn instance_fields(&self, id: TypeId) -> Vec<FieldId> {
        self.type_desc(id)
            .fields
            .iter()
            .copied()
            .filter(|&f| !self.field_desc(f).is_static)
            .collect()
    }
}

fn align_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

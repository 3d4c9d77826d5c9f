//! Symbol/linker collaborator interface
//!
//! The middle tier produces two kinds of symbol traffic: read-only data
//! for interned string literals, and references to the well-known runtime
//! helper routines that lowering calls into. Both go through `SymbolSink`
//! so the real linker stays external.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

/// Suffix appended to a type name to form its descriptor symbol
pub const TYPE_DEFINITION_SUFFIX: &str = "$typedef";

/// Well-known runtime helper routines resolved by the linker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeHelper {
    AllocateObject,
    AllocateArray,
    Box32,
    Box64,
    BoxFloat32,
    BoxFloat64,
    /// Generic boxing through an address and byte count
    Box,
    Unbox32,
    Unbox64,
    /// Generic unboxing through an address and byte count
    Unbox,
    IsInstanceOfType,
    IsInstanceOfInterfaceType,
    MemoryCopy,
    MemorySet,
    ThrowIndexOutOfRange,
    GetVirtualFunctionPtr,
}

impl RuntimeHelper {
    /// Linker symbol name of the helper
    pub fn symbol_name(self) -> &'static str {
        use RuntimeHelper::*;
        match self {
            AllocateObject => "Sable.Runtime::AllocateObject",
            AllocateArray => "Sable.Runtime::AllocateArray",
            Box32 => "Sable.Runtime::Box32",
            Box64 => "Sable.Runtime::Box64",
            BoxFloat32 => "Sable.Runtime::BoxFloat32",
            BoxFloat64 => "Sable.Runtime::BoxFloat64",
            Box => "Sable.Runtime::Box",
            Unbox32 => "Sable.Runtime::Unbox32",
            Unbox64 => "Sable.Runtime::Unbox64",
            Unbox => "Sable.Runtime::Unbox",
            IsInstanceOfType => "Sable.Runtime::IsInstanceOfType",
            IsInstanceOfInterfaceType => "Sable.Runtime::IsInstanceOfInterfaceType",
            MemoryCopy => "Sable.Runtime::MemoryCopy",
            MemorySet => "Sable.Runtime::MemorySet",
            ThrowIndexOutOfRange => "Sable.Runtime::ThrowIndexOutOfRangeException",
            GetVirtualFunctionPtr => "Sable.Runtime::GetVirtualFunctionPtr",
        }
    }

    /// Reverse lookup by symbol name
    pub fn by_name(name: &str) -> Option<RuntimeHelper> {
        static BY_NAME: Lazy<FxHashMap<&'static str, RuntimeHelper>> = Lazy::new(|| {
            use RuntimeHelper::*;
            let all = [
                AllocateObject,
                AllocateArray,
                Box32,
                Box64,
                BoxFloat32,
                BoxFloat64,
                Box,
                Unbox32,
                Unbox64,
                Unbox,
                IsInstanceOfType,
                IsInstanceOfInterfaceType,
                MemoryCopy,
                MemorySet,
                ThrowIndexOutOfRange,
                GetVirtualFunctionPtr,
            ];
            all.iter().map(|&h| (h.symbol_name(), h)).collect()
        });
        BY_NAME.get(name).copied()
    }
}

/// A pending absolute-address link within a data symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    /// Symbol containing the patch site
    pub within: String,
    /// Byte offset of the patch site
    pub offset: u32,
    /// Symbol whose address is patched in
    pub target: String,
}

/// Destination for symbols emitted during lowering
pub trait SymbolSink: Send {
    /// Define a read-only data symbol; returns false if it already existed
    /// (string literals are interned, later hits share the first emission)
    fn define_rodata(&mut self, name: &str, alignment: u32, data: &[u8]) -> bool;

    /// Request an absolute-address patch inside a previously defined symbol
    fn link_absolute(&mut self, request: LinkRequest);
}

/// In-memory sink used by tests and by drivers that link later
#[derive(Debug, Default)]
pub struct MemorySymbolSink {
    symbols: FxHashMap<String, (u32, Vec<u8>)>,
    links: Vec<LinkRequest>,
}

impl MemorySymbolSink {
    pub fn new() -> Self {
        MemorySymbolSink::default()
    }

    pub fn symbol(&self, name: &str) -> Option<&(u32, Vec<u8>)> {
        self.symbols.get(name)
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn links(&self) -> &[LinkRequest] {
        &self.links
    }
}

impl SymbolSink for MemorySymbolSink {
    fn define_rodata(&mut self, name: &str, alignment: u32, data: &[u8]) -> bool {
        if self.symbols.contains_key(name) {
            return false;
        }
        self.symbols.insert(name.to_string(), (alignment, data.to_vec()));
        true
    }

    fn link_absolute(&mut self, request: LinkRequest) {
        self.links.push(request);
    }
}

/// Build the in-image layout of a string literal: a three-pointer-word
/// header (type descriptor placeholder, sync word, length) followed by
/// UTF-16 code units
pub fn string_literal_bytes(data: &str, pointer_size: u32) -> Vec<u8> {
    let units: Vec<u16> = data.encode_utf16().collect();
    let mut bytes = Vec::with_capacity((pointer_size * 3) as usize + units.len() * 2);
    // type descriptor (patched by the linker) and sync word
    bytes.resize((pointer_size * 2) as usize, 0);
    // length field, pointer-sized
    let len = units.len() as u64;
    bytes.extend_from_slice(&len.to_le_bytes()[..pointer_size as usize]);
    for unit in units {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

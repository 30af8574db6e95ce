//! Register metadata tables, as the platform layer describes them.
//!
//! The tables carry both numbering schemes; [`RegisterNumbering`] is the
//! single place where the session mode picks one.

use crate::protocol::SessionMode;

/// Which wire numbering a register lookup uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterNumbering {
    Gdb,
    Lldb,
}

impl From<SessionMode> for RegisterNumbering {
    fn from(mode: SessionMode) -> RegisterNumbering {
        match mode {
            SessionMode::Gdb => RegisterNumbering::Gdb,
            SessionMode::Lldb => RegisterNumbering::Lldb,
        }
    }
}

/// Descriptor-side display format of a register value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RegisterValueFormat {
    Binary,
    Decimal,
    #[default]
    Hexadecimal,
    Float,
    Vector,
}

/// Descriptor-side encoding of a register value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RegisterValueEncoding {
    #[default]
    UInteger,
    SInteger,
    IeeeSingle,
    IeeeDouble,
    IeeeExtended,
}

/// Element type of a vector register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorFormat {
    UInt8,
    SInt8,
    UInt16,
    SInt16,
    UInt32,
    SInt32,
    UInt128,
    Float32,
}

/// Metadata of a single register.
#[derive(Clone, Debug, Default)]
pub struct RegisterDef {
    pub name: String,
    /// LLDB-facing name when it differs from `name`.
    pub lldb_name: Option<String>,
    pub alternate_name: Option<String>,
    pub generic_name: Option<String>,
    pub bit_size: u32,
    pub lldb_offset: u32,
    pub lldb_number: u32,
    pub gcc_number: Option<u32>,
    pub dwarf_number: Option<u32>,
    pub format: RegisterValueFormat,
    pub encoding: RegisterValueEncoding,
    pub vector_format: Option<VectorFormat>,
    /// LLDB numbers of the registers this one is a slice of.
    pub container_registers: Vec<u32>,
    /// LLDB numbers of the registers a write to this one invalidates.
    pub invalidate_registers: Vec<u32>,
}

/// A named register set, e.g. "General Purpose Registers".
#[derive(Clone, Debug)]
pub struct RegisterSet {
    pub name: String,
    pub registers: Vec<RegisterDef>,
}

/// The full LLDB-numbered register table of the target architecture.
#[derive(Clone, Debug, Default)]
pub struct LldbDescriptor {
    pub sets: Vec<RegisterSet>,
}

/// One resolved register: its definition plus the set it belongs to.
#[derive(Clone, Copy, Debug)]
pub struct LldbRegisterLookup<'a> {
    pub set_name: &'a str,
    pub def: &'a RegisterDef,
}

impl LldbDescriptor {
    /// Find a register by LLDB number.
    pub fn register_info(&self, regno: u32) -> Option<LldbRegisterLookup<'_>> {
        self.sets.iter().find_map(|set| {
            set.registers
                .iter()
                .find(|def| def.lldb_number == regno)
                .map(|def| LldbRegisterLookup {
                    set_name: &set.name,
                    def,
                })
        })
    }
}

//! Register access: metadata queries, value transfer, save/restore.

use crate::error::Error;
use crate::protocol::registers::{RegisterEncoding, RegisterFormat, RegisterInfo};
use crate::protocol::Ptid;
use crate::session::DebugSession;
use crate::target::registers::{
    RegisterDef, RegisterNumbering, RegisterValueEncoding, RegisterValueFormat, VectorFormat,
};

impl DebugSession {
    /// `qRegisterInfo`: metadata of one LLDB-numbered register.
    pub fn on_query_register_info(&self, regno: u32) -> Result<RegisterInfo, Error> {
        let lookup = self
            .process()?
            .lldb_description()
            .register_info(regno)
            .ok_or(Error::InvalidArgument)?;
        Ok(shape_register_info(lookup.set_name, lookup.def))
    }

    /// `g`: every general register as a value.
    pub fn on_read_general_registers(&self, ptid: Ptid) -> Result<Vec<u64>, Error> {
        let thread = self.resolve_thread(ptid)?;
        let state = thread.read_cpu_state()?;
        Ok(state.gp_values())
    }

    /// `G`: overwrite the general registers.
    pub fn on_write_general_registers(&mut self, ptid: Ptid, values: &[u64]) -> Result<(), Error> {
        let thread = self.resolve_thread(ptid)?;
        let mut state = thread.read_cpu_state()?;
        state.set_gp_values(values);
        thread.write_cpu_state(state.as_ref())
    }

    /// `p`: raw bytes of one register under the session's wire numbering.
    pub fn on_read_register_value(&self, ptid: Ptid, regno: u32) -> Result<Vec<u8>, Error> {
        let thread = self.resolve_thread(ptid)?;
        let state = thread.read_cpu_state()?;
        let bytes = state
            .register(self.numbering(), regno)
            .ok_or(Error::InvalidArgument)?;
        Ok(bytes.to_vec())
    }

    /// `P`: overwrite one register; the value must match its width exactly.
    pub fn on_write_register_value(
        &mut self,
        ptid: Ptid,
        regno: u32,
        value: &[u8],
    ) -> Result<(), Error> {
        let thread = self.resolve_thread(ptid)?;
        let mut state = thread.read_cpu_state()?;
        let slot = state
            .register_mut(self.numbering(), regno)
            .ok_or(Error::InvalidArgument)?;
        if value.len() != slot.len() {
            return Err(Error::InvalidArgument);
        }
        slot.copy_from_slice(value);
        thread.write_cpu_state(state.as_ref())
    }

    /// `QSaveRegisterState`: snapshot a thread's CPU state under a fresh id.
    pub fn on_save_registers(&mut self, ptid: Ptid) -> Result<u64, Error> {
        let thread = self.resolve_thread(ptid)?;
        let state = thread.read_cpu_state()?;

        let id = self.next_save_id;
        self.next_save_id += 1;
        self.saved_registers.insert(id, state);
        Ok(id)
    }

    /// `QRestoreRegisterState`: write a snapshot back and consume it.
    pub fn on_restore_registers(&mut self, ptid: Ptid, id: u64) -> Result<(), Error> {
        let thread = self.resolve_thread(ptid)?;
        let state = self.saved_registers.get(&id).ok_or(Error::NotFound)?;
        thread.write_cpu_state(state.as_ref())?;
        self.saved_registers.remove(&id);
        Ok(())
    }

    fn numbering(&self) -> RegisterNumbering {
        self.mode.into()
    }
}

/// Fold descriptor metadata into the reply shape.
fn shape_register_info(set_name: &str, def: &RegisterDef) -> RegisterInfo {
    let (encoding, format) = match def.format {
        RegisterValueFormat::Vector => {
            let format = match def.vector_format {
                Some(VectorFormat::SInt8) => RegisterFormat::VectorSint8,
                Some(VectorFormat::UInt16) => RegisterFormat::VectorUint16,
                Some(VectorFormat::SInt16) => RegisterFormat::VectorSint16,
                Some(VectorFormat::UInt32) => RegisterFormat::VectorUint32,
                Some(VectorFormat::SInt32) => RegisterFormat::VectorSint32,
                Some(VectorFormat::UInt128) => RegisterFormat::VectorUint128,
                Some(VectorFormat::Float32) => RegisterFormat::VectorFloat32,
                Some(VectorFormat::UInt8) | None => RegisterFormat::VectorUint8,
            };
            (RegisterEncoding::Vector, format)
        }
        RegisterValueFormat::Float => (RegisterEncoding::Ieee754, RegisterFormat::Float),
        plain => {
            let encoding = match def.encoding {
                RegisterValueEncoding::UInteger => RegisterEncoding::Uint,
                RegisterValueEncoding::SInteger => RegisterEncoding::Sint,
                RegisterValueEncoding::IeeeSingle
                | RegisterValueEncoding::IeeeDouble
                | RegisterValueEncoding::IeeeExtended => RegisterEncoding::Ieee754,
            };
            let format = match plain {
                RegisterValueFormat::Binary => RegisterFormat::Binary,
                RegisterValueFormat::Decimal => RegisterFormat::Decimal,
                _ => RegisterFormat::Hex,
            };
            (encoding, format)
        }
    };

    RegisterInfo {
        set_name: set_name.to_string(),
        register_name: def.lldb_name.clone().unwrap_or_else(|| def.name.clone()),
        alternate_name: def.alternate_name.clone(),
        generic_name: def.generic_name.clone(),
        bit_size: def.bit_size,
        byte_offset: def.lldb_offset,
        gcc_register_index: def.gcc_number,
        dwarf_register_index: def.dwarf_number,
        encoding,
        format,
        container_registers: def.container_registers.clone(),
        invalidate_registers: def.invalidate_registers.clone(),
    }
}

//! Paginated qXfer object reads.
//!
//! Payloads are small (XML documents and the auxiliary vector), so each
//! read regenerates the full object and slices it; the contract is only
//! that walking increasing offsets reassembles the exact payload and that
//! `last` flips on the final chunk.

use crate::error::Error;
use crate::session::DebugSession;
use crate::target::Process;
use log::debug;
use std::fmt::Write;

/// One window of a qXfer object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XferChunk {
    pub data: Vec<u8>,
    pub last: bool,
}

impl DebugSession {
    /// `qXfer:<object>:read:<annex>:<offset>,<length>`.
    pub fn on_xfer_read(
        &self,
        object: &str,
        annex: &str,
        offset: u64,
        length: u64,
    ) -> Result<XferChunk, Error> {
        debug!(
            target: "session",
            "xfer read object='{object}' annex='{annex}' offset={offset:#x} length={length:#x}"
        );

        let process = self.process()?;
        let payload = match object {
            "features" => {
                let description = process.gdb_description();
                if annex == "target.xml" {
                    description.main_xml().into_bytes()
                } else {
                    description.feature_xml(annex).unwrap_or_default().into_bytes()
                }
            }
            "auxv" => process.auxiliary_vector()?,
            "threads" => threads_document(process).into_bytes(),
            "libraries-svr4" if process.is_elf() => libraries_document(process)?.into_bytes(),
            _ => return Err(Error::Unsupported),
        };

        Ok(paginate(payload, offset, length))
    }
}

/// `<threads>` document: one element per live thread, hex ptid, decimal core.
fn threads_document(process: &dyn Process) -> String {
    let mut doc = String::from("<threads>\n");
    for thread in process.threads() {
        let _ = writeln!(
            doc,
            "<thread id=\"p{:x}.{:x}\" core=\"{}\"/>",
            process.pid(),
            thread.tid(),
            thread.core()
        );
    }
    doc.push_str("</threads>\n");
    doc
}

/// svr4 link-map document; the main module only contributes the `main-lm`
/// attribute.
fn libraries_document(process: &dyn Process) -> Result<String, Error> {
    let mut main_map_address = None;
    let mut entries = String::new();
    for library in process.shared_libraries()? {
        if library.main {
            main_map_address = library.map_address;
        } else {
            let _ = writeln!(
                entries,
                "<library name=\"{}\" lm=\"{:#x}\" l_addr=\"{:#x}\" l_ld=\"{:#x}\" />",
                library.path,
                library.map_address.unwrap_or(0),
                library.base_address,
                library.ld_address
            );
        }
    }

    let mut doc = String::from("<library-list-svr4 version=\"1.0\"");
    if let Some(address) = main_map_address {
        let _ = write!(doc, " main-lm=\"{address:#x}\"");
    }
    doc.push_str(">\n");
    doc.push_str(&entries);
    doc.push_str("</library-list-svr4>");
    Ok(doc)
}

fn paginate(payload: Vec<u8>, offset: u64, length: u64) -> XferChunk {
    let start = (offset.min(payload.len() as u64)) as usize;
    let mut data = payload[start..].to_vec();
    if data.len() as u64 > length {
        data.truncate(length as usize);
        XferChunk { data, last: false }
    } else {
        XferChunk { data, last: true }
    }
}

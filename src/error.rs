use std::io;

/// Session-level error taxonomy.
///
/// Every operation of the session core returns one of these kinds; the
/// framing layer maps them onto `Exx` replies. Collaborator errors are
/// passed through verbatim, so platform implementations report their
/// syscall and I/O failures with the dedicated variants.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- protocol error kinds --------------------------------------
    #[error("operation not supported")]
    Unsupported,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("not found")]
    NotFound,
    #[error("no inferior process")]
    ProcessNotFound,
    #[error("already exists")]
    AlreadyExist,
    #[error("unknown error")]
    Unknown,

    // --------------------------------- platform errors -------------------------------------------
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0} syscall error: {1}")]
    Syscall(&'static str, nix::Error),
}

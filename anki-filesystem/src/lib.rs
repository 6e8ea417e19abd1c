//! Resource filesystem: an ordered search path of directory and archive
//! mount points resolving canonical forward-slash filenames to readable byte
//! streams.

pub mod archive;
pub mod file;
pub mod filesystem;
pub mod path;

#[cfg(test)]
mod tests;

/// Errors that can be returned from resource filesystem operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no mount point supplies '{0}'")]
    NotFound(String),
    #[error("path '{path}' escapes its mount root")]
    PathEscape { path: String },
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("I/O failure")]
    Io(#[from] std::io::Error),
    #[error("corrupt archive: {reason}")]
    CorruptArchive { reason: String },
    #[error("invalid or unexpected data was returned: {0}")]
    InvalidData(Box<str>),
    #[error("malformed XML document")]
    Xml(#[from] xmltree::ParseError),
}

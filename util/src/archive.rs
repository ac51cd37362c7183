//! Struct archiving functionality
//!
//! To add archiving functionality to a struct implement the `Archived` trait.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
///
/// Records must be flat structs, since CSV has no notion of nesting. Files
/// for the writer are opened with [`create_file`].
pub struct Archiver<W: std::io::Write = File> {
    writer: Writer<W>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors that can occur while archiving.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Could not open the archive file: {0}")]
    FileError(std::io::Error),

    #[error("Could not serialise the record: {0}")]
    SerialiseError(csv::Error),

    #[error("Could not flush the archive: {0}")]
    FlushError(std::io::Error),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A trait which enables a struct to be archived as a csv.
///
/// Implementors hold one `Archiver` per archived quantity, created in their
/// `new` or `init` functions, and write the latest values on each call.
pub trait Archived {
    /// Write the archives for this struct
    fn write(&mut self) -> Result<(), ArchiveError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<W: std::io::Write> Archiver<W> {
    /// Create an archiver writing into any writer, the header row is taken
    /// from the first record's field names.
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: WriterBuilder::new().has_headers(true).from_writer(writer),
        }
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(&mut self, record: T) -> Result<(), ArchiveError> {
        self.writer
            .serialize(record)
            .map_err(ArchiveError::SerialiseError)?;
        self.writer.flush().map_err(ArchiveError::FlushError)
    }

    /// Consume the archiver and return the inner writer.
    pub fn into_inner(self) -> Option<W> {
        self.writer.into_inner().ok()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Create (or truncate) an archive file at a path relative to the session's
/// archive root, creating any missing parent directories.
pub fn create_file<P: AsRef<Path>>(session: &Session, path: P) -> Result<File, ArchiveError> {
    let session_path = session.arch_root.join(path);

    // Create the parent directory if needed
    if let Some(parent) = session_path.parent() {
        std::fs::create_dir_all(parent).map_err(ArchiveError::FileError)?;
    }

    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(session_path)
        .map_err(ArchiveError::FileError)
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        time_s: f64,
        left: i32,
        right: i32,
    }

    #[test]
    fn test_serialise_writes_header_once() {
        let mut arch = Archiver::from_writer(Vec::new());
        arch.serialise(Row { time_s: 0.0, left: 1, right: -1 }).unwrap();
        arch.serialise(Row { time_s: 0.5, left: 2, right: -2 }).unwrap();

        let out = String::from_utf8(arch.into_inner().unwrap()).unwrap();
        assert_eq!(out, "time_s,left,right\n0.0,1,-1\n0.5,2,-2\n");
    }
}

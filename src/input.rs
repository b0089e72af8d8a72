//! Input sources
//!
//! An `InputSource` is the payload of a recorded edit. It can be read any
//! number of times: classification probes it at record time and the import
//! reads it again when the artifact is written. Large payloads can be spooled
//! to a temporary file; the file is removed once the last clone of the source
//! is dropped, whether the artifact holding it was written or discarded.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tempfile::NamedTempFile;

#[derive(Clone)]
enum Buffer {
    Memory(Arc<[u8]>),
    Spooled(Arc<NamedTempFile>),
}

/// A multiply-readable byte payload with content metadata
#[derive(Clone)]
pub struct InputSource {
    buffer: Buffer,
    content_type: Option<String>,
    extension: Option<String>,
}

impl InputSource {
    /// Wrap an in-memory payload
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        Self {
            buffer: Buffer::Memory(Arc::from(data)),
            content_type: None,
            extension: None,
        }
    }

    /// Copy a reader into a temporary file and serve reads from there
    pub fn spool<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut file = NamedTempFile::new()?;
        io::copy(&mut reader, &mut file)?;
        file.flush()?;
        Ok(Self {
            buffer: Buffer::Spooled(Arc::new(file)),
            content_type: None,
            extension: None,
        })
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Open a fresh reader positioned at the start of the payload
    pub fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        match &self.buffer {
            Buffer::Memory(data) => Ok(Box::new(Cursor::new(&data[..]))),
            Buffer::Spooled(file) => {
                let mut handle: File = file.reopen()?;
                handle.seek(SeekFrom::Start(0))?;
                Ok(Box::new(handle))
            }
        }
    }

    /// Read the whole payload
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.open()?.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Path of the backing temporary file, if the payload was spooled
    pub fn spool_path(&self) -> Option<&std::path::Path> {
        match &self.buffer {
            Buffer::Memory(_) => None,
            Buffer::Spooled(file) => Some(file.path()),
        }
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = match &self.buffer {
            Buffer::Memory(data) => format!("memory({} bytes)", data.len()),
            Buffer::Spooled(file) => format!("spooled({})", file.path().display()),
        };
        f.debug_struct("InputSource")
            .field("buffer", &backing)
            .field("content_type", &self.content_type)
            .field("extension", &self.extension)
            .finish()
    }
}

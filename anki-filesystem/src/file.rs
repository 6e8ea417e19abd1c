//! Readable byte streams handed out by the resource filesystem.

use std::fs;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

use flate2::read::DeflateDecoder;

use crate::archive::{ArchiveEntry, Codec};
use crate::Error;

/// A readable, seekable stream over one resource.
///
/// Directory-backed and archive-backed files behave identically from the
/// caller's perspective: [`ResourceFile::size`] is the uncompressed length,
/// seeks are absolute within the resource, and reads never observe container
/// framing. A fresh stream is opened per consumer; streams are not shared
/// across threads.
#[derive(Debug)]
pub struct ResourceFile {
    size: u64,
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    /// Plain file under a directory mount.
    Disk(fs::File),
    /// Bounded window over an archive file (`Store` codec).
    Window {
        file: fs::File,
        base: u64,
        len: u64,
        pos: u64,
    },
    /// Fully inflated archive payload (`Deflate` codec).
    Memory(Cursor<Vec<u8>>),
}

impl ResourceFile {
    pub(crate) fn from_disk(file: fs::File) -> Result<ResourceFile, Error> {
        let size = file.metadata()?.len();
        Ok(ResourceFile {
            size,
            inner: Inner::Disk(file),
        })
    }

    pub(crate) fn from_archive(mut file: fs::File, entry: ArchiveEntry) -> Result<ResourceFile, Error> {
        let inner = match entry.codec {
            Codec::Store => {
                file.seek(SeekFrom::Start(entry.offset))?;
                Inner::Window {
                    file,
                    base: entry.offset,
                    len: entry.uncompressed_size,
                    pos: 0,
                }
            }
            Codec::Deflate => {
                file.seek(SeekFrom::Start(entry.offset))?;
                let compressed = file.take(entry.compressed_size);
                let mut payload = Vec::with_capacity(entry.uncompressed_size as usize);
                DeflateDecoder::new(compressed)
                    .read_to_end(&mut payload)
                    .map_err(|err| Error::CorruptArchive {
                        reason: format!("deflate payload failed to decode: {err}"),
                    })?;
                if payload.len() as u64 != entry.uncompressed_size {
                    return Err(Error::CorruptArchive {
                        reason: format!(
                            "deflate payload decoded to {} bytes, expected {}",
                            payload.len(),
                            entry.uncompressed_size
                        ),
                    });
                }
                Inner::Memory(Cursor::new(payload))
            }
        };
        Ok(ResourceFile {
            size: entry.uncompressed_size,
            inner,
        })
    }

    /// Uncompressed length of the resource in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Seek to an absolute offset within the resource.
    pub fn seek_from_start(&mut self, offset: u64) -> Result<(), Error> {
        self.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Read everything from the current position to the end.
    pub fn read_all_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::with_capacity(self.size as usize);
        self.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Read the remainder of the resource as UTF-8 text.
    ///
    /// A single trailing NUL terminator, if present, is not part of the text.
    pub fn read_all_text(&mut self) -> Result<String, Error> {
        let mut bytes = self.read_all_bytes()?;
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        String::from_utf8(bytes)
            .map_err(|err| Error::InvalidData(format!("text is not UTF-8: {err}").into()))
    }

    /// Parse the remainder of the resource as an XML document.
    pub fn parse_xml(&mut self) -> Result<xmltree::Element, Error> {
        let root = xmltree::Element::parse(&mut *self)?;
        Ok(root)
    }
}

impl Read for ResourceFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Disk(file) => file.read(buf),
            Inner::Window { file, len, pos, .. } => {
                let remaining = len.saturating_sub(*pos);
                if remaining == 0 {
                    return Ok(0);
                }
                let cap = buf.len().min(remaining as usize);
                let read = file.read(&mut buf[..cap])?;
                *pos += read as u64;
                Ok(read)
            }
            Inner::Memory(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for ResourceFile {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        match &mut self.inner {
            Inner::Disk(file) => file.seek(target),
            Inner::Window {
                file,
                base,
                len,
                pos,
            } => {
                let new_pos = match target {
                    SeekFrom::Start(offset) => i128::from(offset),
                    SeekFrom::Current(delta) => i128::from(*pos) + i128::from(delta),
                    SeekFrom::End(delta) => i128::from(*len) + i128::from(delta),
                };
                let new_pos = u64::try_from(new_pos).map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "seek before the start of the resource",
                    )
                })?;
                file.seek(SeekFrom::Start(*base + new_pos))?;
                *pos = new_pos;
                Ok(new_pos)
            }
            Inner::Memory(cursor) => cursor.seek(target),
        }
    }
}

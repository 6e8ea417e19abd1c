//! Byte-blob asset kind with no backend interaction.
//!
//! Useful for benchmarks and for exercising the cache and loader machinery
//! without dragging a decoder into the picture.

use anki_filesystem::file::ResourceFile;

use crate::asset::AssetKind;
use crate::manager::LoadContext;
use crate::Error;

pub struct Dummy;

#[derive(Debug)]
pub struct DummyHeader {
    pub size_bytes: u64,
}

#[derive(Debug)]
pub struct DummyBody {
    pub bytes: Vec<u8>,
}

impl AssetKind for Dummy {
    const KIND: &'static str = "dummy";

    type Header = DummyHeader;
    type Body = DummyBody;

    fn decode_header(
        file: &mut ResourceFile,
        _name: &str,
        _ctx: &LoadContext,
    ) -> Result<DummyHeader, Error> {
        Ok(DummyHeader {
            size_bytes: file.size(),
        })
    }

    fn decode_body(
        _header: &DummyHeader,
        file: &mut ResourceFile,
        _name: &str,
        _ctx: &LoadContext,
    ) -> Result<DummyBody, Error> {
        Ok(DummyBody {
            bytes: file.read_all_bytes()?,
        })
    }
}

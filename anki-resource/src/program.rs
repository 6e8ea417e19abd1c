//! Shader program sources.

use anki_filesystem::file::ResourceFile;

use crate::asset::AssetKind;
use crate::manager::LoadContext;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStage {
    Vertex,
    Fragment,
    Compute,
}

impl ProgramStage {
    /// Stage from the filename extension: `.vert`, `.frag`, or `.comp`.
    pub fn from_name(name: &str) -> Option<ProgramStage> {
        match name.rsplit('.').next() {
            Some("vert") => Some(ProgramStage::Vertex),
            Some("frag") => Some(ProgramStage::Fragment),
            Some("comp") => Some(ProgramStage::Compute),
            _ => None,
        }
    }
}

pub struct Program;

#[derive(Debug)]
pub struct ProgramHeader {
    pub stage: ProgramStage,
}

#[derive(Debug)]
pub struct ProgramBody {
    pub source: String,
}

impl AssetKind for Program {
    const KIND: &'static str = "program";

    type Header = ProgramHeader;
    type Body = ProgramBody;

    fn decode_header(
        file: &mut ResourceFile,
        name: &str,
        _ctx: &LoadContext,
    ) -> Result<ProgramHeader, Error> {
        let stage = ProgramStage::from_name(name)
            .ok_or_else(|| Error::decode::<Program>(name, "unknown shader extension"))?;
        if file.size() == 0 {
            return Err(Error::decode::<Program>(name, "shader source is empty"));
        }
        Ok(ProgramHeader { stage })
    }

    fn decode_body(
        _header: &ProgramHeader,
        file: &mut ResourceFile,
        name: &str,
        _ctx: &LoadContext,
    ) -> Result<ProgramBody, Error> {
        let source = file.read_all_text()?;
        if source.trim().is_empty() {
            return Err(Error::decode::<Program>(name, "shader source is empty"));
        }
        Ok(ProgramBody { source })
    }
}

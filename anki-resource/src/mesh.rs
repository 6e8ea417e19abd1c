//! Binary mesh assets (`.akms`).
//!
//! Layout, all little endian:
//!
//! ```text
//! magic         [u8; 4]  "AKMS"
//! version       u32
//! vertex_count  u32
//! index_count   u32
//! positions     vertex_count * 3 * f32
//! indices       index_count * u32
//! ```

use std::io::Read;

use anki_filesystem::file::ResourceFile;
use byteorder::{LittleEndian, ReadBytesExt};

use crate::asset::AssetKind;
use crate::backend::{BackendSlot, SlotKind};
use crate::manager::LoadContext;
use crate::Error;

pub const MESH_MAGIC: [u8; 4] = *b"AKMS";
pub const MESH_VERSION: u32 = 1;

const MESH_HEADER_LEN: u64 = 16;

/// Axis-aligned bounding box of a mesh's positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

pub struct Mesh;

#[derive(Debug)]
pub struct MeshHeader {
    pub vertex_count: u32,
    pub index_count: u32,
    slot: BackendSlot,
}

impl MeshHeader {
    pub fn slot(&self) -> &BackendSlot {
        &self.slot
    }

    fn positions_len(&self) -> usize {
        self.vertex_count as usize * 3 * 4
    }

    fn indices_len(&self) -> usize {
        self.index_count as usize * 4
    }
}

#[derive(Debug)]
pub struct MeshBody {
    pub bounds: Aabb,
}

impl AssetKind for Mesh {
    const KIND: &'static str = "mesh";

    type Header = MeshHeader;
    type Body = MeshBody;

    fn decode_header(
        file: &mut ResourceFile,
        name: &str,
        ctx: &LoadContext,
    ) -> Result<MeshHeader, Error> {
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).map_err(anki_filesystem::Error::Io)?;
        if magic != MESH_MAGIC {
            return Err(Error::decode::<Mesh>(name, "bad magic"));
        }
        let version = file.read_u32::<LittleEndian>().map_err(anki_filesystem::Error::Io)?;
        if version != MESH_VERSION {
            return Err(Error::decode::<Mesh>(name, format!("unsupported version {version}")));
        }
        let vertex_count = file.read_u32::<LittleEndian>().map_err(anki_filesystem::Error::Io)?;
        let index_count = file.read_u32::<LittleEndian>().map_err(anki_filesystem::Error::Io)?;

        if vertex_count == 0 {
            return Err(Error::decode::<Mesh>(name, "mesh has no vertices"));
        }
        if index_count == 0 || index_count % 3 != 0 {
            return Err(Error::decode::<Mesh>(
                name,
                format!("index count {index_count} is not a positive multiple of 3"),
            ));
        }

        let size_bytes = u64::from(vertex_count) * 12 + u64::from(index_count) * 4;
        Ok(MeshHeader {
            vertex_count,
            index_count,
            slot: BackendSlot::allocate(ctx.backend().clone(), SlotKind::Mesh, size_bytes)?,
        })
    }

    fn decode_body(
        header: &MeshHeader,
        file: &mut ResourceFile,
        name: &str,
        _ctx: &LoadContext,
    ) -> Result<MeshBody, Error> {
        file.seek_from_start(MESH_HEADER_LEN)?;

        let mut payload = vec![0u8; header.positions_len() + header.indices_len()];
        file.read_exact(&mut payload)
            .map_err(|_| Error::decode::<Mesh>(name, "vertex or index data is truncated"))?;

        let (position_bytes, index_bytes) = payload.split_at(header.positions_len());

        let mut bounds = Aabb {
            min: [f32::INFINITY; 3],
            max: [f32::NEG_INFINITY; 3],
        };
        for position in position_bytes.chunks_exact(12) {
            for axis in 0..3 {
                let bytes = [
                    position[axis * 4],
                    position[axis * 4 + 1],
                    position[axis * 4 + 2],
                    position[axis * 4 + 3],
                ];
                let value = f32::from_le_bytes(bytes);
                if !value.is_finite() {
                    return Err(Error::decode::<Mesh>(name, "non-finite vertex position"));
                }
                bounds.min[axis] = bounds.min[axis].min(value);
                bounds.max[axis] = bounds.max[axis].max(value);
            }
        }

        for index in index_bytes.chunks_exact(4) {
            let index = u32::from_le_bytes([index[0], index[1], index[2], index[3]]);
            if index >= header.vertex_count {
                return Err(Error::decode::<Mesh>(
                    name,
                    format!("index {index} is out of range for {} vertices", header.vertex_count),
                ));
            }
        }

        header.slot.upload(&payload)?;
        Ok(MeshBody { bounds })
    }
}

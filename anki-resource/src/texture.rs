//! TGA-backed texture assets.
//!
//! Supports the TGA shapes our tooling emits: uncompressed or RLE true
//! colour at 24/32 bpp, and uncompressed 8 bpp grey scale. Pixels are
//! swizzled to RGB(A) order and pushed to the backend slot that the header
//! decode pre-allocated.

use std::io::Read;

use anki_filesystem::file::ResourceFile;
use byteorder::{LittleEndian, ReadBytesExt};

use crate::asset::AssetKind;
use crate::backend::{BackendSlot, SlotKind};
use crate::manager::LoadContext;
use crate::Error;

const TGA_HEADER_LEN: u64 = 18;

const TGA_TRUE_COLOR: u8 = 2;
const TGA_GREY_SCALE: u8 = 3;
const TGA_TRUE_COLOR_RLE: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    R8,
    Rgb8,
    Rgba8,
}

impl TextureFormat {
    pub fn channels(self) -> u32 {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::Rgb8 => 3,
            TextureFormat::Rgba8 => 4,
        }
    }
}

pub struct Texture;

#[derive(Debug)]
pub struct TextureHeader {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    image_type: u8,
    pixel_data_offset: u64,
    slot: BackendSlot,
}

impl TextureHeader {
    pub fn slot(&self) -> &BackendSlot {
        &self.slot
    }

    pub fn size_bytes(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.format.channels())
    }
}

#[derive(Debug)]
pub struct TextureBody {
    pub bytes_uploaded: u64,
}

impl AssetKind for Texture {
    const KIND: &'static str = "texture";

    type Header = TextureHeader;
    type Body = TextureBody;

    fn decode_header(
        file: &mut ResourceFile,
        name: &str,
        ctx: &LoadContext,
    ) -> Result<TextureHeader, Error> {
        let id_length = file.read_u8().map_err(anki_filesystem::Error::Io)?;
        let color_map_type = file.read_u8().map_err(anki_filesystem::Error::Io)?;
        let image_type = file.read_u8().map_err(anki_filesystem::Error::Io)?;
        let mut color_map_spec = [0u8; 5];
        file.read_exact(&mut color_map_spec)
            .map_err(anki_filesystem::Error::Io)?;
        let _x_origin = file.read_u16::<LittleEndian>().map_err(anki_filesystem::Error::Io)?;
        let _y_origin = file.read_u16::<LittleEndian>().map_err(anki_filesystem::Error::Io)?;
        let width = file.read_u16::<LittleEndian>().map_err(anki_filesystem::Error::Io)?;
        let height = file.read_u16::<LittleEndian>().map_err(anki_filesystem::Error::Io)?;
        let bits_per_pixel = file.read_u8().map_err(anki_filesystem::Error::Io)?;
        let _descriptor = file.read_u8().map_err(anki_filesystem::Error::Io)?;

        if color_map_type != 0 {
            return Err(Error::decode::<Texture>(name, "colour-mapped TGAs are not supported"));
        }
        let format = match (image_type, bits_per_pixel) {
            (TGA_TRUE_COLOR | TGA_TRUE_COLOR_RLE, 24) => TextureFormat::Rgb8,
            (TGA_TRUE_COLOR | TGA_TRUE_COLOR_RLE, 32) => TextureFormat::Rgba8,
            (TGA_GREY_SCALE, 8) => TextureFormat::R8,
            _ => {
                return Err(Error::decode::<Texture>(
                    name,
                    format!("unsupported TGA shape (type {image_type}, {bits_per_pixel} bpp)"),
                ))
            }
        };
        if width == 0 || height == 0 {
            return Err(Error::decode::<Texture>(name, "image has a zero dimension"));
        }
        let max = ctx.settings().max_texture_size;
        if u32::from(width) > max || u32::from(height) > max {
            return Err(Error::decode::<Texture>(
                name,
                format!("{width}x{height} exceeds the maximum texture size {max}"),
            ));
        }

        let header = TextureHeader {
            width: u32::from(width),
            height: u32::from(height),
            format,
            image_type,
            pixel_data_offset: TGA_HEADER_LEN + u64::from(id_length),
            // The slot is reserved here; the body task only uploads into it.
            slot: BackendSlot::allocate(
                ctx.backend().clone(),
                SlotKind::Texture,
                u64::from(width) * u64::from(height) * u64::from(format.channels()),
            )?,
        };
        Ok(header)
    }

    fn decode_body(
        header: &TextureHeader,
        file: &mut ResourceFile,
        name: &str,
        _ctx: &LoadContext,
    ) -> Result<TextureBody, Error> {
        file.seek_from_start(header.pixel_data_offset)?;

        let pixels = match header.image_type {
            TGA_TRUE_COLOR | TGA_GREY_SCALE => read_raw_pixels(header, file, name)?,
            TGA_TRUE_COLOR_RLE => read_rle_pixels(header, file, name)?,
            other => unreachable!("header decode accepted image type {other}"),
        };

        header.slot.upload(&pixels)?;
        Ok(TextureBody {
            bytes_uploaded: pixels.len() as u64,
        })
    }
}

fn read_raw_pixels(
    header: &TextureHeader,
    file: &mut ResourceFile,
    name: &str,
) -> Result<Vec<u8>, Error> {
    let mut pixels = vec![0u8; header.size_bytes() as usize];
    file.read_exact(&mut pixels)
        .map_err(|_| Error::decode::<Texture>(name, "pixel data is truncated"))?;
    swizzle_bgr(&mut pixels, header.format);
    Ok(pixels)
}

fn read_rle_pixels(
    header: &TextureHeader,
    file: &mut ResourceFile,
    name: &str,
) -> Result<Vec<u8>, Error> {
    let channels = header.format.channels() as usize;
    let total = header.size_bytes() as usize;
    let truncated = |_| Error::decode::<Texture>(name, "RLE pixel data is truncated");

    let mut pixels = Vec::with_capacity(total);
    while pixels.len() < total {
        let packet = file.read_u8().map_err(truncated)?;
        let count = (packet as usize & 0x7f) + 1;
        if pixels.len() + count * channels > total {
            return Err(Error::decode::<Texture>(name, "RLE packet overruns the image"));
        }

        if packet & 0x80 != 0 {
            // Run-length packet: one pixel value repeated.
            let mut pixel = [0u8; 4];
            file.read_exact(&mut pixel[..channels]).map_err(truncated)?;
            for _ in 0..count {
                pixels.extend_from_slice(&pixel[..channels]);
            }
        } else {
            // Raw packet: `count` literal pixels.
            let start = pixels.len();
            pixels.resize(start + count * channels, 0);
            file.read_exact(&mut pixels[start..]).map_err(truncated)?;
        }
    }

    swizzle_bgr(&mut pixels, header.format);
    Ok(pixels)
}

/// TGA stores true colour pixels as BGR(A); flip to RGB(A) in place.
fn swizzle_bgr(pixels: &mut [u8], format: TextureFormat) {
    let channels = format.channels() as usize;
    if channels < 3 {
        return;
    }
    for pixel in pixels.chunks_exact_mut(channels) {
        pixel.swap(0, 2);
    }
}

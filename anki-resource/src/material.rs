//! XML material assets.
//!
//! A material composes leaf assets: one program per stage plus an ordered
//! texture list and scalar parameters. Cross-references are owning handles
//! and point strictly from the composite to the leaves, so reference cycles
//! cannot form.
//!
//! ```xml
//! <material>
//!     <programs>
//!         <vertex>shaders/pbr.vert</vertex>
//!         <fragment>shaders/pbr.frag</fragment>
//!     </programs>
//!     <textures>
//!         <texture unit="0">textures/crate_albedo.tga</texture>
//!     </textures>
//!     <values>
//!         <value name="roughness">0.25</value>
//!     </values>
//! </material>
//! ```

use anki_filesystem::file::ResourceFile;
use xmltree::{Element, XMLNode};

use crate::asset::AssetKind;
use crate::manager::LoadContext;
use crate::program::{Program, ProgramStage};
use crate::texture::Texture;
use crate::{Error, ProgramHandle, TextureHandle};

pub struct Material;

#[derive(Debug)]
pub struct MaterialTexture {
    pub unit: u32,
    pub texture: TextureHandle,
}

#[derive(Debug, Clone)]
pub struct MaterialValue {
    pub name: String,
    pub value: f32,
}

#[derive(Debug)]
pub struct MaterialHeader {
    pub vertex_program: ProgramHandle,
    pub fragment_program: ProgramHandle,
    pub textures: Vec<MaterialTexture>,
    pub values: Vec<MaterialValue>,
}

impl MaterialHeader {
    /// Whether every referenced leaf asset has finished its body decode.
    ///
    /// The material itself becomes ready as soon as its document is decoded;
    /// renderers gate on this before binding it.
    pub fn references_ready(&self) -> bool {
        self.vertex_program.is_ready()
            && self.fragment_program.is_ready()
            && self.textures.iter().all(|entry| entry.texture.is_ready())
    }
}

#[derive(Debug)]
pub struct MaterialBody;

impl AssetKind for Material {
    const KIND: &'static str = "material";

    type Header = MaterialHeader;
    type Body = MaterialBody;

    fn decode_header(
        file: &mut ResourceFile,
        name: &str,
        ctx: &LoadContext,
    ) -> Result<MaterialHeader, Error> {
        let root = file.parse_xml()?;
        if root.name != "material" {
            return Err(Error::decode::<Material>(
                name,
                format!("root element is <{}>, expected <material>", root.name),
            ));
        }

        let programs = root
            .get_child("programs")
            .ok_or_else(|| Error::decode::<Material>(name, "missing <programs>"))?;
        let vertex_program =
            load_program(programs, "vertex", ProgramStage::Vertex, name, ctx)?;
        let fragment_program =
            load_program(programs, "fragment", ProgramStage::Fragment, name, ctx)?;

        let mut textures = Vec::new();
        if let Some(list) = root.get_child("textures") {
            for element in child_elements(list) {
                if element.name != "texture" {
                    continue;
                }
                let unit = element
                    .attributes
                    .get("unit")
                    .and_then(|value| value.parse::<u32>().ok())
                    .ok_or_else(|| {
                        Error::decode::<Material>(name, "<texture> needs a numeric unit attribute")
                    })?;
                let filename = element_text(element).ok_or_else(|| {
                    Error::decode::<Material>(name, "<texture> is missing its filename")
                })?;
                textures.push(MaterialTexture {
                    unit,
                    texture: ctx.load::<Texture>(&filename)?,
                });
            }
        }

        let mut values = Vec::new();
        if let Some(list) = root.get_child("values") {
            for element in child_elements(list) {
                if element.name != "value" {
                    continue;
                }
                let value_name = element.attributes.get("name").cloned().ok_or_else(|| {
                    Error::decode::<Material>(name, "<value> needs a name attribute")
                })?;
                let value = element_text(element)
                    .and_then(|text| text.parse::<f32>().ok())
                    .ok_or_else(|| {
                        Error::decode::<Material>(
                            name,
                            format!("value '{value_name}' is not a float"),
                        )
                    })?;
                values.push(MaterialValue {
                    name: value_name,
                    value,
                });
            }
        }

        Ok(MaterialHeader {
            vertex_program,
            fragment_program,
            textures,
            values,
        })
    }

    fn decode_body(
        _header: &MaterialHeader,
        _file: &mut ResourceFile,
        _name: &str,
        _ctx: &LoadContext,
    ) -> Result<MaterialBody, Error> {
        // The document decode happens in the header phase; the body task only
        // exists so materials move through the same states as every kind.
        Ok(MaterialBody)
    }
}

fn load_program(
    programs: &Element,
    child: &str,
    stage: ProgramStage,
    name: &str,
    ctx: &LoadContext,
) -> Result<ProgramHandle, Error> {
    let filename = programs
        .get_child(child)
        .and_then(element_text)
        .ok_or_else(|| Error::decode::<Material>(name, format!("missing <{child}> program")))?;
    let handle = ctx.load::<Program>(&filename)?;

    let actual = handle.header().map(|header| header.stage);
    if actual != Some(stage) {
        return Err(Error::decode::<Material>(
            name,
            format!("'{filename}' is not a {stage:?} shader"),
        ));
    }
    Ok(handle)
}

fn child_elements(parent: &Element) -> impl Iterator<Item = &Element> {
    parent.children.iter().filter_map(XMLNode::as_element)
}

fn element_text(element: &Element) -> Option<String> {
    let text = element.get_text()?;
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

//! XML animation assets: named channels of position/rotation/scale keys.
//!
//! ```xml
//! <animation>
//!     <channels>
//!         <channel name="spine">
//!             <positionKeys>
//!                 <key><time>0.0</time><value>0 1 0</value></key>
//!             </positionKeys>
//!             <rotationKeys>
//!                 <key><time>0.0</time><value>0 0 0 1</value></key>
//!             </rotationKeys>
//!             <scaleKeys>
//!                 <key><time>0.0</time><value>1.0</value></key>
//!             </scaleKeys>
//!         </channel>
//!     </channels>
//! </animation>
//! ```

use anki_filesystem::file::ResourceFile;
use xmltree::{Element, XMLNode};

use crate::asset::AssetKind;
use crate::manager::LoadContext;
use crate::Error;

pub struct Animation;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionKey {
    pub time: f64,
    pub position: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationKey {
    pub time: f64,
    /// Quaternion, `[x, y, z, w]`.
    pub rotation: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleKey {
    pub time: f64,
    pub scale: f32,
}

#[derive(Debug, Clone)]
pub struct AnimationChannel {
    pub name: String,
    pub position_keys: Vec<PositionKey>,
    pub rotation_keys: Vec<RotationKey>,
    pub scale_keys: Vec<ScaleKey>,
}

#[derive(Debug)]
pub struct AnimationHeader {
    pub channel_count: usize,
}

#[derive(Debug)]
pub struct AnimationBody {
    /// Largest key time across every track.
    pub duration: f64,
    pub channels: Vec<AnimationChannel>,
}

impl AssetKind for Animation {
    const KIND: &'static str = "animation";

    type Header = AnimationHeader;
    type Body = AnimationBody;

    fn decode_header(
        file: &mut ResourceFile,
        name: &str,
        _ctx: &LoadContext,
    ) -> Result<AnimationHeader, Error> {
        let root = file.parse_xml()?;
        let channels = channels_element(&root, name)?;
        let channel_count = child_elements(channels)
            .filter(|element| element.name == "channel")
            .count();
        if channel_count == 0 {
            return Err(Error::decode::<Animation>(name, "animation has no channels"));
        }
        Ok(AnimationHeader { channel_count })
    }

    fn decode_body(
        header: &AnimationHeader,
        file: &mut ResourceFile,
        name: &str,
        _ctx: &LoadContext,
    ) -> Result<AnimationBody, Error> {
        let root = file.parse_xml()?;
        let channels_el = channels_element(&root, name)?;

        let mut channels = Vec::with_capacity(header.channel_count);
        let mut duration = 0.0f64;
        for element in child_elements(channels_el) {
            if element.name != "channel" {
                continue;
            }
            let channel_name = element.attributes.get("name").cloned().ok_or_else(|| {
                Error::decode::<Animation>(name, "<channel> needs a name attribute")
            })?;

            let mut channel = AnimationChannel {
                name: channel_name,
                position_keys: Vec::new(),
                rotation_keys: Vec::new(),
                scale_keys: Vec::new(),
            };
            for (time, values) in keys(element, "positionKeys", name)? {
                channel.position_keys.push(PositionKey {
                    time,
                    position: fixed_values::<3>(&values, name)?,
                });
            }
            for (time, values) in keys(element, "rotationKeys", name)? {
                channel.rotation_keys.push(RotationKey {
                    time,
                    rotation: fixed_values::<4>(&values, name)?,
                });
            }
            for (time, values) in keys(element, "scaleKeys", name)? {
                channel.scale_keys.push(ScaleKey {
                    time,
                    scale: fixed_values::<1>(&values, name)?[0],
                });
            }

            for last_time in [
                channel.position_keys.last().map(|key| key.time),
                channel.rotation_keys.last().map(|key| key.time),
                channel.scale_keys.last().map(|key| key.time),
            ]
            .into_iter()
            .flatten()
            {
                duration = duration.max(last_time);
            }
            channels.push(channel);
        }

        Ok(AnimationBody { duration, channels })
    }
}

fn channels_element<'a>(root: &'a Element, name: &str) -> Result<&'a Element, Error> {
    if root.name != "animation" {
        return Err(Error::decode::<Animation>(
            name,
            format!("root element is <{}>, expected <animation>", root.name),
        ));
    }
    root.get_child("channels")
        .ok_or_else(|| Error::decode::<Animation>(name, "missing <channels>"))
}

/// Parse one `<...Keys>` track into `(time, raw value floats)` pairs,
/// enforcing non-decreasing key times.
fn keys(
    channel: &Element,
    track: &str,
    name: &str,
) -> Result<Vec<(f64, Vec<f32>)>, Error> {
    let Some(track_el) = channel.get_child(track) else {
        return Ok(Vec::new());
    };

    let mut keys = Vec::new();
    let mut previous_time = f64::NEG_INFINITY;
    for key in child_elements(track_el) {
        if key.name != "key" {
            continue;
        }
        let time = key
            .get_child("time")
            .and_then(element_text)
            .and_then(|text| text.parse::<f64>().ok())
            .ok_or_else(|| {
                Error::decode::<Animation>(name, format!("{track} key has a bad <time>"))
            })?;
        if time < previous_time {
            return Err(Error::decode::<Animation>(
                name,
                format!("{track} key times are not sorted"),
            ));
        }
        previous_time = time;

        let values = key
            .get_child("value")
            .and_then(element_text)
            .ok_or_else(|| {
                Error::decode::<Animation>(name, format!("{track} key has no <value>"))
            })?;
        let values = values
            .split_whitespace()
            .map(|token| token.parse::<f32>())
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|_| {
                Error::decode::<Animation>(name, format!("{track} key value is not numeric"))
            })?;
        keys.push((time, values));
    }
    Ok(keys)
}

fn fixed_values<const N: usize>(values: &[f32], name: &str) -> Result<[f32; N], Error> {
    <[f32; N]>::try_from(values)
        .map_err(|_| Error::decode::<Animation>(name, format!("key value needs {N} components")))
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

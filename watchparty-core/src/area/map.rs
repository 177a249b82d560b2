//! Town map
//!
//! The subset of the Tiled JSON map format a town needs: object layers with
//! named, typed rectangles. Tile data and every other property are ignored.

use serde::Deserialize;

use super::interactable::BoundingBox;

/// Object type marking a viewing area on the map
pub const VIEWING_AREA_OBJECT_TYPE: &str = "ViewingArea";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TownMap {
    #[serde(default)]
    pub layers: Vec<MapLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MapLayer {
    #[serde(default)]
    pub name: String,
    /// Present on object layers only
    #[serde(default)]
    pub objects: Vec<MapObject>,
    /// Present on group layers only
    #[serde(default)]
    pub layers: Vec<MapLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MapObject {
    #[serde(default)]
    pub name: String,
    /// Older Tiled versions write `type`, newer ones `class`
    #[serde(default, rename = "type", alias = "class")]
    pub object_type: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

impl MapObject {
    /// The object's rectangle, if it has a non-zero width and height
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match (self.width, self.height) {
            (Some(width), Some(height)) if width != 0.0 && height != 0.0 => Some(BoundingBox {
                x: self.x,
                y: self.y,
                width,
                height,
            }),
            _ => None,
        }
    }
}

impl TownMap {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Every object of every layer, group layers included, in file order
    pub fn objects(&self) -> Vec<&MapObject> {
        fn collect<'a>(layers: &'a [MapLayer], out: &mut Vec<&'a MapObject>) {
            for layer in layers {
                out.extend(layer.objects.iter());
                collect(&layer.layers, out);
            }
        }
        let mut out = Vec::new();
        collect(&self.layers, &mut out);
        out
    }

    /// Objects marking viewing areas
    pub fn viewing_area_objects(&self) -> Vec<&MapObject> {
        self.objects()
            .into_iter()
            .filter(|o| o.object_type == VIEWING_AREA_OBJECT_TYPE)
            .collect()
    }
}

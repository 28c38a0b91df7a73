use serde::{Deserialize, Deserializer, Serialize};

/// A DAVIS split exported in COCO annotation format.
///
/// Every frame of every video is one `Image`; image ids are expected to run
/// contiguously from 1 in playback order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Dataset {
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// One video frame.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    pub id: u64,
    #[serde(default)]
    pub file_name: String,
    pub height: u32,
    pub width: u32,
}

/// A ground-truth object mask or a predicted result for one frame.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Annotation {
    #[serde(default)]
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub segmentation: Option<Segmentation>,
    #[serde(default, deserialize_with = "deserialize_iscrowd")]
    pub iscrowd: bool,
    /// Confidence, present only in result files.
    #[serde(default)]
    pub score: Option<f64>,
}

// Exported datasets write `iscrowd` as 0/1 as often as true/false.
fn deserialize_iscrowd<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(u8),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    /// One or more polygons, each a flat `[x0, y0, x1, y1, ...]` list.
    Polygon(Vec<Vec<f64>>),
    /// RLE with counts packed into the COCO ASCII string format.
    CompressedRle { size: [u32; 2], counts: String },
    /// RLE with plain integer counts.
    UncompressedRle { size: [u32; 2], counts: Vec<u32> },
}

/// An object category; in DAVIS each video usually carries its own.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub supercategory: Option<String>,
}

/// Column-major run-length encoding of a binary mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Rle {
    pub h: u32,
    pub w: u32,
    /// Alternating run lengths, background first.
    pub counts: Vec<u32>,
}

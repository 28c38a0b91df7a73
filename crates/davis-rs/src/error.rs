use thiserror::Error;

/// Result type for davis-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading datasets or evaluating sequences.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Annotation and segmentation sequences have different lengths after gap filling.
    #[error("sequence length mismatch: {annotations} annotations vs {segmentations} segmentations")]
    ShapeMismatch {
        annotations: usize,
        segmentations: usize,
    },

    /// A frame pair whose masks do not share dimensions, as `(height, width)`.
    #[error("mask size mismatch at frame {frame}: annotation {annotation:?} vs segmentation {segmentation:?}")]
    MaskShapeMismatch {
        frame: usize,
        annotation: (u32, u32),
        segmentation: (u32, u32),
    },

    /// Requested measure is not one of J, F, T.
    #[error("unknown measure '{0}', valid options are J, F, T")]
    UnknownMetric(String),

    /// Annotation could not be rasterised (no segmentation and no bbox, unknown
    /// image, or a malformed compressed RLE).
    #[error("annotation {ann_id} could not be converted to a mask")]
    MissingMask { ann_id: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

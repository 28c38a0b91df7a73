pub mod davis;
pub mod error;
pub mod eval;
pub mod mask;
pub mod measures;
pub mod params;
pub mod sequence;
pub mod statistics;
pub mod types;

pub use davis::{AnnotationSource, DAVIS};
pub use error::{Error, Result};
pub use eval::{DAVISeval, EvalStage, MeasureResult, SequenceResult};
pub use mask::Mask;
pub use measures::{db_eval_boundary, db_eval_iou, FrameMetric, Measure};
pub use params::Params;
pub use statistics::{db_statistics, Statistics};
pub use types::{Annotation, Category, Dataset, Image, Rle, Segmentation};

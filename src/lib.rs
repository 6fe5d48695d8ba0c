pub mod dense;
pub mod pipeline;
pub mod reduce;
pub mod sparse;
pub mod transform;
mod utils;

pub use utils::Direction;
pub use utils::FloatOps;
pub use utils::Normalize;
pub use utils::lp_norm;

pub use pipeline::TransformPipeline;
pub use sparse::{SparseMatrix, SparseVector};
pub use transform::{
    ColumnNormTransform, ColumnSelectorTransform, FeatureContainer, FeatureTransform,
    MinMaxTransform, OutlierClipTransform, PowerTransform, RowNormTransform, SparseFeature,
    StandardizeTransform, Transform,
};

//! # Feature transforms
//!
//! Every transform is fitted once on a training matrix, which it transforms in
//! place at the same time, and is afterwards applied read-only to new data: a
//! whole matrix, a feature container or a single sparse row. Fitted
//! parameters are plain vectors and maps so a fitted transform can be
//! serialized in one process and applied in another.
//!
//! ## Available transforms
//! - [`ColumnNormTransform`]: divide each column by its L_p norm
//! - [`ColumnSelectorTransform`]: drop columns with too few stored entries
//! - [`MinMaxTransform`]: scale each column into `[0, 1]`
//! - [`PowerTransform`]: raise every stored entry to a fixed power
//! - [`OutlierClipTransform`]: clip each column to approximate percentiles
//! - [`RowNormTransform`]: divide each row by its own L_p norm
//! - [`StandardizeTransform`]: z-score each column, clip, and prune entries at the mean

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::sparse::{SparseMatrix, SparseVector};
use crate::utils::FloatOps;

pub mod column_norm;
pub mod column_selector;
pub mod min_max;
pub mod outlier;
pub mod power;
pub mod row_norm;
pub mod standardize;

pub use column_norm::ColumnNormTransform;
pub use column_selector::ColumnSelectorTransform;
pub use min_max::MinMaxTransform;
pub use outlier::OutlierClipTransform;
pub use power::PowerTransform;
pub use row_norm::RowNormTransform;
pub use standardize::StandardizeTransform;

/// Anything that holds the matrix a transform should work on.
pub trait FeatureContainer<T: FloatOps> {
    fn transformed_matrix_mut(&mut self) -> &mut SparseMatrix<T>;

    /// Column names that must follow the matrix columns, if the container
    /// keeps any.
    fn feature_names_mut(&mut self) -> Option<&mut Vec<String>> {
        None
    }
}

/// A named sparse feature block: the matrix being transformed together with
/// the names of its columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "SparseFeatureParts<T>",
    bound(deserialize = "T: FloatOps + Deserialize<'de>")
)]
pub struct SparseFeature<T> {
    feature_names: Vec<String>,
    matrix: SparseMatrix<T>,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: FloatOps + Deserialize<'de>"))]
struct SparseFeatureParts<T> {
    feature_names: Vec<String>,
    matrix: SparseMatrix<T>,
}

impl<T: FloatOps> TryFrom<SparseFeatureParts<T>> for SparseFeature<T> {
    type Error = anyhow::Error;

    fn try_from(parts: SparseFeatureParts<T>) -> anyhow::Result<Self> {
        SparseFeature::new(parts.feature_names, parts.matrix)
    }
}

impl<T: FloatOps> SparseFeature<T> {
    pub fn new(feature_names: Vec<String>, matrix: SparseMatrix<T>) -> anyhow::Result<Self> {
        if feature_names.len() != matrix.ncols() {
            return Err(anyhow!(
                "Got {} feature names for a matrix with {} columns",
                feature_names.len(),
                matrix.ncols()
            ));
        }
        Ok(SparseFeature {
            feature_names,
            matrix,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn matrix(&self) -> &SparseMatrix<T> {
        &self.matrix
    }

    pub(crate) fn set_feature_names(&mut self, names: Vec<String>) {
        self.feature_names = names;
    }

    pub fn into_parts(self) -> (Vec<String>, SparseMatrix<T>) {
        (self.feature_names, self.matrix)
    }
}

impl<T: FloatOps> FeatureContainer<T> for SparseFeature<T> {
    fn transformed_matrix_mut(&mut self) -> &mut SparseMatrix<T> {
        &mut self.matrix
    }

    fn feature_names_mut(&mut self) -> Option<&mut Vec<String>> {
        Some(&mut self.feature_names)
    }
}

/// Fit-then-apply contract shared by all transforms.
///
/// All operations mutate their argument in place. `fit_transform` overwrites
/// any previously fitted parameters, so it should run once per training pass.
pub trait FeatureTransform<T: FloatOps>: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_fitted(&self) -> bool;

    /// Learns parameters from `matrix`, then transforms it with them.
    fn fit_transform(&mut self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()>;

    /// Fits on the container's matrix, then remaps its feature names (if it
    /// keeps any) so they still line up with the output columns.
    fn fit_transform_feature(&mut self, feature: &mut dyn FeatureContainer<T>) -> anyhow::Result<()> {
        self.fit_transform(feature.transformed_matrix_mut())?;
        if let Some(names) = feature.feature_names_mut() {
            *names = self.remap_feature_names(names.clone())?;
        }
        Ok(())
    }

    /// Applies the fitted parameters to `matrix` without refitting.
    fn transform(&self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()>;

    fn transform_feature(&self, feature: &mut dyn FeatureContainer<T>) -> anyhow::Result<()> {
        self.transform(feature.transformed_matrix_mut())?;
        if let Some(names) = feature.feature_names_mut() {
            *names = self.remap_feature_names(names.clone())?;
        }
        Ok(())
    }

    /// Applies the fitted parameters to one row. Empty rows are left alone.
    fn transform_vector(&self, vector: &mut SparseVector<T>) -> anyhow::Result<()>;

    /// Aligns the original column names with the output columns.
    fn remap_feature_names(&self, names: Vec<String>) -> anyhow::Result<Vec<String>> {
        Ok(names)
    }
}

pub(crate) fn not_fitted(name: &str) -> anyhow::Error {
    anyhow!("{} has not been fitted", name)
}

/// Fails when fitted per-column parameters do not cover the matrix columns.
pub(crate) fn check_columns<T: FloatOps>(
    name: &str,
    matrix: &SparseMatrix<T>,
    fitted: usize,
) -> anyhow::Result<()> {
    if matrix.ncols() != fitted {
        return Err(anyhow!(
            "{} was fitted on {} columns but the matrix has {}",
            name,
            fitted,
            matrix.ncols()
        ));
    }
    Ok(())
}

/// Loading check for fitted parameters that come in pairs: both or neither
/// must be present, and with equal lengths.
pub(crate) fn check_fitted_pair<T>(
    name: &str,
    first: &Option<Vec<T>>,
    second: &Option<Vec<T>>,
) -> anyhow::Result<()> {
    match (first, second) {
        (Some(a), Some(b)) if a.len() != b.len() => bail!(
            "{} has fitted parameter arrays of different lengths ({} and {})",
            name,
            a.len(),
            b.len()
        ),
        (Some(_), None) | (None, Some(_)) => {
            bail!("{} carries only part of its fitted parameters", name)
        }
        _ => Ok(()),
    }
}

/// Closed set of transforms, tagged by `type` when serialized.
///
/// Fitted fields may be omitted when deserializing, which yields an unfitted
/// transform configured only by its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    bound(deserialize = "T: FloatOps + Deserialize<'de>")
)]
pub enum Transform<T> {
    ColumnNorm(ColumnNormTransform<T>),
    ColumnSelector(ColumnSelectorTransform),
    MinMax(MinMaxTransform<T>),
    Power(PowerTransform<T>),
    OutlierClip(OutlierClipTransform<T>),
    RowNorm(RowNormTransform),
    Standardize(StandardizeTransform<T>),
}

impl<T: FloatOps> Transform<T> {
    fn inner(&self) -> &dyn FeatureTransform<T> {
        match self {
            Transform::ColumnNorm(t) => t,
            Transform::ColumnSelector(t) => t,
            Transform::MinMax(t) => t,
            Transform::Power(t) => t,
            Transform::OutlierClip(t) => t,
            Transform::RowNorm(t) => t,
            Transform::Standardize(t) => t,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FeatureTransform<T> {
        match self {
            Transform::ColumnNorm(t) => t,
            Transform::ColumnSelector(t) => t,
            Transform::MinMax(t) => t,
            Transform::Power(t) => t,
            Transform::OutlierClip(t) => t,
            Transform::RowNorm(t) => t,
            Transform::Standardize(t) => t,
        }
    }
}

impl<T: FloatOps> FeatureTransform<T> for Transform<T> {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn is_fitted(&self) -> bool {
        self.inner().is_fitted()
    }

    fn fit_transform(&mut self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        self.inner_mut().fit_transform(matrix)
    }

    fn transform(&self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        self.inner().transform(matrix)
    }

    fn transform_vector(&self, vector: &mut SparseVector<T>) -> anyhow::Result<()> {
        self.inner().transform_vector(vector)
    }

    fn remap_feature_names(&self, names: Vec<String>) -> anyhow::Result<Vec<String>> {
        self.inner().remap_feature_names(names)
    }
}

macro_rules! impl_from_transform {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl<T: FloatOps> From<$ty> for Transform<T> {
                fn from(t: $ty) -> Self {
                    Transform::$variant(t)
                }
            }
        )*
    };
}

impl_from_transform!(
    ColumnNorm => ColumnNormTransform<T>,
    ColumnSelector => ColumnSelectorTransform,
    MinMax => MinMaxTransform<T>,
    Power => PowerTransform<T>,
    OutlierClip => OutlierClipTransform<T>,
    RowNorm => RowNormTransform,
    Standardize => StandardizeTransform<T>,
);

#[cfg(test)]
pub(crate) mod test_support {
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use crate::sparse::{SparseMatrix, SparseVector};

    pub fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    pub fn row(indices: Vec<usize>, values: Vec<f64>, dim: usize) -> Option<SparseVector<f64>> {
        Some(SparseVector::new(indices, values, dim).unwrap())
    }

    /// 5x4 training matrix
    /// ```text
    /// [1  0  2  0]
    /// [-  -  -  -]  (absent)
    /// [3  4  0  0]
    /// [0  5  6  0]
    /// [2  0  8  0]
    /// ```
    pub fn training_matrix() -> SparseMatrix<f64> {
        SparseMatrix::from_rows(
            4,
            vec![
                row(vec![0, 2], vec![1.0, 2.0], 4),
                None,
                row(vec![0, 1], vec![3.0, 4.0], 4),
                row(vec![1, 2], vec![5.0, 6.0], 4),
                row(vec![0, 2], vec![2.0, 8.0], 4),
            ],
        )
        .unwrap()
    }

    /// Seeded matrix with about 70% of cells stored, values in `[-50, 50)`.
    /// Rows that draw no entries are absent.
    pub fn random_matrix(nrows: usize, ncols: usize, seed: u64) -> SparseMatrix<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let rows = (0..nrows)
            .map(|_| {
                let dense: Vec<f64> = (0..ncols)
                    .map(|_| {
                        if rng.random_bool(0.7) {
                            rng.random_range(-50.0..50.0)
                        } else {
                            0.0
                        }
                    })
                    .collect();
                let v = SparseVector::from_dense(&dense);
                (!v.is_empty()).then_some(v)
            })
            .collect();
        SparseMatrix::from_rows(ncols, rows).unwrap()
    }

    /// The same rows in a seeded random order.
    pub fn shuffled_rows(matrix: &SparseMatrix<f64>, seed: u64) -> SparseMatrix<f64> {
        let mut rows = matrix.rows().to_vec();
        rows.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        SparseMatrix::from_rows(matrix.ncols(), rows).unwrap()
    }

    /// Row-by-row vector path must agree with the matrix path.
    pub fn assert_vector_path_matches<F>(matrix: &SparseMatrix<f64>, apply_matrix: F, apply_vector: impl Fn(&mut SparseVector<f64>))
    where
        F: Fn(&mut SparseMatrix<f64>),
    {
        let mut by_matrix = matrix.clone();
        apply_matrix(&mut by_matrix);
        for i in 0..matrix.nrows() {
            match matrix.row(i) {
                None => assert!(by_matrix.row(i).is_none()),
                Some(original) => {
                    let mut single = original.clone();
                    apply_vector(&mut single);
                    let expected = by_matrix.row(i).unwrap();
                    assert_eq!(single.indices(), expected.indices());
                    for (a, b) in single.values().iter().zip(expected.values()) {
                        assert!((a - b).abs() < 1e-6, "row {}: {} vs {}", i, a, b);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_feature_container_delegates() {
        init_logger();
        let names: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let mut feature = SparseFeature::new(names, training_matrix()).unwrap();
        let mut transform = PowerTransform::new(2.0);

        transform.fit_transform_feature(&mut feature).unwrap();
        assert_eq!(feature.matrix().row(2).unwrap().values(), &[9.0, 16.0]);

        transform.transform_feature(&mut feature).unwrap();
        assert_eq!(feature.matrix().row(2).unwrap().values(), &[81.0, 256.0]);
    }

    #[test]
    fn test_feature_names_must_match_columns() {
        let names = vec!["only".to_string()];
        assert!(SparseFeature::new(names, training_matrix()).is_err());
    }

    #[test]
    fn test_enum_delegates_and_reports_fitted() {
        let mut transform: Transform<f64> = StandardizeTransform::new(3.0).into();
        assert_eq!(transform.name(), "StandardizeTransform");
        assert!(!transform.is_fitted());

        let mut matrix = training_matrix();
        assert!(transform.transform(&mut matrix).is_err());
        transform.fit_transform(&mut matrix).unwrap();
        assert!(transform.is_fitted());
    }

    #[test]
    fn test_every_variant_loads_from_hyperparameters_alone() {
        let config = [
            (r#"{"type":"column_norm","norm_degree":2}"#, "ColumnNormTransform", false),
            (r#"{"type":"column_selector","min_nonzero_count":1}"#, "ColumnSelectorTransform", false),
            (r#"{"type":"min_max"}"#, "MinMaxTransform", false),
            (r#"{"type":"power","power":0.5}"#, "PowerTransform", true),
            (r#"{"type":"outlier_clip","cutoff_fraction":0.05}"#, "OutlierClipTransform", false),
            (r#"{"type":"row_norm","norm_degree":1}"#, "RowNormTransform", true),
            (r#"{"type":"standardize","clip_cutoff":3.0}"#, "StandardizeTransform", false),
        ];
        for (json, name, stateless) in config {
            let mut transform: Transform<f64> = serde_json::from_str(json).unwrap();
            assert_eq!(transform.name(), name);
            assert_eq!(transform.is_fitted(), stateless, "{}", json);

            let mut matrix = training_matrix();
            transform.fit_transform(&mut matrix).unwrap();
            assert!(transform.is_fitted());
        }
    }

    #[test]
    fn test_feature_roundtrip_checks_names() {
        let names: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let feature = SparseFeature::new(names, training_matrix()).unwrap();
        let json = serde_json::to_string(&feature).unwrap();
        assert_eq!(serde_json::from_str::<SparseFeature<f64>>(&json).unwrap(), feature);

        let truncated = json.replacen(r#"["a","b","c","d"]"#, r#"["a"]"#, 1);
        assert!(serde_json::from_str::<SparseFeature<f64>>(&truncated).is_err());
    }

    #[test]
    fn test_default_remap_is_identity() {
        let transform: Transform<f64> = RowNormTransform::new(2).into();
        let names = vec!["x".to_string(), "y".to_string()];
        assert_eq!(transform.remap_feature_names(names.clone()).unwrap(), names);
    }
}

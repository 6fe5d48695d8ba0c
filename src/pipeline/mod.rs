//! # Transform pipelines
//!
//! An ordered list of transforms that is fitted once on training data and then
//! replayed, possibly in another process, on new matrices or single rows.
//!
//! A pipeline is persisted as JSON. The same format, with the fitted fields
//! left out, doubles as configuration:
//!
//! ```json
//! [
//!   { "type": "column_selector", "min_nonzero_count": 2 },
//!   { "type": "outlier_clip", "cutoff_fraction": 0.01 },
//!   { "type": "standardize", "clip_cutoff": 3.0 }
//! ]
//! ```

use std::io::{Read, Write};

use anyhow::{bail, Context};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::sparse::{SparseMatrix, SparseVector};
use crate::transform::{FeatureContainer, FeatureTransform, SparseFeature, Transform};
use crate::utils::FloatOps;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent, bound(deserialize = "T: FloatOps + Deserialize<'de>"))]
pub struct TransformPipeline<T> {
    transforms: Vec<Transform<T>>,
}

impl<T: FloatOps> Default for TransformPipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FloatOps> TransformPipeline<T> {
    pub fn new() -> Self {
        TransformPipeline {
            transforms: Vec::new(),
        }
    }

    pub fn push(&mut self, transform: impl Into<Transform<T>>) -> &mut Self {
        self.transforms.push(transform.into());
        self
    }

    pub fn with(mut self, transform: impl Into<Transform<T>>) -> Self {
        self.push(transform);
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transform<T>> {
        self.transforms.iter()
    }

    /// True when every transform has its parameters.
    pub fn is_fitted(&self) -> bool {
        self.transforms.iter().all(|t| t.is_fitted())
    }

    /// Fits each transform in order, feeding it the output of the previous one.
    pub fn fit_transform(&mut self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        info!(
            "Fitting pipeline of {} transforms on {}x{} matrix",
            self.transforms.len(),
            matrix.nrows(),
            matrix.ncols()
        );
        for (step, transform) in self.transforms.iter_mut().enumerate() {
            debug!("step {}: fitting {}", step, transform.name());
            transform
                .fit_transform(matrix)
                .with_context(|| format!("step {} ({}) failed to fit", step, transform.name()))?;
        }
        Ok(())
    }

    /// Fits on the feature's matrix and realigns its feature names with the
    /// output columns.
    pub fn fit_transform_feature(&mut self, feature: &mut SparseFeature<T>) -> anyhow::Result<()> {
        self.fit_transform(feature.transformed_matrix_mut())?;
        let names = self.remap_feature_names(feature.feature_names().to_vec())?;
        feature.set_feature_names(names);
        Ok(())
    }

    pub fn transform(&self, matrix: &mut SparseMatrix<T>) -> anyhow::Result<()> {
        for (step, transform) in self.transforms.iter().enumerate() {
            transform
                .transform(matrix)
                .with_context(|| format!("step {} ({}) failed to transform", step, transform.name()))?;
        }
        Ok(())
    }

    pub fn transform_feature(&self, feature: &mut SparseFeature<T>) -> anyhow::Result<()> {
        self.transform(feature.transformed_matrix_mut())?;
        let names = self.remap_feature_names(feature.feature_names().to_vec())?;
        feature.set_feature_names(names);
        Ok(())
    }

    /// Runs a single row through every transform, as at serving time.
    pub fn transform_vector(&self, vector: &mut SparseVector<T>) -> anyhow::Result<()> {
        for (step, transform) in self.transforms.iter().enumerate() {
            transform
                .transform_vector(vector)
                .with_context(|| format!("step {} ({}) failed to transform", step, transform.name()))?;
        }
        Ok(())
    }

    pub fn remap_feature_names(&self, names: Vec<String>) -> anyhow::Result<Vec<String>> {
        self.transforms
            .iter()
            .try_fold(names, |names, transform| transform.remap_feature_names(names))
    }
}

impl<T: FloatOps + Serialize> TransformPipeline<T> {
    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).context("Failed to serialize pipeline")
    }

    pub fn write_json<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        serde_json::to_writer(writer, self).context("Failed to write pipeline")
    }
}

impl<T: FloatOps + DeserializeOwned> TransformPipeline<T> {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse pipeline")
    }

    pub fn read_json<R: Read>(reader: R) -> anyhow::Result<Self> {
        serde_json::from_reader(reader).context("Failed to read pipeline")
    }

    /// Builds an unfitted pipeline from a configuration. Configurations that
    /// already carry fitted parameters are rejected.
    pub fn from_config_json(json: &str) -> anyhow::Result<Self> {
        let pipeline = Self::from_json(json)?;
        if let Some(fitted) = pipeline
            .transforms
            .iter()
            .find(|t| t.is_fitted() && carries_parameters(t))
        {
            bail!(
                "Configuration for {} already contains fitted parameters",
                fitted.name()
            );
        }
        Ok(pipeline)
    }
}

fn carries_parameters<T: FloatOps>(transform: &Transform<T>) -> bool {
    !matches!(transform, Transform::Power(_) | Transform::RowNorm(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_support::*;
    use crate::transform::{
        ColumnNormTransform, ColumnSelectorTransform, MinMaxTransform, OutlierClipTransform,
        PowerTransform, RowNormTransform, StandardizeTransform,
    };

    fn full_pipeline() -> TransformPipeline<f64> {
        TransformPipeline::new()
            .with(ColumnSelectorTransform::new(1))
            .with(OutlierClipTransform::new(0.0))
            .with(PowerTransform::new(0.5))
            .with(MinMaxTransform::new())
            .with(ColumnNormTransform::new(2))
            .with(StandardizeTransform::new(3.0))
            .with(RowNormTransform::new(1))
    }

    #[test]
    fn test_fit_then_replay_row_by_row() {
        init_logger();
        let mut pipeline = full_pipeline();
        assert!(!pipeline.is_fitted());

        let mut fitted = training_matrix();
        pipeline.fit_transform(&mut fitted).unwrap();
        assert!(pipeline.is_fitted());
        assert_eq!(fitted.ncols(), 3);

        for i in 0..fitted.nrows() {
            if let Some(original) = training_matrix().row(i) {
                let mut single = original.clone();
                pipeline.transform_vector(&mut single).unwrap();
                let expected = fitted.row(i).unwrap();
                assert_eq!(single.indices(), expected.indices());
                for (a, b) in single.values().iter().zip(expected.values()) {
                    assert!((a - b).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_json_round_trip_transforms_identically() {
        let mut pipeline = full_pipeline();
        let mut train = training_matrix();
        pipeline.fit_transform(&mut train).unwrap();

        let json = pipeline.to_json().unwrap();
        let restored = TransformPipeline::<f64>::from_json(&json).unwrap();
        assert_eq!(restored, pipeline);

        let mut a = training_matrix();
        let mut b = training_matrix();
        pipeline.transform(&mut a).unwrap();
        restored.transform(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reader_writer_round_trip() {
        let mut pipeline = TransformPipeline::new().with(StandardizeTransform::new(2.0f32));
        let mut train = SparseMatrix::from_rows(
            2,
            vec![
                Some(SparseVector::new(vec![0, 1], vec![1.0f32, 2.0], 2).unwrap()),
                Some(SparseVector::new(vec![0], vec![3.0f32], 2).unwrap()),
                Some(SparseVector::new(vec![1], vec![6.0f32], 2).unwrap()),
            ],
        )
        .unwrap();
        pipeline.fit_transform(&mut train).unwrap();

        let mut buffer = Vec::new();
        pipeline.write_json(&mut buffer).unwrap();
        let restored = TransformPipeline::<f32>::read_json(buffer.as_slice()).unwrap();
        assert_eq!(restored, pipeline);
    }

    #[test]
    fn test_from_config() {
        let config = r#"[
            {"type": "column_selector", "min_nonzero_count": 3},
            {"type": "power", "power": 2.0},
            {"type": "standardize", "clip_cutoff": 3.0}
        ]"#;
        let mut pipeline = TransformPipeline::<f64>::from_config_json(config).unwrap();
        assert_eq!(pipeline.len(), 3);
        assert!(!pipeline.is_fitted());

        let mut matrix = training_matrix();
        pipeline.fit_transform(&mut matrix).unwrap();
        assert_eq!(matrix.ncols(), 2);

        let fitted_json = pipeline.to_json().unwrap();
        assert!(TransformPipeline::<f64>::from_config_json(&fitted_json).is_err());
    }

    #[test]
    fn test_unknown_transform_type_rejected() {
        let config = r#"[{"type": "log1p"}]"#;
        assert!(TransformPipeline::<f64>::from_config_json(config).is_err());
    }

    #[test]
    fn test_feature_names_follow_selection() {
        let names: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let mut feature = SparseFeature::new(names, training_matrix()).unwrap();
        let mut pipeline = TransformPipeline::new()
            .with(ColumnSelectorTransform::new(3))
            .with(MinMaxTransform::new());

        pipeline.fit_transform_feature(&mut feature).unwrap();
        assert_eq!(feature.feature_names(), &["a".to_string(), "c".to_string()]);
        assert_eq!(feature.matrix().ncols(), 2);

        let mut fresh = SparseFeature::new(
            ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect(),
            training_matrix(),
        )
        .unwrap();
        pipeline.transform_feature(&mut fresh).unwrap();
        assert_eq!(fresh, feature);
    }

    #[test]
    fn test_inference_before_fit_names_the_step() {
        let pipeline = TransformPipeline::new()
            .with(PowerTransform::new(2.0))
            .with(MinMaxTransform::new());
        let mut matrix = training_matrix();
        let err = pipeline.transform(&mut matrix).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("step 1 (MinMaxTransform)"));
        assert!(message.contains("has not been fitted"));
    }
}

//! Preprocessor + estimator composition and its persisted form

use super::{Estimator, EstimatorTags, Preprocessor, SavedEstimator, SavedPreprocessor};
use crate::error::{AutoMLError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Version of the JSON layout written by [`Pipeline::save`]
pub const PIPELINE_FORMAT_VERSION: u32 = 1;

/// Two-stage model: raw frame → feature matrix → probabilities
#[derive(Debug)]
pub struct Pipeline {
    preprocessor: Box<dyn Preprocessor>,
    estimator: Box<dyn Estimator>,
    tags: Option<EstimatorTags>,
}

/// Compose a fitted or unfitted preprocessor with an estimator
pub fn make_pipeline(preprocessor: Box<dyn Preprocessor>, estimator: Box<dyn Estimator>) -> Pipeline {
    Pipeline {
        preprocessor,
        estimator,
        tags: None,
    }
}

impl Clone for Pipeline {
    fn clone(&self) -> Self {
        Self {
            preprocessor: self.preprocessor.boxed_clone(),
            estimator: self.estimator.boxed_clone(),
            tags: self.tags.clone(),
        }
    }
}

impl Pipeline {
    /// Attach the estimator's capability tags
    pub fn with_tags(mut self, tags: EstimatorTags) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn tags(&self) -> Option<&EstimatorTags> {
        self.tags.as_ref()
    }

    /// Preprocessing step (step 0)
    pub fn preprocessor(&self) -> &dyn Preprocessor {
        self.preprocessor.as_ref()
    }

    /// Final estimator step
    pub fn estimator(&self) -> &dyn Estimator {
        self.estimator.as_ref()
    }

    /// Swap the final step, keeping the preprocessor
    pub fn replace_estimator(&mut self, estimator: Box<dyn Estimator>) {
        self.estimator = estimator;
    }

    /// Fit both steps on raw data
    pub fn fit(&mut self, x: &DataFrame, y: &Array1<f64>) -> Result<()> {
        let features = self.preprocessor.fit_transform(x, y)?;
        self.estimator.fit(&features, y)
    }

    pub fn transform(&self, x: &DataFrame) -> Result<Array2<f64>> {
        self.preprocessor.transform(x)
    }

    pub fn predict(&self, x: &DataFrame) -> Result<Array1<f64>> {
        self.estimator.predict(&self.transform(x)?)
    }

    pub fn predict_proba(&self, x: &DataFrame) -> Result<Array2<f64>> {
        self.estimator.predict_proba(&self.transform(x)?)
    }

    pub fn to_saved(&self) -> Result<SavedPipeline> {
        Ok(SavedPipeline {
            format_version: PIPELINE_FORMAT_VERSION,
            preprocessor: self.preprocessor.to_saved()?,
            estimator: self.estimator.to_saved()?,
            tags: self.tags.clone(),
        })
    }

    /// Write the pipeline as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(&self.to_saved()?)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a pipeline written by [`Pipeline::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let saved: SavedPipeline = serde_json::from_str(&text)?;
        saved.into_pipeline()
    }
}

/// Serializable pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPipeline {
    pub format_version: u32,
    pub preprocessor: SavedPreprocessor,
    pub estimator: SavedEstimator,
    #[serde(default)]
    pub tags: Option<EstimatorTags>,
}

impl SavedPipeline {
    pub fn into_pipeline(self) -> Result<Pipeline> {
        if self.format_version > PIPELINE_FORMAT_VERSION {
            return Err(AutoMLError::SerializationError(format!(
                "Pipeline format {} is newer than supported version {}",
                self.format_version, PIPELINE_FORMAT_VERSION
            )));
        }
        Ok(Pipeline {
            preprocessor: self.preprocessor.into_preprocessor(),
            estimator: self.estimator.into_estimator(),
            tags: self.tags,
        })
    }
}

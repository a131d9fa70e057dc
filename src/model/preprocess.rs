//! Built-in preprocessors

use super::{Preprocessor, SavedPreprocessor};
use crate::data::{column_f64, column_names, column_str, dataframe_to_array, is_numeric_column};
use crate::error::{AutoMLError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Source of one transformed feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureOrigin {
    /// Untouched input column
    Raw { column: String },
    /// Numeric column standardised as `(v - center) / scale`
    Numeric {
        column: String,
        center: f64,
        scale: f64,
    },
    /// Indicator of one category of a categorical column
    Categorical { column: String, category: String },
}

impl FeatureOrigin {
    /// Input column the feature was derived from
    pub fn column(&self) -> &str {
        match self {
            FeatureOrigin::Raw { column }
            | FeatureOrigin::Numeric { column, .. }
            | FeatureOrigin::Categorical { column, .. } => column,
        }
    }

    /// Map a transformed value back to the input scale, if the feature is numeric
    pub fn to_original(&self, value: f64) -> Option<f64> {
        match self {
            FeatureOrigin::Raw { .. } => Some(value),
            FeatureOrigin::Numeric { center, scale, .. } => Some(value * scale + center),
            FeatureOrigin::Categorical { .. } => None,
        }
    }
}

/// Casts every column to `f64` as-is
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Passthrough {
    columns: Vec<String>,
}

impl Passthrough {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preprocessor for Passthrough {
    fn fit(&mut self, x: &DataFrame, _y: &Array1<f64>) -> Result<()> {
        self.columns = column_names(x);
        Ok(())
    }

    fn transform(&self, x: &DataFrame) -> Result<Array2<f64>> {
        if self.columns.is_empty() {
            return dataframe_to_array(x);
        }
        let selected = x.select(self.columns.iter().map(String::as_str))?;
        dataframe_to_array(&selected)
    }

    fn feature_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn feature_origins(&self) -> Vec<FeatureOrigin> {
        self.columns
            .iter()
            .map(|c| FeatureOrigin::Raw { column: c.clone() })
            .collect()
    }

    fn boxed_clone(&self) -> Box<dyn Preprocessor> {
        Box::new(self.clone())
    }

    fn to_saved(&self) -> Result<SavedPreprocessor> {
        Ok(SavedPreprocessor::Passthrough(self.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NumericColumn {
    column: String,
    median: f64,
    mean: f64,
    std: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CategoricalColumn {
    column: String,
    categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FittedColumns {
    numeric: Vec<NumericColumn>,
    categorical: Vec<CategoricalColumn>,
}

/// Median imputation + standard scaling for numeric columns, constant
/// imputation + one-hot encoding for categorical ones.
///
/// Columns not listed explicitly are assigned by dtype at fit time, unless
/// both lists are given, in which case the rest are dropped. Categories
/// unseen during fit encode as all zeros.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnPreprocessor {
    numeric: Option<Vec<String>>,
    categorical: Option<Vec<String>>,
    /// Fill value for missing categories
    pub missing_value: String,
    fitted: Option<FittedColumns>,
}

impl Default for ColumnPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnPreprocessor {
    pub fn new() -> Self {
        Self {
            numeric: None,
            categorical: None,
            missing_value: "missing".to_string(),
            fitted: None,
        }
    }

    pub fn with_numeric(mut self, columns: &[&str]) -> Self {
        self.numeric = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_categorical(mut self, columns: &[&str]) -> Self {
        self.categorical = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    fn fitted(&self) -> Result<&FittedColumns> {
        self.fitted.as_ref().ok_or(AutoMLError::ModelNotFitted)
    }

    fn resolve_columns(&self, x: &DataFrame) -> Result<(Vec<String>, Vec<String>)> {
        match (&self.numeric, &self.categorical) {
            (Some(num), Some(cat)) => Ok((num.clone(), cat.clone())),
            _ => {
                let mut numeric = Vec::new();
                let mut categorical = Vec::new();
                for name in column_names(x) {
                    let listed_num = self.numeric.as_ref().map_or(false, |c| c.contains(&name));
                    let listed_cat = self.categorical.as_ref().map_or(false, |c| c.contains(&name));
                    if listed_num {
                        numeric.push(name);
                    } else if listed_cat || !is_numeric_column(x, &name)? {
                        categorical.push(name);
                    } else {
                        numeric.push(name);
                    }
                }
                Ok((numeric, categorical))
            }
        }
    }

    fn categorical_values(&self, x: &DataFrame, column: &str) -> Result<Vec<String>> {
        Ok(column_str(x, column)?
            .into_iter()
            .map(|v| v.unwrap_or_else(|| self.missing_value.clone()))
            .collect())
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

impl Preprocessor for ColumnPreprocessor {
    fn fit(&mut self, x: &DataFrame, _y: &Array1<f64>) -> Result<()> {
        let (numeric_cols, categorical_cols) = self.resolve_columns(x)?;

        let mut numeric = Vec::with_capacity(numeric_cols.len());
        for column in numeric_cols {
            let values = column_f64(x, &column)?;
            let mut present: Vec<f64> = values.iter().flatten().copied().collect();
            let med = median(&mut present);
            let imputed: Vec<f64> = values.iter().map(|v| v.unwrap_or(med)).collect();
            let n = imputed.len().max(1) as f64;
            let mean = imputed.iter().sum::<f64>() / n;
            let var = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };
            numeric.push(NumericColumn {
                column,
                median: med,
                mean,
                std,
            });
        }

        let mut categorical = Vec::with_capacity(categorical_cols.len());
        for column in categorical_cols {
            let categories: BTreeSet<String> =
                self.categorical_values(x, &column)?.into_iter().collect();
            categorical.push(CategoricalColumn {
                column,
                categories: categories.into_iter().collect(),
            });
        }

        self.fitted = Some(FittedColumns {
            numeric,
            categorical,
        });
        Ok(())
    }

    fn transform(&self, x: &DataFrame) -> Result<Array2<f64>> {
        let fitted = self.fitted()?;
        let n_features = fitted.numeric.len()
            + fitted.categorical.iter().map(|c| c.categories.len()).sum::<usize>();
        let mut out = Array2::zeros((x.height(), n_features));

        let mut j = 0;
        for col in &fitted.numeric {
            for (i, v) in column_f64(x, &col.column)?.into_iter().enumerate() {
                out[[i, j]] = (v.unwrap_or(col.median) - col.mean) / col.std;
            }
            j += 1;
        }
        for col in &fitted.categorical {
            for (i, v) in self.categorical_values(x, &col.column)?.iter().enumerate() {
                if let Ok(k) = col.categories.binary_search(v) {
                    out[[i, j + k]] = 1.0;
                }
            }
            j += col.categories.len();
        }

        Ok(out)
    }

    fn feature_names(&self) -> Vec<String> {
        self.feature_origins()
            .into_iter()
            .map(|origin| match origin {
                FeatureOrigin::Categorical { column, category } => {
                    format!("cat__{}_{}", column, category)
                }
                other => format!("num__{}", other.column()),
            })
            .collect()
    }

    fn feature_origins(&self) -> Vec<FeatureOrigin> {
        let Some(fitted) = &self.fitted else {
            return Vec::new();
        };
        let numeric = fitted.numeric.iter().map(|c| FeatureOrigin::Numeric {
            column: c.column.clone(),
            center: c.mean,
            scale: c.std,
        });
        let categorical = fitted.categorical.iter().flat_map(|c| {
            c.categories.iter().map(move |cat| FeatureOrigin::Categorical {
                column: c.column.clone(),
                category: cat.clone(),
            })
        });
        numeric.chain(categorical).collect()
    }

    fn boxed_clone(&self) -> Box<dyn Preprocessor> {
        Box::new(self.clone())
    }

    fn to_saved(&self) -> Result<SavedPreprocessor> {
        Ok(SavedPreprocessor::Columns(self.clone()))
    }
}

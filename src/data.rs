//! Data loading, target extraction and train/test splitting

use crate::error::{AutoMLError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::Path;
use tracing::info;

/// Load a CSV, JSON or Parquet file
pub fn load_data(path: &Path) -> Result<DataFrame> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let df = match ext {
        "csv" => CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        "json" => JsonReader::new(std::fs::File::open(path)?).finish()?,
        "parquet" => ParquetReader::new(std::fs::File::open(path)?).finish()?,
        _ => {
            return Err(AutoMLError::DataError(format!(
                "Unsupported file format: {}",
                path.display()
            )))
        }
    };

    info!(rows = df.height(), cols = df.width(), path = %path.display(), "Loaded data");
    Ok(df)
}

/// Values of a column cast to `f64`; nulls and NaN become `None`
pub fn column_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| AutoMLError::FeatureNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Values of a column cast to strings; nulls become `None`
pub fn column_str(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| AutoMLError::FeatureNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Whether the column holds numbers or booleans
pub fn is_numeric_column(df: &DataFrame, name: &str) -> Result<bool> {
    let column = df
        .column(name)
        .map_err(|_| AutoMLError::FeatureNotFound(name.to_string()))?;
    Ok(matches!(
        column.dtype(),
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
            | DataType::Boolean
    ))
}

/// Column names in frame order
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

/// Every column cast to `f64`; missing values become NaN
pub fn dataframe_to_array(df: &DataFrame) -> Result<Array2<f64>> {
    let names = column_names(df);
    let mut out = Array2::from_elem((df.height(), names.len()), f64::NAN);
    for (j, name) in names.iter().enumerate() {
        for (i, v) in column_f64(df, name)?.into_iter().enumerate() {
            if let Some(v) = v {
                out[[i, j]] = v;
            }
        }
    }
    Ok(out)
}

/// Split a frame into features and a 0/1 target
pub fn split_target(df: &DataFrame, target: &str) -> Result<(DataFrame, Array1<f64>)> {
    let values = column_f64(df, target)?;
    let y: Vec<f64> = values
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Some(v) if v == 0.0 || v == 1.0 => Ok(v),
            other => Err(AutoMLError::DataError(format!(
                "Target '{}' must be 0/1, row {} holds {:?}",
                target, i, other
            ))),
        })
        .collect::<Result<_>>()?;
    let x = df.drop(target)?;
    Ok((x, Array1::from_vec(y)))
}

/// Train and test partitions
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: DataFrame,
    pub x_test: DataFrame,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
}

/// Seeded shuffle split; with `stratify` each class keeps its proportion
pub fn train_test_split(
    x: &DataFrame,
    y: &Array1<f64>,
    test_size: f64,
    stratify: bool,
    seed: u64,
) -> Result<TrainTestSplit> {
    if x.height() != y.len() {
        return Err(AutoMLError::ShapeError {
            expected: format!("{} labels", x.height()),
            actual: format!("{} labels", y.len()),
        });
    }
    if !(0.0..1.0).contains(&test_size) || test_size == 0.0 {
        return Err(AutoMLError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must lie in (0, 1)".to_string(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let groups: Vec<Vec<usize>> = if stratify {
        let mut negatives: Vec<usize> = Vec::new();
        let mut positives: Vec<usize> = Vec::new();
        for (i, &v) in y.iter().enumerate() {
            if v > 0.5 {
                positives.push(i);
            } else {
                negatives.push(i);
            }
        }
        vec![negatives, positives]
    } else {
        vec![(0..y.len()).collect()]
    };

    let mut train_idx = Vec::new();
    let mut test_idx = Vec::new();
    for mut group in groups {
        group.shuffle(&mut rng);
        let n_test = (group.len() as f64 * test_size).round() as usize;
        test_idx.extend_from_slice(&group[..n_test]);
        train_idx.extend_from_slice(&group[n_test..]);
    }
    train_idx.sort_unstable();
    test_idx.sort_unstable();

    Ok(TrainTestSplit {
        x_train: take_rows(x, &train_idx)?,
        x_test: take_rows(x, &test_idx)?,
        y_train: train_idx.iter().map(|&i| y[i]).collect(),
        y_test: test_idx.iter().map(|&i| y[i]).collect(),
    })
}

/// Rows of `df` at `indices`
pub fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx = IdxCa::from_vec(
        "idx".into(),
        indices.iter().map(|&i| i as IdxSize).collect(),
    );
    Ok(df.take(&idx)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_target() {
        let df = df! {
            "age" => &[22.0, 38.0, 26.0],
            "survived" => &[0i64, 1, 1],
        }
        .unwrap();
        let (x, y) = split_target(&df, "survived").unwrap();
        assert_eq!(column_names(&x), vec!["age"]);
        assert_eq!(y, ndarray::array![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_split_target_rejects_non_binary() {
        let df = df! { "y" => &[0i64, 3] }.unwrap();
        assert!(split_target(&df, "y").is_err());
    }

    #[test]
    fn test_stratified_split_keeps_ratio() {
        let n = 100;
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let df = df! { "x" => &values }.unwrap();
        let y: Array1<f64> = (0..n).map(|i| if i < 20 { 1.0 } else { 0.0 }).collect();

        let split = train_test_split(&df, &y, 0.25, true, 1).unwrap();
        assert_eq!(split.x_train.height() + split.x_test.height(), n);
        assert_eq!(split.y_test.sum(), 5.0);
        assert_eq!(split.y_train.sum(), 15.0);
    }

    #[test]
    fn test_dataframe_to_array_marks_missing() {
        let df = df! { "a" => &[Some(1.0), None], "b" => &[true, false] }.unwrap();
        let arr = dataframe_to_array(&df).unwrap();
        assert_eq!(arr[[0, 0]], 1.0);
        assert!(arr[[1, 0]].is_nan());
        assert_eq!(arr[[0, 1]], 1.0);
    }
}

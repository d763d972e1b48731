//! # Label Encoder
//!
//! Assigns each distinct tag a class index and converts indices to one-hot
//! rows. Classes are kept in sorted order so the assignment is stable across
//! runs for the same tag set.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqTagError};

/// Closed label set with one-hot conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct LabelFile {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on a label sequence.
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = labels
            .into_iter()
            .map(|label| label.as_ref().to_string())
            .collect();
        Self::from_classes(classes.into_iter().collect())
    }

    fn from_classes(classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, class)| (class.clone(), i))
            .collect();
        Self { classes, index }
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Class labels in index order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Class index of a label.
    ///
    /// # Errors
    ///
    /// `SeqTagError::UnknownLabel` if the label was not seen by [`fit`](Self::fit).
    pub fn encode(&self, label: &str) -> Result<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| SeqTagError::UnknownLabel(label.to_string()))
    }

    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// Label for a class index.
    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    /// One-hot row of length [`num_classes`](Self::num_classes).
    pub fn one_hot(&self, index: usize) -> Result<Vec<f32>> {
        self.check_index(index)?;
        let mut row = vec![0.0f32; self.num_classes()];
        row[index] = 1.0;
        Ok(row)
    }

    /// Row-major one-hot matrix, `indices.len() * num_classes` values.
    pub fn one_hot_batch(&self, indices: &[usize]) -> Result<Vec<f32>> {
        let n = self.num_classes();
        let mut matrix = vec![0.0f32; indices.len() * n];
        for (row, &index) in indices.iter().enumerate() {
            self.check_index(index)?;
            matrix[row * n + index] = 1.0;
        }
        Ok(matrix)
    }

    /// Index of the largest entry of a one-hot (or probability) row.
    pub fn index_of(row: &[f32]) -> Option<usize> {
        row.iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.num_classes() {
            return Err(SeqTagError::ClassIndexOutOfRange {
                index,
                num_classes: self.num_classes(),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        let file = LabelFile {
            classes: self.classes.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// # Errors
    ///
    /// `SeqTagError::InvalidLabels` if a class name appears twice.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: LabelFile = serde_json::from_str(json)?;
        let mut seen = HashSet::with_capacity(file.classes.len());
        if let Some(dup) = file.classes.iter().find(|class| !seen.insert(class.as_str())) {
            return Err(SeqTagError::InvalidLabels(format!("duplicate class {dup:?}")));
        }
        Ok(Self::from_classes(file.classes))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|source| SeqTagError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| SeqTagError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

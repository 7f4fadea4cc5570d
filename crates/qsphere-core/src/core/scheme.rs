//! Shell-grouped sampling schemes.
//!
//! A scheme is a list of point groups (shells), each optionally labeled with
//! the acquisition strength (b-value) shared by its points. Points are unit
//! 3-vectors; normalization is the producer's responsibility.

use nalgebra::Vector3;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SchemeError {
    #[error("number of point groups ({shells}) and scalar labels ({labels}) disagree")]
    LabelCountMismatch { shells: usize, labels: usize },

    #[error("operation requires per-shell labels, but the scheme carries none")]
    MissingLabels,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scheme {
    shells: Vec<Vec<Vector3<f64>>>,
    labels: Option<Vec<f64>>,
}

impl Scheme {
    pub fn new(shells: Vec<Vec<Vector3<f64>>>) -> Self {
        Self {
            shells,
            labels: None,
        }
    }

    /// A scheme whose shells carry acquisition-strength labels. Fails when the
    /// label count does not match the shell count.
    pub fn with_labels(
        shells: Vec<Vec<Vector3<f64>>>,
        labels: Vec<f64>,
    ) -> Result<Self, SchemeError> {
        if shells.len() != labels.len() {
            return Err(SchemeError::LabelCountMismatch {
                shells: shells.len(),
                labels: labels.len(),
            });
        }
        Ok(Self {
            shells,
            labels: Some(labels),
        })
    }

    pub fn shells(&self) -> &[Vec<Vector3<f64>>] {
        &self.shells
    }

    pub fn labels(&self) -> Option<&[f64]> {
        self.labels.as_deref()
    }

    pub fn num_shells(&self) -> usize {
        self.shells.len()
    }

    pub fn total_points(&self) -> usize {
        self.shells.iter().map(Vec::len).sum()
    }

    pub fn shell_sizes(&self) -> Vec<usize> {
        self.shells.iter().map(Vec::len).collect()
    }

    /// Cumulative shell offsets with a leading zero, mapping shell index to the
    /// first flat point index of that shell.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.shells.len() + 1);
        offsets.push(0);
        for shell in &self.shells {
            offsets.push(offsets.last().copied().unwrap_or(0) + shell.len());
        }
        offsets
    }

    /// All points concatenated in shell order.
    pub fn flat(&self) -> Vec<Vector3<f64>> {
        self.shells.iter().flatten().copied().collect()
    }

    /// Merges the shell groups into a single flat list of points with one
    /// label per point, the form consumed by multi-shell ordering.
    pub fn combined(&self) -> Result<(Vec<Vector3<f64>>, Vec<f64>), SchemeError> {
        let labels = self.labels.as_ref().ok_or(SchemeError::MissingLabels)?;
        let mut per_point = Vec::with_capacity(self.total_points());
        for (shell, &label) in self.shells.iter().zip(labels) {
            per_point.extend(std::iter::repeat(label).take(shell.len()));
        }
        Ok((self.flat(), per_point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_shells() -> Vec<Vec<Vector3<f64>>> {
        vec![
            vec![Vector3::x(), Vector3::y()],
            vec![Vector3::z(), -Vector3::x(), -Vector3::y()],
        ]
    }

    #[test]
    fn mismatched_label_count_is_rejected() {
        let err = Scheme::with_labels(two_shells(), vec![1000.0, 2000.0, 3000.0]).unwrap_err();
        assert_eq!(
            err,
            SchemeError::LabelCountMismatch {
                shells: 2,
                labels: 3
            }
        );
    }

    #[test]
    fn offsets_and_flattening_are_consistent() {
        let scheme = Scheme::new(two_shells());
        assert_eq!(scheme.offsets(), vec![0, 2, 5]);
        assert_eq!(scheme.total_points(), 5);
        assert_eq!(scheme.flat().len(), 5);
        assert_eq!(scheme.shell_sizes(), vec![2, 3]);
    }

    #[test]
    fn combined_repeats_labels_per_point() {
        let scheme = Scheme::with_labels(two_shells(), vec![1000.0, 2000.0]).unwrap();
        let (points, labels) = scheme.combined().unwrap();
        assert_eq!(points.len(), 5);
        assert_eq!(labels, vec![1000.0, 1000.0, 2000.0, 2000.0, 2000.0]);
    }

    #[test]
    fn combined_without_labels_fails() {
        let scheme = Scheme::new(two_shells());
        assert_eq!(scheme.combined().unwrap_err(), SchemeError::MissingLabels);
    }
}

// src/calibration/aggregation.rs

//! Bidirectional map between a flat parameter vector and a set of
//! parameter-bearing objects.
//!
//! The aggregation snapshots the object ordering and slice widths at
//! construction. Object `i` with width `m_i` owns the indices
//! `[m_0 + .. + m_{i-1}, m_0 + .. + m_i)` of the aggregated vector, and the
//! ordering stays fixed for the life of the aggregation: the optimizer
//! relies on index `j` meaning the same parameter on every iteration.

use crate::calibration::types::{ParameterMap, ParameterObject};
use crate::error::CalibrationError;
use std::sync::Arc;

/// An ordered set of parameter objects viewed as one flat vector.
pub struct ParameterAggregation {
    objects: Vec<Arc<dyn ParameterObject>>,
    widths: Vec<usize>,
}

impl ParameterAggregation {
    /// Snapshot the ordering and slice widths of `objects`.
    ///
    /// Fails with [`CalibrationError::EmptyAggregation`] if no objects are
    /// given. Objects reporting zero-width slices are legal and simply
    /// contribute nothing to the aggregated vector.
    pub fn new(objects: Vec<Arc<dyn ParameterObject>>) -> Result<Self, CalibrationError> {
        if objects.is_empty() {
            return Err(CalibrationError::EmptyAggregation);
        }
        let widths = objects.iter().map(|o| o.parameters().len()).collect();
        Ok(Self { objects, widths })
    }

    /// Total width of the aggregated vector.
    pub fn len(&self) -> usize {
        self.widths.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The objects in aggregation order.
    pub fn objects(&self) -> &[Arc<dyn ParameterObject>] {
        &self.objects
    }

    /// Concatenate the current slices in sequence order.
    pub fn parameter(&self) -> Vec<f64> {
        let mut parameter = Vec::with_capacity(self.len());
        for object in &self.objects {
            parameter.extend(object.parameters());
        }
        parameter
    }

    /// Partition `parameter` into per-object slices keyed by object name.
    ///
    /// Fails with [`CalibrationError::DimensionMismatch`] if the vector
    /// length is not the sum of the snapshotted widths.
    pub fn split(&self, parameter: &[f64]) -> Result<ParameterMap, CalibrationError> {
        if parameter.len() != self.len() {
            return Err(CalibrationError::DimensionMismatch(format!(
                "aggregated parameter has length {}, expected {}",
                parameter.len(),
                self.len()
            )));
        }
        let mut map = ParameterMap::with_capacity(self.objects.len());
        let mut offset = 0;
        for (object, &width) in self.objects.iter().zip(&self.widths) {
            map.insert(
                object.name().to_string(),
                parameter[offset..offset + width].to_vec(),
            );
            offset += width;
        }
        Ok(map)
    }
}

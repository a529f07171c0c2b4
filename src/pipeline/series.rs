//! Rolling window of recent records.

use std::collections::VecDeque;

use crate::codec::Record;

/// Default number of records kept for charting
pub const DEFAULT_SERIES_CAPACITY: usize = 500;

/// Capacity-bounded record history, oldest evicted first
#[derive(Debug, Clone)]
pub struct RecordSeries {
    capacity: usize,
    records: VecDeque<Record>,
}

impl RecordSeries {
    /// Create an empty series; a capacity of 0 is raised to 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: Record) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Numeric values of one field, oldest first
    ///
    /// Absent, non-numeric or unknown fields are `None`.
    pub fn column(&self, name: &str) -> Vec<Option<f64>> {
        self.records
            .iter()
            .map(|record| record.get(name).and_then(|v| v.as_f64()))
            .collect()
    }
}

impl Default for RecordSeries {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FieldValue, Schema};

    fn record(schema: &Schema, alt: FieldValue) -> Record {
        Record::from_values(schema, vec![FieldValue::Integer(1), alt]).unwrap()
    }

    #[test]
    fn test_evicts_oldest() {
        let schema = Schema::new(["id", "alt"]);
        let mut series = RecordSeries::new(2);
        for alt in [10, 20, 30] {
            series.push(record(&schema, FieldValue::Integer(alt)));
        }

        assert_eq!(series.len(), 2);
        assert_eq!(series.column("alt"), vec![Some(20.0), Some(30.0)]);
    }

    #[test]
    fn test_column_handles_missing_values() {
        let schema = Schema::new(["id", "alt"]);
        let mut series = RecordSeries::default();
        series.push(record(&schema, FieldValue::Absent));
        series.push(record(&schema, FieldValue::Text("n/a".to_string())));
        series.push(record(&schema, FieldValue::Real(1.5)));

        assert_eq!(series.column("alt"), vec![None, None, Some(1.5)]);
        assert_eq!(series.column("speed"), vec![None, None, None]);
        assert_eq!(series.capacity(), DEFAULT_SERIES_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let schema = Schema::new(["id", "alt"]);
        let mut series = RecordSeries::new(0);
        series.push(record(&schema, FieldValue::Integer(1)));
        series.push(record(&schema, FieldValue::Integer(2)));
        assert_eq!(series.column("alt"), vec![Some(2.0)]);
    }
}

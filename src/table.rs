//! Structured query results: ordered label/cell rows with a synthetic
//! `Total` row appended over every counted entry.

use serde::Serialize;

use crate::parse::format_count;

pub const TOTAL_LABEL: &str = "Total";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Count {
    pub value: u64,
    pub formatted: String,
}

impl Count {
    pub fn new(value: u64) -> Self {
        Count {
            value,
            formatted: format_count(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Count(Count),
    /// Explicit missing-data marker for a sub-query that failed.
    Missing { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub label: String,
    pub cell: Cell,
}

/// Rows keep insertion order (portal region order, bracket table order).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultTable {
    pub rows: Vec<Row>,
}

impl ResultTable {
    pub fn new() -> Self {
        ResultTable::default()
    }

    pub fn push_count(&mut self, label: impl Into<String>, value: u64) {
        self.rows.push(Row {
            label: label.into(),
            cell: Cell::Count(Count::new(value)),
        });
    }

    pub fn push_missing(&mut self, label: impl Into<String>, reason: impl Into<String>) {
        self.rows.push(Row {
            label: label.into(),
            cell: Cell::Missing {
                reason: reason.into(),
            },
        });
    }

    pub fn get(&self, label: &str) -> Option<&Cell> {
        self.rows
            .iter()
            .find(|row| row.label == label)
            .map(|row| &row.cell)
    }

    pub fn count_of(&self, label: &str) -> Option<u64> {
        match self.get(label) {
            Some(Cell::Count(count)) => Some(count.value),
            _ => None,
        }
    }

    /// Sum over every counted row, `Total` excluded.
    pub fn counted_sum(&self) -> u64 {
        self.rows
            .iter()
            .filter(|row| row.label != TOTAL_LABEL)
            .filter_map(|row| match &row.cell {
                Cell::Count(count) => Some(count.value),
                Cell::Missing { .. } => None,
            })
            .sum()
    }

    pub fn missing_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| matches!(row.cell, Cell::Missing { .. }))
            .count()
    }

    /// Appends the synthetic `Total` row over all counted entries.
    pub fn finish_with_total(mut self) -> Self {
        let total = self.counted_sum();
        self.push_count(TOTAL_LABEL, total);
        self
    }

    /// Reduces the table to one label plus `Total`.
    pub fn filtered_to(self, label: &str) -> Self {
        let rows = self
            .rows
            .into_iter()
            .filter(|row| row.label == label || row.label == TOTAL_LABEL)
            .collect();
        ResultTable { rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_sums_counted_rows_only() {
        let mut table = ResultTable::new();
        table.push_count("Norte", 10);
        table.push_count("Sul", 32);
        table.push_missing("Sudeste", "timed out");
        let table = table.finish_with_total();
        assert_eq!(table.count_of(TOTAL_LABEL), Some(42));
        assert_eq!(table.missing_count(), 1);
    }

    #[test]
    fn filter_keeps_label_and_total() {
        let mut table = ResultTable::new();
        table.push_count("Norte", 1);
        table.push_count("Sul", 2);
        let table = table.finish_with_total().filtered_to("Sul");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.count_of("Sul"), Some(2));
        assert_eq!(table.count_of(TOTAL_LABEL), Some(3));
        assert!(table.get("Norte").is_none());
    }

    #[test]
    fn counts_carry_formatted_twin() {
        let mut table = ResultTable::new();
        table.push_count("Sudeste", 32541);
        match table.get("Sudeste") {
            Some(Cell::Count(count)) => assert_eq!(count.formatted, "32.541"),
            other => panic!("unexpected cell {other:?}"),
        }
    }
}

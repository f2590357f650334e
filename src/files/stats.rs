//! Batch statistics.

use schemars::JsonSchema;

use super::{ResultRecord, iso_timestamp};
use crate::prelude::*;

/// Summary numbers for a batch run.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct Statistics {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    /// Formatted as `"NN.NN%"`, or `"0%"` for an empty batch.
    pub success_rate: String,
    /// Characters of text from successful results.
    pub total_characters: usize,
    /// Formatted with two decimals.
    pub average_characters: String,
    pub timestamp: String,
}

/// Compute statistics over a batch of results.
pub fn get_statistics<R: ResultRecord>(results: &[R]) -> Statistics {
    let total_files = results.len();
    let successful = results.iter().filter(|r| r.is_success()).count();
    let total_characters = results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.text().chars().count())
        .sum::<usize>();

    let success_rate = if total_files == 0 {
        "0%".to_owned()
    } else {
        format!("{:.2}%", successful as f64 / total_files as f64 * 100.0)
    };
    let average_characters = if successful == 0 {
        "0.00".to_owned()
    } else {
        format!("{:.2}", total_characters as f64 / successful as f64)
    };

    Statistics {
        total_files,
        successful,
        failed: total_files - successful,
        success_rate,
        total_characters,
        average_characters,
        timestamp: iso_timestamp(),
    }
}

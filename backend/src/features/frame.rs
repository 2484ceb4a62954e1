use chrono::NaiveDate;
use shared::FeatureRow;

/// Number of model input features per time step.
pub const FEATURE_COUNT: usize = 5;

/// Model input feature order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] =
    ["rvi_mean", "vv_mean", "vh_mean", "vv_vh_ratio", "rvi_std"];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("Two composites share the period starting {0}")]
    DuplicatePeriod(NaiveDate),
}

/// Composite rows of one job, ascending by period with no empty rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    pub fn new(rows: Vec<FeatureRow>) -> Result<Self, FrameError> {
        let mut rows: Vec<FeatureRow> = rows
            .into_iter()
            .map(FeatureRow::sanitized)
            .filter(|row| !row.is_empty())
            .collect();
        rows.sort_by_key(|row| row.period_start);
        if let Some(pair) = rows.windows(2).find(|p| p[0].period_start == p[1].period_start) {
            return Err(FrameError::DuplicatePeriod(pair[0].period_start));
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    /// Rows rounded for storage in a job record.
    pub fn display_rows(&self) -> Vec<FeatureRow> {
        self.rows.iter().cloned().map(|row| row.rounded(6)).collect()
    }

    /// Model features per row, in `FEATURE_NAMES` order.
    pub fn feature_matrix(&self) -> Vec<[Option<f64>; FEATURE_COUNT]> {
        self.rows
            .iter()
            .map(|row| {
                [
                    row.rvi_mean,
                    row.vv_mean,
                    row.vh_mean,
                    row.vv_vh_ratio,
                    row.rvi_std,
                ]
            })
            .collect()
    }
}

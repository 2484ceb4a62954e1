use std::sync::Arc;

use ndarray::{s, Array2, ArrayView2, Axis};

use super::frame::{FEATURE_COUNT, FEATURE_NAMES, FeatureFrame};
use super::scaler::StandardScaler;

/// Time steps the classifier consumes.
pub const SEQ_LENGTH: usize = 12;
pub const DEFAULT_MIN_TIME_STEPS: usize = 3;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureError {
    #[error("Only {found} time steps found (minimum {required} required)")]
    InsufficientData { found: usize, required: usize },
}

/// Fixed `SEQ_LENGTH x FEATURE_COUNT` normalised input, oldest step first.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSequence(Array2<f32>);

impl AlignedSequence {
    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array2<f32> {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    scaler: Option<Arc<StandardScaler>>,
    min_time_steps: usize,
}

impl FeatureBuilder {
    pub fn new(scaler: Option<Arc<StandardScaler>>, min_time_steps: usize) -> Self {
        Self {
            scaler,
            min_time_steps: min_time_steps.max(1),
        }
    }

    pub fn min_time_steps(&self) -> usize {
        self.min_time_steps
    }

    pub fn build(&self, frame: &FeatureFrame) -> Result<AlignedSequence, FeatureError> {
        if frame.len() < self.min_time_steps {
            return Err(FeatureError::InsufficientData {
                found: frame.len(),
                required: self.min_time_steps,
            });
        }
        let imputed = impute(&frame.feature_matrix());
        let normalized = match &self.scaler {
            Some(scaler) => scaler.transform(&imputed),
            None => imputed,
        };
        log::debug!(
            "Aligning {} time steps of {:?} to {}",
            normalized.nrows(),
            FEATURE_NAMES,
            SEQ_LENGTH
        );
        Ok(AlignedSequence(align(normalized.view()).mapv(|v| v as f32)))
    }
}

/// Fills gaps per column: forward fill, then backward fill, then zero for a
/// column with no values at all.
pub fn impute(rows: &[[Option<f64>; FEATURE_COUNT]]) -> Array2<f64> {
    let mut out = Array2::zeros((rows.len(), FEATURE_COUNT));
    for col in 0..FEATURE_COUNT {
        let mut filled: Vec<Option<f64>> = Vec::with_capacity(rows.len());
        let mut last = None;
        for row in rows {
            last = row[col].or(last);
            filled.push(last);
        }
        let mut next = None;
        for value in filled.iter_mut().rev() {
            if let Some(v) = *value {
                next = Some(v);
            } else {
                *value = next;
            }
        }
        for (i, value) in filled.into_iter().enumerate() {
            out[[i, col]] = value.unwrap_or(0.0);
        }
    }
    out
}

/// Pads by repeating the last row, or keeps only the most recent
/// `SEQ_LENGTH` rows.
pub fn align(features: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = features.nrows();
    if n >= SEQ_LENGTH {
        return features.slice(s![n - SEQ_LENGTH.., ..]).to_owned();
    }
    let mut out = Array2::zeros((SEQ_LENGTH, features.ncols()));
    out.slice_mut(s![..n, ..]).assign(&features);
    if n > 0 {
        let last = features.row(n - 1);
        for mut row in out.slice_mut(s![n.., ..]).axis_iter_mut(Axis(0)) {
            row.assign(&last);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, NaiveDate};
    use shared::FeatureRow;

    fn frame_of(len: usize) -> FeatureFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rows = (0..len)
            .map(|i| {
                let x = i as f64;
                FeatureRow {
                    period_start: start + Duration::days(10 * i as i64),
                    rvi_mean: Some(0.3 + 0.01 * x),
                    rvi_median: Some(0.3),
                    rvi_std: Some(0.02 + 0.001 * x),
                    vv_mean: Some(-10.0 - 0.1 * x),
                    vh_mean: Some(-16.0 - 0.1 * x),
                    vv_vh_ratio: Some(6.0),
                }
            })
            .collect();
        FeatureFrame::new(rows).unwrap()
    }

    fn scaler() -> Arc<StandardScaler> {
        Arc::new(
            StandardScaler::new(vec![0.35, -10.5, -16.5, 6.0, 0.03], vec![0.1, 1.0, 1.0, 0.5, 0.01])
                .unwrap(),
        )
    }

    fn assert_shape_and_finite(seq: &AlignedSequence) {
        assert_eq!(seq.view().dim(), (SEQ_LENGTH, FEATURE_COUNT));
        assert!(seq.view().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn fewer_than_minimum_rows_is_insufficient() {
        let builder = FeatureBuilder::new(None, DEFAULT_MIN_TIME_STEPS);
        assert_matches!(
            builder.build(&frame_of(2)),
            Err(FeatureError::InsufficientData { found: 2, required: 3 })
        );
        assert_matches!(
            builder.build(&FeatureFrame::default()),
            Err(FeatureError::InsufficientData { found: 0, required: 3 })
        );
    }

    #[test]
    fn output_shape_is_fixed_for_any_length() {
        let builder = FeatureBuilder::new(Some(scaler()), DEFAULT_MIN_TIME_STEPS);
        for len in [3, 7, 12, 13, 30] {
            let seq = builder.build(&frame_of(len)).unwrap();
            assert_shape_and_finite(&seq);
        }
    }

    #[test]
    fn short_frames_repeat_the_last_normalised_row() {
        let scaler = scaler();
        let builder = FeatureBuilder::new(Some(scaler.clone()), DEFAULT_MIN_TIME_STEPS);
        let frame = frame_of(5);
        let seq = builder.build(&frame).unwrap();

        let expected = scaler.transform(&impute(&frame.feature_matrix())).mapv(|v| v as f32);
        let view = seq.view();
        for i in 0..5 {
            assert_eq!(view.row(i), expected.row(i));
        }
        for i in 5..SEQ_LENGTH {
            assert_eq!(view.row(i), expected.row(4));
        }
    }

    #[test]
    fn long_frames_keep_the_most_recent_rows() {
        let builder = FeatureBuilder::new(None, DEFAULT_MIN_TIME_STEPS);
        let frame = frame_of(15);
        let seq = builder.build(&frame).unwrap();

        let full = impute(&frame.feature_matrix()).mapv(|v| v as f32);
        let view = seq.view();
        for i in 0..SEQ_LENGTH {
            assert_eq!(view.row(i), full.row(i + 3));
        }
    }

    #[test]
    fn exact_length_passes_through() {
        let builder = FeatureBuilder::new(None, DEFAULT_MIN_TIME_STEPS);
        let frame = frame_of(SEQ_LENGTH);
        let seq = builder.build(&frame).unwrap();
        let full = impute(&frame.feature_matrix()).mapv(|v| v as f32);
        assert_eq!(seq.into_inner(), full);
    }

    #[test]
    fn imputation_fills_forward_then_backward_then_zero() {
        let rows = vec![
            [None, Some(-10.0), None, None, None],
            [Some(0.4), None, None, None, None],
            [None, None, Some(-16.0), None, None],
            [Some(0.6), Some(-11.0), None, None, None],
        ];
        let filled = impute(&rows);

        assert_eq!(filled.column(0).to_vec(), vec![0.4, 0.4, 0.4, 0.6]);
        assert_eq!(filled.column(1).to_vec(), vec![-10.0, -10.0, -10.0, -11.0]);
        assert_eq!(filled.column(2).to_vec(), vec![-16.0, -16.0, -16.0, -16.0]);
        assert_eq!(filled.column(3).to_vec(), vec![0.0; 4]);
    }

    #[test]
    fn imputation_is_a_no_op_on_complete_rows() {
        let frame = frame_of(6);
        let once = impute(&frame.feature_matrix());
        let as_options: Vec<[Option<f64>; FEATURE_COUNT]> = once
            .outer_iter()
            .map(|row| {
                let mut out = [None; FEATURE_COUNT];
                for (slot, v) in out.iter_mut().zip(row.iter()) {
                    *slot = Some(*v);
                }
                out
            })
            .collect();
        assert_eq!(impute(&as_options), once);
    }

    #[test]
    fn missing_scaler_is_identity() {
        let builder = FeatureBuilder::new(None, DEFAULT_MIN_TIME_STEPS);
        let frame = frame_of(3);
        let seq = builder.build(&frame).unwrap();
        assert!((seq.view()[[0, 1]] - (-10.0)).abs() < 1e-6);
    }
}

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use shared::{FeatureRow, RawObservationRow};

pub const DEFAULT_COMPOSITE_DAYS: u32 = 10;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompositeError {
    #[error("Observation periods must be strictly increasing, {0} is out of order")]
    UnorderedObservations(NaiveDate),
    #[error("Invalid compositing window: {0}")]
    InvalidWindow(String),
}

pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

pub fn linear_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}

/// Radar vegetation index from dual-polarisation backscatter given in dB.
/// Computed on linear power and deliberately left unclamped.
pub fn radar_vegetation_index(vv_db: f64, vh_db: f64) -> f64 {
    let vv = db_to_linear(vv_db);
    let vh = db_to_linear(vh_db);
    4.0 * vh / (vv + vh)
}

/// One pixel of a scene. Non-finite values mark a masked pixel; on the wire
/// a masked value is `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Backscatter {
    #[serde(deserialize_with = "masked_db")]
    pub vv_db: f64,
    #[serde(deserialize_with = "masked_db")]
    pub vh_db: f64,
}

fn masked_db<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl Backscatter {
    fn is_valid(&self) -> bool {
        self.vv_db.is_finite() && self.vh_db.is_finite()
    }
}

/// A single acquisition over the AOI grid. Pixel `i` is the same ground
/// location in every scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub acquired_on: NaiveDate,
    pub pixels: Vec<Backscatter>,
}

impl From<RawObservationRow> for Scene {
    fn from(row: RawObservationRow) -> Self {
        Self {
            acquired_on: row.period_start,
            pixels: vec![Backscatter {
                vv_db: row.vv_mean,
                vh_db: row.vh_mean,
            }],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PixelComposite {
    vv_db: f64,
    vh_db: f64,
    rvi: f64,
    ratio: f64,
}

/// Builds fixed-length temporal composites out of irregular acquisitions.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    window_days: u32,
}

impl Default for Compositor {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_COMPOSITE_DAYS,
        }
    }
}

impl Compositor {
    pub fn new(window_days: u32) -> Result<Self, CompositeError> {
        if window_days == 0 {
            return Err(CompositeError::InvalidWindow(
                "window length must be at least one day".to_string(),
            ));
        }
        Ok(Self { window_days })
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Consecutive `[from, to)` windows covering `[start, end)`; the last one
    /// is cut short at `end`.
    pub fn windows(&self, start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
        let step = Duration::days(i64::from(self.window_days));
        let mut windows = Vec::new();
        let mut current = start;
        while current < end {
            let next = (current + step).min(end);
            windows.push((current, next));
            current = next;
        }
        windows
    }

    pub fn composite_scenes(
        &self,
        scenes: &[Scene],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<FeatureRow> {
        self.windows(start, end)
            .into_iter()
            .filter_map(|(from, to)| {
                let in_window: Vec<&Scene> = scenes
                    .iter()
                    .filter(|scene| scene.acquired_on >= from && scene.acquired_on < to)
                    .collect();
                let row = composite_window(from, &in_window)?;
                if row.is_empty() {
                    log::debug!("Composite window starting {} has no valid values", from);
                    return None;
                }
                Some(row)
            })
            .collect()
    }

    pub fn composite_rows(
        &self,
        rows: &[RawObservationRow],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FeatureRow>, CompositeError> {
        for pair in rows.windows(2) {
            if pair[1].period_start <= pair[0].period_start {
                return Err(CompositeError::UnorderedObservations(pair[1].period_start));
            }
        }
        let scenes: Vec<Scene> = rows.iter().copied().map(Scene::from).collect();
        Ok(self.composite_scenes(&scenes, start, end))
    }
}

fn composite_window(period_start: NaiveDate, scenes: &[&Scene]) -> Option<FeatureRow> {
    let pixel_count = scenes.iter().map(|s| s.pixels.len()).max()?;
    let composites: Vec<PixelComposite> = (0..pixel_count)
        .filter_map(|i| {
            let samples: Vec<Backscatter> = scenes
                .iter()
                .filter_map(|s| s.pixels.get(i).copied())
                .filter(Backscatter::is_valid)
                .collect();
            composite_pixel(&samples)
        })
        .collect();
    if composites.is_empty() {
        return None;
    }

    let vv: Vec<f64> = composites.iter().map(|p| p.vv_db).collect();
    let vh: Vec<f64> = composites.iter().map(|p| p.vh_db).collect();
    let rvi: Vec<f64> = composites.iter().map(|p| p.rvi).collect();
    let ratio: Vec<f64> = composites.iter().map(|p| p.ratio).collect();

    Some(
        FeatureRow {
            period_start,
            rvi_mean: mean(&rvi),
            rvi_median: median(rvi.clone()),
            rvi_std: population_std(&rvi),
            vv_mean: mean(&vv),
            vh_mean: mean(&vh),
            vv_vh_ratio: mean(&ratio),
        }
        .sanitized(),
    )
}

// Median composite across scenes. VV/VH are reduced on linear power and
// reported back in dB; RVI and the dB ratio are per-scene values.
fn composite_pixel(samples: &[Backscatter]) -> Option<PixelComposite> {
    if samples.is_empty() {
        return None;
    }
    let vv_linear = median(samples.iter().map(|s| db_to_linear(s.vv_db)).collect())?;
    let vh_linear = median(samples.iter().map(|s| db_to_linear(s.vh_db)).collect())?;
    let rvi = median(
        samples
            .iter()
            .map(|s| radar_vegetation_index(s.vv_db, s.vh_db))
            .collect(),
    )?;
    let ratio = median(samples.iter().map(|s| s.vv_db - s.vh_db).collect())?;
    Some(PixelComposite {
        vv_db: linear_to_db(vv_linear),
        vh_db: linear_to_db(vh_linear),
        rvi,
        ratio,
    })
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

fn population_std(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

pub mod gateway;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::features::composite::CompositeError;
use crate::features::{FeatureFrame, FrameError};

pub use gateway::{HttpTileProvider, HttpTimeSeriesProvider, Unconfigured};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Compositing failed: {0}")]
    Composite(#[from] CompositeError),
    #[error("Invalid time series: {0}")]
    Frame(#[from] FrameError),
    #[error("{0}")]
    Unavailable(String),
}

/// Source of composited radar time series for an AOI.
#[async_trait]
pub trait TimeSeriesProvider: Send + Sync {
    async fn fetch(
        &self,
        aoi: &serde_json::Value,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<FeatureFrame, ProviderError>;
}

/// Source of a map tile URL template visualising the AOI.
#[async_trait]
pub trait TileProvider: Send + Sync {
    async fn visualization_tile(
        &self,
        aoi: &serde_json::Value,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<String, ProviderError>;
}

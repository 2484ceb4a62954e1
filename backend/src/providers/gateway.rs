use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{ProviderError, TileProvider, TimeSeriesProvider};
use crate::features::{Compositor, FeatureFrame, Scene};

const RVI_PALETTE: [&str; 3] = ["red", "yellow", "green"];

#[derive(Debug, Serialize)]
struct SceneQuery<'a> {
    aoi: &'a serde_json::Value,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Serialize)]
struct TileQuery<'a> {
    aoi: &'a serde_json::Value,
    start_date: NaiveDate,
    end_date: NaiveDate,
    min: f64,
    max: f64,
    palette: [&'static str; 3],
}

#[derive(Debug, Deserialize)]
struct TileResponse {
    url_format: String,
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Pulls raw scenes from the imagery gateway and composites them locally.
#[derive(Clone)]
pub struct HttpTimeSeriesProvider {
    client: reqwest::Client,
    base_url: String,
    compositor: Compositor,
}

impl HttpTimeSeriesProvider {
    pub fn new(client: reqwest::Client, base_url: String, compositor: Compositor) -> Self {
        Self {
            client,
            base_url,
            compositor,
        }
    }
}

#[async_trait]
impl TimeSeriesProvider for HttpTimeSeriesProvider {
    async fn fetch(
        &self,
        aoi: &serde_json::Value,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<FeatureFrame, ProviderError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "scenes"))
            .json(&SceneQuery {
                aoi,
                start_date,
                end_date,
            })
            .send()
            .await?;
        let scenes: Vec<Scene> = check_status(response).await?.json().await?;
        debug!(
            "Received {} scenes for {}..{}, compositing every {} days",
            scenes.len(),
            start_date,
            end_date,
            self.compositor.window_days()
        );
        let rows = self.compositor.composite_scenes(&scenes, start_date, end_date);
        Ok(FeatureFrame::new(rows)?)
    }
}

#[derive(Clone)]
pub struct HttpTileProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTileProvider {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl TileProvider for HttpTileProvider {
    async fn visualization_tile(
        &self,
        aoi: &serde_json::Value,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "tiles"))
            .json(&TileQuery {
                aoi,
                start_date,
                end_date,
                min: 0.0,
                max: 1.0,
                palette: RVI_PALETTE,
            })
            .send()
            .await?;
        let tile: TileResponse = check_status(response).await?.json().await?;
        Ok(tile.url_format)
    }
}

/// Stand-in when no gateway URL is configured; every call fails.
#[derive(Debug, Clone)]
pub struct Unconfigured(pub &'static str);

#[async_trait]
impl TimeSeriesProvider for Unconfigured {
    async fn fetch(
        &self,
        _aoi: &serde_json::Value,
        _start_date: NaiveDate,
        _end_date: NaiveDate,
    ) -> Result<FeatureFrame, ProviderError> {
        Err(ProviderError::Unavailable(format!("{} is not configured", self.0)))
    }
}

#[async_trait]
impl TileProvider for Unconfigured {
    async fn visualization_tile(
        &self,
        _aoi: &serde_json::Value,
        _start_date: NaiveDate,
        _end_date: NaiveDate,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable(format!("{} is not configured", self.0)))
    }
}

//! Backend bridge to the remote prediction service.
//!
//! One completed [`SampleBatch`] becomes one HTTP POST. The response must
//! carry a numeric prediction for every parameter in the fixed table; the
//! batch is decoded all-or-nothing so no partial record set ever reaches the
//! store.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::data::{SampleBatch, SoilParameterRecord, SOIL_PARAMETERS};
use crate::error::{Error, Result};

/// Sink for completed batches.
///
/// The sampler is written against this trait; production code uses
/// [`PredictionClient`].
#[async_trait]
pub trait BatchDispatcher: Send + Sync {
    /// Exchange one batch for the full soil parameter record set.
    async fn dispatch(&self, batch: &SampleBatch) -> Result<Vec<SoilParameterRecord>>;
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    data: &'a [f64],
}

/// HTTP client for the prediction endpoint.
pub struct PredictionClient {
    http: reqwest::Client,
    endpoint: String,
}

impl PredictionClient {
    /// Create a client for a prediction endpoint, e.g.
    /// `http://192.168.1.20:5000/predict`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// The configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BatchDispatcher for PredictionClient {
    async fn dispatch(&self, batch: &SampleBatch) -> Result<Vec<SoilParameterRecord>> {
        debug!(
            "Dispatching batch of {} samples to {}",
            batch.len(),
            self.endpoint
        );

        let response = self
            .http
            .post(&self.endpoint)
            .json(&PredictRequest {
                data: batch.samples(),
            })
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let records = records_from_response(&body)?;

        debug!("Received {} soil parameter records", records.len());

        Ok(records)
    }
}

/// Decode a prediction response body into the full record set.
///
/// Fails closed: a body without a `predictions` object, or a `predictions`
/// object missing any expected key, or a non-numeric value yields an error
/// and no records.
pub fn records_from_response(body: &Value) -> Result<Vec<SoilParameterRecord>> {
    let predictions = body
        .get("predictions")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::InvalidResponse {
            context: "missing predictions object".to_string(),
        })?;

    let mut records = Vec::with_capacity(SOIL_PARAMETERS.len());

    for spec in &SOIL_PARAMETERS {
        let value = predictions
            .get(spec.key)
            .ok_or(Error::MissingPrediction { key: spec.key })?;

        let value = value.as_f64().ok_or_else(|| Error::InvalidResponse {
            context: format!("non-numeric value for {}", spec.key),
        })?;

        records.push(SoilParameterRecord {
            label: spec.label.to_string(),
            value: format!("{value:.2}"),
            unit: spec.unit.to_string(),
            good_range_min: spec.good_range_min,
            good_range_max: spec.good_range_max,
        });
    }

    Ok(records)
}

//! Data types for the acquisition pipeline.

pub mod parameters;
pub mod store;

pub use parameters::{ParameterSpec, PARAMETER_COUNT, SOIL_PARAMETERS};
pub use store::SoilDataStore;

/// Number of sensor readings in one complete batch.
///
/// The probe emits one reading per notification; the prediction service
/// expects exactly this many values per request.
pub const SAMPLE_BATCH_SIZE: usize = 18;

/// An immutable, completed batch of sensor readings in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    samples: Vec<f64>,
}

impl SampleBatch {
    /// Build a batch from a full buffer.
    ///
    /// Only the sample accumulator constructs batches; the length is always
    /// [`SAMPLE_BATCH_SIZE`].
    pub(crate) fn new(samples: Vec<f64>) -> Self {
        debug_assert_eq!(samples.len(), SAMPLE_BATCH_SIZE);
        Self { samples }
    }

    /// The readings, in the order their notifications arrived.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Number of readings in the batch.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// A completed batch is never empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One decoded soil parameter from the prediction service.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SoilParameterRecord {
    /// Human-readable parameter label, e.g. "Total Nitrogen (N)".
    pub label: String,
    /// Predicted value formatted for display.
    pub value: String,
    /// Display unit, e.g. "kg/ha". Empty for unitless parameters.
    pub unit: String,
    /// Lower bound of the recommended range.
    pub good_range_min: f64,
    /// Upper bound of the recommended range.
    pub good_range_max: f64,
}

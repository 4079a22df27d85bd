//! End-to-end pipeline tests over a scripted radio and backend.
//!
//! Drives the full acquisition path: connect, emit notifications, assemble
//! batches, dispatch to a fake prediction backend, publish to the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use agrow_probe_ble::backend::records_from_response;
use agrow_probe_ble::ble::radio::{AdvertisementStream, NotificationStream};
use agrow_probe_ble::ble::ConnectionManager;
use agrow_probe_ble::{
    encode_sample, BatchDispatcher, BleRadio, DiscoveredProbe, ProbeLink, Result, SampleBatch,
    SoilDataStore, SoilParameterRecord, PARAMETER_COUNT, SAMPLE_BATCH_SIZE, SOIL_PARAMETERS,
};

/// A link whose notification stream is fed by the test.
struct FakeLink {
    identifier: String,
    notification_tx: RwLock<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl FakeLink {
    fn notify(&self, payload: Vec<u8>) {
        self.notification_tx
            .read()
            .as_ref()
            .expect("not subscribed")
            .send(payload)
            .unwrap();
    }

    fn notify_value(&self, value: f64) {
        self.notify(encode_sample(value));
    }

    fn drop_link(&self) {
        *self.notification_tx.write() = None;
    }
}

#[async_trait]
impl ProbeLink for FakeLink {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn discover_services(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self, _characteristic: Uuid) -> Result<Vec<u8>> {
        Ok(b"AGROW-PROBE-01".to_vec())
    }

    async fn subscribe(&self, _characteristic: Uuid) -> Result<NotificationStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.notification_tx.write() = Some(tx);
        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async {
            rx.recv().await.map(|payload| (payload, rx))
        })))
    }

    async fn unsubscribe(&self, _characteristic: Uuid) -> Result<()> {
        *self.notification_tx.write() = None;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

struct FakeRadio {
    links: RwLock<HashMap<String, Arc<FakeLink>>>,
}

impl FakeRadio {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            links: RwLock::new(HashMap::new()),
        })
    }

    fn link(&self, identifier: &str) -> Arc<FakeLink> {
        self.links
            .read()
            .get(identifier)
            .cloned()
            .expect("link not created")
    }
}

#[async_trait]
impl BleRadio for FakeRadio {
    async fn start_scan(&self) -> Result<()> {
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        Ok(())
    }

    async fn advertisements(&self) -> Result<AdvertisementStream> {
        Ok(futures::stream::pending().boxed())
    }

    async fn connect(&self, identifier: &str) -> Result<Arc<dyn ProbeLink>> {
        let link = Arc::new(FakeLink {
            identifier: identifier.to_string(),
            notification_tx: RwLock::new(None),
        });
        self.links
            .write()
            .insert(identifier.to_string(), link.clone());
        Ok(link)
    }
}

/// Backend double: records every batch, optionally gated so a dispatch
/// stays in flight until the test releases it, and decodes a scripted
/// response body through the production decoder.
struct ScriptedBackend {
    response: RwLock<Value>,
    dispatched: RwLock<Vec<Vec<f64>>>,
    gate: Option<Semaphore>,
}

impl ScriptedBackend {
    fn new(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response: RwLock::new(response),
            dispatched: RwLock::new(Vec::new()),
            gate: None,
        })
    }

    fn gated(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response: RwLock::new(response),
            dispatched: RwLock::new(Vec::new()),
            gate: Some(Semaphore::new(0)),
        })
    }

    fn release_one(&self) {
        self.gate.as_ref().expect("backend not gated").add_permits(1);
    }

    fn dispatch_count(&self) -> usize {
        self.dispatched.read().len()
    }

    fn dispatched_batches(&self) -> Vec<Vec<f64>> {
        self.dispatched.read().clone()
    }
}

#[async_trait]
impl BatchDispatcher for ScriptedBackend {
    async fn dispatch(&self, batch: &SampleBatch) -> Result<Vec<SoilParameterRecord>> {
        self.dispatched.write().push(batch.samples().to_vec());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let response = self.response.read().clone();
        records_from_response(&response)
    }
}

fn full_predictions() -> Value {
    let mut predictions = serde_json::Map::new();
    for (i, spec) in SOIL_PARAMETERS.iter().enumerate() {
        predictions.insert(spec.key.to_string(), json!(i as f64 * 1.5 + 0.25));
    }
    json!({ "predictions": predictions })
}

fn probe(identifier: &str) -> DiscoveredProbe {
    DiscoveredProbe {
        identifier: identifier.to_string(),
        name: "Demo Soil Sensor".to_string(),
        rssi: Some(-48),
    }
}

/// Poll until `check` passes or a generous deadline expires.
async fn eventually<F: Fn() -> bool>(check: F, what: &str) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

#[tokio::test]
async fn scenario_a_full_batch_yields_twenty_records() {
    let radio = FakeRadio::new();
    let backend = ScriptedBackend::new(full_predictions());
    let store = Arc::new(SoilDataStore::new());
    let manager = ConnectionManager::new(radio.clone(), backend.clone(), store.clone());

    manager.connect(probe("AA")).await.unwrap();
    let link = radio.link("AA");

    for i in 1..=SAMPLE_BATCH_SIZE {
        link.notify_value(i as f64);
    }

    eventually(|| !store.snapshot().is_empty(), "store update").await;

    // Exactly one batch, in arrival order.
    let batches = backend.dispatched_batches();
    assert_eq!(batches.len(), 1);
    let expected: Vec<f64> = (1..=SAMPLE_BATCH_SIZE).map(|i| i as f64).collect();
    assert_eq!(batches[0], expected);

    // The store carries the full record set with the fixed labels.
    let records = store.snapshot();
    assert_eq!(records.len(), PARAMETER_COUNT);
    for (record, spec) in records.iter().zip(SOIL_PARAMETERS.iter()) {
        assert_eq!(record.label, spec.label);
        assert_eq!(record.unit, spec.unit);
        assert_eq!(record.good_range_min, spec.good_range_min);
        assert_eq!(record.good_range_max, spec.good_range_max);
    }
    assert!(store.last_updated().is_some());

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn scenario_b_missing_key_leaves_store_unchanged() {
    let mut body = full_predictions();
    body.get_mut("predictions")
        .unwrap()
        .as_object_mut()
        .unwrap()
        .remove("zn_ext");

    let radio = FakeRadio::new();
    let backend = ScriptedBackend::new(body);
    let store = Arc::new(SoilDataStore::new());
    let manager = ConnectionManager::new(radio.clone(), backend.clone(), store.clone());

    manager.connect(probe("AA")).await.unwrap();
    let link = radio.link("AA");

    for i in 1..=SAMPLE_BATCH_SIZE {
        link.notify_value(i as f64);
    }

    eventually(|| backend.dispatch_count() == 1, "first dispatch").await;

    // The failed batch publishes nothing and the in-flight flag clears, so
    // the next batch goes out.
    for i in 1..=SAMPLE_BATCH_SIZE {
        link.notify_value(100.0 + i as f64);
    }
    eventually(|| backend.dispatch_count() == 2, "second dispatch").await;

    assert!(store.snapshot().is_empty());
    assert!(store.last_updated().is_none());

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn scenario_c_undecodable_payloads_do_not_count() {
    let radio = FakeRadio::new();
    let backend = ScriptedBackend::new(full_predictions());
    let store = Arc::new(SoilDataStore::new());
    let manager = ConnectionManager::new(radio.clone(), backend.clone(), store.clone());

    manager.connect(probe("AA")).await.unwrap();
    let link = radio.link("AA");

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    for i in 1..=9 {
        link.notify_value(i as f64);
    }
    // Malformed payloads in the middle of the stream.
    link.notify(STANDARD.encode("ERR").into_bytes());
    link.notify(b"!!not-base64!!".to_vec());
    for i in 10..=SAMPLE_BATCH_SIZE {
        link.notify_value(i as f64);
    }

    eventually(|| backend.dispatch_count() == 1, "dispatch").await;

    let batches = backend.dispatched_batches();
    let expected: Vec<f64> = (1..=SAMPLE_BATCH_SIZE).map(|i| i as f64).collect();
    assert_eq!(batches[0], expected);

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn scenario_d_single_flight_blocks_second_dispatch() {
    let radio = FakeRadio::new();
    let backend = ScriptedBackend::gated(full_predictions());
    let store = Arc::new(SoilDataStore::new());
    let manager = ConnectionManager::new(radio.clone(), backend.clone(), store.clone());

    manager.connect(probe("AA")).await.unwrap();
    let link = radio.link("AA");

    for i in 1..=SAMPLE_BATCH_SIZE {
        link.notify_value(i as f64);
    }
    eventually(|| backend.dispatch_count() == 1, "first dispatch").await;
    assert!(manager.is_dispatch_in_flight().await);

    // A full second round arrives while the first dispatch is pending:
    // no second dispatch may start.
    for i in 1..=SAMPLE_BATCH_SIZE {
        link.notify_value(200.0 + i as f64);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.dispatch_count(), 1);
    assert!(manager.is_dispatch_in_flight().await);

    // Completing the first dispatch releases the held batch.
    backend.release_one();
    eventually(|| backend.dispatch_count() == 2, "second dispatch").await;

    let batches = backend.dispatched_batches();
    assert_eq!(batches[1][0], 201.0);

    backend.release_one();
    eventually(|| !store.snapshot().is_empty(), "store update").await;

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn superseded_session_results_are_discarded() {
    let radio = FakeRadio::new();
    let backend = ScriptedBackend::gated(full_predictions());
    let store = Arc::new(SoilDataStore::new());
    let manager = ConnectionManager::new(radio.clone(), backend.clone(), store.clone());

    manager.connect(probe("AA")).await.unwrap();
    let link = radio.link("AA");

    for i in 1..=SAMPLE_BATCH_SIZE {
        link.notify_value(i as f64);
    }
    eventually(|| backend.dispatch_count() == 1, "dispatch").await;

    // Supersede while the dispatch is still in flight.
    manager.connect(probe("BB")).await.unwrap();

    // The old session's result arrives late and must not be published.
    backend.release_one();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.snapshot().is_empty());

    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn link_loss_stops_buffering() {
    let radio = FakeRadio::new();
    let backend = ScriptedBackend::new(full_predictions());
    let store = Arc::new(SoilDataStore::new());
    let manager = ConnectionManager::new(radio.clone(), backend.clone(), store.clone());

    manager.connect(probe("AA")).await.unwrap();
    let link = radio.link("AA");

    for i in 1..=5 {
        link.notify_value(i as f64);
    }
    link.drop_link();

    eventually(|| !manager.is_connected(), "session reaped").await;
    assert_eq!(backend.dispatch_count(), 0);
    assert!(store.snapshot().is_empty());
}

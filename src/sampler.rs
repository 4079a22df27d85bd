//! Notification buffering and batch assembly.
//!
//! Each notification carries one base64-encoded ASCII float. Decoded values
//! accumulate in arrival order until a full [`SampleBatch`] is ready, which
//! is handed to the backend bridge under a single-flight discipline: while a
//! dispatch is pending no second batch is started, and samples beyond
//! capacity are dropped rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::BatchDispatcher;
use crate::ble::radio::NotificationStream;
use crate::data::{SampleBatch, SoilDataStore, SAMPLE_BATCH_SIZE};

/// Decode one notification payload into a sensor reading.
///
/// The payload is base64-encoded UTF-8 text holding a single ASCII float.
/// Returns `None` for anything else; malformed payloads are dropped by the
/// caller without affecting the buffer.
pub fn decode_sample(payload: &[u8]) -> Option<f64> {
    let bytes = BASE64.decode(payload).ok()?;
    let text = std::str::from_utf8(&bytes).ok()?;
    text.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Encode a reading the way the probe does. Used by simulators and tests.
pub fn encode_sample(value: f64) -> Vec<u8> {
    BASE64.encode(value.to_string()).into_bytes()
}

/// Accumulates decoded readings into fixed-size batches.
///
/// A batch is emitted the instant the buffer holds exactly
/// [`SAMPLE_BATCH_SIZE`] values and no dispatch is in flight. If a dispatch
/// is pending the buffer holds at the full mark, further values are dropped,
/// and the held batch goes out as soon as the dispatch completes.
pub struct SampleAccumulator {
    buffer: Vec<f64>,
    in_flight: Arc<AtomicBool>,
}

impl SampleAccumulator {
    /// Create an empty accumulator with its own in-flight flag.
    pub fn new() -> Self {
        Self::with_flag(Arc::new(AtomicBool::new(false)))
    }

    /// Create an accumulator sharing an externally observable flag.
    pub fn with_flag(in_flight: Arc<AtomicBool>) -> Self {
        Self {
            buffer: Vec::with_capacity(SAMPLE_BATCH_SIZE),
            in_flight,
        }
    }

    /// Append a decoded reading. Returns a batch if one became ready.
    pub fn push(&mut self, value: f64) -> Option<SampleBatch> {
        if self.buffer.len() >= SAMPLE_BATCH_SIZE {
            // A full batch is already held back behind a pending dispatch.
            debug!("Dropping sample while dispatch is in flight");
            return None;
        }

        self.buffer.push(value);
        self.take_ready()
    }

    /// Record that the pending dispatch finished, successfully or not.
    /// Returns a batch if a held-back full buffer can now go out.
    pub fn complete_dispatch(&mut self) -> Option<SampleBatch> {
        self.in_flight.store(false, Ordering::SeqCst);
        self.take_ready()
    }

    /// Number of readings currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a dispatch is currently pending.
    pub fn is_dispatch_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn take_ready(&mut self) -> Option<SampleBatch> {
        if self.buffer.len() == SAMPLE_BATCH_SIZE && !self.in_flight.load(Ordering::SeqCst) {
            self.in_flight.store(true, Ordering::SeqCst);
            Some(SampleBatch::new(std::mem::take(&mut self.buffer)))
        } else {
            None
        }
    }
}

impl Default for SampleAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running sampler task.
pub(crate) struct SamplerHandle {
    task: tokio::task::JoinHandle<()>,
    active: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
}

impl SamplerHandle {
    /// Stop buffering. Pending dispatch results for this session are
    /// discarded instead of published.
    pub(crate) fn shutdown(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.task.abort();
    }

    /// Whether a backend dispatch is currently pending.
    pub(crate) fn is_dispatch_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Spawn the sampler for one connection session.
///
/// Consumes the notification stream until it ends or the session is torn
/// down. When the stream ends on its own (peripheral-initiated link loss),
/// the session epoch is reported on `closed_tx` so the connection manager
/// can reap the session.
pub(crate) fn spawn_sampler(
    mut notifications: NotificationStream,
    dispatcher: Arc<dyn BatchDispatcher>,
    store: Arc<SoilDataStore>,
    closed_tx: mpsc::UnboundedSender<u64>,
    epoch: u64,
) -> SamplerHandle {
    let active = Arc::new(AtomicBool::new(true));
    let in_flight = Arc::new(AtomicBool::new(false));

    let task_active = active.clone();
    let task_in_flight = in_flight.clone();

    let task = tokio::spawn(async move {
        let mut accumulator = SampleAccumulator::with_flag(task_in_flight);
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

        debug!("Sampler started for session {}", epoch);

        loop {
            tokio::select! {
                payload = notifications.next() => {
                    match payload {
                        Some(data) => {
                            let Some(value) = decode_sample(&data) else {
                                debug!("Dropping undecodable notification payload");
                                continue;
                            };

                            if let Some(batch) = accumulator.push(value) {
                                dispatch_batch(
                                    batch,
                                    &dispatcher,
                                    &store,
                                    &task_active,
                                    &done_tx,
                                    epoch,
                                );
                            }
                        }
                        None => {
                            debug!("Notification stream ended for session {}", epoch);
                            task_active.store(false, Ordering::SeqCst);
                            let _ = closed_tx.send(epoch);
                            break;
                        }
                    }
                }
                Some(()) = done_rx.recv() => {
                    if let Some(batch) = accumulator.complete_dispatch() {
                        dispatch_batch(
                            batch,
                            &dispatcher,
                            &store,
                            &task_active,
                            &done_tx,
                            epoch,
                        );
                    }
                }
            }
        }

        debug!("Sampler stopped for session {}", epoch);
    });

    SamplerHandle {
        task,
        active,
        in_flight,
    }
}

/// Hand one batch to the backend without blocking the notification loop.
///
/// The publish step runs only if the originating session is still active; a
/// superseded session's late result is discarded. The completion signal is
/// sent regardless of outcome so the accumulator can clear its flag.
fn dispatch_batch(
    batch: SampleBatch,
    dispatcher: &Arc<dyn BatchDispatcher>,
    store: &Arc<SoilDataStore>,
    active: &Arc<AtomicBool>,
    done_tx: &mpsc::Sender<()>,
    epoch: u64,
) {
    let dispatcher = dispatcher.clone();
    let store = store.clone();
    let active = active.clone();
    let done_tx = done_tx.clone();

    tokio::spawn(async move {
        match dispatcher.dispatch(&batch).await {
            Ok(records) => {
                if active.load(Ordering::SeqCst) {
                    store.replace(records);
                } else {
                    debug!("Discarding prediction result for superseded session {}", epoch);
                }
            }
            Err(e) => {
                warn!("Batch dispatch failed for session {}: {}", epoch, e);
            }
        }

        let _ = done_tx.send(()).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_sample_accepts_ascii_floats() {
        assert_eq!(decode_sample(&encode_sample(3.5)), Some(3.5));
        assert_eq!(decode_sample(BASE64.encode("  42.0 \n").as_bytes()), Some(42.0));
        assert_eq!(decode_sample(BASE64.encode("-0.25").as_bytes()), Some(-0.25));
    }

    #[test]
    fn test_decode_sample_rejects_garbage() {
        assert_eq!(decode_sample(b"not base64!!"), None);
        assert_eq!(decode_sample(BASE64.encode("ERR").as_bytes()), None);
        assert_eq!(decode_sample(BASE64.encode("").as_bytes()), None);
        assert_eq!(decode_sample(BASE64.encode("NaN").as_bytes()), None);
        assert_eq!(decode_sample(BASE64.encode([0xFFu8, 0xFE]).as_bytes()), None);
    }

    #[test]
    fn test_batch_emitted_at_capacity() {
        let mut accumulator = SampleAccumulator::new();

        for i in 1..SAMPLE_BATCH_SIZE {
            assert!(accumulator.push(i as f64).is_none());
        }
        assert_eq!(accumulator.len(), SAMPLE_BATCH_SIZE - 1);

        let batch = accumulator.push(SAMPLE_BATCH_SIZE as f64).unwrap();
        let expected: Vec<f64> = (1..=SAMPLE_BATCH_SIZE).map(|i| i as f64).collect();
        assert_eq!(batch.samples(), expected.as_slice());

        // Buffer resets immediately; the dispatch flag is up.
        assert!(accumulator.is_empty());
        assert!(accumulator.is_dispatch_in_flight());
    }

    #[test]
    fn test_single_flight_holds_second_batch() {
        let mut accumulator = SampleAccumulator::new();

        for i in 0..SAMPLE_BATCH_SIZE {
            let _ = accumulator.push(i as f64);
        }
        assert!(accumulator.is_dispatch_in_flight());

        // A second full round arrives while the dispatch is pending.
        for i in 0..SAMPLE_BATCH_SIZE {
            assert!(accumulator.push(100.0 + i as f64).is_none());
        }
        assert_eq!(accumulator.len(), SAMPLE_BATCH_SIZE);

        // Overflow beyond the held batch is dropped, not queued.
        assert!(accumulator.push(999.0).is_none());
        assert_eq!(accumulator.len(), SAMPLE_BATCH_SIZE);

        // Completion releases the held batch and re-arms the flag.
        let batch = accumulator.complete_dispatch().unwrap();
        assert_eq!(batch.samples()[0], 100.0);
        assert!(accumulator.is_dispatch_in_flight());
        assert!(accumulator.is_empty());
    }

    #[test]
    fn test_complete_dispatch_with_partial_buffer() {
        let mut accumulator = SampleAccumulator::new();

        for i in 0..SAMPLE_BATCH_SIZE {
            let _ = accumulator.push(i as f64);
        }
        accumulator.push(1.0);

        assert!(accumulator.complete_dispatch().is_none());
        assert!(!accumulator.is_dispatch_in_flight());
        // The partial second buffer keeps accumulating where it left off.
        assert_eq!(accumulator.len(), 1);
    }

    proptest! {
        /// Batches always hold exactly SAMPLE_BATCH_SIZE values in arrival
        /// order, no matter how pushes and completions interleave.
        #[test]
        fn prop_batches_are_full_and_ordered(
            ops in proptest::collection::vec(
                prop_oneof![
                    (0.0f64..1000.0).prop_map(Some),
                    Just(None),
                ],
                0..200,
            )
        ) {
            let mut accumulator = SampleAccumulator::new();
            let mut pushed = Vec::new();
            let mut batched = Vec::new();

            for op in ops {
                let emitted = match op {
                    Some(value) => {
                        let before = accumulator.len();
                        let emitted = accumulator.push(value);
                        if before < SAMPLE_BATCH_SIZE {
                            pushed.push(value);
                        }
                        emitted
                    }
                    None => accumulator.complete_dispatch(),
                };

                if let Some(batch) = emitted {
                    prop_assert_eq!(batch.len(), SAMPLE_BATCH_SIZE);
                    batched.extend_from_slice(batch.samples());
                }
            }

            // Everything batched so far is a prefix of what was accepted,
            // in order.
            prop_assert!(batched.len() <= pushed.len());
            prop_assert_eq!(&pushed[..batched.len()], batched.as_slice());
        }
    }
}

//! Shared byte accounting for transfer streams
//!
//! A `RateCounter` is created per load generation window, shared by every
//! concurrent stream of that window, and discarded once the final rate has
//! been read. All mutation (the running byte total and the cyclic upload
//! cursor) goes through a single mutex; rate computation works on a
//! consistent snapshot taken under the same lock.

use std::sync::Mutex;
use std::time::Instant;

use bytes::Bytes;
use rand::RngCore;

/// Mutable counter state, kept behind one lock so concurrent streams cannot
/// interleave a total update with a cursor update.
#[derive(Debug, Default)]
struct CounterState {
    started_at: Option<Instant>,
    total: u64,
    position: usize,
    payload: Vec<u8>,
}

/// Thread-safe byte accumulator with time-windowed average-rate computation
///
/// For upload windows the counter additionally owns the pre-allocated payload
/// buffer and a cyclic read cursor over it: `next_chunk` hands out successive
/// slices and wraps the cursor back to zero exactly when it reaches the
/// payload size, so the same buffer is replayed indefinitely without
/// reallocation and without ever terminating the request body on its own.
#[derive(Debug, Default)]
pub struct RateCounter {
    state: Mutex<CounterState>,
}

impl RateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the measurement epoch. Must be called once per window before
    /// any rate accessor; the rate accessors return 0.0 until then.
    pub fn start(&self) {
        let mut state = self.state.lock().expect("counter lock poisoned");
        state.started_at = Some(Instant::now());
    }

    /// Adds `n` transferred bytes to the shared total
    pub fn record(&self, n: usize) {
        let mut state = self.state.lock().expect("counter lock poisoned");
        state.total += n as u64;
    }

    /// Cumulative bytes recorded in this window
    pub fn total(&self) -> u64 {
        self.state.lock().expect("counter lock poisoned").total
    }

    /// Wall-clock seconds since `start()`, 0.0 if the window was never opened
    pub fn elapsed_seconds(&self) -> f64 {
        let state = self.state.lock().expect("counter lock poisoned");
        state
            .started_at
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Average bytes per second over the open window
    pub fn avg_bytes(&self) -> f64 {
        let (total, elapsed) = self.snapshot();
        if elapsed <= 0.0 {
            return 0.0;
        }
        total as f64 / elapsed
    }

    /// Average bits per second over the open window
    pub fn avg_bits(&self) -> f64 {
        self.avg_bytes() * 8.0
    }

    /// Average megabits (decimal) per second over the open window
    pub fn avg_mbps(&self) -> f64 {
        self.avg_bits() / 1_000_000.0
    }

    /// Generates the pre-allocated upload payload: `size_kib` KiB of
    /// pseudo-random data, and rewinds the cursor to the start
    pub fn generate_payload(&self, size_kib: usize) {
        let mut payload = vec![0u8; size_kib * 1024];
        rand::thread_rng().fill_bytes(&mut payload);

        let mut state = self.state.lock().expect("counter lock poisoned");
        state.payload = payload;
        state.position = 0;
    }

    /// Hands out the next slice of the cyclic upload payload, at most
    /// `max_len` bytes, recording the bytes as transferred. The cursor wraps
    /// to zero when it reaches the payload size. Returns an empty chunk when
    /// no payload was generated.
    pub fn next_chunk(&self, max_len: usize) -> Bytes {
        let mut state = self.state.lock().expect("counter lock poisoned");
        if state.payload.is_empty() || max_len == 0 {
            return Bytes::new();
        }

        let end = (state.position + max_len).min(state.payload.len());
        let chunk = Bytes::copy_from_slice(&state.payload[state.position..end]);
        state.total += chunk.len() as u64;
        state.position = end;
        if state.position == state.payload.len() {
            state.position = 0;
        }
        chunk
    }

    /// Current cursor position within the upload payload
    pub fn position(&self) -> usize {
        self.state.lock().expect("counter lock poisoned").position
    }

    /// Size of the generated upload payload in bytes
    pub fn payload_size(&self) -> usize {
        self.state.lock().expect("counter lock poisoned").payload.len()
    }

    fn snapshot(&self) -> (u64, f64) {
        let state = self.state.lock().expect("counter lock poisoned");
        let elapsed = state
            .started_at
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        (state.total, elapsed)
    }
}

#[cfg(test)]
impl RateCounter {
    /// Moves the window start into the past so rate math can be tested
    /// against an exact elapsed time.
    pub(crate) fn backdate_start(&self, by: std::time::Duration) {
        let mut state = self.state.lock().expect("counter lock poisoned");
        state.started_at = Some(Instant::now() - by);
    }
}

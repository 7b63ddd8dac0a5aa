//! Samples waiting for the next persistence flush

use crate::feed::PriceSample;
use tokio::sync::Mutex;

/// Append-only sample queue drained as a whole by the flusher
#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Mutex<Vec<PriceSample>>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append samples, returning the buffered count afterwards
    pub async fn append(&self, samples: impl IntoIterator<Item = PriceSample>) -> usize {
        let mut buffered = self.samples.lock().await;
        buffered.extend(samples);
        buffered.len()
    }

    /// Take everything buffered so far and leave the buffer empty
    pub async fn take_and_clear(&self) -> Vec<PriceSample> {
        std::mem::take(&mut *self.samples.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.samples.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.samples.lock().await.is_empty()
    }
}

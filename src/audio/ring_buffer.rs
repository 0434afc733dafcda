//! Lock-free SPSC ring buffer for int16 audio samples.
//!
//! Passes samples from the cpal callback thread to whichever component is
//! currently consuming the microphone (recorder, barge listener, hotword
//! watcher) without locks.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ~10 seconds of 16 kHz mono audio.
const DEFAULT_CAPACITY: usize = 160_000;

/// Producer half — lives in the cpal audio callback.
pub struct SampleProducer {
    inner: ringbuf::HeapProd<i16>,
}

/// Consumer half — lives on the processing thread.
pub struct SampleConsumer {
    inner: ringbuf::HeapCons<i16>,
}

/// Create a matched producer/consumer pair.
pub fn sample_ring_buffer(capacity: Option<usize>) -> (SampleProducer, SampleConsumer) {
    let cap = capacity.unwrap_or(DEFAULT_CAPACITY);
    let rb = HeapRb::<i16>::new(cap);
    let (prod, cons) = rb.split();
    (SampleProducer { inner: prod }, SampleConsumer { inner: cons })
}

impl SampleProducer {
    /// Push a slice of samples. Returns how many were written; samples
    /// beyond a full buffer are dropped and the consumer catches up.
    pub fn push_slice(&mut self, samples: &[i16]) -> usize {
        self.inner.push_slice(samples)
    }
}

// Safety: the ringbuf producer is designed for single-threaded use and
// cpal callbacks run on one dedicated audio thread.
unsafe impl Send for SampleProducer {}

impl SampleConsumer {
    /// Pop up to `buf.len()` samples into `buf`, returning the count read.
    pub fn pop_slice(&mut self, buf: &mut [i16]) -> usize {
        self.inner.pop_slice(buf)
    }

    /// Samples currently available.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Drain everything that is buffered.
    pub fn drain_all(&mut self) -> Vec<i16> {
        let n = self.available();
        if n == 0 {
            return Vec::new();
        }
        let mut buf = vec![0i16; n];
        let read = self.pop_slice(&mut buf);
        buf.truncate(read);
        buf
    }
}

unsafe impl Send for SampleConsumer {}

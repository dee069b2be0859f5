use crate::error::TResult;
use crate::types::SampleBatch;

/// Destination for full batches. Implementations must not block the caller.
pub trait BatchSink {
    fn submit(&self, batch: SampleBatch) -> TResult<()>;
}

/// Fixed-capacity buffer for one sample stream.
///
/// Reaching capacity hands the whole buffer to the sink as one batch.
pub struct SampleBatcher<T> {
    buffer: Vec<T>,
    capacity: usize,
    flushed_batches: u64,
}

impl<T> SampleBatcher<T>
where
    Vec<T>: Into<SampleBatch>,
{
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            flushed_batches: 0,
        }
    }

    pub fn add<K: BatchSink + ?Sized>(&mut self, sample: T, sink: &K) -> TResult<()> {
        self.buffer.push(sample);
        if self.buffer.len() >= self.capacity {
            self.flush(sink)?;
        }
        Ok(())
    }

    pub fn flush<K: BatchSink + ?Sized>(&mut self, sink: &K) -> TResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        sink.submit(batch.into())?;
        self.flushed_batches += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn flushed_batches(&self) -> u64 {
        self.flushed_batches
    }
}

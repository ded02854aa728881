//! Streams derived rows from a producer task into chunked writes.
//!
//! Used when the rows to write are a cross product too large to build as
//! one in-memory list. The producer runs as a spawned task writing into a
//! bounded `tokio::sync::mpsc` channel; the caller's task drains it,
//! flushing every `chunk_size` rows in its own read-write transaction. The
//! channel capacity is the only flow control: a slow writer blocks the
//! producer's `send`.
//!
//! Rows carry no ordering guarantee, so the destination key must identify
//! each row independently of arrival order.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::Client;
use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::mutation::Mutation;

/// Aborts the producer if the consumer returns early or is dropped.
struct ProducerTask(Option<JoinHandle<Result<(), StorageError>>>);

impl ProducerTask {
    async fn join(mut self) -> Result<(), StorageError> {
        match self.0.take() {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(err) => Err(StorageError::TaskFailure(format!("batch producer: {err}"))),
            },
            None => Ok(()),
        }
    }
}

impl Drop for ProducerTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchWriter {
    chunk_size: usize,
    channel_capacity: usize,
}

impl BatchWriter {
    pub fn new(chunk_size: usize, channel_capacity: usize) -> Self {
        BatchWriter {
            chunk_size: chunk_size.max(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.batch_chunk_size, config.batch_channel_capacity)
    }

    /// Runs `producer` and writes every row it sends.
    ///
    /// Returns the number of rows written once the producer has finished and
    /// the last partial chunk is committed. The first failed write aborts
    /// the producer and is returned; chunks already committed stay. If the
    /// producer fails, its error is returned and its final partial chunk is
    /// not written.
    pub async fn run<T, P, Fut, F>(
        &self,
        client: &Client,
        producer: P,
        to_mutation: F,
    ) -> Result<usize, StorageError>
    where
        T: Send + 'static,
        P: FnOnce(mpsc::Sender<T>) -> Fut,
        Fut: Future<Output = Result<(), StorageError>> + Send + 'static,
        F: Fn(&T) -> Mutation,
    {
        let (tx, mut rx) = mpsc::channel(self.channel_capacity);
        let producer = ProducerTask(Some(tokio::spawn(producer(tx))));

        let mut chunk: Vec<Mutation> = Vec::with_capacity(self.chunk_size);
        let mut written = 0usize;
        let mut flushes = 0usize;

        while let Some(row) = rx.recv().await {
            chunk.push(to_mutation(&row));
            if chunk.len() >= self.chunk_size {
                written += flush(client, &mut chunk).await?;
                flushes += 1;
            }
        }

        // Channel closed: every sender is gone, so the producer has returned.
        producer.join().await?;

        if !chunk.is_empty() {
            written += flush(client, &mut chunk).await?;
            flushes += 1;
        }

        tracing::info!(rows = written, chunks = flushes, "batch write complete");
        Ok(written)
    }
}

async fn flush(client: &Client, chunk: &mut Vec<Mutation>) -> Result<usize, StorageError> {
    let rows = std::mem::take(chunk);
    let count = rows.len();
    client
        .read_write(|txn| {
            txn.buffer_all(rows.iter().cloned());
            Ok(())
        })
        .await?;
    tracing::debug!(rows = count, "flushed batch chunk");
    Ok(count)
}

//! Per-session store writer.
//!
//! Every mutation a session makes goes through one `StoreWriter`: a dedicated
//! thread that owns its own connection and runs queued mutations strictly one
//! at a time through [`modify_database`]. Callers await the result without
//! blocking the async runtime.

use rusqlite::{Connection, Transaction};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::retry::{modify_database, RetryPolicy};
use crate::error::StoreError;

type Job = Box<dyn FnOnce(&mut Connection) + Send>;

/// Handle to a single-consumer mutation queue
#[derive(Clone)]
pub struct StoreWriter {
    jobs: mpsc::UnboundedSender<Job>,
    policy: RetryPolicy,
}

impl StoreWriter {
    /// Start the writer thread. It exits once every handle is dropped.
    pub fn spawn(conn: Connection, policy: RetryPolicy, name: &str) -> Result<Self, StoreError> {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        let thread_name = format!("store-writer-{}", name);

        std::thread::Builder::new().name(thread_name.clone()).spawn(move || {
            let mut conn = conn;
            while let Some(job) = queue.blocking_recv() {
                job(&mut conn);
            }
            debug!("{} stopped", thread_name);
        })?;

        Ok(Self { jobs, policy })
    }

    /// Queue a mutation and wait for it to commit.
    ///
    /// The mutation may run several times if its commit conflicts with another
    /// writer, so it must not have side effects outside the transaction.
    pub async fn modify<T, F>(&self, mutation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: Fn(&Transaction<'_>) -> Result<T, StoreError> + Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let policy = self.policy.clone();

        let job: Job = Box::new(move |conn| {
            let outcome = modify_database(conn, &policy, mutation);
            // The caller may have gone away; nothing to report to then
            let _ = reply.send(outcome);
        });

        self.jobs.send(job).map_err(|_| StoreError::WriterClosed)?;
        result.await.map_err(|_| StoreError::WriterClosed)?
    }
}

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Owns the long-lived background tasks (watchers, ingest loops, upkeep) and binds them
/// to one shutdown token.
pub struct Supervisor {
    cancel: CancellationToken,
    tasks: Vec<(String, JoinHandle<()>)>,
    grace: Duration,
}

impl Supervisor {
    pub fn new(grace: Duration) -> Self {
        Self { cancel: CancellationToken::new(), tasks: Vec::new(), grace }
    }

    /// Token cancelled on shutdown; tasks select on it.
    pub fn token(&self) -> CancellationToken { self.cancel.clone() }

    pub fn len(&self) -> usize { self.tasks.len() }
    pub fn is_empty(&self) -> bool { self.tasks.is_empty() }

    pub fn spawn<F>(&mut self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(task = %name, "spawning supervised task");
        self.tasks.push((name, tokio::spawn(fut)));
    }

    /// Take ownership of a task spawned elsewhere. It must stop on its own once the
    /// token's holders stop (e.g. an ingest loop whose senders are dropped).
    pub fn adopt(&mut self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.tasks.push((name.into(), handle));
    }

    /// Cancel the token and wait for every task, aborting whatever is still running
    /// once the grace period is over.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + self.grace;
        for (name, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!(task = %name, "task stopped"),
                Ok(Err(e)) => warn!(task = %name, error = %e, "task ended abnormally"),
                Err(_) => {
                    warn!(task = %name, "task did not stop within grace period; aborting");
                    handle.abort();
                }
            }
        }
    }
}

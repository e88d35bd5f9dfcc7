use std::future::Future;

use tokio::task::JoinSet;

/// Owns every long-running task so shutdown can stop them together.
#[derive(Default)]
pub struct Lifecycle {
    tasks: JoinSet<()>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        tracing::debug!("Starting task {}", name);

        self.tasks.spawn(async move {
            task.await;
            tracing::info!("Task {} finished", name);
        });
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Resolves once all tasks have ended.
    pub async fn wait(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::error!("Task panicked: {:?}", e);
                }
            }
        }
    }

    pub async fn shutdown(&mut self) {
        tracing::info!("Stopping {} tasks", self.tasks.len());
        self.tasks.shutdown().await;
    }
}

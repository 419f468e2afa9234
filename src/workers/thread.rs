use std::sync::Arc;
use std::thread;

use tokio_util::sync::CancellationToken;

use super::{Worker, WorkerFactory, WorkerFn};
use crate::error::WorkerError;

/// Default [`WorkerFactory`] backed by named OS threads.
///
/// Thread names are `"{prefix}-{name}"` when a prefix is set, `name` otherwise.
#[derive(Debug, Clone, Default)]
pub struct ThreadWorkerFactory {
    prefix: Option<Arc<str>>,
    stack_size: Option<usize>,
}

impl ThreadWorkerFactory {
    /// Factory with no prefix and the platform default stack size.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends `prefix-` to every thread name.
    pub fn with_prefix(mut self, prefix: impl Into<Arc<str>>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sets the stack size of spawned threads, in bytes.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    fn thread_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{p}-{name}"),
            None => name.to_string(),
        }
    }
}

impl WorkerFactory for ThreadWorkerFactory {
    fn new_worker(&self, name: &str, run: WorkerFn) -> Result<Worker, WorkerError> {
        let full = self.thread_name(name);
        let token = CancellationToken::new();
        let ctx = token.clone();

        let mut builder = thread::Builder::new().name(full.clone());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }

        let join = builder
            .spawn(move || run(ctx))
            .map_err(|e| WorkerError::Spawn {
                name: full.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(worker = %full, "worker spawned");
        Ok(Worker::from_parts(full, token, join))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_thread_is_named() {
        let (tx, rx) = mpsc::channel();
        let factory = ThreadWorkerFactory::new().with_prefix("svc");
        let w = factory
            .new_worker(
                "loop",
                Box::new(move |_ctx| {
                    let _ = tx.send(thread::current().name().map(str::to_string));
                }),
            )
            .unwrap();
        w.join().unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("svc-loop"));
    }

    #[test]
    fn test_stop_cancels_and_joins() {
        let factory = ThreadWorkerFactory::new();
        let w = factory
            .new_worker(
                "spin",
                Box::new(|ctx: CancellationToken| {
                    while !ctx.is_cancelled() {
                        thread::yield_now();
                    }
                }),
            )
            .unwrap();
        assert!(!w.token().is_cancelled());
        w.stop().unwrap();
    }

    #[test]
    fn test_panic_surfaces_on_join() {
        let factory = ThreadWorkerFactory::new();
        let w = factory
            .new_worker("boom", Box::new(|_ctx| panic!("kaboom")))
            .unwrap();
        match w.join() {
            Err(WorkerError::Panicked { name, message }) => {
                assert_eq!(name, "boom");
                assert_eq!(message, "kaboom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_factory_is_reusable_concurrently() {
        let factory = Arc::new(ThreadWorkerFactory::new().with_stack_size(256 * 1024));
        let spawners: Vec<_> = (0..8)
            .map(|i| {
                let f = Arc::clone(&factory);
                thread::spawn(move || {
                    f.new_worker(&format!("w{i}"), Box::new(|_ctx| {}))
                        .unwrap()
                        .join()
                        .unwrap();
                })
            })
            .collect();
        for s in spawners {
            s.join().unwrap();
        }
    }
}

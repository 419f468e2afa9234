//! # Example: Application Lifecycle
//!
//! Three application instances share one pool, run a heartbeat worker each,
//! submit some work, and are deleted one by one. A fourth instance runs on a
//! tokio runtime handed out by a custom provider.
//!
//! ```text
//! RUST_LOG=info cargo run --example app_lifecycle --features logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use poolvisor::{
    AppInstance, Bus, Config, Event, EventKind, ExecutionProvider, ExecutorRef, InstanceId,
    LifecycleManager, LogWriter, ProviderError, RuntimeExecutor, SharedPoolProvider, Subscribe,
    TaskError,
};
use tracing_subscriber::EnvFilter;

/// Counts pool starts and shutdowns.
#[derive(Default)]
struct PoolCounter {
    started: AtomicUsize,
    stopped: AtomicUsize,
}

impl Subscribe for PoolCounter {
    fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::PoolStarted => {
                self.started.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::PoolShutdown => {
                self.stopped.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "pool-counter"
    }
}

/// Gives every instance its own tokio runtime.
struct RuntimeProvider {
    cfg: Config,
}

impl ExecutionProvider for RuntimeProvider {
    fn executor(&self, instance: InstanceId) -> Result<ExecutorRef, ProviderError> {
        let name = self.cfg.thread_name(&format!("rt-{}", instance.as_u64()));
        Ok(Arc::new(RuntimeExecutor::with_config(name, &self.cfg)?))
    }

    fn release_executor(
        &self,
        _instance: InstanceId,
        executor: ExecutorRef,
    ) -> Result<(), ProviderError> {
        executor.shutdown();
        executor.await_termination(self.cfg.grace);
        Ok(())
    }
}

fn heartbeat(app: &AppInstance) -> anyhow::Result<()> {
    let name = app.name().to_string();
    app.spawn_worker("heartbeat", move |ctx| {
        while !ctx.is_cancelled() {
            tracing::debug!(app = %name, "tick");
            thread::sleep(Duration::from_millis(50));
        }
    })?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = Config {
        pool_size: 4,
        grace: Duration::from_secs(2),
        ..Config::default()
    };
    let bus = Bus::new(cfg.bus_capacity_clamped());
    let counter = Arc::new(PoolCounter::default());

    let subs: Vec<Arc<dyn Subscribe>> = vec![counter.clone(), Arc::new(LogWriter::new())];

    let provider = Arc::new(SharedPoolProvider::new(cfg.clone()).with_bus(bus.clone()));
    let manager = LifecycleManager::builder(provider)
        .with_config(cfg.clone())
        .with_bus(bus)
        .with_subscribers(subs)
        .build()?;

    let apps = ["billing", "search", "reports"]
        .into_iter()
        .map(|name| AppInstance::new(name, &manager))
        .collect::<Result<Vec<_>, _>>()?;

    for app in &apps {
        heartbeat(app)?;
        let label = app.name().to_string();
        let fut = app.executor().submit(move || {
            thread::sleep(Duration::from_millis(20));
            if label == "reports" {
                Err(TaskError::fail("report template missing"))
            } else {
                Ok(label.len())
            }
        })?;
        let name = app.name().to_string();
        fut.on_success(move |n| tracing::info!(app = %name, bytes = n, "work done"));
        let name = app.name().to_string();
        fut.on_failure(move |e| tracing::warn!(app = %name, error = %e, "work failed"));
    }

    thread::sleep(Duration::from_millis(200));
    for app in &apps {
        app.delete()?;
    }
    // dropping the last manager reference drains the subscribers
    drop(apps);
    drop(manager);

    let rt_manager = LifecycleManager::builder(Arc::new(RuntimeProvider { cfg: cfg.clone() }))
        .with_config(cfg)
        .build()?;
    let tokio_app = AppInstance::new("tokio-backed", &rt_manager)?;
    let answer = tokio_app.executor().submit(|| Ok(6 * 7))?.wait()?;
    tracing::info!(answer, "runtime executor answered");
    tokio_app.delete()?;

    println!(
        "pools started={} stopped={}",
        counter.started.load(Ordering::Relaxed),
        counter.stopped.load(Ordering::Relaxed)
    );
    Ok(())
}

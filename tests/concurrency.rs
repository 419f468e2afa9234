use std::collections::HashMap;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use poolvisor::{
    AppInstance, Config, DedicatedPoolProvider, ExecutionProvider, ExecutorRef, InstanceId,
    LifecycleManager, ProviderError, SharedPoolProvider, ThreadPool, ThreadWorkerFactory,
};

const INSTANCES: usize = 128;

/// Thread-safe fake counting acquisitions and releases per instance.
struct CountingProvider {
    pool: ExecutorRef,
    counts: Mutex<HashMap<InstanceId, (usize, usize)>>,
}

impl ExecutionProvider for CountingProvider {
    fn executor(&self, instance: InstanceId) -> Result<ExecutorRef, ProviderError> {
        self.counts.lock().unwrap().entry(instance).or_default().0 += 1;
        Ok(Arc::clone(&self.pool))
    }

    fn release_executor(
        &self,
        instance: InstanceId,
        _executor: ExecutorRef,
    ) -> Result<(), ProviderError> {
        self.counts.lock().unwrap().entry(instance).or_default().1 += 1;
        Ok(())
    }
}

#[test]
fn concurrent_pairs_release_exactly_once() {
    let pool = ThreadPool::new("count", 2, None, &ThreadWorkerFactory::new()).unwrap();
    let provider = Arc::new(CountingProvider {
        pool: Arc::new(pool),
        counts: Mutex::new(HashMap::new()),
    });
    let mgr = LifecycleManager::builder(provider.clone()).build().unwrap();
    let start = Arc::new(Barrier::new(INSTANCES));

    let threads: Vec<_> = (0..INSTANCES)
        .map(|_| {
            let mgr = Arc::clone(&mgr);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let id = InstanceId::new();
                start.wait();
                let handle = mgr.acquire_handle(id).unwrap();
                mgr.release_handle(id, handle).unwrap();
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let counts = provider.counts.lock().unwrap();
    assert_eq!(counts.len(), INSTANCES);
    assert!(counts.values().all(|&(acq, rel)| acq == 1 && rel == 1));
}

#[test]
fn shared_pool_survives_until_last_instance() {
    let cfg = Config {
        pool_size: 2,
        grace: Duration::from_secs(5),
        ..Config::default()
    };
    let provider = Arc::new(SharedPoolProvider::new(cfg.clone()));
    let mgr = LifecycleManager::builder(provider.clone())
        .with_config(cfg)
        .build()
        .unwrap();

    let apps: Vec<AppInstance> = (0..INSTANCES)
        .map(|i| AppInstance::new(format!("app-{i}"), &mgr).unwrap())
        .collect();
    assert_eq!(provider.users(), INSTANCES);

    let mut apps = apps.into_iter();
    let last = apps.next_back().unwrap();
    thread::scope(|s| {
        for app in apps {
            s.spawn(move || {
                assert_eq!(app.executor().submit(|| Ok(1)).unwrap().wait(), Ok(1));
                app.delete().unwrap();
            });
        }
    });

    assert!(provider.is_running());
    assert_eq!(last.executor().submit(|| Ok(2)).unwrap().wait(), Ok(2));
    last.delete().unwrap();
    assert!(!provider.is_running());
}

#[test]
fn dedicated_pools_are_torn_down_per_instance() {
    let cfg = Config {
        pool_size: 1,
        grace: Duration::from_secs(5),
        ..Config::default()
    };
    let provider = Arc::new(DedicatedPoolProvider::new(cfg.clone()));
    let mgr = LifecycleManager::builder(provider.clone())
        .with_config(cfg)
        .build()
        .unwrap();

    thread::scope(|s| {
        for i in 0..16 {
            let mgr = &mgr;
            s.spawn(move || {
                let app = AppInstance::new(format!("app-{i}"), mgr).unwrap();
                assert_eq!(app.executor().submit(move || Ok(i)).unwrap().wait(), Ok(i));
                app.delete().unwrap();
            });
        }
    });

    assert_eq!(provider.live(), 0);
}

//! Minimal reactive primitives: a readable/writable [`Store`], a fire-and-await
//! [`Event`], and [`Reactive`] for settings that may be either static or live.

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use parking_lot::RwLock;
use shared::Result;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// A shared, observable value. Clones point at the same value.
pub struct Store<T> {
    inner: Arc<watch::Sender<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(watch::Sender::new(value)),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.inner.borrow().clone()
    }

    pub fn set(&self, value: T) {
        self.inner.send_replace(value);
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.inner.send_modify(f);
    }

    /// Read the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.inner.subscribe()
    }
}

impl<T: Debug> Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("value", &*self.inner.borrow())
            .finish()
    }
}

type Watcher<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A named trigger. Emitting runs every watcher concurrently and waits for all of them.
pub struct Event<T> {
    name: Arc<str>,
    watchers: Arc<RwLock<Vec<Watcher<T>>>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            watchers: Arc::clone(&self.watchers),
        }
    }
}

impl<T> Event<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            watchers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn watch<F, Fut>(&self, watcher: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.watchers
            .write()
            .push(Arc::new(move |payload: T| watcher(payload).boxed()));
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    /// Every watcher runs even if another fails; the first failure is returned.
    pub async fn emit(&self, payload: T) -> Result<()> {
        // Clone watchers to release lock before awaiting
        let watchers: Vec<Watcher<T>> = self.watchers.read().clone();

        let results = join_all(watchers.iter().map(|watcher| watcher(payload.clone()))).await;
        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }
}

impl<T> Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("watchers", &self.watchers.read().len())
            .finish()
    }
}

/// A setting given either as a plain value or as a live store.
#[derive(Debug, Clone)]
pub enum Reactive<T> {
    Static(T),
    Store(Store<T>),
}

impl<T> Reactive<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn into_store(self) -> Store<T> {
        match self {
            Reactive::Static(value) => Store::new(value),
            Reactive::Store(store) => store,
        }
    }
}

impl From<bool> for Reactive<bool> {
    fn from(value: bool) -> Self {
        Reactive::Static(value)
    }
}

impl<T> From<Store<T>> for Reactive<T> {
    fn from(store: Store<T>) -> Self {
        Reactive::Store(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_store_clones_share_value() {
        let store = Store::new(1);
        let other = store.clone();

        other.set(2);
        assert_eq!(store.get(), 2);

        store.update(|v| *v += 40);
        assert_eq!(other.get(), 42);
        assert_eq!(store.with(|v| *v * 2), 84);
    }

    #[tokio::test]
    async fn test_store_subscribers_see_changes() {
        let store = Store::new("a".to_string());
        let mut rx = store.subscribe();

        store.set("b".to_string());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), "b");
    }

    #[tokio::test]
    async fn test_event_runs_all_watchers() {
        let event: Event<u32> = Event::new("tick");
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let total = Arc::clone(&total);
            event.watch(move |n| {
                let total = Arc::clone(&total);
                async move {
                    total.fetch_add(n as usize, Ordering::SeqCst);
                    Ok(())
                }
            });
        }

        assert_eq!(event.watcher_count(), 3);
        event.emit(5).await.unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 15);
    }

    #[tokio::test]
    async fn test_event_without_watchers_is_noop() {
        let event: Event<()> = Event::new("purge");
        event.emit(()).await.unwrap();
    }

    #[tokio::test]
    async fn test_event_reports_failure_after_running_everyone() {
        let event: Event<()> = Event::new("purge");
        let ran = Arc::new(AtomicUsize::new(0));

        event.watch(|_| async { Err(Error::Adapter("disk on fire".to_string())) });
        let counter = Arc::clone(&ran);
        event.watch(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let result = event.emit(()).await;
        assert!(matches!(result, Err(Error::Adapter(_))));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reactive_into_store() {
        let fixed: Reactive<bool> = false.into();
        assert!(!fixed.into_store().get());

        let live = Store::new(true);
        let reactive: Reactive<bool> = live.clone().into();
        let store = reactive.into_store();
        live.set(false);
        assert!(!store.get());
    }
}

//! In-memory collaborators for unit testing
//!
//! `MockEventSource` serves a fixed list snapshot and replays a scripted event
//! feed, recording every call so tests can assert on list/watch counts, how many
//! events were consumed, and whether the subscription was released.
//! `MockDiscovery` resolves kinds from a `DiscoverySnapshot` or fails as if the
//! discovery API were unreachable.

mod helpers;

pub use helpers::{pod, pod_with_conditions, to_dynamic};

use crate::discovery::{gvk_display, DiscoverySnapshot};
use crate::error::WaitError;
use crate::models::{ObjectSnapshot, ResourceDescriptor, Selector, WatchEvent};
use crate::source::{EventSource, EventStream, TypeDiscovery};
use futures::future;
use futures::stream::{self, BoxStream, Stream};
use futures::StreamExt;
use kube::core::{DynamicObject, GroupVersionKind};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// One scripted item of the watch feed
pub type ScriptedEvent = Result<WatchEvent<DynamicObject>, String>;

/// Parameters of a recorded list or watch call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Namespace scope passed by the caller
    pub namespace: Option<String>,
    /// Plural name of the resource addressed
    pub plural: String,
    /// Selectors passed through
    pub selector: Selector,
    /// Only set for watch calls
    pub resource_version: Option<String>,
}

/// Mock event source for testing
#[derive(Debug, Clone, Default)]
pub struct MockEventSource {
    pub(crate) objects: Arc<Mutex<Vec<DynamicObject>>>,
    pub(crate) resource_version: Arc<Mutex<String>>,
    pub(crate) script: Arc<Mutex<Vec<ScriptedEvent>>>,
    pub(crate) list_error: Arc<Mutex<Option<String>>>,
    pub(crate) hang_list: Arc<Mutex<bool>>,
    pub(crate) watch_error: Arc<Mutex<Option<String>>>,
    pub(crate) end_after_script: Arc<Mutex<bool>>,
    pub(crate) calls: Arc<Mutex<Vec<RecordedCall>>>,
    // Counters
    pub(crate) list_calls: Arc<AtomicUsize>,
    pub(crate) watch_calls: Arc<AtomicUsize>,
    pub(crate) consumed: Arc<AtomicUsize>,
    pub(crate) open_subscriptions: Arc<AtomicUsize>,
}

impl MockEventSource {
    /// Create a mock whose list returns nothing at resourceVersion "1"
    pub fn new() -> Self {
        let source = Self::default();
        *source.resource_version.lock().unwrap() = "1".to_string();
        source
    }

    /// Add an object to the list snapshot (for test setup)
    pub fn add_object(&self, object: DynamicObject) {
        self.objects.lock().unwrap().push(object);
    }

    /// Set the resourceVersion the list call reports
    pub fn set_resource_version(&self, version: impl Into<String>) {
        *self.resource_version.lock().unwrap() = version.into();
    }

    /// Append an event to the watch script
    pub fn push_event(&self, event: WatchEvent<DynamicObject>) {
        self.script.lock().unwrap().push(Ok(event));
    }

    /// Append a transport failure to the watch script
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script.lock().unwrap().push(Err(message.into()));
    }

    /// Make the list call fail
    pub fn fail_list(&self, message: impl Into<String>) {
        *self.list_error.lock().unwrap() = Some(message.into());
    }

    /// Make the list call hang until the caller gives up
    pub fn hang_list(&self) {
        *self.hang_list.lock().unwrap() = true;
    }

    /// Make opening the watch fail
    pub fn fail_watch(&self, message: impl Into<String>) {
        *self.watch_error.lock().unwrap() = Some(message.into());
    }

    /// Close the feed once the script is exhausted instead of idling forever
    pub fn end_after_script(&self) {
        *self.end_after_script.lock().unwrap() = true;
    }

    /// Number of list calls made
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of watch subscriptions opened
    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Number of scripted events pulled from the feed
    pub fn consumed_events(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }

    /// Number of subscriptions that have not been dropped yet
    pub fn open_subscriptions(&self) -> usize {
        self.open_subscriptions.load(Ordering::SeqCst)
    }

    /// Every list and watch call, in order
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(
        &self,
        namespace: Option<&str>,
        descriptor: &ResourceDescriptor,
        selector: &Selector,
        resource_version: Option<&str>,
    ) {
        self.calls.lock().unwrap().push(RecordedCall {
            namespace: namespace.map(str::to_string),
            plural: descriptor.plural.clone(),
            selector: selector.clone(),
            resource_version: resource_version.map(str::to_string),
        });
    }
}

#[async_trait::async_trait]
impl EventSource for MockEventSource {
    async fn list(
        &self,
        namespace: Option<&str>,
        descriptor: &ResourceDescriptor,
        selector: &Selector,
    ) -> Result<ObjectSnapshot, WaitError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.record(namespace, descriptor, selector, None);

        if let Some(message) = self.list_error.lock().unwrap().clone() {
            return Err(WaitError::Transport(message));
        }
        let hang = *self.hang_list.lock().unwrap();
        if hang {
            future::pending::<()>().await;
        }

        let items = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|obj| match namespace {
                Some(ns) if descriptor.namespaced => obj.metadata.namespace.as_deref() == Some(ns),
                _ => true,
            })
            .cloned()
            .collect();

        Ok(ObjectSnapshot {
            items,
            resource_version: self.resource_version.lock().unwrap().clone(),
        })
    }

    async fn watch(
        &self,
        namespace: Option<&str>,
        descriptor: &ResourceDescriptor,
        selector: &Selector,
        resource_version: &str,
    ) -> Result<EventStream, WaitError> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        self.record(namespace, descriptor, selector, Some(resource_version));

        if let Some(message) = self.watch_error.lock().unwrap().clone() {
            return Err(WaitError::Transport(message));
        }

        let consumed = Arc::clone(&self.consumed);
        let scripted = stream::iter(self.script.lock().unwrap().clone())
            .inspect(move |_| {
                consumed.fetch_add(1, Ordering::SeqCst);
            })
            .map(|item| item.map_err(WaitError::Transport));

        let inner = if *self.end_after_script.lock().unwrap() {
            scripted.boxed()
        } else {
            scripted.chain(stream::pending()).boxed()
        };

        self.open_subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(TrackedStream {
            inner,
            open: Arc::clone(&self.open_subscriptions),
        }
        .boxed())
    }
}

/// Feed wrapper that marks the subscription closed when dropped
struct TrackedStream {
    inner: BoxStream<'static, Result<WatchEvent<DynamicObject>, WaitError>>,
    open: Arc<AtomicUsize>,
}

impl Stream for TrackedStream {
    type Item = Result<WatchEvent<DynamicObject>, WaitError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock type discovery for testing
#[derive(Debug, Clone, Default)]
pub struct MockDiscovery {
    pub(crate) snapshot: Option<DiscoverySnapshot>,
    pub(crate) hang: bool,
    pub(crate) resolve_calls: Arc<AtomicUsize>,
}

impl MockDiscovery {
    /// Resolve from the given snapshot
    pub fn new(snapshot: DiscoverySnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            ..Self::default()
        }
    }

    /// Resolve from the compiled-in core types
    pub fn builtin() -> Self {
        Self::new(DiscoverySnapshot::builtin())
    }

    /// Fail every lookup as if the discovery API were unreachable
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Never answer a lookup, like a discovery API that stalls
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::builtin()
        }
    }

    /// Number of resolve calls made
    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TypeDiscovery for MockDiscovery {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceDescriptor, WaitError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            future::pending::<()>().await;
        }
        match &self.snapshot {
            Some(snapshot) => snapshot.resolve(gvk),
            None => Err(WaitError::Resolution {
                kind: gvk_display(gvk),
                reason: "discovery failed: connection refused".to_string(),
            }),
        }
    }
}

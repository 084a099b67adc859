//! Condition watcher
//!
//! Blocks until a predicate holds for the watched resources, or the deadline
//! elapses. The flow is list-then-watch:
//!
//! 1. List matching objects into an [`ObjectStore`].
//! 2. If the store is non-empty and every object satisfies the predicate,
//!    return immediately without opening a watch.
//! 3. Otherwise watch from the list's resourceVersion (no gap between snapshot
//!    and feed) and return on the first event whose object satisfies the
//!    predicate.
//!
//! Note the asymmetry: the snapshot check covers *all* objects, while each
//! later event is judged on its own object only. Both checks are kept as-is.
//!
//! A single deadline covers the list call and every read from the feed. The
//! feed is dropped, and with it the subscription, on every exit path.

use crate::error::WaitError;
use crate::models::{ResourceDescriptor, Selector, WatchEvent};
use crate::source::EventSource;
use futures::StreamExt;
use kube::core::DynamicObject;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info};

/// Upper bound on a wait's deadline, about thirty years out
const MAX_WAIT: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Deadline `timeout` from now; absurdly long timeouts are clamped to [`MAX_WAIT`]
pub fn deadline_after(timeout: Duration) -> Instant {
    Instant::now() + timeout.min(MAX_WAIT)
}

/// Identity of an object inside the store: (namespace, name)
pub type ObjectKey = (Option<String>, String);

fn object_key(object: &DynamicObject) -> ObjectKey {
    (
        object.metadata.namespace.clone(),
        object.metadata.name.clone().unwrap_or_default(),
    )
}

fn object_display(object: &DynamicObject) -> String {
    let (namespace, name) = object_key(object);
    match namespace {
        Some(ns) => format!("{ns}/{name}"),
        None => name,
    }
}

/// One-line description of an event, kept for timeout diagnostics
fn summarize(event: &WatchEvent<DynamicObject>) -> String {
    match event {
        WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
            format!("{} {}", event.type_name(), object_display(obj))
        }
        WatchEvent::Bookmark { resource_version } => format!("Bookmark at {resource_version}"),
        WatchEvent::Error(message) => format!("Error: {message}"),
    }
}

/// Map an untyped object onto the caller's static type
fn decode<K: DeserializeOwned>(object: DynamicObject) -> Result<K, WaitError> {
    let display = object_display(&object);
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|e| WaitError::Decode(format!("{display}: {e}")))
}

/// Last known state of every matching object
///
/// Seeded by the list call and kept current by each watch event.
#[derive(Debug)]
pub struct ObjectStore<K> {
    objects: HashMap<ObjectKey, K>,
}

impl<K> Default for ObjectStore<K> {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
        }
    }
}

impl<K> ObjectStore<K> {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently tracked
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if no object is tracked
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Last known state of the object with `key`
    pub fn get(&self, key: &ObjectKey) -> Option<&K> {
        self.objects.get(key)
    }

    /// Insert or replace an object
    pub fn apply(&mut self, key: ObjectKey, object: K) {
        self.objects.insert(key, object);
    }

    /// Forget a deleted object
    pub fn delete(&mut self, key: &ObjectKey) {
        self.objects.remove(key);
    }

    /// Precondition over the whole store.
    ///
    /// An empty store never satisfies it: no matching objects is not
    /// evidence that the condition holds.
    pub fn all_satisfy(&self, predicate: impl Fn(&K) -> bool) -> bool {
        !self.objects.is_empty() && self.objects.values().all(predicate)
    }
}

/// State of a single blocking wait call
///
/// Created per call, consumed by [`WaitSession::run`]; never shared.
pub struct WaitSession<'a, S: ?Sized, K, P> {
    source: &'a S,
    namespace: Option<&'a str>,
    descriptor: &'a ResourceDescriptor,
    selector: &'a Selector,
    predicate: P,
    timeout: Duration,
    deadline: Instant,
    store: ObjectStore<K>,
    last_event: Option<String>,
}

impl<S: ?Sized, K, P> fmt::Debug for WaitSession<'_, S, K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitSession")
            .field("namespace", &self.namespace)
            .field("resource", &self.descriptor.plural)
            .field("selector", &self.selector)
            .field("timeout", &self.timeout)
            .field("deadline", &self.deadline)
            .field("observed", &self.store.len())
            .field("last_event", &self.last_event)
            .finish_non_exhaustive()
    }
}

impl<'a, S, K, P> WaitSession<'a, S, K, P>
where
    S: EventSource + ?Sized,
    K: DeserializeOwned + Clone + Send,
    P: Fn(&K) -> bool,
{
    /// Start a session; the deadline is fixed here
    pub fn new(
        source: &'a S,
        namespace: Option<&'a str>,
        descriptor: &'a ResourceDescriptor,
        selector: &'a Selector,
        predicate: P,
        timeout: Duration,
    ) -> Self {
        let deadline = deadline_after(timeout);
        Self::with_deadline(source, namespace, descriptor, selector, predicate, timeout, deadline)
    }

    /// Start a session against a deadline fixed earlier by the caller
    ///
    /// `timeout` is only reported back in [`WaitError::Timeout`].
    pub fn with_deadline(
        source: &'a S,
        namespace: Option<&'a str>,
        descriptor: &'a ResourceDescriptor,
        selector: &'a Selector,
        predicate: P,
        timeout: Duration,
        deadline: Instant,
    ) -> Self {
        Self {
            source,
            namespace,
            descriptor,
            selector,
            predicate,
            timeout,
            deadline,
            store: ObjectStore::new(),
            last_event: None,
        }
    }

    /// Run the session to completion
    ///
    /// Returns `Ok(None)` when the initial snapshot already satisfied the
    /// predicate, `Ok(Some(event))` for the first satisfying event.
    pub async fn run(mut self) -> Result<Option<WatchEvent<K>>, WaitError> {
        let resource_version = self.load_snapshot().await?;

        if self.store.all_satisfy(&self.predicate) {
            info!(
                "All {} {} already satisfy the condition",
                self.store.len(),
                self.descriptor.plural
            );
            return Ok(None);
        }
        debug!(
            "Precondition not met for {} ({} objects listed), watching from {}",
            self.descriptor.plural,
            self.store.len(),
            resource_version
        );

        let mut feed = match timeout_at(
            self.deadline,
            self.source.watch(
                self.namespace,
                self.descriptor,
                self.selector,
                &resource_version,
            ),
        )
        .await
        {
            Ok(feed) => feed?,
            Err(_) => return Err(self.timed_out()),
        };

        loop {
            let next = match timeout_at(self.deadline, feed.next()).await {
                Ok(next) => next,
                Err(_) => return Err(self.timed_out()),
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(WaitError::Transport(format!(
                        "watch on {} closed before the condition was met",
                        self.descriptor.plural
                    )));
                }
            };

            if let Some(done) = self.handle_event(event)? {
                info!("Condition met for {}", self.descriptor.plural);
                return Ok(Some(done));
            }
        }
    }

    async fn load_snapshot(&mut self) -> Result<String, WaitError> {
        let snapshot = match timeout_at(
            self.deadline,
            self.source
                .list(self.namespace, self.descriptor, self.selector),
        )
        .await
        {
            Ok(snapshot) => snapshot?,
            Err(_) => return Err(self.timed_out()),
        };

        for object in snapshot.items {
            let key = object_key(&object);
            self.store.apply(key, decode(object)?);
        }
        Ok(snapshot.resource_version)
    }

    /// Fold one event into the store; `Some` if it satisfies the predicate
    fn handle_event(
        &mut self,
        event: WatchEvent<DynamicObject>,
    ) -> Result<Option<WatchEvent<K>>, WaitError> {
        let summary = summarize(&event);
        debug!("{}", summary);
        self.last_event = Some(summary);

        let key = match &event {
            WatchEvent::Error(message) => return Err(WaitError::Transport(message.clone())),
            WatchEvent::Bookmark { .. } => return Ok(None),
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
                object_key(obj)
            }
        };

        let event = event.try_map(decode::<K>)?;
        match &event {
            WatchEvent::Added(obj) | WatchEvent::Modified(obj) => {
                self.store.apply(key, obj.clone());
            }
            WatchEvent::Deleted(_) => self.store.delete(&key),
            WatchEvent::Bookmark { .. } | WatchEvent::Error(_) => {}
        }

        let satisfied = event.object().is_some_and(|obj| (self.predicate)(obj));
        Ok(satisfied.then_some(event))
    }

    fn timed_out(&self) -> WaitError {
        WaitError::Timeout {
            resource: self.descriptor.plural.clone(),
            timeout: self.timeout,
            last_event: self.last_event.clone(),
        }
    }
}

/// Wait until `predicate` holds for the objects of `descriptor`, or `timeout` elapses
pub async fn watch_until<S, K, P>(
    source: &S,
    namespace: Option<&str>,
    descriptor: &ResourceDescriptor,
    selector: &Selector,
    predicate: P,
    timeout: Duration,
) -> Result<Option<WatchEvent<K>>, WaitError>
where
    S: EventSource + ?Sized,
    K: DeserializeOwned + Clone + Send,
    P: Fn(&K) -> bool,
{
    WaitSession::new(source, namespace, descriptor, selector, predicate, timeout)
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockEventSource, pod, to_dynamic};
    use k8s_openapi::api::core::v1::Pod;

    fn pods() -> ResourceDescriptor {
        ResourceDescriptor::new("", "v1", "Pod", "pods", true)
    }

    fn phase_is(phase: &'static str) -> impl Fn(&Pod) -> bool {
        move |pod: &Pod| {
            pod.status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                == Some(phase)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_pod_becomes_running() {
        let source = MockEventSource::new();
        source.add_object(to_dynamic(&pod("ns1", "web-0", "Pending")));
        source.push_event(WatchEvent::Added(to_dynamic(&pod("ns1", "web-0", "Pending"))));
        source.push_event(WatchEvent::Modified(to_dynamic(&pod("ns1", "web-0", "Running"))));

        let result = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::from_secs(30),
        )
        .await
        .unwrap();

        match result {
            Some(WatchEvent::Modified(pod)) => {
                assert_eq!(pod.metadata.name.as_deref(), Some("web-0"));
            }
            other => panic!("expected Modified event, got {:?}", other),
        }
        assert_eq!(source.list_calls(), 1);
        assert_eq!(source.watch_calls(), 1);
        assert_eq!(source.consumed_events(), 2);
        assert_eq!(source.open_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_satisfied_snapshot_skips_watch() {
        let source = MockEventSource::new();
        source.add_object(to_dynamic(&pod("ns1", "web-0", "Running")));
        source.add_object(to_dynamic(&pod("ns1", "web-1", "Running")));

        let result = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert!(result.is_none());
        assert_eq!(source.list_calls(), 1);
        assert_eq!(source.watch_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_selection_times_out() {
        let source = MockEventSource::new();
        let start = Instant::now();

        let err = watch_until(
            &source,
            Some("ns2"),
            &pods(),
            &Selector::new().labels("app=missing"),
            |_: &Pod| true,
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();

        let elapsed = start.elapsed();
        assert!(err.is_timeout(), "expected timeout, got {err}");
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2100));
        assert_eq!(source.watch_calls(), 1);
        assert_eq!(source.consumed_events(), 0);
        assert_eq!(source.open_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_last_event() {
        let source = MockEventSource::new();
        source.add_object(to_dynamic(&pod("ns1", "web-0", "Pending")));
        source.push_event(WatchEvent::Modified(to_dynamic(&pod("ns1", "web-0", "Failed"))));

        let err = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        match err {
            WaitError::Timeout { resource, last_event, .. } => {
                assert_eq!(resource, "pods");
                assert_eq!(last_event.as_deref(), Some("Modified ns1/web-0"));
            }
            other => panic!("expected timeout, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_event_ends_wait() {
        let source = MockEventSource::new();
        source.push_event(WatchEvent::Error("too old resource version".to_string()));
        source.push_event(WatchEvent::Added(to_dynamic(&pod("ns1", "web-0", "Running"))));

        let err = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::from_secs(30),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WaitError::Transport(ref m) if m == "too old resource version"));
        assert_eq!(source.consumed_events(), 1);
        assert_eq!(source.open_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_propagated() {
        let source = MockEventSource::new();
        source.push_failure("connection reset");

        let err = watch_until(
            &source,
            None,
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::from_secs(30),
        )
        .await
        .unwrap_err();

        assert!(err.is_transport());
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_feed_is_an_error() {
        let source = MockEventSource::new();
        source.push_event(WatchEvent::Added(to_dynamic(&pod("ns1", "web-0", "Pending"))));
        source.end_after_script();

        let err = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::from_secs(30),
        )
        .await
        .unwrap_err();

        assert!(err.is_transport());
        assert_eq!(source.open_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_failure_skips_watch() {
        let source = MockEventSource::new();
        source.fail_list("forbidden");

        let err = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::from_secs(30),
        )
        .await
        .unwrap_err();

        assert!(err.is_transport());
        assert_eq!(source.watch_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_list_times_out() {
        let source = MockEventSource::new();
        source.hang_list();
        let start = Instant::now();

        let err = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();

        let elapsed = start.elapsed();
        assert!(err.is_timeout(), "expected timeout, got {err}");
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2100));
        assert_eq!(source.list_calls(), 1);
        assert_eq!(source.watch_calls(), 0);
    }

    #[test]
    fn test_huge_timeout_is_clamped() {
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline > Instant::now() + Duration::from_secs(86_400 * 365));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_still_waits() {
        let source = MockEventSource::new();
        source.add_object(to_dynamic(&pod("ns1", "web-0", "Running")));

        let outcome = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::MAX,
        )
        .await
        .unwrap();

        assert!(outcome.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_events_consumed_after_success() {
        let source = MockEventSource::new();
        source.push_event(WatchEvent::Added(to_dynamic(&pod("ns1", "web-0", "Running"))));
        source.push_event(WatchEvent::Modified(to_dynamic(&pod("ns1", "web-0", "Failed"))));
        source.push_event(WatchEvent::Deleted(to_dynamic(&pod("ns1", "web-0", "Failed"))));

        let result: Option<WatchEvent<Pod>> = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert!(matches!(result, Some(WatchEvent::Added(_))));
        assert_eq!(source.consumed_events(), 1);
        assert_eq!(source.open_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_resumes_from_list_version() {
        let source = MockEventSource::new();
        source.set_resource_version("4711");
        source.push_event(WatchEvent::Bookmark {
            resource_version: "4712".to_string(),
        });
        source.push_event(WatchEvent::Added(to_dynamic(&pod("ns1", "web-0", "Running"))));
        let selector = Selector::new().labels("app=web").fields("spec.nodeName=node-1");

        let result: Option<WatchEvent<Pod>> = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &selector,
            phase_is("Running"),
            Duration::from_secs(30),
        )
        .await
        .unwrap();
        assert!(result.is_some());

        let calls = source.recorded_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].resource_version, None);
        assert_eq!(calls[1].resource_version.as_deref(), Some("4711"));
        for call in &calls {
            assert_eq!(call.namespace.as_deref(), Some("ns1"));
            assert_eq!(call.plural, "pods");
            assert_eq!(call.selector, selector);
        }
    }

    // The snapshot is judged as a whole, later events one object at a time:
    // web-1 is still Pending when web-0's event ends the wait.
    #[tokio::test(start_paused = true)]
    async fn test_events_are_judged_individually() {
        let source = MockEventSource::new();
        source.add_object(to_dynamic(&pod("ns1", "web-0", "Pending")));
        source.add_object(to_dynamic(&pod("ns1", "web-1", "Pending")));
        source.push_event(WatchEvent::Modified(to_dynamic(&pod("ns1", "web-0", "Running"))));

        let result = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert!(matches!(result, Some(WatchEvent::Modified(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_event_is_checked_too() {
        let source = MockEventSource::new();
        source.add_object(to_dynamic(&pod("ns1", "job-0", "Running")));
        source.push_event(WatchEvent::Deleted(to_dynamic(&pod("ns1", "job-0", "Succeeded"))));

        let result = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Succeeded"),
            Duration::from_secs(30),
        )
        .await
        .unwrap();

        assert!(matches!(result, Some(WatchEvent::Deleted(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_incompatible_object_fails_to_decode() {
        let source = MockEventSource::new();
        let mut object = to_dynamic(&pod("ns1", "web-0", "Running"));
        object.data = serde_json::json!({ "status": "not-an-object" });
        source.add_object(object);

        let err = watch_until(
            &source,
            Some("ns1"),
            &pods(),
            &Selector::new(),
            phase_is("Running"),
            Duration::from_secs(30),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WaitError::Decode(ref m) if m.starts_with("ns1/web-0")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_the_call_releases_subscription() {
        let source = MockEventSource::new();

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            watch_until(
                &source,
                Some("ns1"),
                &pods(),
                &Selector::new(),
                phase_is("Running"),
                Duration::from_secs(60),
            ),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(source.watch_calls(), 1);
        assert_eq!(source.open_subscriptions(), 0);
    }

    #[test]
    fn test_empty_store_never_satisfies() {
        let store: ObjectStore<Pod> = ObjectStore::new();
        assert!(!store.all_satisfy(|_| true));
    }

    #[test]
    fn test_store_tracks_deletes() {
        let mut store = ObjectStore::new();
        let key: ObjectKey = (Some("ns1".to_string()), "web-0".to_string());
        store.apply(key.clone(), pod("ns1", "web-0", "Running"));
        assert!(store.all_satisfy(phase_is("Running")));

        store.apply(key.clone(), pod("ns1", "web-0", "Pending"));
        assert_eq!(store.len(), 1);
        assert!(!store.all_satisfy(phase_is("Running")));

        store.delete(&key);
        assert!(store.get(&key).is_none());
        assert!(store.is_empty());
    }
}

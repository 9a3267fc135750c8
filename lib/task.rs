//! Bookkeeping for in-flight requests.
//!
//! Every dispatched request is recorded as a [`Task`] under a [`TaskId`] issued by the registry.
//! Completions are correlated by id, so two concurrent requests to the same URL never collide.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use http::Method;
use parking_lot::Mutex;
use tracing::trace;
use url::Url;

use crate::error::{RequestError, RequestErrorCode};
use crate::request::WireRequest;

/// Identity of one dispatch. Unique per [`TaskRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// The raw numeric id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One in-flight request.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    method: Method,
    url: Url,
    submitted_at: Instant,
}

impl Task {
    /// Record `request` as being dispatched under `id`.
    #[must_use]
    pub fn new(id: TaskId, request: &WireRequest) -> Self {
        Self {
            id,
            method: request.method.clone(),
            url: request.url.clone(),
            submitted_at: Instant::now(),
        }
    }

    /// The task's identity.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Method of the submitted request.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL of the submitted request.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Time since the request was handed to the transport.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }
}

/// Thread-safe registry of in-flight [`Task`]s, kept in submission order.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    next_id: AtomicU64,
    tasks: Mutex<Vec<Task>>,
}

impl TaskRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh, never-before-seen id.
    pub fn issue_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register `task`. Nothing is deduplicated.
    pub fn add(&self, task: Task) {
        trace!(id = %task.id, url = %task.url, "registering task");
        self.tasks.lock().push(task);
    }

    /// The first task whose request URL is string-equal to `url`.
    #[must_use]
    pub fn find_by_response_url(&self, url: &Url) -> Option<Task> {
        self.tasks
            .lock()
            .iter()
            .find(|task| task.url.as_str() == url.as_str())
            .cloned()
    }

    /// The task registered under `id`, if it is still in flight.
    #[must_use]
    pub fn find(&self, id: TaskId) -> Option<Task> {
        self.tasks.lock().iter().find(|task| task.id == id).cloned()
    }

    /// Remove the task registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestErrorCode::NoRequestFound`] if no such task is registered.
    pub fn remove(&self, id: TaskId) -> Result<Task, RequestError> {
        let mut tasks = self.tasks.lock();
        let index = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(RequestError::Code(RequestErrorCode::NoRequestFound))?;
        let task = tasks.remove(index);
        trace!(id = %task.id, elapsed = ?task.elapsed(), "removed task");
        Ok(task)
    }

    /// Number of tasks in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::request::Request;

    fn wire(url: &str) -> WireRequest {
        Request::get(url).unwrap().to_wire()
    }

    #[test]
    fn ids_are_unique() {
        let registry = TaskRegistry::new();
        let a = registry.issue_id();
        let b = registry.issue_id();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn add_then_remove() {
        let registry = TaskRegistry::new();
        assert!(registry.is_empty());

        let id = registry.issue_id();
        registry.add(Task::new(id, &wire("http://x/a")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find(id).unwrap().url().as_str(), "http://x/a");

        let removed = registry.remove(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(registry.is_empty());
    }

    #[test]
    fn removing_twice_reports_no_request_found() {
        let registry = TaskRegistry::new();
        let id = registry.issue_id();
        registry.add(Task::new(id, &wire("http://x/a")));
        registry.remove(id).unwrap();

        let err = registry.remove(id).unwrap_err();
        assert_eq!(err.code(), Some(RequestErrorCode::NoRequestFound));
    }

    #[test]
    fn find_by_url_returns_first_match() {
        let registry = TaskRegistry::new();
        let first = registry.issue_id();
        let second = registry.issue_id();
        registry.add(Task::new(first, &wire("http://x/same")));
        registry.add(Task::new(second, &wire("http://x/same")));

        let url = Url::parse("http://x/same").unwrap();
        assert_eq!(registry.find_by_response_url(&url).unwrap().id(), first);

        let other = Url::parse("http://x/other").unwrap();
        assert!(registry.find_by_response_url(&other).is_none());
    }

    #[test]
    fn remove_is_by_identity_not_url() {
        let registry = TaskRegistry::new();
        let first = registry.issue_id();
        let second = registry.issue_id();
        registry.add(Task::new(first, &wire("http://x/same")));
        registry.add(Task::new(second, &wire("http://x/same")));

        registry.remove(second).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.find(first).is_some());
        assert!(registry.find(second).is_none());
    }
}

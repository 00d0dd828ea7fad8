// High-risk toast overlays, at most one per URL per page lifetime.

use crate::dom::{self, Document, DomPatch, ElementSpec, NodeId, SharedDocument};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const TOAST_ATTRIBUTE: &str = "data-mailshield-toast";
pub const TOAST_TEXT: &str = "🛑 VERY HIGH RISK LINK DETECTED!";

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// URLs that have already produced a toast. Grows monotonically; a fresh set stands
/// for a page reload. Clones share the same underlying set.
#[derive(Debug, Clone, Default)]
pub struct ToastedUrlSet {
    urls: Arc<Mutex<HashSet<String>>>,
}

impl ToastedUrlSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the URL was not present before.
    pub fn insert(&self, url: &str) -> bool {
        guard(&self.urls).insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        guard(&self.urls).contains(url)
    }

    pub fn len(&self) -> usize {
        guard(&self.urls).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ToastNotifier<D> {
    document: SharedDocument<D>,
    shown: ToastedUrlSet,
    duration: Duration,
    active: Arc<Mutex<HashMap<NodeId, JoinHandle<()>>>>,
}

impl<D: Document + 'static> ToastNotifier<D> {
    pub fn new(document: SharedDocument<D>, shown: ToastedUrlSet, duration: Duration) -> Self {
        Self {
            document,
            shown,
            duration,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn shown(&self) -> &ToastedUrlSet {
        &self.shown
    }

    /// Show a toast for `url` unless one was shown before. Must be called from within a
    /// tokio runtime, which drives the auto-dismiss timer.
    pub fn notify(&self, url: &str) -> Option<NodeId> {
        if !self.shown.insert(url) {
            debug!("Toast already shown for {}", url);
            return None;
        }

        let toast = {
            let mut document = dom::lock(&self.document);
            let body = document.body();
            match document.mutate(body, DomPatch::AppendChild(toast_element(url))) {
                Ok(Some(node)) => node,
                Ok(None) => return None,
                Err(e) => {
                    warn!("Failed to render toast for {}: {}", url, e);
                    return None;
                }
            }
        };
        info!("High-risk toast shown for {}", url);

        // The map lock is held until the handle is stored so the timer cannot finish
        // before its own entry exists.
        let mut active = guard(&self.active);
        let document = self.document.clone();
        let registry = self.active.clone();
        let duration = self.duration;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if guard(&registry).remove(&toast).is_some() {
                remove_toast(&document, toast);
                debug!("Toast {:?} expired", toast);
            }
        });
        active.insert(toast, handle);

        Some(toast)
    }

    /// Remove a toast immediately, cancelling its timer. Returns `false` if it was
    /// already gone.
    pub fn dismiss(&self, toast: NodeId) -> bool {
        let Some(handle) = guard(&self.active).remove(&toast) else {
            return false;
        };
        handle.abort();
        remove_toast(&self.document, toast);
        debug!("Toast {:?} dismissed", toast);
        true
    }

    /// Toasts currently on screen.
    pub fn active(&self) -> Vec<NodeId> {
        let mut toasts: Vec<NodeId> = guard(&self.active).keys().copied().collect();
        toasts.sort();
        toasts
    }
}

fn remove_toast<D: Document>(document: &SharedDocument<D>, toast: NodeId) {
    let mut document = dom::lock(document);
    if document.is_attached(toast)
        && let Err(e) = document.mutate(toast, DomPatch::Remove)
    {
        warn!("Failed to remove toast {:?}: {}", toast, e);
    }
}

fn toast_element(url: &str) -> ElementSpec {
    ElementSpec::new("div")
        .attr("class", "mailshield-toast")
        .attr(TOAST_ATTRIBUTE, url)
        .attr("role", "alert")
        .attr("title", "Click to dismiss")
        .style("position", "fixed")
        .style("top", "20px")
        .style("right", "20px")
        .style("background-color", "#d93025")
        .style("color", "white")
        .style("padding", "15px")
        .style("border-radius", "8px")
        .style("z-index", "10000")
        .style("box-shadow", "0 4px 6px rgba(0,0,0,0.1)")
        .style("font-weight", "bold")
        .style("cursor", "pointer")
        .text(TOAST_TEXT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toasted_set_is_shared_between_clones() {
        let set = ToastedUrlSet::new();
        let clone = set.clone();

        assert!(set.insert("https://bad.example/"));
        assert!(!clone.insert("https://bad.example/"));
        assert!(clone.contains("https://bad.example/"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_independent_sets_do_not_share() {
        let a = ToastedUrlSet::new();
        let b = ToastedUrlSet::new();
        a.insert("https://bad.example/");
        assert!(b.is_empty());
    }
}

// Document capability interface.
//
// The pipeline never owns the page. It reads and patches it through `Document`, which
// the browser glue implements for a live page and `MemoryDocument` implements for tests
// and for saved HTML.

mod memory;

pub use ego_tree::NodeId;
pub use memory::MemoryDocument;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("Unknown node: {0:?}")]
    UnknownNode(NodeId),

    #[error("Node {0:?} is not attached to the document")]
    Detached(NodeId),

    #[error("Node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

/// A compiled CSS selector list that keeps its source text, so a live-page
/// implementation can hand the same selector to the browser.
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    compiled: scraper::Selector,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, DomError> {
        let source = source.trim();
        let compiled = scraper::Selector::parse(source)
            .map_err(|e| DomError::InvalidSelector(format!("'{}': {}", source, e)))?;

        Ok(Self {
            source: source.to_string(),
            compiled,
        })
    }

    /// Combine several selector strings into one list. Each entry is checked on its
    /// own first so errors name the offending entry.
    pub fn parse_all<S: AsRef<str>>(sources: &[S]) -> Result<Option<Self>, DomError> {
        let entries: Vec<&str> = sources
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect();

        if entries.is_empty() {
            return Ok(None);
        }
        for entry in &entries {
            Self::parse(entry)?;
        }
        Self::parse(&entries.join(", ")).map(Some)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn compiled(&self) -> &scraper::Selector {
        &self.compiled
    }
}

impl FromStr for Selector {
    type Err = DomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Description of an element to create.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementSpec {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub styles: Vec<(String, String)>,
    pub text: Option<String>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }

    pub fn style(mut self, property: &str, value: impl Into<String>) -> Self {
        self.styles.push((property.to_string(), value.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// A single write against the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomPatch {
    SetAttribute { name: String, value: String },
    SetStyle { property: String, value: String },
    /// Insert a new element as the next sibling of the target.
    InsertAfter(ElementSpec),
    /// Append a new element as the last child of the target.
    AppendChild(ElementSpec),
    /// Detach the target from its parent.
    Remove,
}

impl DomPatch {
    pub fn set_attribute(name: &str, value: impl Into<String>) -> Self {
        DomPatch::SetAttribute {
            name: name.to_string(),
            value: value.into(),
        }
    }

    pub fn set_style(property: &str, value: impl Into<String>) -> Self {
        DomPatch::SetStyle {
            property: property.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
}

/// One observed change, as delivered to watchers in batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub attribute: Option<String>,
}

impl MutationRecord {
    pub fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added,
            removed,
            attribute: None,
        }
    }

    pub fn attribute(target: NodeId, name: &str) -> Self {
        Self {
            kind: MutationKind::Attributes,
            target,
            added: Vec::new(),
            removed: Vec::new(),
            attribute: Some(name.to_string()),
        }
    }

    pub fn is_structural(&self) -> bool {
        self.kind == MutationKind::ChildList
    }
}

/// Read/patch access to an externally owned page.
pub trait Document: Send {
    /// URL of the page, used to resolve relative links and to recognise its own host.
    fn location(&self) -> Option<&Url>;

    fn body(&self) -> NodeId;

    /// Descendants of `root` matching `selector`, in document order.
    fn query(&self, root: NodeId, selector: &Selector) -> Vec<NodeId>;

    /// The node itself or its nearest ancestor matching `selector`.
    fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId>;

    fn tag_name(&self, node: NodeId) -> Option<&str>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str>;

    fn is_attached(&self, node: NodeId) -> bool;

    /// Apply one patch. Insertions return the id of the created element.
    fn mutate(&mut self, node: NodeId, patch: DomPatch) -> Result<Option<NodeId>, DomError>;
}

/// A document shared between the scan pipeline and its timers.
///
/// The lock is only ever taken for synchronous sections and never held across an
/// await point.
pub type SharedDocument<D> = Arc<Mutex<D>>;

pub fn share<D: Document>(document: D) -> SharedDocument<D> {
    Arc::new(Mutex::new(document))
}

/// Lock a shared document, recovering the guard if a previous holder panicked.
pub fn lock<D>(document: &SharedDocument<D>) -> MutexGuard<'_, D> {
    document.lock().unwrap_or_else(PoisonError::into_inner)
}

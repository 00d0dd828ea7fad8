use super::{Document, DomError, DomPatch, ElementSpec, MutationRecord, NodeId, Selector};
use ego_tree::NodeRef;
use html5ever::{Attribute, LocalName, QualName, ns};
use scraper::node::{Element, Text};
use scraper::{ElementRef, Html, Node};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

/// In-memory document backed by a parsed `scraper` tree.
///
/// Removed nodes stay in the tree's arena, so a late result can still ask about its
/// link while `is_attached()` reports `false`. Mutations are queued and handed to
/// observers in one batch per [`MemoryDocument::flush_mutations`] call, the way a
/// browser delivers mutation records once per task.
#[derive(Debug)]
pub struct MemoryDocument {
    html: Html,
    body: NodeId,
    location: Option<Url>,
    pending: Vec<MutationRecord>,
    observers: Vec<mpsc::UnboundedSender<Vec<MutationRecord>>>,
}

impl MemoryDocument {
    /// An empty `<html><head></head><body></body></html>` page.
    pub fn new(location: Option<Url>) -> Self {
        Self::parse("", location)
    }

    /// Build a document from HTML source.
    pub fn parse(source: &str, location: Option<Url>) -> Self {
        let mut html = Html::parse_document(source);

        let body = html
            .tree
            .root()
            .descendants()
            .find(|node| {
                node.value()
                    .as_element()
                    .is_some_and(|element| element.name() == "body")
            })
            .map(|node| node.id());

        // Frameset documents have no body; give the pipeline one to work in.
        let body = match body {
            Some(body) => body,
            None => html
                .tree
                .root_mut()
                .append(element_node("body", Vec::new()))
                .id(),
        };

        debug!("Parsed document with {} nodes", html.tree.nodes().count());
        Self {
            html,
            body,
            location,
            pending: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Subscribe to mutation batches.
    pub fn observe(&mut self) -> mpsc::UnboundedReceiver<Vec<MutationRecord>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    /// Deliver all queued records as one batch. Returns the number of records sent.
    pub fn flush_mutations(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        self.observers.retain(|tx| tx.send(batch.clone()).is_ok());
        count
    }

    pub fn pending_mutations(&self) -> &[MutationRecord] {
        &self.pending
    }

    /// Parse `source` as a fragment and append its nodes under `parent`, as a page
    /// script would when a new message is rendered.
    pub fn append_html(&mut self, parent: NodeId, source: &str) -> Result<Vec<NodeId>, DomError> {
        self.element(parent)?;
        let fragment = Html::parse_fragment(source);

        // Fragment content is parsed into a synthetic <html> wrapper.
        let Some(wrapper) = fragment
            .tree
            .root()
            .children()
            .find(|node| node.value().is_element())
        else {
            return Ok(Vec::new());
        };

        let mut added = Vec::new();
        for child in wrapper.children() {
            added.push(self.copy_subtree(child, parent)?);
        }

        if !added.is_empty() {
            self.pending
                .push(MutationRecord::child_list(parent, added.clone(), Vec::new()));
        }
        Ok(added)
    }

    /// Remove a node the way the host page would (e.g. a message pane closing).
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), DomError> {
        self.mutate(node, DomPatch::Remove).map(|_| ())
    }

    /// Run a selector against the attached document.
    pub fn select(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let selector = Selector::parse(selector)?;
        Ok(self.query(self.html.tree.root().id(), &selector))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.html.tree.get(node)?.parent().map(|p| p.id())
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.html
            .tree
            .get(node)
            .map(|n| n.children().map(|c| c.id()).collect())
            .unwrap_or_default()
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.html.tree.get(node)?.next_sibling().map(|s| s.id())
    }

    /// Value of one inline style property.
    pub fn style(&self, node: NodeId, property: &str) -> Option<String> {
        let style = self.attribute(node, "style")?;
        parse_style(style)
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(property))
            .map(|(_, value)| value)
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let Some(node) = self.html.tree.get(node) else {
            return String::new();
        };
        node.descendants()
            .filter_map(|n| n.value().as_text())
            .map(|text| &**text)
            .collect()
    }

    /// Serialize the attached tree back to HTML.
    pub fn to_html(&self) -> String {
        self.html.html()
    }

    fn copy_subtree(&mut self, source: NodeRef<'_, Node>, parent: NodeId) -> Result<NodeId, DomError> {
        let mut target = self
            .html
            .tree
            .get_mut(parent)
            .ok_or(DomError::UnknownNode(parent))?;
        let copied = target.append(source.value().clone()).id();

        for child in source.children() {
            self.copy_subtree(child, copied)?;
        }
        Ok(copied)
    }

    fn create_detached(&mut self, spec: ElementSpec) -> NodeId {
        let ElementSpec {
            tag,
            mut attributes,
            styles,
            text,
        } = spec;

        if !styles.is_empty() {
            attributes.retain(|(name, _)| name != "style");
            attributes.push(("style".to_string(), format_style(&styles)));
        }

        let mut element = self.html.tree.orphan(element_node(&tag, attributes));
        if let Some(text) = text {
            element.append(Node::Text(Text { text: text.into() }));
        }
        element.id()
    }

    fn element(&self, node: NodeId) -> Result<&Element, DomError> {
        self.html
            .tree
            .get(node)
            .ok_or(DomError::UnknownNode(node))?
            .value()
            .as_element()
            .ok_or(DomError::NotAnElement(node))
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let mut target = self
            .html
            .tree
            .get_mut(node)
            .ok_or(DomError::UnknownNode(node))?;
        let Node::Element(element) = target.value() else {
            return Err(DomError::NotAnElement(node));
        };

        let mut replaced = false;
        let mut attributes: Vec<Attribute> = element
            .attrs
            .iter()
            .map(|(qualified, current)| {
                if &*qualified.local == name {
                    replaced = true;
                    attribute(qualified.clone(), value)
                } else {
                    attribute(qualified.clone(), current)
                }
            })
            .collect();
        if !replaced {
            attributes.push(attribute(attribute_name(name), value));
        }

        // Rebuilt rather than patched so the cached id and class lists stay in sync.
        let rebuilt = Element::new(element.name.clone(), attributes);
        *element = rebuilt;

        self.pending.push(MutationRecord::attribute(node, name));
        Ok(())
    }
}

impl Document for MemoryDocument {
    fn location(&self) -> Option<&Url> {
        self.location.as_ref()
    }

    fn body(&self) -> NodeId {
        self.body
    }

    fn query(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        let Some(root) = self.html.tree.get(root) else {
            return Vec::new();
        };
        root.descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .filter(|element| selector.compiled().matches(element))
            .map(|element| element.id())
            .collect()
    }

    fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let node = self.html.tree.get(node)?;
        std::iter::once(node)
            .chain(node.ancestors())
            .filter_map(ElementRef::wrap)
            .find(|element| selector.compiled().matches(element))
            .map(|element| element.id())
    }

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).ok().map(Element::name)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).ok()?.attr(name)
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let root = self.html.tree.root().id();
        match self.html.tree.get(node) {
            Some(n) => n.id() == root || n.ancestors().any(|a| a.id() == root),
            None => false,
        }
    }

    fn mutate(&mut self, node: NodeId, patch: DomPatch) -> Result<Option<NodeId>, DomError> {
        if self.html.tree.get(node).is_none() {
            return Err(DomError::UnknownNode(node));
        }

        match patch {
            DomPatch::SetAttribute { name, value } => {
                self.set_attribute(node, &name, &value)?;
                Ok(None)
            }
            DomPatch::SetStyle { property, value } => {
                let mut styles = self
                    .element(node)?
                    .attr("style")
                    .map(parse_style)
                    .unwrap_or_default();
                match styles
                    .iter_mut()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&property))
                {
                    Some(existing) => existing.1 = value,
                    None => styles.push((property, value)),
                }
                self.set_attribute(node, "style", &format_style(&styles))?;
                Ok(None)
            }
            DomPatch::InsertAfter(spec) => {
                let parent = self.parent(node).ok_or(DomError::Detached(node))?;
                let created = self.create_detached(spec);
                if let Some(mut target) = self.html.tree.get_mut(node) {
                    target.insert_id_after(created);
                }
                self.pending
                    .push(MutationRecord::child_list(parent, vec![created], Vec::new()));
                Ok(Some(created))
            }
            DomPatch::AppendChild(spec) => {
                self.element(node)?;
                let created = self.create_detached(spec);
                if let Some(mut target) = self.html.tree.get_mut(node) {
                    target.append_id(created);
                }
                self.pending
                    .push(MutationRecord::child_list(node, vec![created], Vec::new()));
                Ok(Some(created))
            }
            DomPatch::Remove => {
                if let Some(parent) = self.parent(node) {
                    if let Some(mut target) = self.html.tree.get_mut(node) {
                        target.detach();
                    }
                    self.pending
                        .push(MutationRecord::child_list(parent, Vec::new(), vec![node]));
                }
                Ok(None)
            }
        }
    }
}

fn attribute_name(name: &str) -> QualName {
    QualName::new(None, ns!(), LocalName::from(name))
}

fn attribute(name: QualName, value: &str) -> Attribute {
    Attribute {
        name,
        value: value.into(),
    }
}

fn element_node(tag: &str, attributes: Vec<(String, String)>) -> Node {
    let attributes = attributes
        .iter()
        .map(|(name, value)| attribute(attribute_name(name), value))
        .collect();
    let name = QualName::new(None, ns!(html), LocalName::from(tag));
    Node::Element(Element::new(name, attributes))
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|declaration| declaration.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

fn format_style(styles: &[(String, String)]) -> String {
    styles
        .iter()
        .map(|(name, value)| format!("{}: {};", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> MemoryDocument {
        MemoryDocument::parse(
            r#"<html><body>
                <div role="main"><p>Hello <a id="first" href="https://x.example/">x</a></p></div>
                <nav><a href="/inbox">Inbox</a></nav>
            </body></html>"#,
            Url::parse("https://mail.example.com/u/0/").ok(),
        )
    }

    #[test]
    fn test_parse_finds_body_and_links() {
        let doc = page();
        assert_eq!(doc.tag_name(doc.body()), Some("body"));
        let links = doc.select("a[href]").unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(doc.attribute(links[0], "id"), Some("first"));
        assert_eq!(doc.text_content(links[1]), "Inbox");
    }

    #[test]
    fn test_insert_after_places_sibling() {
        let mut doc = page();
        let link = doc.select("#first").unwrap()[0];
        let badge = doc
            .mutate(
                link,
                DomPatch::InsertAfter(ElementSpec::new("span").attr("class", "badge").text("[80]")),
            )
            .unwrap()
            .unwrap();

        assert_eq!(doc.next_sibling(link), Some(badge));
        assert_eq!(doc.text_content(badge), "[80]");
        assert!(doc.is_attached(badge));
        assert_eq!(doc.select("div[role=main] a + span.badge").unwrap(), vec![badge]);
    }

    #[test]
    fn test_set_attribute_keeps_selectors_in_sync() {
        let mut doc = page();
        let link = doc.select("#first").unwrap()[0];
        doc.mutate(link, DomPatch::set_attribute("data-mailshield-scanned", "true"))
            .unwrap();
        doc.mutate(link, DomPatch::set_attribute("class", "flagged"))
            .unwrap();

        assert_eq!(doc.attribute(link, "href"), Some("https://x.example/"));
        assert_eq!(
            doc.select("a.flagged[data-mailshield-scanned=true]").unwrap(),
            vec![link]
        );
        assert_eq!(doc.pending_mutations().len(), 2);
    }

    #[test]
    fn test_set_style_merges_properties() {
        let mut doc = page();
        let link = doc.select("#first").unwrap()[0];
        doc.mutate(link, DomPatch::set_style("border", "1px solid red"))
            .unwrap();
        doc.mutate(link, DomPatch::set_style("padding", "2px"))
            .unwrap();
        doc.mutate(link, DomPatch::set_style("border", "3px solid red"))
            .unwrap();

        assert_eq!(doc.style(link, "border").as_deref(), Some("3px solid red"));
        assert_eq!(doc.style(link, "padding").as_deref(), Some("2px"));
    }

    #[test]
    fn test_removed_node_is_detached() {
        let mut doc = page();
        let main = doc.select("[role=main]").unwrap()[0];
        let link = doc.select("#first").unwrap()[0];

        doc.remove_node(main).unwrap();

        assert!(!doc.is_attached(main));
        assert!(!doc.is_attached(link));
        assert_eq!(doc.attribute(link, "href"), Some("https://x.example/"));
        assert!(doc.select("#first").unwrap().is_empty());
        assert!(!doc.to_html().contains("x.example"));

        let batch = doc.pending_mutations();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].removed, vec![main]);
    }

    #[test]
    fn test_mutations_are_batched() {
        let mut doc = page();
        let mut rx = doc.observe();
        let body = doc.body();

        doc.append_html(body, "<p><a href='https://a.example/'>a</a></p>")
            .unwrap();
        doc.append_html(body, "<p>two</p>").unwrap();
        assert_eq!(doc.flush_mutations(), 2);
        assert_eq!(doc.flush_mutations(), 0);

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(MutationRecord::is_structural));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_append_html_unwraps_fragment() {
        let mut doc = MemoryDocument::new(None);
        let body = doc.body();
        let added = doc
            .append_html(body, "<div class='msg'>hi</div><a href='x'>y</a>")
            .unwrap();

        assert_eq!(added.len(), 2);
        assert_eq!(doc.tag_name(added[0]), Some("div"));
        assert_eq!(doc.parent(added[1]), Some(body));
        assert_eq!(doc.select("body > div.msg").unwrap(), vec![added[0]]);
    }

    #[test]
    fn test_to_html_escapes() {
        let mut doc = MemoryDocument::new(None);
        let body = doc.body();
        doc.mutate(
            body,
            DomPatch::AppendChild(ElementSpec::new("span").attr("title", "a \"b\" & c").text("<x>")),
        )
        .unwrap();

        let html = doc.to_html();
        assert!(html.contains(r#"title="a &quot;b&quot; &amp; c""#));
        assert!(html.contains("&lt;x&gt;"));
    }
}

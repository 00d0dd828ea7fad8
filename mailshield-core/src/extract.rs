// Candidate link extraction for one scan pass.

use crate::config::PipelineConfig;
use crate::dom::{Document, DomError, DomPatch, NodeId, Selector};
use std::fmt;
use tracing::debug;
use url::Url;

const LINK_SELECTOR: &str = "a[href]";
const NETWORK_SCHEMES: &[&str] = &["http", "https"];

/// Lifecycle of a link element within the pipeline. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScanState {
    Unscanned,
    Scanning,
    Scanned,
}

/// A link element selected for scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCandidate {
    node: NodeId,
    url: String,
    state: ScanState,
}

impl LinkCandidate {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Record that the scoring attempt for this link has finished, whatever its outcome.
    pub fn complete(&mut self) {
        if self.state == ScanState::Scanning {
            self.state = ScanState::Scanned;
        }
    }
}

/// Why a link was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    AlreadyProcessed,
    ExcludedRegion,
    MalformedUrl,
    NonNetworkScheme,
    HostDomain,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Exclusion::AlreadyProcessed => "already processed",
            Exclusion::ExcludedRegion => "inside navigation chrome",
            Exclusion::MalformedUrl => "malformed URL",
            Exclusion::NonNetworkScheme => "non-network scheme",
            Exclusion::HostDomain => "host application link",
        };
        f.write_str(reason)
    }
}

/// Which links are out of scope. The region selectors track the host UI's markup, so
/// they are configuration rather than fixed rules.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    pub excluded_regions: Option<Selector>,
    pub host_domains: Vec<String>,
}

impl ExclusionPolicy {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, DomError> {
        Ok(Self {
            excluded_regions: Selector::parse_all(&config.excluded_regions)?,
            host_domains: config
                .host_domains
                .iter()
                .map(|d| canonical_domain(d))
                .filter(|d| !d.is_empty())
                .collect(),
        })
    }
}

pub struct LinkExtractor {
    marker: String,
    links: Selector,
    content_roots: Vec<Selector>,
    policy: ExclusionPolicy,
}

impl LinkExtractor {
    pub fn new(
        marker: &str,
        content_roots: Vec<Selector>,
        policy: ExclusionPolicy,
    ) -> Result<Self, DomError> {
        Ok(Self {
            marker: marker.to_string(),
            links: Selector::parse(LINK_SELECTOR)?,
            content_roots,
            policy,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, DomError> {
        let content_roots = config
            .content_roots
            .iter()
            .map(|s| Selector::parse(s))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(
            &config.marker_attribute,
            content_roots,
            ExclusionPolicy::from_config(config)?,
        )
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// The primary reading pane if one of the content root selectors matches, else the
    /// body.
    pub fn scan_root<D: Document>(&self, document: &D) -> NodeId {
        let body = document.body();
        self.content_roots
            .iter()
            .find_map(|selector| document.query(body, selector).into_iter().next())
            .unwrap_or(body)
    }

    /// Start one extraction pass. The set of link elements is fixed now; each survivor
    /// is marked as it is yielded.
    pub fn extract<'a, D: Document>(&'a self, document: &'a mut D) -> Candidates<'a, D> {
        let root = self.scan_root(&*document);
        let pending = document.query(root, &self.links);
        let host_domains = self.host_domains_for(&*document);
        debug!("Extraction root {:?} holds {} links", root, pending.len());

        Candidates {
            extractor: self,
            document,
            pending: pending.into_iter(),
            host_domains,
        }
    }

    /// Decide whether `node` should be scanned, returning its absolute URL if so.
    pub fn evaluate<D: Document>(&self, document: &D, node: NodeId) -> Result<String, Exclusion> {
        self.evaluate_with(document, node, &self.host_domains_for(document))
    }

    fn evaluate_with<D: Document>(
        &self,
        document: &D,
        node: NodeId,
        host_domains: &[String],
    ) -> Result<String, Exclusion> {
        if document.attribute(node, &self.marker).is_some() {
            return Err(Exclusion::AlreadyProcessed);
        }

        if let Some(ref regions) = self.policy.excluded_regions
            && document.closest(node, regions).is_some()
        {
            return Err(Exclusion::ExcludedRegion);
        }

        let href = document.attribute(node, "href").unwrap_or("").trim();
        let url = resolve_href(document.location(), href).ok_or(Exclusion::MalformedUrl)?;

        if !NETWORK_SCHEMES.contains(&url.scheme()) {
            return Err(Exclusion::NonNetworkScheme);
        }

        let host = url.host_str().ok_or(Exclusion::MalformedUrl)?;
        if host_domains.iter().any(|domain| is_same_domain(host, domain)) {
            return Err(Exclusion::HostDomain);
        }

        Ok(url.to_string())
    }

    fn host_domains_for<D: Document>(&self, document: &D) -> Vec<String> {
        let mut domains = self.policy.host_domains.clone();
        if let Some(host) = document.location().and_then(Url::host_str) {
            let host = canonical_domain(host);
            if !domains.contains(&host) {
                domains.push(host);
            }
        }
        domains
    }
}

/// Lazy, single-use sequence of candidates for one pass.
pub struct Candidates<'a, D: Document> {
    extractor: &'a LinkExtractor,
    document: &'a mut D,
    pending: std::vec::IntoIter<NodeId>,
    host_domains: Vec<String>,
}

impl<D: Document> Iterator for Candidates<'_, D> {
    type Item = LinkCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        for node in self.pending.by_ref() {
            let url = match self
                .extractor
                .evaluate_with(&*self.document, node, &self.host_domains)
            {
                Ok(url) => url,
                Err(exclusion) => {
                    if exclusion != Exclusion::AlreadyProcessed {
                        debug!("Skipping link {:?}: {}", node, exclusion);
                    }
                    continue;
                }
            };

            // Marked before any scoring starts so no later pass can pick it up again.
            if let Err(e) = self
                .document
                .mutate(node, DomPatch::set_attribute(&self.extractor.marker, "true"))
            {
                debug!("Could not mark link {:?}: {}", node, e);
                continue;
            }

            debug!("Selected link {:?} -> {}", node, url);
            return Some(LinkCandidate {
                node,
                url,
                state: ScanState::Scanning,
            });
        }
        None
    }
}

fn resolve_href(base: Option<&Url>, href: &str) -> Option<Url> {
    if href.is_empty() {
        return None;
    }

    let mut url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    url.set_fragment(None);
    Some(url)
}

fn canonical_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// `domain` is already canonical. Only the link's host drops a leading `www.`, so a
/// configured `www.` domain never widens to its parent's other subdomains.
fn is_same_domain(host: &str, domain: &str) -> bool {
    let host = canonical_domain(host);
    let bare = host.strip_prefix("www.").unwrap_or(&host);
    [host.as_str(), bare]
        .iter()
        .any(|h| *h == domain || h.ends_with(&format!(".{}", domain)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_href() {
        let base = Url::parse("https://mail.example.com/u/0/").unwrap();
        assert_eq!(
            resolve_href(Some(&base), "/inbox#top").unwrap().as_str(),
            "https://mail.example.com/inbox"
        );
        assert_eq!(
            resolve_href(None, "https://x.example/a#b").unwrap().as_str(),
            "https://x.example/a"
        );
        assert!(resolve_href(None, "/relative").is_none());
        assert!(resolve_href(Some(&base), "").is_none());
        assert!(resolve_href(Some(&base), "http://[::1").is_none());
    }

    #[test]
    fn test_same_domain() {
        assert!(is_same_domain("mail.example.com", "mail.example.com"));
        assert!(is_same_domain("www.mail.example.com", "mail.example.com"));
        assert!(is_same_domain("accounts.mail.example.com", "mail.example.com"));
        assert!(!is_same_domain("mail.example.com.evil.net", "mail.example.com"));
        assert!(!is_same_domain("notmail.example.com", "mail.example.com"));
    }

    #[test]
    fn test_www_domain_stays_narrow() {
        assert!(is_same_domain("www.google.com", "www.google.com"));
        assert!(is_same_domain("WWW.Google.com.", "www.google.com"));
        assert!(!is_same_domain("sites.google.com", "www.google.com"));
        assert!(!is_same_domain("google.com", "www.google.com"));
        assert!(is_same_domain("www.google.com", "google.com"));
    }

    #[test]
    fn test_configured_www_domain_is_kept_verbatim() {
        let config = PipelineConfig {
            host_domains: vec![" WWW.Google.com. ".to_string(), "  ".to_string()],
            ..PipelineConfig::default()
        };
        let policy = ExclusionPolicy::from_config(&config).unwrap();
        assert_eq!(policy.host_domains, vec!["www.google.com".to_string()]);
    }

    #[test]
    fn test_candidate_state_moves_forward() {
        let doc = crate::dom::MemoryDocument::new(None);
        let mut candidate = LinkCandidate {
            node: doc.body(),
            url: "https://x.example/".to_string(),
            state: ScanState::Scanning,
        };
        candidate.complete();
        assert_eq!(candidate.state(), ScanState::Scanned);
        candidate.complete();
        assert_eq!(candidate.state(), ScanState::Scanned);
    }
}

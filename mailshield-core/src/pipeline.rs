// Scan pass orchestration: extract, score with bounded concurrency, annotate, toast.

use crate::annotate::{Annotation, AnnotationEngine};
use crate::config::PipelineConfig;
use crate::debounce::{ScanTrigger, spawn_debounced};
use crate::dom::{self, Document, DomError, MutationRecord, NodeId, SharedDocument};
use crate::extract::{LinkCandidate, LinkExtractor};
use crate::toast::{ToastNotifier, ToastedUrlSet};
use crate::watcher::MutationWatcher;
use futures::stream::{self, StreamExt};
use mailshield_scanner::{RiskLevel, RiskScorer, ScanResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-link result of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Annotated {
        node: NodeId,
        result: ScanResult,
        toast: Option<NodeId>,
    },
    /// Scored as safe, or already annotated; nothing changed.
    Silent { node: NodeId, result: ScanResult },
    /// Scored, but the element had left the page.
    Detached { node: NodeId, result: ScanResult },
    Failed {
        node: NodeId,
        url: String,
        error: String,
    },
}

/// One annotated link, as reported after a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkFinding {
    pub url: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub reasons: Vec<String>,
    pub toast_shown: bool,
}

/// Counts for one scan pass. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub candidates: usize,
    pub annotated: usize,
    pub silent: usize,
    pub detached: usize,
    pub failed: usize,
    pub toasts: usize,
    pub findings: Vec<LinkFinding>,
    pub failures: Vec<String>,
}

impl PassSummary {
    fn record(&mut self, outcome: LinkOutcome) {
        match outcome {
            LinkOutcome::Annotated { result, toast, .. } => {
                self.annotated += 1;
                if toast.is_some() {
                    self.toasts += 1;
                }
                self.findings.push(LinkFinding {
                    url: result.url().to_string(),
                    risk_score: result.risk_score(),
                    risk_level: result.risk_level(),
                    reasons: result.reasons().to_vec(),
                    toast_shown: toast.is_some(),
                });
            }
            LinkOutcome::Silent { .. } => self.silent += 1,
            LinkOutcome::Detached { .. } => self.detached += 1,
            LinkOutcome::Failed { url, .. } => {
                self.failed += 1;
                self.failures.push(url);
            }
        }
    }
}

pub struct ScanPipeline<D, S> {
    document: SharedDocument<D>,
    scorer: Arc<S>,
    extractor: LinkExtractor,
    annotator: AnnotationEngine,
    toasts: ToastNotifier<D>,
    max_in_flight: usize,
    debounce_window: Duration,
}

impl<D, S> ScanPipeline<D, S>
where
    D: Document + 'static,
    S: RiskScorer + 'static,
{
    pub fn new(
        document: SharedDocument<D>,
        scorer: Arc<S>,
        config: &PipelineConfig,
        toasted: ToastedUrlSet,
    ) -> Result<Self, DomError> {
        let extractor = LinkExtractor::from_config(config)?;
        let toasts = ToastNotifier::new(document.clone(), toasted, config.toast_duration());

        Ok(Self {
            document,
            scorer,
            extractor,
            annotator: AnnotationEngine::new(),
            toasts,
            max_in_flight: config.max_in_flight.max(1),
            debounce_window: config.debounce_window(),
        })
    }

    pub fn document(&self) -> &SharedDocument<D> {
        &self.document
    }

    pub fn toasts(&self) -> &ToastNotifier<D> {
        &self.toasts
    }

    /// Run one pass over the links currently on the page.
    ///
    /// Failures stay per link: a failed request leaves its element unannotated and the
    /// rest of the batch carries on.
    pub async fn scan_pass(&self) -> PassSummary {
        let candidates = self.extract_candidates();
        let mut summary = PassSummary {
            candidates: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() {
            debug!("No new links to scan");
            return summary;
        }
        info!("Scanning {} new links", candidates.len());

        let outcomes: Vec<LinkOutcome> = stream::iter(candidates)
            .map(|candidate| self.scan_link(candidate))
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        for outcome in outcomes {
            summary.record(outcome);
        }

        info!(
            "Pass complete: {} annotated, {} silent, {} failed, {} detached",
            summary.annotated, summary.silent, summary.failed, summary.detached
        );
        summary
    }

    fn extract_candidates(&self) -> Vec<LinkCandidate> {
        let mut document = dom::lock(&self.document);
        self.extractor.extract(&mut *document).collect()
    }

    async fn scan_link(&self, mut candidate: LinkCandidate) -> LinkOutcome {
        let node = candidate.node();
        let scored = self.scorer.score_url(candidate.url()).await;
        candidate.complete();

        let result = match scored {
            Ok(result) => result,
            Err(e) => {
                warn!("MailShield scan failed for {}: {}", candidate.url(), e);
                return LinkOutcome::Failed {
                    node,
                    url: candidate.url().to_string(),
                    error: e.to_string(),
                };
            }
        };

        match self.apply(node, &result) {
            Ok(Annotation::Applied { .. }) => {
                let toast = if result.risk_level() == RiskLevel::High {
                    self.toasts.notify(result.url())
                } else {
                    None
                };
                LinkOutcome::Annotated {
                    node,
                    result,
                    toast,
                }
            }
            Ok(Annotation::Silent) | Ok(Annotation::AlreadyAnnotated) => {
                LinkOutcome::Silent { node, result }
            }
            Ok(Annotation::Detached) => LinkOutcome::Detached { node, result },
            Err(e) => {
                warn!("Failed to annotate {}: {}", result.url(), e);
                LinkOutcome::Failed {
                    node,
                    url: result.url().to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    fn apply(&self, node: NodeId, result: &ScanResult) -> Result<Annotation, DomError> {
        let mut document = dom::lock(&self.document);
        self.annotator.annotate(&mut *document, node, result)
    }

    /// Run an initial pass now, then a debounced pass after every structural change
    /// delivered on `mutations`.
    pub fn watch(
        self: &Arc<Self>,
        mutations: mpsc::UnboundedReceiver<Vec<MutationRecord>>,
    ) -> WatchHandle {
        let pipeline = self.clone();
        let (trigger, debounce_task) = spawn_debounced(self.debounce_window, move || {
            let pipeline = pipeline.clone();
            async move {
                pipeline.scan_pass().await;
            }
        });

        let initial = self.clone();
        let initial_task = tokio::spawn(async move { initial.scan_pass().await });
        let watcher_task = MutationWatcher::new(trigger.clone()).spawn(mutations);

        WatchHandle {
            trigger,
            initial_task: Some(initial_task),
            debounce_task,
            watcher_task,
        }
    }
}

/// Running watch session. Dropping it leaves the tasks running; call
/// [`WatchHandle::stop`] to end them.
pub struct WatchHandle {
    trigger: ScanTrigger,
    initial_task: Option<JoinHandle<PassSummary>>,
    debounce_task: JoinHandle<()>,
    watcher_task: JoinHandle<()>,
}

impl WatchHandle {
    /// Request a scan as if a mutation had been observed.
    pub fn trigger(&self) -> bool {
        self.trigger.trigger()
    }

    /// Wait for the initial pass to finish. Yields `None` on later calls.
    pub async fn initial_pass(&mut self) -> Option<PassSummary> {
        self.initial_task.take()?.await.ok()
    }

    pub fn stop(self) {
        self.watcher_task.abort();
        self.debounce_task.abort();
        if let Some(task) = self.initial_task {
            task.abort();
        }
    }
}

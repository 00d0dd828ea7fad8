// Rendering scan results onto link elements.

use crate::dom::{Document, DomError, DomPatch, ElementSpec, NodeId};
use mailshield_scanner::{RiskLevel, ScanResult};
use tracing::debug;

pub const RISK_ATTRIBUTE: &str = "data-mailshield-risk";
pub const BADGE_CLASS: &str = "mailshield-badge";

/// What happened to a link after its result arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    /// Score was zero; the link is left untouched.
    Silent,
    /// The link left the page while its request was in flight.
    Detached,
    /// The link already carries a risk annotation.
    AlreadyAnnotated,
    Applied { badge: NodeId },
}

struct Appearance {
    border: &'static str,
    background: &'static str,
    color: &'static str,
    icon: &'static str,
    hint: &'static str,
}

fn appearance(level: RiskLevel) -> Option<Appearance> {
    match level {
        RiskLevel::Safe => None,
        RiskLevel::Low => Some(Appearance {
            border: "1px dashed #f9ab00",
            background: "rgba(249, 171, 0, 0.05)",
            color: "#f9ab00",
            icon: "⚠️",
            hint: "Suspicious link detected.",
        }),
        RiskLevel::Medium => Some(Appearance {
            border: "2px solid #f9ab00",
            background: "rgba(249, 171, 0, 0.1)",
            color: "#f9ab00",
            icon: "⚠️",
            hint: "Suspicious link detected.",
        }),
        RiskLevel::High => Some(Appearance {
            border: "3px solid #d93025",
            background: "rgba(217, 48, 37, 0.1)",
            color: "#d93025",
            icon: "🚨",
            hint: "VERY HIGH RISK! DO NOT CLICK.",
        }),
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationEngine;

impl AnnotationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn annotate<D: Document>(
        &self,
        document: &mut D,
        node: NodeId,
        result: &ScanResult,
    ) -> Result<Annotation, DomError> {
        if result.is_safe() {
            return Ok(Annotation::Silent);
        }
        let Some(look) = appearance(result.risk_level()) else {
            return Ok(Annotation::Silent);
        };

        if !document.is_attached(node) {
            debug!("Link {:?} detached before its result arrived", node);
            return Ok(Annotation::Detached);
        }
        if document.attribute(node, RISK_ATTRIBUTE).is_some() {
            return Ok(Annotation::AlreadyAnnotated);
        }

        let level = result.risk_level();
        let score = result.risk_score();

        document.mutate(node, DomPatch::set_attribute(RISK_ATTRIBUTE, level.as_str()))?;
        document.mutate(node, DomPatch::set_style("border", look.border))?;
        document.mutate(node, DomPatch::set_style("background-color", look.background))?;
        document.mutate(node, DomPatch::set_style("border-radius", "4px"))?;
        document.mutate(node, DomPatch::set_style("padding", "2px"))?;
        document.mutate(node, DomPatch::set_attribute("title", tooltip(result)))?;
        document.mutate(node, DomPatch::set_attribute("aria-label", accessible_label(result)))?;

        let badge = ElementSpec::new("span")
            .attr("class", BADGE_CLASS)
            .attr("data-mailshield-level", level.as_str())
            .attr("title", look.hint)
            .attr("role", "note")
            .style("font-size", "10px")
            .style("color", look.color)
            .style("margin-left", "5px")
            .style("cursor", "help")
            .text(badge_text(level, score, look.icon));

        let badge = document
            .mutate(node, DomPatch::InsertAfter(badge))?
            .ok_or(DomError::Detached(node))?;

        debug!("Annotated link {:?} as {} ({})", node, level, score);
        Ok(Annotation::Applied { badge })
    }
}

pub fn badge_text(level: RiskLevel, score: u8, icon: &str) -> String {
    format!(
        "{} {} [Score: {}]",
        icon,
        level.as_str().to_uppercase(),
        score
    )
}

pub fn tooltip(result: &ScanResult) -> String {
    if result.reasons().is_empty() {
        format!("🛡️ MailShield Score: {}", result.risk_score())
    } else {
        format!(
            "🛡️ MailShield Score: {} | {}",
            result.risk_score(),
            result.reasons().join(", ")
        )
    }
}

fn accessible_label(result: &ScanResult) -> String {
    let mut label = format!(
        "MailShield {} risk, score {}",
        result.risk_level(),
        result.risk_score()
    );
    if !result.reasons().is_empty() {
        label.push_str(": ");
        label.push_str(&result.reasons().join(", "));
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tooltip_joins_reasons() {
        let result = ScanResult::new(
            "https://bad.example/",
            80,
            vec!["Typosquatting".to_string(), "Homoglyph".to_string()],
        );
        assert_eq!(
            tooltip(&result),
            "🛡️ MailShield Score: 80 | Typosquatting, Homoglyph"
        );

        let bare = ScanResult::new("https://bad.example/", 30, vec![]);
        assert_eq!(tooltip(&bare), "🛡️ MailShield Score: 30");
    }

    #[test]
    fn test_badge_text() {
        assert_eq!(badge_text(RiskLevel::High, 80, "🚨"), "🚨 HIGH [Score: 80]");
    }

    #[test]
    fn test_safe_level_has_no_appearance() {
        assert!(appearance(RiskLevel::Safe).is_none());
        assert!(appearance(RiskLevel::Low).is_some());
    }
}

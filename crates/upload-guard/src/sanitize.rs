//! The sanitizer: parse, validate the root, collect removals, apply, serialize.
//!
//! Removals are gathered in a read-only walk and applied afterwards, so the
//! tree is never mutated while it is being traversed.

use crate::error::{Result, SanitizeError};
use crate::policy::{AttributeThreat, Policy};
use crate::threat::style::is_dangerous_style;
use crate::tree::{Document, NodeId, ParseOptions};
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static SVG_SANITIZER: LazyLock<Sanitizer> = LazyLock::new(Sanitizer::svg);
static XML_SANITIZER: LazyLock<Sanitizer> = LazyLock::new(Sanitizer::xml);

/// Sanitize an SVG upload with the built-in hardened policy.
pub fn sanitize_svg(content: &[u8]) -> Result<Vec<u8>> {
    SVG_SANITIZER.sanitize(content)
}

/// Sanitize a generic XML upload with the built-in policy.
pub fn sanitize_xml(content: &[u8]) -> Result<Vec<u8>> {
    XML_SANITIZER.sanitize(content)
}

/// Why an element was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementThreat {
    ForbiddenTag,
    DangerousStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedElement {
    pub element: String,
    pub reason: ElementThreat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedAttribute {
    pub element: String,
    pub attribute: String,
    pub reason: AttributeThreat,
}

/// What a sanitization pass removed. Advisory only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub removed_elements: Vec<RemovedElement>,
    pub removed_attributes: Vec<RemovedAttribute>,
}

impl Report {
    /// Nothing was removed.
    pub fn is_clean(&self) -> bool {
        self.removed_elements.is_empty() && self.removed_attributes.is_empty()
    }

    pub fn removed(&self) -> usize {
        self.removed_elements.len() + self.removed_attributes.len()
    }
}

/// Output of [`Sanitizer::sanitize_with_report`].
#[derive(Debug, Clone)]
pub struct Sanitized {
    pub bytes: Vec<u8>,
    pub report: Report,
}

#[derive(Debug, Default)]
struct Removals {
    elements: Vec<(NodeId, ElementThreat)>,
    attributes: Vec<(NodeId, usize, AttributeThreat)>,
}

/// Stateless sanitizer bound to one policy. Cheap to share across threads.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    policy: Policy,
}

impl Sanitizer {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }

    pub fn svg() -> Self {
        Self::new(Policy::svg())
    }

    pub fn xml() -> Self {
        Self::new(Policy::xml())
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Sanitize `content`, failing closed on anything that cannot be
    /// processed safely. Empty input is returned unchanged.
    pub fn sanitize(&self, content: &[u8]) -> Result<Vec<u8>> {
        self.sanitize_with_report(content).map(|s| s.bytes)
    }

    /// Like [`Sanitizer::sanitize`], also returning what was removed.
    pub fn sanitize_with_report(&self, content: &[u8]) -> Result<Sanitized> {
        if content.is_empty() {
            return Ok(Sanitized {
                bytes: Vec::new(),
                report: Report::default(),
            });
        }

        let limit = self.policy.max_size();
        if content.len() > limit {
            warn!(size = content.len(), limit, "rejected oversized document");
            return Err(SanitizeError::TooLarge {
                size: content.len(),
                limit,
            });
        }

        let result = self.run(content);
        if let Err(e) = &result {
            warn!(kind = %e.kind(), "rejected document: {e}");
        }
        result
    }

    fn run(&self, content: &[u8]) -> Result<Sanitized> {
        let options = ParseOptions {
            max_depth: self.policy.max_depth(),
        };
        let mut doc = Document::parse(content, options)?;
        self.check_root(&doc)?;

        let removals = self.collect(&doc);
        let report = apply(&mut doc, removals);
        let bytes = doc.to_bytes()?;

        if !report.is_clean() {
            info!(
                removed_elements = report.removed_elements.len(),
                removed_attributes = report.removed_attributes.len(),
                "sanitized document"
            );
        }
        Ok(Sanitized { bytes, report })
    }

    fn check_root(&self, doc: &Document) -> Result<()> {
        let root = doc.root_element();
        let rejected = !self.policy.accepts_root(&root.name)
            || self.policy.is_forbidden_element(&root.name)
            || (self.policy.is_style_element(&root.name)
                && is_dangerous_style(&doc.text_content(doc.root())));
        if rejected {
            return Err(SanitizeError::UnexpectedRoot {
                found: root.name.qualified.clone(),
            });
        }
        Ok(())
    }

    /// Read-only pre-order walk. Subtrees of removed elements are skipped.
    fn collect(&self, doc: &Document) -> Removals {
        let mut removals = Removals::default();
        let root = doc.root();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let Some(el) = doc.element(id) else {
                continue;
            };

            if id != root {
                if self.policy.is_forbidden_element(&el.name) {
                    removals.elements.push((id, ElementThreat::ForbiddenTag));
                    continue;
                }
                if self.policy.is_style_element(&el.name)
                    && is_dangerous_style(&doc.text_content(id))
                {
                    removals.elements.push((id, ElementThreat::DangerousStyle));
                    continue;
                }
            }

            for (index, attr) in el.attributes.iter().enumerate() {
                if let Some(threat) = self.policy.attribute_threat(attr) {
                    removals.attributes.push((id, index, threat));
                }
            }
            stack.extend(el.children.iter().rev().copied());
        }

        removals
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::svg()
    }
}

fn apply(doc: &mut Document, removals: Removals) -> Report {
    let mut report = Report::default();

    // Indices of one element are pushed in ascending order, so walking the
    // list backwards removes them without shifting the ones still pending.
    for (id, index, reason) in removals.attributes.into_iter().rev() {
        if let Some(el) = doc.element_mut(id) {
            let attr = el.attributes.remove(index);
            debug!(element = %el.name.qualified, attribute = %attr.name.qualified, ?reason, "removed attribute");
            report.removed_attributes.push(RemovedAttribute {
                element: el.name.qualified.clone(),
                attribute: attr.name.qualified,
                reason,
            });
        }
    }
    report.removed_attributes.reverse();

    for (id, reason) in removals.elements {
        let name = doc
            .element(id)
            .map(|el| el.name.qualified.clone())
            .unwrap_or_default();
        if doc.detach(id) {
            debug!(element = %name, ?reason, "removed element");
            report.removed_elements.push(RemovedElement {
                element: name,
                reason,
            });
        }
    }

    report
}

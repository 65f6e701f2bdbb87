//! Body rendering for remote items.
//!
//! The [`BodyRenderer`] seam keeps the engine independent of any
//! particular body dialect; [`MarkdownRenderer`] is the concrete
//! implementation whose output the remote parser can read back. The
//! engine guarantees the context it passes: the parent reference is only
//! present once the parent has a confirmed remote identity.

use crate::plan::model::{PlanItem, PlanItemType};
use crate::remote::metadata;

/// Remote reference to a related item, resolved by the engine from the
/// sync map before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRef {
    pub id: String,
    /// Short human key, e.g. "#12".
    pub key: String,
    pub title: String,
}

/// Everything a renderer may embed besides the item itself.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// Plan fingerprint, stamped into the metadata block.
    pub plan_id: String,
    pub parent: Option<ItemRef>,
    pub sub_items: Vec<ItemRef>,
    pub depends_on: Vec<ItemRef>,
}

/// Renders a plan item into a remote item body, metadata block included.
pub trait BodyRenderer: Send + Sync {
    fn render(&self, item: &PlanItem, ctx: &RenderContext) -> String;
}

/// Markdown body renderer. Section headings match what
/// [`crate::remote::parser`] extracts, so rendered bodies survive a
/// render -> parse round trip.
#[derive(Debug, Default, Clone)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl BodyRenderer for MarkdownRenderer {
    fn render(&self, item: &PlanItem, ctx: &RenderContext) -> String {
        let mut out = String::new();

        // Preamble lines sit before the first heading; the parser
        // discards them by design.
        if let Some(parent) = &ctx.parent {
            out.push_str(&format!("> Parent: {} {}\n", parent.key, parent.title));
        }
        if let Some(estimate) = &item.estimate {
            let mut parts = Vec::new();
            if let Some(size) = &estimate.size {
                parts.push(size.clone());
            }
            if let Some(hours) = estimate.hours {
                parts.push(format!("{hours}h"));
            }
            if !parts.is_empty() {
                out.push_str(&format!("> Estimate: {}\n", parts.join(", ")));
            }
        }
        if let Some(spec_ref) = &item.spec_ref {
            out.push_str(&format!("> Spec: {spec_ref}\n"));
        }
        if !out.is_empty() {
            out.push('\n');
        }

        if let Some(goal) = &item.goal {
            push_section(&mut out, "Goal", goal);
        }
        if let Some(motivation) = &item.motivation {
            push_section(&mut out, "Motivation", motivation);
        }
        push_bullet_section(&mut out, "Requirements", &item.requirements);
        push_bullet_section(&mut out, "Acceptance Criteria", &item.acceptance_criteria);
        push_bullet_section(&mut out, "Success Metrics", &item.success_metrics);
        push_bullet_section(&mut out, "Assumptions", &item.assumptions);
        push_bullet_section(&mut out, "Risks", &item.risks);

        if let Some(scope) = &item.scope {
            if !scope.in_scope.is_empty() || !scope.out_of_scope.is_empty() {
                out.push_str("## Scope\n\n");
                if !scope.in_scope.is_empty() {
                    out.push_str("### In\n");
                    for bullet in &scope.in_scope {
                        out.push_str(&format!("- {bullet}\n"));
                    }
                }
                if !scope.out_of_scope.is_empty() {
                    out.push_str("### Out\n");
                    for bullet in &scope.out_of_scope {
                        out.push_str(&format!("- {bullet}\n"));
                    }
                }
                out.push('\n');
            }
        }

        if let Some(verification) = &item.verification {
            let mut lines = Vec::new();
            for command in &verification.commands {
                lines.push(format!("- `{command}`"));
            }
            for check in &verification.ci_checks {
                lines.push(format!("- CI: {check}"));
            }
            for evidence in &verification.evidence {
                lines.push(format!("- Evidence: {evidence}"));
            }
            for step in &verification.manual_steps {
                lines.push(format!("- Manual: {step}"));
            }
            if !lines.is_empty() {
                out.push_str("## Verification\n\n");
                for line in &lines {
                    out.push_str(line);
                    out.push('\n');
                }
                out.push('\n');
            }
        }

        if !ctx.sub_items.is_empty() {
            out.push_str("## Sub-items\n\n");
            for sub in &ctx.sub_items {
                out.push_str(&format!("- [ ] {} {}\n", sub.key, sub.title));
            }
            out.push('\n');
        }

        if !ctx.depends_on.is_empty() {
            out.push_str("## Depends on\n\n");
            for dep in &ctx.depends_on {
                out.push_str(&format!("- {} {}\n", dep.key, dep.title));
            }
            out.push('\n');
        }

        out.push_str(&metadata::render_metadata(
            &ctx.plan_id,
            &item.id,
            &item_type_tag(item.item_type),
            item.parent_id.as_deref(),
        ));

        out
    }
}

fn push_section(out: &mut String, heading: &str, text: &str) {
    out.push_str(&format!("## {heading}\n\n{}\n\n", text.trim()));
}

fn push_bullet_section(out: &mut String, heading: &str, bullets: &[String]) {
    if bullets.is_empty() {
        return;
    }
    out.push_str(&format!("## {heading}\n\n"));
    for bullet in bullets {
        out.push_str(&format!("- {bullet}\n"));
    }
    out.push('\n');
}

fn item_type_tag(item_type: PlanItemType) -> String {
    item_type.to_string().to_ascii_uppercase()
}

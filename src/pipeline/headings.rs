//! Document-wide heading reconciliation.
//!
//! Pages are recognised independently, so heading depth drifts between
//! pages: "2.1 Methods" on page 4 can come back as `#` while "2 Approach" on
//! page 3 was also `#`. After assembly, only the outline (every heading line,
//! in order) goes back to the model, which returns the same headings with
//! corrected depth inside a fenced block. The corrected depths are then
//! applied to the document by exact heading-text match; body text is never
//! touched.
//!
//! Headings with the same text share one entry in the level map, and the
//! last one in the corrected outline wins. Headings absent from the
//! corrected outline keep their depth. Lines inside fenced code blocks are
//! not headings.

use crate::pipeline::llm::{VisionModel, VisionRequest, VisionReply};
use crate::prompts::heading_prompt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#+)\s+(.+)$").expect("valid regex"));

/// A heading line split into depth and trimmed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading<'a> {
    pub level: usize,
    pub text: &'a str,
}

/// Parse a single line as a heading.
pub fn parse_heading(line: &str) -> Option<Heading<'_>> {
    let caps = RE_HEADING.captures(line)?;
    let level = caps.get(1)?.as_str().len();
    let text = caps.get(2)?.as_str().trim();
    (!text.is_empty()).then_some(Heading { level, text })
}

/// Every line of `content`, flagged `true` when it is prose: outside fenced
/// code blocks and not a fence line itself.
pub(crate) fn lines_outside_code(content: &str) -> impl Iterator<Item = (&str, bool)> {
    let mut in_code = false;
    content.split('\n').map(move |line| {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
            return (line, false);
        }
        (line, !in_code)
    })
}

/// Every heading line of `content`, in order, joined by `\n`.
pub fn extract_outline(content: &str) -> String {
    lines_outside_code(content)
        .filter(|(line, prose)| *prose && parse_heading(line.trim_end_matches('\r')).is_some())
        .map(|(line, _)| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Contents of the first ``` fenced block, language tag ignored.
///
/// `None` when there is no opening fence or it is never closed.
pub fn extract_fenced_block(reply: &str) -> Option<String> {
    let mut lines = reply.lines();
    lines.by_ref().find(|l| l.trim_start().starts_with("```"))?;

    let mut body = Vec::new();
    for line in lines {
        if line.trim_start().starts_with("```") {
            return Some(body.join("\n"));
        }
        body.push(line);
    }
    None
}

/// Heading text → level. Later duplicates overwrite earlier ones.
pub fn level_map(outline: &str) -> HashMap<String, usize> {
    outline
        .lines()
        .filter_map(parse_heading)
        .map(|h| (h.text.to_string(), h.level))
        .collect()
}

/// Rewrite the depth of every heading found in `levels`.
///
/// Everything after the `#` run is kept byte for byte; unmatched headings and
/// body lines are untouched. Returns the new content and how many lines
/// changed.
pub fn apply_levels(content: &str, levels: &HashMap<String, usize>) -> (String, usize) {
    let mut changed = 0;
    let lines: Vec<String> = lines_outside_code(content)
        .map(|(line, prose)| {
            let Some(heading) = prose.then(|| parse_heading(line)).flatten() else {
                return line.to_string();
            };
            match levels.get(heading.text) {
                Some(&level) if level != heading.level => {
                    changed += 1;
                    format!("{}{}", "#".repeat(level), &line[heading.level..])
                }
                _ => line.to_string(),
            }
        })
        .collect();
    (lines.join("\n"), changed)
}

/// Outcome of [`reconcile_headings`].
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    pub content: String,
    /// True when the model returned a usable outline.
    pub corrected: bool,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Ask `model` to fix the outline of `content` and apply the result.
///
/// Never fails: a model error or a reply without a fenced block leaves the
/// content unchanged.
pub async fn reconcile_headings(model: &dyn VisionModel, content: String) -> Reconciled {
    let outline = extract_outline(&content);
    if outline.is_empty() {
        debug!("No headings to reconcile");
        return Reconciled {
            content,
            ..Reconciled::default()
        };
    }

    let reply = match model.invoke(VisionRequest::text(heading_prompt(&outline))).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Heading correction skipped: model call failed: {}", e);
            return Reconciled {
                content,
                ..Reconciled::default()
            };
        }
    };
    let VisionReply {
        content: text,
        input_tokens,
        output_tokens,
        ..
    } = reply;

    let Some(corrected) = extract_fenced_block(&text) else {
        warn!("Heading correction skipped: reply has no fenced outline");
        return Reconciled {
            content,
            corrected: false,
            input_tokens,
            output_tokens,
        };
    };

    let (content, changed) = apply_levels(&content, &level_map(&corrected));
    info!("Heading correction rewrote {} heading(s)", changed);
    Reconciled {
        content,
        corrected: true,
        input_tokens,
        output_tokens,
    }
}

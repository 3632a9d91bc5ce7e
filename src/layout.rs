//! Region clustering: collapse a page's raw primitives into content blocks.
//!
//! PDFs expose a flat stream of positioned text runs, vector paths and image
//! placements with no block structure. This module rebuilds paragraph, figure
//! and table blocks from spatial adjacency so each block can be cropped and
//! recognised on its own.
//!
//! ## Page pipeline
//!
//! ```text
//! drawings + images ──merge(10, rules 100)──▶ anchors
//! large text  ──adsorb(0.1)──▶ anchors'
//! small text  ──adsorb(5)────▶ anchors''
//! anchors'' ──merge(10)──▶ filter(20×20) ──▶ regions
//! ```
//!
//! Large text is adsorbed before small text: captions and axis labels only
//! become near a figure once the figure has grown to cover its body text.
//!
//! Nothing here panics or returns an error. Invalid rectangles are dropped
//! with a warning and the remaining input is still clustered.

use crate::config::RegionConfig;
use crate::geometry::{is_horizontal_near, is_near, is_valid, union, Rect};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Where a candidate rectangle came from. Only decides adsorption order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    /// A text block with long lines (body text).
    TextLarge,
    /// A text block with short lines (labels, captions, axis ticks).
    TextSmall,
    /// A vector path (lines, boxes, chart strokes).
    Drawing,
    /// A raster image placement.
    Image,
}

/// A candidate rectangle tagged with its source kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaggedRegion {
    pub rect: Rect,
    pub kind: RegionKind,
}

impl TaggedRegion {
    pub fn new(rect: Rect, kind: RegionKind) -> Self {
        Self { rect, kind }
    }
}

/// Average characters per line above which a text block counts as body text.
const LARGE_TEXT_CHARS_PER_LINE: f64 = 5.0;

/// Classify a text block by its average line length.
pub fn classify_text(text: &str) -> RegionKind {
    let lines = text.split('\n').count().max(1);
    let chars = text.chars().count();
    if chars as f64 / lines as f64 > LARGE_TEXT_CHARS_PER_LINE {
        RegionKind::TextLarge
    } else {
        RegionKind::TextSmall
    }
}

/// Drop invalid rectangles, logging each one.
fn retain_valid(rects: Vec<Rect>, stage: &str) -> Vec<Rect> {
    rects
        .into_iter()
        .filter(|r| {
            let ok = is_valid(r);
            if !ok {
                warn!("{stage}: dropping invalid rectangle {r:?}");
            }
            ok
        })
        .collect()
}

/// Merge rectangles until no two of them are near each other.
///
/// Each pass pops rectangles off a working queue and greedily swallows every
/// remaining rectangle that is near the growing union. Passes repeat until
/// one completes without a merge, so transitive adjacencies created by a
/// merge are never missed. O(n²) per pass, fine at page scale.
pub fn merge_rects(rects: Vec<Rect>, distance: f64, horizontal_distance: Option<f64>) -> Vec<Rect> {
    let mut current_round = retain_valid(rects, "merge");

    loop {
        let mut queue: VecDeque<Rect> = current_round.into();
        let mut next_round = Vec::with_capacity(queue.len());
        let mut merged_any = false;

        while let Some(mut current) = queue.pop_front() {
            let mut i = 0;
            while i < queue.len() {
                let other = queue[i];
                let near = is_near(&current, &other, distance)
                    || horizontal_distance
                        .is_some_and(|hd| is_horizontal_near(&current, &other, hd));
                if near {
                    current = union(&current, &other);
                    queue.remove(i);
                    merged_any = true;
                } else {
                    i += 1;
                }
            }
            next_round.push(current);
        }

        current_round = next_round;
        if !merged_any {
            break;
        }
    }

    retain_valid(current_round, "merge")
}

/// Pull each source into the first target it is near.
///
/// A source merges into at most one target: the first near one in target
/// order, not the nearest. Returns `(unabsorbed sources, updated targets)`.
pub fn adsorb_rects_to_rects(
    sources: Vec<Rect>,
    mut targets: Vec<Rect>,
    distance: f64,
) -> (Vec<Rect>, Vec<Rect>) {
    let mut remaining = Vec::new();

    for source in retain_valid(sources, "adsorb") {
        match targets.iter().position(|t| is_near(&source, t, distance)) {
            Some(idx) => targets[idx] = union(&source, &targets[idx]),
            None => remaining.push(source),
        }
    }

    (remaining, targets)
}

/// Keep rectangles strictly wider than `min_width` and taller than `min_height`.
pub fn filter_small_rects(rects: Vec<Rect>, min_width: f64, min_height: f64) -> Vec<Rect> {
    rects
        .into_iter()
        .filter(|r| r.width() > min_width && r.height() > min_height)
        .collect()
}

/// Short, flat paths: underlines, table hairline fragments, bullets.
fn is_short_line(r: &Rect, cfg: &RegionConfig) -> bool {
    r.height() < 1.0 && r.width() < cfg.short_line_max_width
}

/// Run the full clustering pipeline for one page.
pub fn cluster_regions(candidates: &[TaggedRegion], cfg: &RegionConfig) -> Vec<Rect> {
    let mut anchors = Vec::new();
    let mut large_text = Vec::new();
    let mut small_text = Vec::new();

    for c in candidates {
        match c.kind {
            RegionKind::Drawing if is_short_line(&c.rect, cfg) => {}
            RegionKind::Drawing | RegionKind::Image => anchors.push(c.rect),
            RegionKind::TextLarge => large_text.push(c.rect),
            RegionKind::TextSmall => small_text.push(c.rect),
        }
    }

    let anchors = merge_rects(
        anchors,
        cfg.merge_distance,
        Some(cfg.horizontal_merge_distance),
    );
    let (_, anchors) = adsorb_rects_to_rects(large_text, anchors, cfg.large_text_adsorb_distance);
    let (_, anchors) = adsorb_rects_to_rects(small_text, anchors, cfg.small_text_adsorb_distance);
    let merged = merge_rects(anchors, cfg.final_merge_distance, None);
    let regions = filter_small_rects(merged, cfg.min_width, cfg.min_height);

    debug!(
        "Clustered {} candidates into {} regions",
        candidates.len(),
        regions.len()
    );
    regions
}

/// Order regions top-to-bottom, then left-to-right (PDF y grows upwards).
pub fn reading_order(mut regions: Vec<Rect>) -> Vec<Rect> {
    regions.sort_by(|a, b| b.y1.total_cmp(&a.y1).then(a.x0.total_cmp(&b.x0)));
    regions
}

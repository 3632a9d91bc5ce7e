//! Axis-aligned rectangle primitives used by the region clustering engine.
//!
//! Coordinates are PDF points in the page's own coordinate space (pdfium
//! reports them with the origin at the bottom-left corner). Every operation
//! here is pure: a [`Rect`] is a `Copy` value and merging always produces a
//! new rectangle.

use serde::{Deserialize, Serialize};

/// Padding applied to each rectangle before measuring the gap between two
/// rectangles. Both rectangles are padded, so [`distance`] subtracts it twice.
pub const BUFFER: f64 = 0.1;

/// Maximum height of a "thin horizontal strip" (a ruled line).
const RULE_MAX_HEIGHT: f64 = 2.0;

/// Minimum width of a "thin horizontal strip".
const RULE_MIN_WIDTH: f64 = 10.0;

/// Maximum horizontal gap between two rules that still counts as aligned.
const RULE_EDGE_TOLERANCE: f64 = 5.0;

/// An axis-aligned box `(x0, y0, x1, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Build a rectangle from two arbitrary corners, normalising the order.
    pub fn from_corners(ax: f64, ay: f64, bx: f64, by: f64) -> Self {
        Self {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// True when `other` lies entirely inside `self` (edges inclusive).
    pub fn contains(&self, other: &Rect) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }

    /// True for ruled lines: very flat and reasonably wide.
    pub fn is_horizontal_strip(&self) -> bool {
        self.height() < RULE_MAX_HEIGHT && self.width() > RULE_MIN_WIDTH
    }
}

/// Gap between two closed intervals; 0 when they overlap or touch.
fn axis_gap(a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    if a1 < b0 {
        b0 - a1
    } else if b1 < a0 {
        a0 - b1
    } else {
        0.0
    }
}

/// Distance between the nearest edges of `a` and `b`, less `2 × BUFFER`.
///
/// Overlapping boxes report exactly `0.0`. Boxes closer than `2 × BUFFER`
/// report a small negative value, so "near" must be tested as
/// `distance < threshold`, never as `distance >= 0`.
pub fn distance(a: &Rect, b: &Rect) -> f64 {
    let dx = axis_gap(a.x0, a.x1, b.x0, b.x1);
    let dy = axis_gap(a.y0, a.y1, b.y0, b.y1);
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    dx.hypot(dy) - 2.0 * BUFFER
}

pub fn is_near(a: &Rect, b: &Rect, threshold: f64) -> bool {
    distance(a, b) < threshold
}

/// Joins horizontal rule segments that [`is_near`] would keep apart.
///
/// Both rectangles must be thin horizontal strips whose horizontal spans
/// overlap (or whose facing left/right edges are within 5 units), stacked
/// less than `threshold` apart vertically.
pub fn is_horizontal_near(a: &Rect, b: &Rect, threshold: f64) -> bool {
    if !a.is_horizontal_strip() || !b.is_horizontal_strip() {
        return false;
    }
    // Overlapping spans give a gap of zero.
    if axis_gap(a.x0, a.x1, b.x0, b.x1) >= RULE_EDGE_TOLERANCE {
        return false;
    }
    axis_gap(a.y0, a.y1, b.y0, b.y1) < threshold
}

/// Smallest rectangle covering both inputs.
pub fn union(a: &Rect, b: &Rect) -> Rect {
    Rect {
        x0: a.x0.min(b.x0),
        y0: a.y0.min(b.y0),
        x1: a.x1.max(b.x1),
        y1: a.y1.max(b.y1),
    }
}

/// [`union`] over optional inputs. `None` means no merge took place.
pub fn union_opt(a: Option<&Rect>, b: Option<&Rect>) -> Option<Rect> {
    match (a, b) {
        (Some(a), Some(b)) => Some(union(a, b)),
        (Some(r), None) | (None, Some(r)) => Some(*r),
        (None, None) => None,
    }
}

/// Finite bounds, correct orientation, and strictly positive area.
pub fn is_valid(r: &Rect) -> bool {
    [r.x0, r.y0, r.x1, r.y1].iter().all(|v| v.is_finite()) && r.x0 < r.x1 && r.y0 < r.y1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Rect> {
        vec![
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(5.0, 5.0, 20.0, 8.0),
            Rect::new(12.0, 0.0, 30.0, 4.0),
            Rect::new(100.0, 100.0, 120.0, 140.0),
            Rect::new(-50.0, 30.0, -10.0, 31.0),
            Rect::new(0.0, 10.15, 10.0, 20.0),
        ]
    }

    #[test]
    fn overlapping_rects_have_zero_distance() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 15.0, 15.0);
        assert_eq!(distance(&a, &b), 0.0);
    }

    #[test]
    fn distance_subtracts_double_buffer() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(13.0, 0.0, 20.0, 10.0);
        assert!((distance(&a, &b) - 2.8).abs() < 1e-9);

        // Diagonal gap: 3-4-5 triangle.
        let c = Rect::new(13.0, 14.0, 20.0, 20.0);
        assert!((distance(&a, &c) - 4.8).abs() < 1e-9);
    }

    #[test]
    fn near_touching_rects_report_negative_distance() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.05, 0.0, 20.0, 10.0);
        assert!(distance(&a, &b) < 0.0);
        assert!(is_near(&a, &b, 0.0));
    }

    #[test]
    fn is_near_is_symmetric() {
        let rects = sample();
        for a in &rects {
            for b in &rects {
                for d in [0.0, 0.1, 1.0, 5.0, 50.0] {
                    assert_eq!(is_near(a, b, d), is_near(b, a, d), "{a:?} {b:?} {d}");
                }
            }
        }
    }

    #[test]
    fn union_contains_both_inputs() {
        let rects = sample();
        for a in &rects {
            for b in &rects {
                let u = union(a, b);
                assert!(u.contains(a) && u.contains(b), "{u:?} ⊉ {a:?}, {b:?}");
            }
        }
    }

    #[test]
    fn union_opt_handles_missing_inputs() {
        let a = Rect::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(union_opt(Some(&a), None), Some(a));
        assert_eq!(union_opt(None, Some(&a)), Some(a));
        assert_eq!(union_opt(None, None), None);
    }

    #[test]
    fn validity() {
        assert!(is_valid(&Rect::new(0.0, 0.0, 1.0, 1.0)));
        assert!(!is_valid(&Rect::new(0.0, 0.0, 0.0, 1.0)));
        assert!(!is_valid(&Rect::new(0.0, 5.0, 1.0, 5.0)));
        assert!(!is_valid(&Rect::new(2.0, 0.0, 1.0, 1.0)));
        assert!(!is_valid(&Rect::new(0.0, 0.0, f64::NAN, 1.0)));
        assert!(!is_valid(&Rect::new(0.0, 0.0, f64::INFINITY, 1.0)));
    }

    #[test]
    fn horizontal_rules_stacked_vertically_are_near() {
        let top = Rect::new(50.0, 700.0, 500.0, 701.0);
        let bottom = Rect::new(52.0, 640.0, 498.0, 640.5);
        assert!(!is_near(&top, &bottom, 10.0));
        assert!(is_horizontal_near(&top, &bottom, 100.0));
        assert!(is_horizontal_near(&bottom, &top, 100.0));
        assert!(!is_horizontal_near(&top, &bottom, 50.0));
    }

    #[test]
    fn horizontal_near_requires_thin_wide_strips() {
        let rule = Rect::new(0.0, 0.0, 200.0, 1.0);
        let tall = Rect::new(0.0, 20.0, 200.0, 40.0);
        let short = Rect::new(0.0, 20.0, 8.0, 21.0);
        assert!(!is_horizontal_near(&rule, &tall, 100.0));
        assert!(!is_horizontal_near(&rule, &short, 100.0));
    }

    #[test]
    fn horizontal_near_requires_horizontal_alignment() {
        let left = Rect::new(0.0, 0.0, 100.0, 1.0);
        let far_right = Rect::new(300.0, 20.0, 400.0, 21.0);
        assert!(!is_horizontal_near(&left, &far_right, 100.0));

        let end_to_end = Rect::new(103.0, 20.0, 150.0, 21.0);
        assert!(is_horizontal_near(&left, &end_to_end, 100.0));

        let gap_too_wide = Rect::new(105.0, 20.0, 150.0, 21.0);
        assert!(!is_horizontal_near(&left, &gap_too_wide, 100.0));
    }

    #[test]
    fn from_corners_normalises() {
        let r = Rect::from_corners(10.0, 20.0, 0.0, 5.0);
        assert_eq!(r, Rect::new(0.0, 5.0, 10.0, 20.0));
        assert_eq!(r.width(), 10.0);
        assert_eq!(r.height(), 15.0);
        assert_eq!(r.area(), 150.0);
    }
}

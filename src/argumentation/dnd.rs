//! Pointer-tracking drag and drop over SVG geometry
//!
//! Pointer positions arrive in screen space and are mapped into SVG user
//! space through the inverse of the canvas' screen transform. Drop targets
//! are hit-tested in reverse registration order so the topmost one wins.
//!
//! Lifecycle: `Idle -> Dragging -> Idle`. Each transition reports its
//! [`DragEvent`]s exactly once.

use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// 2D affine transform in SVG `matrix(a b c d e f)` form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(x: f64, y: f64) -> Self {
        Self { e: x, f: y, ..Self::IDENTITY }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self { a: sx, d: sy, ..Self::IDENTITY }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point {
            x: self.a * p.x + self.c * p.y + self.e,
            y: self.b * p.x + self.d * p.y + self.f,
        }
    }

    /// `None` for singular transforms (e.g. a zero scale).
    pub fn inverse(&self) -> Option<Matrix> {
        let det = self.a * self.d - self.b * self.c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(Matrix {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Shape {
    Rect { x: f64, y: f64, width: f64, height: f64 },
    Circle { cx: f64, cy: f64, r: f64 },
    Polygon { points: Vec<Point> },
    Polyline { points: Vec<Point> },
}

/// A shape plus how it is painted: only painted areas are hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub shape: Shape,
    pub filled: bool,
    pub stroke_width: f64,
}

impl Geometry {
    pub fn filled(shape: Shape) -> Self {
        Self {
            shape,
            filled: true,
            stroke_width: 0.0,
        }
    }

    pub fn stroked(shape: Shape, stroke_width: f64) -> Self {
        Self {
            shape,
            filled: false,
            stroke_width,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        (self.filled && self.fill_contains(p)) || (self.stroke_width > 0.0 && self.stroke_contains(p))
    }

    fn fill_contains(&self, p: Point) -> bool {
        match &self.shape {
            Shape::Rect { x, y, width, height } => {
                p.x >= *x && p.x <= x + width && p.y >= *y && p.y <= y + height
            }
            Shape::Circle { cx, cy, r } => p.distance(&Point::new(*cx, *cy)) <= *r,
            // An open polyline fills as if closed
            Shape::Polygon { points } | Shape::Polyline { points } => even_odd(points, p),
        }
    }

    fn stroke_contains(&self, p: Point) -> bool {
        let half = self.stroke_width / 2.0;
        match &self.shape {
            Shape::Rect { x, y, width, height } => {
                let corners = [
                    Point::new(*x, *y),
                    Point::new(x + width, *y),
                    Point::new(x + width, y + height),
                    Point::new(*x, y + height),
                ];
                near_outline(&corners, true, p, half)
            }
            Shape::Circle { cx, cy, r } => (p.distance(&Point::new(*cx, *cy)) - r).abs() <= half,
            Shape::Polygon { points } => near_outline(points, true, p, half),
            Shape::Polyline { points } => near_outline(points, false, p, half),
        }
    }
}

fn even_odd(points: &[Point], p: Point) -> bool {
    let mut inside = false;
    let n = points.len();
    for i in 0..n {
        let (a, b) = (points[i], points[(i + n - 1) % n]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
    }
    inside
}

fn near_outline(points: &[Point], closed: bool, p: Point, tolerance: f64) -> bool {
    let segments = points.windows(2).map(|w| (w[0], w[1]));
    let closing = match (closed, points.first(), points.last()) {
        (true, Some(first), Some(last)) if points.len() > 2 => Some((*last, *first)),
        _ => None,
    };
    segments
        .chain(closing)
        .any(|(a, b)| segment_distance(a, b, p) <= tolerance)
}

fn segment_distance(a: Point, b: Point, p: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length = dx * dx + dy * dy;
    if length == 0.0 {
        return p.distance(&a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / length).clamp(0.0, 1.0);
    p.distance(&Point::new(a.x + t * dx, a.y + t * dy))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTarget {
    pub id: String,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragEvent<T> {
    Enter { target: String },
    Leave { target: String },
    Drop { target: String, item: T },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragState<T> {
    Idle,
    Dragging {
        item: T,
        /// Pointer in SVG user space
        position: Point,
        over: Option<String>,
    },
}

/// Tracks one in-flight drag item against registered drop targets.
#[derive(Debug, Clone)]
pub struct DragDropContext<T> {
    targets: Vec<DropTarget>,
    screen_ctm: Matrix,
    state: DragState<T>,
}

impl<T: Clone> Default for DragDropContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> DragDropContext<T> {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            screen_ctm: Matrix::IDENTITY,
            state: DragState::Idle,
        }
    }

    /// User space to screen transform of the canvas.
    pub fn set_screen_ctm(&mut self, ctm: Matrix) {
        self.screen_ctm = ctm;
    }

    /// Registers a target; re-registering an id replaces it and moves it on top.
    pub fn register_target(&mut self, id: impl Into<String>, geometry: Geometry) {
        let id = id.into();
        self.targets.retain(|t| t.id != id);
        self.targets.push(DropTarget { id, geometry });
    }

    pub fn unregister_target(&mut self, id: &str) {
        self.targets.retain(|t| t.id != id);
    }

    pub fn state(&self) -> &DragState<T> {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn hovered(&self) -> Option<&str> {
        match &self.state {
            DragState::Dragging { over, .. } => over.as_deref(),
            DragState::Idle => None,
        }
    }

    /// Screen point to SVG user space.
    pub fn to_user_space(&self, screen: Point) -> Option<Point> {
        self.screen_ctm.inverse().map(|m| m.apply(screen))
    }

    /// Topmost target containing the user-space point.
    pub fn hit_test(&self, p: Point) -> Option<&DropTarget> {
        self.targets.iter().rev().find(|t| t.geometry.contains(p))
    }

    /// Start dragging `item`. A drag already in flight is replaced silently.
    pub fn begin_drag(&mut self, item: T, screen: Point) -> Vec<DragEvent<T>> {
        self.state = DragState::Dragging {
            item,
            position: self.to_user_space(screen).unwrap_or_default(),
            over: None,
        };
        self.move_pointer(screen)
    }

    /// Update the pointer; reports leave/enter when the hovered target changes.
    pub fn move_pointer(&mut self, screen: Point) -> Vec<DragEvent<T>> {
        let Some(user) = self.to_user_space(screen) else {
            return Vec::new();
        };
        let hit = self.hit_test(user).map(|t| t.id.clone());
        let DragState::Dragging { position, over, .. } = &mut self.state else {
            return Vec::new();
        };
        *position = user;
        if *over == hit {
            return Vec::new();
        }
        let mut events = Vec::new();
        if let Some(previous) = over.take() {
            events.push(DragEvent::Leave { target: previous });
        }
        if let Some(next) = hit {
            trace!(target_id = %next, "drag entered target");
            events.push(DragEvent::Enter { target: next.clone() });
            *over = Some(next);
        }
        events
    }

    /// Release the pointer. Drops onto the hovered target, if any.
    pub fn drop(&mut self, screen: Point) -> Vec<DragEvent<T>> {
        let mut events = self.move_pointer(screen);
        if let DragState::Dragging { item, over, .. } = std::mem::replace(&mut self.state, DragState::Idle) {
            if let Some(target) = over {
                events.push(DragEvent::Drop { target, item });
            }
        }
        events
    }

    /// Pointer cancel: back to idle without dropping.
    pub fn cancel(&mut self) -> Vec<DragEvent<T>> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Dragging { over: Some(target), .. } => vec![DragEvent::Leave { target }],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Geometry {
        Geometry::filled(Shape::Rect {
            x,
            y,
            width: w,
            height: h,
        })
    }

    #[test]
    fn test_matrix_inverse_round_trip() {
        let m = Matrix {
            a: 2.0,
            b: 0.5,
            c: -1.0,
            d: 3.0,
            e: 10.0,
            f: -4.0,
        };
        let inv = m.inverse().unwrap();
        let p = Point::new(3.0, 7.0);
        let back = inv.apply(m.apply(p));
        assert!((back.x - p.x).abs() < 1e-12 && (back.y - p.y).abs() < 1e-12);
        assert!(Matrix::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_fill_and_stroke_containment() {
        let circle = Geometry::stroked(Shape::Circle { cx: 0.0, cy: 0.0, r: 10.0 }, 2.0);
        assert!(circle.contains(Point::new(10.5, 0.0)));
        assert!(!circle.contains(Point::new(0.0, 0.0)));

        let triangle = Geometry::filled(Shape::Polygon {
            points: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(0.0, 10.0)],
        });
        assert!(triangle.contains(Point::new(2.0, 2.0)));
        assert!(!triangle.contains(Point::new(8.0, 8.0)));

        let line = Geometry::stroked(
            Shape::Polyline {
                points: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
            },
            1.0,
        );
        assert!(line.contains(Point::new(5.0, 0.4)));
        assert!(!line.contains(Point::new(5.0, 1.0)));
    }

    #[test]
    fn test_topmost_target_wins() {
        let mut ctx: DragDropContext<String> = DragDropContext::new();
        ctx.register_target("a1", rect(0.0, 0.0, 100.0, 100.0));
        ctx.register_target("a2", rect(50.0, 50.0, 100.0, 100.0));
        assert_eq!(ctx.hit_test(Point::new(75.0, 75.0)).map(|t| t.id.as_str()), Some("a2"));
        assert_eq!(ctx.hit_test(Point::new(10.0, 10.0)).map(|t| t.id.as_str()), Some("a1"));
    }

    #[test]
    fn test_events_fire_once_per_transition() {
        let mut ctx: DragDropContext<String> = DragDropContext::new();
        ctx.register_target("a1", rect(0.0, 0.0, 10.0, 10.0));
        ctx.register_target("a2", rect(20.0, 0.0, 10.0, 10.0));

        assert!(ctx.begin_drag("t1".to_string(), Point::new(-5.0, -5.0)).is_empty());
        assert_eq!(
            ctx.move_pointer(Point::new(5.0, 5.0)),
            vec![DragEvent::Enter { target: "a1".to_string() }]
        );
        assert!(ctx.move_pointer(Point::new(6.0, 6.0)).is_empty());
        assert_eq!(
            ctx.move_pointer(Point::new(25.0, 5.0)),
            vec![
                DragEvent::Leave { target: "a1".to_string() },
                DragEvent::Enter { target: "a2".to_string() },
            ]
        );
        assert_eq!(
            ctx.drop(Point::new(25.0, 5.0)),
            vec![DragEvent::Drop {
                target: "a2".to_string(),
                item: "t1".to_string(),
            }]
        );
        assert!(!ctx.is_dragging());
        assert!(ctx.drop(Point::new(25.0, 5.0)).is_empty());
    }

    #[test]
    fn test_pointer_mapped_through_inverse_ctm() {
        let mut ctx: DragDropContext<u32> = DragDropContext::new();
        // Canvas zoomed 2x and offset by 100px on screen
        ctx.set_screen_ctm(Matrix {
            e: 100.0,
            ..Matrix::scale(2.0, 2.0)
        });
        ctx.register_target("a1", rect(0.0, 0.0, 10.0, 10.0));
        ctx.begin_drag(7, Point::new(0.0, 0.0));
        assert_eq!(ctx.hovered(), None);
        ctx.move_pointer(Point::new(110.0, 10.0));
        assert_eq!(ctx.hovered(), Some("a1"));
    }

    #[test]
    fn test_cancel_leaves_without_drop() {
        let mut ctx: DragDropContext<u32> = DragDropContext::new();
        ctx.register_target("a1", rect(0.0, 0.0, 10.0, 10.0));
        ctx.begin_drag(1, Point::new(5.0, 5.0));
        assert_eq!(ctx.cancel(), vec![DragEvent::Leave { target: "a1".to_string() }]);
        assert_eq!(ctx.state(), &DragState::Idle);
        assert!(ctx.cancel().is_empty());
    }
}

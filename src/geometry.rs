// src/geometry.rs
//
// Axis-aligned box math shared by the associator, the renderer and the
// capability adapters.

/// Axis-aligned bounding box in pixel coordinates, corner form.
/// Valid boxes have x1 < x2 and y1 < y2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// A box is usable when all coordinates are finite and it has positive
    /// extent on both axes.
    pub fn is_valid(&self) -> bool {
        self.x1.is_finite()
            && self.y1.is_finite()
            && self.x2.is_finite()
            && self.y2.is_finite()
            && self.x2 > self.x1
            && self.y2 > self.y1
    }

    /// Clamp all coordinates into a frame of the given size. May produce a
    /// degenerate box if the original lies fully outside.
    pub fn clamp_to(&self, width: u32, height: u32) -> BBox {
        let w = width as f32;
        let h = height as f32;
        BBox::new(
            self.x1.clamp(0.0, w),
            self.y1.clamp(0.0, h),
            self.x2.clamp(0.0, w),
            self.y2.clamp(0.0, h),
        )
    }

    /// Integer pixel rectangle (x, y, w, h) clipped to the image, for
    /// drawing and for seeding native trackers. `None` when nothing of the
    /// box survives the clip.
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> Option<(i32, i32, u32, u32)> {
        let clamped = self.clamp_to(width, height);
        if !clamped.is_valid() {
            return None;
        }
        let x = clamped.x1.round() as i32;
        let y = clamped.y1.round() as i32;
        let w = (clamped.x2.round() as i32 - x).max(0) as u32;
        let h = (clamped.y2.round() as i32 - y).max(0) as u32;
        if w == 0 || h == 0 {
            return None;
        }
        Some((x, y, w, h))
    }
}

/// Intersection-over-union of two boxes. Degenerate or disjoint pairs score
/// 0.0; identical valid boxes score 1.0.
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter_w = (x2 - x1).max(0.0);
    let inter_h = (y2 - y1).max(0.0);
    let intersection = inter_w * inter_h;

    if intersection <= 0.0 {
        return 0.0;
    }

    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_boxes() {
        let a = BBox::new(10.0, 10.0, 60.0, 110.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_touching_edges_score_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_known_overlap() {
        // 100x100 boxes offset by 50 on one axis: inter 5000, union 15000
        let a = BBox::new(0.0, 0.0, 100.0, 100.0);
        let b = BBox::new(50.0, 0.0, 150.0, 100.0);
        let expected = 5000.0 / 15000.0;
        assert!((iou(&a, &b) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_iou_contained_box() {
        let outer = BBox::new(0.0, 0.0, 100.0, 100.0);
        let inner = BBox::new(25.0, 25.0, 75.0, 75.0);
        assert!((iou(&outer, &inner) - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_iou_symmetry() {
        let a = BBox::new(5.0, 5.0, 55.0, 95.0);
        let b = BBox::new(30.0, 20.0, 80.0, 120.0);
        assert!((iou(&a, &b) - iou(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn test_iou_degenerate_box_scores_zero() {
        let degenerate = BBox::new(10.0, 10.0, 10.0, 40.0);
        let normal = BBox::new(0.0, 0.0, 50.0, 50.0);
        assert_eq!(iou(&degenerate, &normal), 0.0);
        assert_eq!(iou(&degenerate, &degenerate), 0.0);
    }

    #[test]
    fn test_iou_in_unit_range() {
        let a = BBox::new(-20.0, -20.0, 40.0, 35.0);
        let b = BBox::new(0.0, 0.0, 100.0, 100.0);
        let score = iou(&a, &b);
        assert!((0.0..=1.0).contains(&score), "iou out of range: {}", score);
    }

    #[test]
    fn test_validity_checks() {
        assert!(BBox::new(0.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!BBox::new(0.0, 0.0, 0.0, 1.0).is_valid());
        assert!(!BBox::new(10.0, 0.0, 5.0, 1.0).is_valid());
        assert!(!BBox::new(f32::NAN, 0.0, 5.0, 1.0).is_valid());
        assert!(!BBox::new(0.0, 0.0, f32::INFINITY, 1.0).is_valid());
    }

    #[test]
    fn test_clamp_to_frame() {
        let b = BBox::new(-10.0, -5.0, 700.0, 200.0).clamp_to(640, 360);
        assert_eq!(b, BBox::new(0.0, 0.0, 640.0, 200.0));

        // Fully outside collapses to a degenerate edge box
        let gone = BBox::new(700.0, 10.0, 800.0, 50.0).clamp_to(640, 360);
        assert!(!gone.is_valid());
    }

    #[test]
    fn test_to_pixel_rect() {
        let r = BBox::new(10.4, 20.6, 50.0, 80.0).to_pixel_rect(640, 360);
        assert_eq!(r, Some((10, 21, 40, 59)));
        assert_eq!(BBox::new(700.0, 0.0, 800.0, 50.0).to_pixel_rect(640, 360), None);
        assert_eq!(BBox::new(10.0, 10.0, 10.2, 10.2).to_pixel_rect(640, 360), None);
    }

    #[test]
    fn test_box_accessors() {
        let b = BBox::new(10.0, 20.0, 60.0, 120.0);
        assert_eq!(b.width(), 50.0);
        assert_eq!(b.height(), 100.0);
        assert_eq!(b.area(), 5000.0);
        assert_eq!(b.center(), (35.0, 70.0));
    }
}

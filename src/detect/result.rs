/// Axis-aligned box in frame pixel coordinates (top-down rows).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Build from centre coordinates, as detector heads emit them.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn intersection(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }

    /// Intersection over union; 0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clip to a `width` x `height` frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> BoundingBox {
        let x1 = self.x.clamp(0.0, width as f32);
        let y1 = self.y.clamp(0.0, height as f32);
        let x2 = (self.x + self.w).clamp(0.0, width as f32);
        let y2 = (self.y + self.h).clamp(0.0, height as f32);
        BoundingBox::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> BoundingBox {
        BoundingBox::new(self.x * sx, self.y * sy, self.w * sx, self.h * sy)
    }
}

/// One detector hit.
#[derive(Clone, Debug)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
    pub label: String,
}

/// A detection carried across frames under a stable identifier.
#[derive(Clone, Debug)]
pub struct Track {
    pub id: u32,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
    pub label: String,
    /// Number of updates this track has been matched in.
    pub hits: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        assert!((b.iou(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn clamp_keeps_box_inside_frame() {
        let b = BoundingBox::new(-5.0, 90.0, 20.0, 20.0).clamp_to(100, 100);
        assert_eq!(b, BoundingBox::new(0.0, 90.0, 15.0, 10.0));
    }
}

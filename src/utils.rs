//! Utility functions for image processing and coordinate transformations.

pub mod image_conversion;
pub mod safe_cast;

use opencv::core::Rect;
use safe_cast::f32_to_i32_clamp;

/// Expand a face box by `shift` of its size on every side, make it square and
/// keep it inside a `max_width` × `max_height` image
#[must_use]
#[allow(clippy::cast_precision_loss)] // Precision loss acceptable for box dimensions
pub fn refine_box(bbox: Rect, max_width: i32, max_height: i32, shift: f32) -> Rect {
    let x_shift = f32_to_i32_clamp(bbox.width as f32 * shift, 0, max_width);
    let y_shift = f32_to_i32_clamp(bbox.height as f32 * shift, 0, max_height);

    let x = (bbox.x - x_shift).max(0);
    let y = (bbox.y - y_shift).max(0);
    let width = (bbox.width + 2 * x_shift).min(max_width - x);
    let height = (bbox.height + 2 * y_shift).min(max_height - y);

    let side = width.max(height).min(max_width).min(max_height).max(0);
    let x = x.min(max_width - side).max(0);
    let y = y.min(max_height - side).max(0);

    Rect::new(x, y, side, side)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refine_box_expands_and_squares() {
        let refined = refine_box(Rect::new(100, 100, 30, 40), 200, 200, 0.1);
        assert_eq!(refined.width, refined.height);
        assert!(refined.width > 40);
    }

    #[test]
    fn test_refine_box_stays_inside_image() {
        for bbox in [Rect::new(190, 190, 20, 20), Rect::new(0, 0, 10, 10), Rect::new(-5, 50, 300, 20)] {
            let refined = refine_box(bbox, 200, 150, 0.5);
            assert!(refined.x >= 0);
            assert!(refined.y >= 0);
            assert!(refined.x + refined.width <= 200);
            assert!(refined.y + refined.height <= 150);
            assert_eq!(refined.width, refined.height);
        }
    }
}

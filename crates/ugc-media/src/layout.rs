//! Reference-canvas scaling.
//!
//! Layouts (overlay boxes, caption positions, font sizes) are authored against
//! a fixed 9:16 canvas of 1080×1920 and mapped onto whatever the output video
//! actually measures.

/// Reference canvas width.
pub const DESIGN_WIDTH: u32 = 1080;
/// Reference canvas height.
pub const DESIGN_HEIGHT: u32 = 1920;

/// Pixel rectangle on a concrete video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The canvas a layout was designed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesignSpace {
    pub width: u32,
    pub height: u32,
}

impl Default for DesignSpace {
    fn default() -> Self {
        Self {
            width: DESIGN_WIDTH,
            height: DESIGN_HEIGHT,
        }
    }
}

impl DesignSpace {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Map a horizontal design-space length onto a `target_width` video.
    pub fn scale_x(&self, value: f64, target_width: u32) -> f64 {
        value * target_width as f64 / self.width as f64
    }

    pub fn scale_y(&self, value: f64, target_height: u32) -> f64 {
        value * target_height as f64 / self.height as f64
    }

    /// Font sizes follow the smaller of the two axis ratios so text never
    /// overflows a squatter frame. Never below 1pt.
    pub fn scale_font(&self, size: f64, target_width: u32, target_height: u32) -> u32 {
        let ratio = (target_width as f64 / self.width as f64).min(target_height as f64 / self.height as f64);
        (size * ratio).round().max(1.0) as u32
    }

    /// Convert a rectangle given in percent of the frame into pixels on the
    /// target video, clamped to the frame and rounded to even sizes.
    pub fn percent_rect_to_pixels(
        &self,
        x_percent: f64,
        y_percent: f64,
        w_percent: f64,
        h_percent: f64,
        target_width: u32,
        target_height: u32,
    ) -> PixelRect {
        let pct = |v: f64| if v.is_finite() { v.clamp(0.0, 100.0) / 100.0 } else { 0.0 };
        let tw = target_width as f64;
        let th = target_height as f64;

        let x = ((pct(x_percent) * tw).round() as u32).min(target_width);
        let y = ((pct(y_percent) * th).round() as u32).min(target_height);
        let width = make_even((pct(w_percent) * tw).round() as u32).min(make_even(target_width - x));
        let height = make_even((pct(h_percent) * th).round() as u32).min(make_even(target_height - y));

        PixelRect { x, y, width, height }
    }
}

/// Round down to an even value (libx264 needs even dimensions).
#[inline]
pub fn make_even(value: u32) -> u32 {
    value & !1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_on_reference_canvas() {
        let space = DesignSpace::default();
        assert_eq!(space.scale_x(540.0, 1080), 540.0);
        assert_eq!(space.scale_y(960.0, 1920), 960.0);
        assert_eq!(space.scale_font(48.0, 1080, 1920), 48);
    }

    #[test]
    fn test_half_resolution() {
        let space = DesignSpace::default();
        assert_eq!(space.scale_x(100.0, 540), 50.0);
        assert_eq!(space.scale_y(100.0, 960), 50.0);
        assert_eq!(space.scale_font(48.0, 540, 960), 24);
    }

    #[test]
    fn test_font_uses_tighter_axis() {
        let space = DesignSpace::default();
        // Landscape target: height ratio 0.5625 is tighter than width ratio 1.78.
        assert_eq!(space.scale_font(64.0, 1920, 1080), 36);
        assert_eq!(space.scale_font(0.2, 1920, 1080), 1);
    }

    #[test]
    fn test_percent_rect() {
        let space = DesignSpace::default();
        let rect = space.percent_rect_to_pixels(10.0, 50.0, 80.0, 25.0, 1080, 1920);
        assert_eq!(rect, PixelRect { x: 108, y: 960, width: 864, height: 480 });
    }

    #[test]
    fn test_percent_rect_clamped_to_frame() {
        let space = DesignSpace::default();
        let rect = space.percent_rect_to_pixels(90.0, 95.0, 50.0, 50.0, 1080, 1920);
        assert!(rect.x + rect.width <= 1080);
        assert!(rect.y + rect.height <= 1920);
        assert_eq!(rect.width % 2, 0);

        let rect = space.percent_rect_to_pixels(-5.0, f64::NAN, 150.0, 10.0, 101, 55);
        assert_eq!((rect.x, rect.y), (0, 0));
        assert_eq!(rect.width, 100);
    }

    #[test]
    fn test_degenerate_canvas() {
        let space = DesignSpace::new(0, 0);
        assert_eq!(space.width, 1);
        assert!(space.scale_x(1.0, 10).is_finite());
    }
}

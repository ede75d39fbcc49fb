use egui::{Color32, Pos2, Rect, Vec2};

use super::canvas::{
    MAX_BLOCK_HEIGHT, MAX_BLOCK_WIDTH, MIN_BLOCK_HEIGHT, MIN_BLOCK_WIDTH, clamp_block_size,
};

pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 3.0;
// Multiplicative zoom change per wheel notch
pub const ZOOM_STEP: f32 = 1.1;

/// Fixed display palette for blocks, cycled in creation order.
pub const BLOCK_PALETTE: [Color32; 6] = [
    Color32::from_rgb(255, 236, 179),
    Color32::from_rgb(197, 225, 165),
    Color32::from_rgb(179, 229, 252),
    Color32::from_rgb(248, 187, 208),
    Color32::from_rgb(209, 196, 233),
    Color32::from_rgb(255, 204, 188),
];

pub fn palette_color(index: usize) -> Color32 {
    BLOCK_PALETTE[index % BLOCK_PALETTE.len()]
}

/// Pan/zoom state for one canvas. Zoom scales about the canvas-rect center,
/// pan is applied in screen space, so screen↔world conversion round-trips.
#[derive(Clone, Copy, Debug)]
pub struct Viewport {
    pub pan: Vec2,
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn to_screen(&self, canvas: Rect, world: Pos2) -> Pos2 {
        let c = canvas.center();
        Pos2::new(
            (world.x - c.x) * self.zoom + c.x + self.pan.x,
            (world.y - c.y) * self.zoom + c.y + self.pan.y,
        )
    }

    pub fn from_screen(&self, canvas: Rect, screen: Pos2) -> Pos2 {
        let c = canvas.center();
        Pos2::new(
            ((screen.x - self.pan.x) - c.x) / self.zoom + c.x,
            ((screen.y - self.pan.y) - c.y) / self.zoom + c.y,
        )
    }

    /// World coordinate currently shown at the middle of the canvas rect.
    pub fn visible_center(&self, canvas: Rect) -> Pos2 {
        self.from_screen(canvas, canvas.center())
    }

    /// Multiply zoom by `factor`, clamped to the allowed range.
    pub fn zoom_by(&mut self, factor: f32) {
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Wheel input, in notches (positive zooms in).
    pub fn zoom_notches(&mut self, notches: f32) {
        self.zoom_by(ZOOM_STEP.powf(notches));
    }
}

/// Heuristic size for a freshly dropped block: wider and taller for longer
/// text, monotonically non-decreasing in the text length, capped at the block
/// size bounds.
pub fn block_size_for_text(text: &str) -> Vec2 {
    let chars = text.chars().count() as f32;
    let width = (MIN_BLOCK_WIDTH + chars * 1.8).clamp(MIN_BLOCK_WIDTH, MAX_BLOCK_WIDTH);
    // Rough wrapped-line estimate at ~8px per character
    let lines = (chars * 8.0 / width).ceil().max(1.0);
    let height = (60.0 + lines * 22.0).clamp(MIN_BLOCK_HEIGHT, MAX_BLOCK_HEIGHT);
    clamp_block_size(Vec2::new(width, height))
}

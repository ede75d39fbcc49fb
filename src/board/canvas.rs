use std::time::{Duration, Instant};

use egui::{Pos2, Rect, Vec2};
use time::OffsetDateTime;
use uuid::Uuid;

use super::view;

// Basic type aliases for clarity
pub type BlockId = Uuid;
pub type CanvasId = Uuid;

// Block size bounds (world units)
pub const MIN_BLOCK_WIDTH: f32 = 200.0;
pub const MAX_BLOCK_WIDTH: f32 = 600.0;
pub const MIN_BLOCK_HEIGHT: f32 = 100.0;
pub const MAX_BLOCK_HEIGHT: f32 = 500.0;

// Working-copy edits are committed back to the canvas list after this much quiet time
pub const COMMIT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Back-reference from a block to the chat message it was spawned from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: Uuid,
    pub message_id: Uuid,
}

#[derive(Clone, Debug)]
pub struct TextBlock {
    pub id: BlockId,
    pub text: String,
    // world-space top-left corner
    pub pos: Pos2,
    pub size: Vec2,
    // index into the fixed display palette, assigned cyclically at creation
    pub color_index: usize,
    pub source: Option<MessageRef>,
}

impl TextBlock {
    pub fn rect(&self) -> Rect {
        Rect::from_min_size(self.pos, self.size)
    }

    pub fn center(&self) -> Pos2 {
        self.rect().center()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectorStyle {
    Straight,
    #[default]
    Curved,
    Angled,
}

#[derive(Clone, Debug)]
pub struct Connection {
    pub id: Uuid,
    pub from_block: BlockId,
    pub to_block: BlockId,
    // Cached endpoint coordinates. Seeded from the clicked handle (from) and the
    // target block center (to); snapped to the block center whenever an endpoint
    // block moves or resizes.
    pub from_point: Pos2,
    pub to_point: Pos2,
    pub style: ConnectorStyle,
    pub label: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Canvas {
    pub id: CanvasId,
    pub title: String,
    pub blocks: Vec<TextBlock>,
    pub connections: Vec<Connection>,
    pub created_at: OffsetDateTime,
    pub modified_at: OffsetDateTime,
}

impl Canvas {
    pub fn new(title: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Canvas {
            id: Uuid::now_v7(),
            title: title.into(),
            blocks: Vec::new(),
            connections: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    // Add a block and return its new ID; size is clamped to the documented bounds
    pub fn add_block(
        &mut self,
        text: String,
        pos: Pos2,
        size: Vec2,
        source: Option<MessageRef>,
    ) -> BlockId {
        let id = Uuid::now_v7();
        let color_index = self.blocks.len() % view::BLOCK_PALETTE.len();
        self.blocks.push(TextBlock {
            id,
            text,
            pos,
            size: clamp_block_size(size),
            color_index,
            source,
        });
        id
    }

    pub fn block(&self, id: BlockId) -> Option<&TextBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut TextBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    pub fn move_block(&mut self, id: BlockId, pos: Pos2) -> bool {
        if let Some(b) = self.block_mut(id) {
            b.pos = pos;
            self.refresh_endpoints(id);
            true
        } else {
            false
        }
    }

    pub fn resize_block(&mut self, id: BlockId, size: Vec2) -> bool {
        if let Some(b) = self.block_mut(id) {
            b.size = clamp_block_size(size);
            self.refresh_endpoints(id);
            true
        } else {
            false
        }
    }

    pub fn remove_block(&mut self, id: BlockId) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|b| b.id != id);
        if self.blocks.len() == before {
            return false;
        }
        // Cascade delete connections touching this block
        self.connections
            .retain(|c| c.from_block != id && c.to_block != id);
        true
    }

    // Add a connection if both ends exist and differ; returns the connection ID.
    // `from_point` is the exact handle coordinate the gesture started on; the
    // target endpoint is cached as the destination block's geometric center.
    pub fn add_connection(
        &mut self,
        from_block: BlockId,
        to_block: BlockId,
        from_point: Pos2,
        style: ConnectorStyle,
    ) -> Option<Uuid> {
        if from_block == to_block {
            return None;
        }
        let to_point = self.block(to_block)?.center();
        self.block(from_block)?;
        let id = Uuid::now_v7();
        self.connections.push(Connection {
            id,
            from_block,
            to_block,
            from_point,
            to_point,
            style,
            label: None,
        });
        Some(id)
    }

    pub fn connection(&self, id: Uuid) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }

    pub fn connection_mut(&mut self, id: Uuid) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|c| c.id == id)
    }

    pub fn remove_connection(&mut self, id: Uuid) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c.id != id);
        self.connections.len() != before
    }

    // Snap cached endpoints of every connection touching `id` to the block's
    // current center. Called after each move/resize step.
    fn refresh_endpoints(&mut self, id: BlockId) {
        let Some(center) = self.block(id).map(TextBlock::center) else {
            return;
        };
        for c in self.connections.iter_mut() {
            if c.from_block == id {
                c.from_point = center;
            }
            if c.to_block == id {
                c.to_point = center;
            }
        }
    }
}

/// The canvas list plus the live working copy of the active canvas.
///
/// Edits land in the working copy and are written back into the list once the
/// debounce window elapses without further changes; switching canvases flushes
/// first so nothing is lost.
pub struct BoardStore {
    canvases: Vec<Canvas>,
    active: CanvasId,
    working: Canvas,
    dirty: bool,
    last_change: Instant,
}

impl BoardStore {
    pub fn new() -> Self {
        let first = Canvas::new("Canvas 1");
        let active = first.id;
        let working = first.clone();
        BoardStore {
            canvases: vec![first],
            active,
            working,
            dirty: false,
            last_change: Instant::now(),
        }
    }

    pub fn canvases(&self) -> &[Canvas] {
        &self.canvases
    }

    pub fn active_id(&self) -> CanvasId {
        self.active
    }

    /// The live working copy of the active canvas.
    pub fn working(&self) -> &Canvas {
        &self.working
    }

    /// Mutable access to the working copy. Callers that change anything must
    /// follow up with [`BoardStore::mark_dirty`].
    pub fn working_mut(&mut self) -> &mut Canvas {
        &mut self.working
    }

    pub fn create_canvas(&mut self, title: impl Into<String>) -> CanvasId {
        self.flush();
        let canvas = Canvas::new(title);
        let id = canvas.id;
        self.canvases.push(canvas);
        self.select_canvas(id);
        id
    }

    /// Switch the active canvas, swapping the working copy. Pending edits are
    /// committed to the outgoing canvas first.
    pub fn select_canvas(&mut self, id: CanvasId) -> bool {
        let Some(target) = self.canvases.iter().find(|c| c.id == id) else {
            return false;
        };
        if id == self.active {
            return true;
        }
        let target = target.clone();
        self.flush();
        self.active = id;
        self.working = target;
        true
    }

    /// Delete a canvas. Deleting the sole remaining canvas is a no-op; deleting
    /// the active one selects the first survivor.
    pub fn delete_canvas(&mut self, id: CanvasId) -> bool {
        if self.canvases.len() <= 1 {
            return false;
        }
        let before = self.canvases.len();
        self.canvases.retain(|c| c.id != id);
        if self.canvases.len() == before {
            return false;
        }
        if id == self.active {
            let fallback = self.canvases[0].clone();
            self.active = fallback.id;
            self.working = fallback;
            self.dirty = false;
        }
        true
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.last_change = Instant::now();
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Commit the working copy once the debounce window has elapsed.
    pub fn maybe_commit(&mut self, now: Instant) -> bool {
        if self.dirty && now.duration_since(self.last_change) >= COMMIT_DEBOUNCE {
            self.flush();
            true
        } else {
            false
        }
    }

    /// Commit immediately, regardless of the debounce window.
    pub fn flush(&mut self) {
        if !self.dirty {
            return;
        }
        self.working.modified_at = OffsetDateTime::now_utc();
        if let Some(slot) = self.canvases.iter_mut().find(|c| c.id == self.active) {
            *slot = self.working.clone();
        }
        self.dirty = false;
    }
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new()
    }
}

pub fn clamp_block_size(size: Vec2) -> Vec2 {
    Vec2::new(
        size.x.clamp(MIN_BLOCK_WIDTH, MAX_BLOCK_WIDTH),
        size.y.clamp(MIN_BLOCK_HEIGHT, MAX_BLOCK_HEIGHT),
    )
}

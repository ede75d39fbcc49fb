#![allow(clippy::collapsible_if)]
use std::collections::HashMap;
use std::time::{Duration, Instant};

use eframe::egui::{
    self, Align, Align2, Color32, CornerRadius, FontId, Key, KeyboardShortcut, Modifiers, Pos2,
    Rect, RichText, ScrollArea, Sense, Stroke, StrokeKind, Vec2,
};
use time::macros::format_description;
use uuid::Uuid;

use crate::board::canvas::{
    BlockId, BoardStore, COMMIT_DEBOUNCE, CanvasId, ConnectorStyle, MessageRef,
};
use crate::board::view::{self, Viewport, block_size_for_text};
use crate::bridge::{DragBridge, DragPayload};
use crate::chat::session::{Author, ChatId, ChatStore, MessageId};
use crate::persistence::settings::{AppSettings, Theme};

// Clicking a block with a recorded source pulses the message for this long
const HIGHLIGHT_PULSE: Duration = Duration::from_secs(2);
// Transient zoom factor readout after scrolling
const ZOOM_HUD: Duration = Duration::from_millis(1000);

const SC_TOGGLE_SIDEBAR: KeyboardShortcut = KeyboardShortcut::new(Modifiers::COMMAND, Key::B);
const SC_NEW_CHAT: KeyboardShortcut = KeyboardShortcut::new(Modifiers::COMMAND, Key::N);
const SC_NEW_CANVAS: KeyboardShortcut =
    KeyboardShortcut::new(Modifiers::COMMAND.plus(Modifiers::SHIFT), Key::N);
const SC_CANVAS_SWITCHER: KeyboardShortcut = KeyboardShortcut::new(Modifiers::COMMAND, Key::K);
const SC_FOCUS_SEARCH: KeyboardShortcut = KeyboardShortcut::new(Modifiers::COMMAND, Key::F);
const SC_PREV_CHAT: KeyboardShortcut = KeyboardShortcut::new(Modifiers::ALT, Key::ArrowUp);
const SC_NEXT_CHAT: KeyboardShortcut = KeyboardShortcut::new(Modifiers::ALT, Key::ArrowDown);

// Mutually exclusive pointer modes over the canvas
#[derive(Clone, Copy, Debug, PartialEq)]
enum PointerMode {
    Idle,
    Panning,
    DraggingBlock(BlockId),
    ResizingBlock(BlockId),
    // Armed after clicking a connection handle; completed by clicking another
    // block's body, cancelled by clicking empty canvas.
    Connecting { from: BlockId, from_point: Pos2 },
}

#[derive(Clone, Copy)]
struct HighlightPulse {
    chat_id: ChatId,
    message_id: MessageId,
    until: Instant,
}

pub struct BoardApp {
    chat: ChatStore,
    store: BoardStore,
    bridge: DragBridge,
    // per-canvas pan/zoom
    viewports: HashMap<CanvasId, Viewport>,
    mode: PointerMode,
    settings: AppSettings,
    // chrome state
    sidebar_open: bool,
    show_canvas_switcher: bool,
    switcher_needs_focus: bool,
    canvas_search: String,
    input_buffer: String,
    // chat↔canvas glue
    message_drag: Option<DragPayload>,
    scroll_to_message: Option<MessageId>,
    scroll_to_bottom: bool,
    highlight: Option<HighlightPulse>,
    // canvas extras
    open_connection: Option<Uuid>,
    connection_label_edit: String,
    zoom_hud_until: Option<Instant>,
    last_canvas_rect: Option<Rect>,
}

impl BoardApp {
    pub fn new() -> Self {
        let settings = AppSettings::load_or_default();
        Self {
            chat: ChatStore::new(),
            store: BoardStore::new(),
            bridge: DragBridge::new(),
            viewports: HashMap::new(),
            mode: PointerMode::Idle,
            settings,
            sidebar_open: true,
            show_canvas_switcher: false,
            switcher_needs_focus: false,
            canvas_search: String::new(),
            input_buffer: String::new(),
            message_drag: None,
            scroll_to_message: None,
            scroll_to_bottom: true,
            highlight: None,
            open_connection: None,
            connection_label_edit: String::new(),
            zoom_hud_until: None,
            last_canvas_rect: None,
        }
    }

    fn viewport(&self) -> Viewport {
        self.viewports
            .get(&self.store.active_id())
            .copied()
            .unwrap_or_default()
    }

    fn set_viewport(&mut self, vp: Viewport) {
        self.viewports.insert(self.store.active_id(), vp);
    }

    // Switching the active chat clears the pending highlight and any pending
    // drag transfer.
    fn select_chat(&mut self, id: ChatId) {
        if self.chat.select(id) {
            self.highlight = None;
            self.bridge.cancel();
            self.scroll_to_bottom = true;
        }
    }

    fn create_chat(&mut self) {
        self.chat.create_session();
        self.highlight = None;
        self.bridge.cancel();
        self.scroll_to_bottom = true;
    }

    fn cycle_chat(&mut self, offset: isize) {
        self.chat.select_adjacent(offset);
        self.highlight = None;
        self.bridge.cancel();
        self.scroll_to_bottom = true;
    }

    fn create_canvas(&mut self) {
        let title = format!("Canvas {}", self.store.canvases().len() + 1);
        self.store.create_canvas(title);
        self.mode = PointerMode::Idle;
        self.open_connection = None;
    }

    // Jump the chat panel to the message a block was spawned from and pulse a
    // highlight on it.
    fn jump_to_message(&mut self, src: MessageRef) {
        if self.chat.message(src.chat_id, src.message_id).is_none() {
            return;
        }
        self.select_chat(src.chat_id);
        self.scroll_to_message = Some(src.message_id);
        self.scroll_to_bottom = false;
        self.highlight = Some(HighlightPulse {
            chat_id: src.chat_id,
            message_id: src.message_id,
            until: Instant::now() + HIGHLIGHT_PULSE,
        });
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.input_mut(|i| i.consume_shortcut(&SC_TOGGLE_SIDEBAR)) {
            self.sidebar_open = !self.sidebar_open;
        }
        if ctx.input_mut(|i| i.consume_shortcut(&SC_NEW_CANVAS)) {
            self.create_canvas();
        }
        if ctx.input_mut(|i| i.consume_shortcut(&SC_NEW_CHAT)) {
            self.create_chat();
        }
        if ctx.input_mut(|i| i.consume_shortcut(&SC_CANVAS_SWITCHER)) {
            self.show_canvas_switcher = !self.show_canvas_switcher;
            self.switcher_needs_focus = self.show_canvas_switcher;
        }
        if ctx.input_mut(|i| i.consume_shortcut(&SC_FOCUS_SEARCH)) {
            if !self.show_canvas_switcher {
                self.show_canvas_switcher = true;
            }
            self.switcher_needs_focus = true;
        }
        if ctx.input_mut(|i| i.consume_shortcut(&SC_PREV_CHAT)) {
            self.cycle_chat(-1);
        }
        if ctx.input_mut(|i| i.consume_shortcut(&SC_NEXT_CHAT)) {
            self.cycle_chat(1);
        }
        // Escape closes the topmost transient thing
        if ctx.input(|i| i.key_pressed(Key::Escape)) {
            if self.show_canvas_switcher {
                self.show_canvas_switcher = false;
            } else if self.open_connection.is_some() {
                self.open_connection = None;
            } else if matches!(self.mode, PointerMode::Connecting { .. }) {
                self.mode = PointerMode::Idle;
            } else {
                self.highlight = None;
            }
        }
    }

    fn render_top_bar(&mut self, ctx: &egui::Context) {
        let canvas_title = self
            .store
            .canvases()
            .iter()
            .find(|c| c.id == self.store.active_id())
            .map(|c| c.title.clone())
            .unwrap_or_default();
        let zoom = self.viewport().zoom;
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .button("☰")
                    .on_hover_text("Toggle chat sidebar (Ctrl+B)")
                    .clicked()
                {
                    self.sidebar_open = !self.sidebar_open;
                }
                ui.strong("ChatBoard");
                ui.separator();
                if ui
                    .button(format!("{canvas_title} ▾"))
                    .on_hover_text("Switch canvas (Ctrl+K)")
                    .clicked()
                {
                    self.show_canvas_switcher = !self.show_canvas_switcher;
                    self.switcher_needs_focus = self.show_canvas_switcher;
                }
                ui.small(format!("{:.0}%", zoom * 100.0));
                ui.with_layout(egui::Layout::right_to_left(Align::Center), |ui| {
                    let icon = match self.settings.theme {
                        Theme::Dark => "☀",
                        Theme::Light => "🌙",
                    };
                    if ui.button(icon).on_hover_text("Toggle theme").clicked() {
                        self.settings.theme = match self.settings.theme {
                            Theme::Dark => Theme::Light,
                            Theme::Light => Theme::Dark,
                        };
                        self.settings.save_or_warn();
                    }
                });
            });
        });
    }

    fn render_chat_panel(&mut self, ctx: &egui::Context) {
        let panel = egui::SidePanel::left("chat_panel")
            .resizable(true)
            .default_width(self.settings.left_panel_width)
            .width_range(240.0..=640.0)
            .show(ctx, |ui| {
                self.render_sessions_sidebar(ui);
                ui.separator();
                self.render_input_dock_and_transcript(ui);
            });
        // Persist the panel width once the resize drag has ended
        let width = panel.response.rect.width();
        if (width - self.settings.left_panel_width).abs() > 1.0
            && !ctx.input(|i| i.pointer.any_down())
        {
            self.settings.left_panel_width = width;
            self.settings.save_or_warn();
        }
    }

    fn render_sessions_sidebar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let arrow = if self.sidebar_open { "▾" } else { "▸" };
            if ui.button(arrow).on_hover_text("Collapse session list").clicked() {
                self.sidebar_open = !self.sidebar_open;
            }
            ui.strong("Chats");
            ui.with_layout(egui::Layout::right_to_left(Align::Center), |ui| {
                if ui.button("＋").on_hover_text("New chat (Ctrl+N)").clicked() {
                    self.create_chat();
                }
            });
        });
        if !self.sidebar_open {
            return;
        }

        let active = self.chat.active_id();
        let sole = self.chat.sessions().len() <= 1;
        let rows: Vec<(ChatId, String, u32)> = self
            .chat
            .sessions()
            .iter()
            .map(|s| (s.id, s.title.clone(), s.unread))
            .collect();

        let mut select: Option<ChatId> = None;
        let mut delete: Option<ChatId> = None;
        ScrollArea::vertical()
            .id_salt("chat_sessions")
            .max_height(140.0)
            .show(ui, |ui| {
                for (id, title, unread) in &rows {
                    ui.horizontal(|ui| {
                        if ui.selectable_label(*id == active, title).clicked() {
                            select = Some(*id);
                        }
                        if *unread > 0 {
                            ui.small(
                                RichText::new(format!("●{unread}"))
                                    .color(Color32::from_rgb(120, 200, 255)),
                            );
                        }
                        ui.with_layout(egui::Layout::right_to_left(Align::Center), |ui| {
                            if ui
                                .add_enabled(!sole, egui::Button::new("✕").small())
                                .on_hover_text("Delete chat")
                                .clicked()
                            {
                                delete = Some(*id);
                            }
                        });
                    });
                }
            });
        if let Some(id) = select {
            self.select_chat(id);
        }
        if let Some(id) = delete {
            // Guarded: deleting the sole remaining chat is a no-op
            if self.chat.delete_session(id) && id == active {
                self.highlight = None;
                self.bridge.cancel();
                self.scroll_to_bottom = true;
            }
        }
    }

    fn render_input_dock_and_transcript(&mut self, ui: &mut egui::Ui) {
        let transcript_height = (ui.available_height() - 64.0).max(120.0);
        self.render_transcript(ui, transcript_height);
        ui.separator();

        let mut send_now = false;
        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.input_buffer)
                    .desired_width(ui.available_width() - 56.0)
                    .hint_text("Type a message..."),
            );
            if response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter)) {
                send_now = true;
                response.request_focus();
            }
            let clicked = ui
                .add_enabled(
                    !self.input_buffer.trim().is_empty(),
                    egui::Button::new("Send"),
                )
                .clicked();
            send_now |= clicked;
        });
        if send_now {
            let prompt = self.input_buffer.trim().to_string();
            if !prompt.is_empty() {
                self.chat.push_user_message(prompt);
                self.input_buffer.clear();
                self.scroll_to_bottom = true;
            }
        }
    }

    fn render_transcript(&mut self, ui: &mut egui::Ui, height: f32) {
        let now = Instant::now();
        let active_id = self.chat.active_id();
        let scroll_target = self.scroll_to_message.take();
        let highlight = self.highlight;
        let scroll_to_bottom = self.scroll_to_bottom;
        let max_bubble = (ui.available_width() * 0.85).max(120.0);

        let mut drag_start: Option<DragPayload> = None;
        let mut pin_to_canvas: Option<DragPayload> = None;

        let session = self.chat.active();
        ScrollArea::vertical()
            .id_salt("chat_transcript")
            .auto_shrink([false, false])
            .max_height(height)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                if session.messages.is_empty() {
                    ui.add_space(12.0);
                    ui.weak("No messages yet. Say something, then drag it onto the canvas.");
                }
                let fmt = format_description!("[hour]:[minute]");
                for m in &session.messages {
                    let is_user = m.author == Author::User;
                    let (author, fill) = if is_user {
                        ("You", ui.visuals().code_bg_color)
                    } else {
                        ("Assistant", ui.visuals().faint_bg_color)
                    };
                    let highlighted = highlight
                        .filter(|h| {
                            h.chat_id == active_id && h.message_id == m.id && h.until > now
                        })
                        .is_some();
                    let stroke = if highlighted {
                        Stroke::new(2.0, Color32::from_rgb(255, 200, 80))
                    } else {
                        Stroke::new(1.0, ui.visuals().widgets.noninteractive.bg_stroke.color)
                    };
                    let layout = if is_user {
                        egui::Layout::top_down(Align::Max)
                    } else {
                        egui::Layout::top_down(Align::Min)
                    };
                    ui.with_layout(layout, |ui| {
                        let bubble = egui::Frame::group(ui.style())
                            .fill(fill)
                            .stroke(stroke)
                            .corner_radius(CornerRadius::same(8))
                            .inner_margin(egui::Margin::symmetric(8, 6))
                            .show(ui, |ui| {
                                ui.set_max_width(max_bubble);
                                let mut pinned = false;
                                ui.horizontal(|ui| {
                                    ui.small(RichText::new(author).strong());
                                    let stamp = m
                                        .sent_at
                                        .format(fmt)
                                        .unwrap_or_else(|_| "--:--".to_string());
                                    ui.small(stamp);
                                    if ui
                                        .small_button("📌")
                                        .on_hover_text("Send to canvas")
                                        .clicked()
                                    {
                                        pinned = true;
                                    }
                                });
                                ui.label(&m.text);
                                pinned
                            });
                        let payload = DragPayload {
                            text: m.text.clone(),
                            message_id: m.id,
                            chat_id: active_id,
                        };
                        if bubble.inner {
                            pin_to_canvas = Some(payload.clone());
                        }
                        let resp = bubble.response.interact(Sense::click_and_drag());
                        if resp.drag_started() {
                            drag_start = Some(payload);
                        }
                        if scroll_target == Some(m.id) {
                            resp.scroll_to_me(Some(Align::Center));
                        }
                    });
                    ui.add_space(4.0);
                }
                if scroll_to_bottom {
                    ui.scroll_to_cursor(Some(Align::BOTTOM));
                }
            });
        self.scroll_to_bottom = false;

        if let Some(payload) = drag_start {
            self.message_drag = Some(payload);
        }
        if let Some(payload) = pin_to_canvas {
            self.bridge.begin(payload);
        }
    }

    fn render_canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            // Keep the view stable when the chat panel resizes the canvas rect
            let prev_rect = self.last_canvas_rect;
            let available = ui.available_rect_before_wrap();
            let mut vp = self.viewport();
            if let Some(prev) = prev_rect {
                if prev != available {
                    let dc = available.center() - prev.center();
                    vp.pan += dc * (vp.zoom - 1.0);
                }
            }
            self.last_canvas_rect = Some(available);

            // Background gets what block interactions leave over
            let bg_resp = ui.allocate_rect(available, Sense::click_and_drag());

            // A message dragged from the chat side completes the transfer when
            // released over the canvas; released anywhere else it just clears.
            if self.message_drag.is_some() && ctx.input(|i| i.pointer.primary_released()) {
                let over_canvas = ctx
                    .pointer_latest_pos()
                    .map(|p| available.contains(p))
                    .unwrap_or(false);
                let payload = self.message_drag.take();
                if over_canvas {
                    if let Some(payload) = payload {
                        self.bridge.begin(payload);
                    }
                }
            }

            // Consume the pending transfer: one new block, centered in the
            // visible viewport, sized from the text.
            if let Some(payload) = self.bridge.take() {
                let size = block_size_for_text(&payload.text);
                let center = vp.visible_center(available);
                let pos = center - size * 0.5;
                let source = MessageRef {
                    chat_id: payload.chat_id,
                    message_id: payload.message_id,
                };
                self.store
                    .working_mut()
                    .add_block(payload.text, pos, size, Some(source));
                self.store.mark_dirty();
            }

            // Zoom with scroll only when the pointer is over the canvas area
            if bg_resp.hovered() {
                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll != 0.0 {
                    vp.zoom_notches(scroll / 50.0);
                    self.zoom_hud_until = Some(Instant::now() + ZOOM_HUD);
                    ui.ctx().request_repaint_after(Duration::from_millis(16));
                }
            }

            // Background drag pans; starting one disarms a pending connection
            if bg_resp.drag_started() {
                self.mode = PointerMode::Panning;
            }
            if bg_resp.dragged() && self.mode == PointerMode::Panning {
                vp.pan += bg_resp.drag_delta();
            }
            if bg_resp.drag_stopped() && self.mode == PointerMode::Panning {
                self.mode = PointerMode::Idle;
            }
            if bg_resp.clicked() {
                if matches!(self.mode, PointerMode::Connecting { .. }) {
                    self.mode = PointerMode::Idle;
                }
            }

            let painter = ui.painter_at(available);
            let dark = ui.visuals().dark_mode;
            paint_grid(&painter, available, vp, dark);

            // Snapshots keep the paint/interact loops free of store borrows
            let blocks: Vec<(BlockId, Rect, usize, String, Option<MessageRef>)> = self
                .store
                .working()
                .blocks
                .iter()
                .map(|b| (b.id, b.rect(), b.color_index, b.text.clone(), b.source))
                .collect();
            let connections: Vec<(Uuid, Pos2, Pos2, ConnectorStyle, Option<String>)> = self
                .store
                .working()
                .connections
                .iter()
                .map(|c| (c.id, c.from_point, c.to_point, c.style, c.label.clone()))
                .collect();

            if blocks.is_empty() {
                let hint = "Drag a chat message here to pin it as a block";
                painter.text(
                    available.center(),
                    Align2::CENTER_CENTER,
                    hint,
                    FontId::proportional(15.0),
                    ui.visuals().weak_text_color(),
                );
            }

            // Connections first so blocks draw on top
            let base_color = if dark {
                Color32::from_rgba_premultiplied(170, 170, 170, 200)
            } else {
                Color32::from_rgba_premultiplied(110, 110, 110, 200)
            };
            for (cid, from_w, to_w, style, label) in &connections {
                let a = vp.to_screen(available, *from_w);
                let b = vp.to_screen(available, *to_w);
                let selected = self.open_connection == Some(*cid);
                let stroke = if selected {
                    Stroke::new(2.5, Color32::from_rgb(255, 200, 80))
                } else {
                    Stroke::new(1.5, base_color)
                };
                let mid = paint_connection(&painter, a, b, *style, stroke);
                paint_arrowhead(&painter, a, b, *style, (7.0 * vp.zoom).clamp(4.0, 12.0), stroke);

                if let Some(label) = label {
                    if !label.is_empty() {
                        let font = FontId::proportional((12.0 * vp.zoom).clamp(8.0, 16.0));
                        let galley = painter.layout_no_wrap(label.clone(), font, stroke.color);
                        let pad = Vec2::new(6.0 * vp.zoom, 3.0 * vp.zoom);
                        let rect =
                            Rect::from_center_size(mid + Vec2::new(0.0, -12.0), galley.size() + pad * 2.0);
                        painter.rect_filled(
                            rect,
                            6.0 * vp.zoom,
                            if dark {
                                Color32::from_rgba_premultiplied(25, 25, 25, 220)
                            } else {
                                Color32::from_rgba_premultiplied(245, 245, 245, 220)
                            },
                        );
                        painter.galley(rect.min + pad, galley, stroke.color);
                    }
                }

                // Midpoint dot opens the connection editor
                let dot_resp =
                    ui.allocate_rect(Rect::from_center_size(mid, Vec2::splat(12.0)), Sense::click());
                let dot_r = if dot_resp.hovered() { 5.0 } else { 3.0 };
                painter.circle_filled(mid, dot_r, stroke.color);
                if dot_resp.clicked() {
                    self.open_connection = Some(*cid);
                    self.connection_label_edit = label.clone().unwrap_or_default();
                }
            }

            // Blocks: draw and interact
            let text_color = Color32::from_rgb(35, 35, 35);
            for (id, wrect, color_index, text, source) in &blocks {
                let srect = Rect::from_min_max(
                    vp.to_screen(available, wrect.min),
                    vp.to_screen(available, wrect.max),
                );
                if !available.intersects(srect) {
                    continue;
                }
                let resp = ui.allocate_rect(srect, Sense::click_and_drag());

                let armed_from = matches!(self.mode, PointerMode::Connecting { from, .. } if from == *id);
                let rounding = (6.0 * vp.zoom).clamp(2.0, 10.0);
                painter.rect_filled(srect, rounding, view::palette_color(*color_index));
                let stroke = if armed_from {
                    Stroke::new(2.5, Color32::from_rgb(80, 220, 120))
                } else if resp.hovered() {
                    Stroke::new(2.0, Color32::from_rgb(120, 200, 255))
                } else {
                    Stroke::new(1.0, Color32::from_rgba_premultiplied(0, 0, 0, 60))
                };
                painter.rect_stroke(srect, rounding, stroke, StrokeKind::Inside);

                let pad = (10.0 * vp.zoom).clamp(4.0, 16.0);
                let font = FontId::proportional((14.0 * vp.zoom).clamp(8.0, 24.0));
                let galley = painter.layout(
                    text.clone(),
                    font,
                    text_color,
                    (srect.width() - 2.0 * pad).max(8.0),
                );
                painter
                    .with_clip_rect(srect.shrink(2.0))
                    .galley(srect.min + Vec2::splat(pad), galley, text_color);

                // Source marker: the block remembers which message spawned it
                if source.is_some() {
                    painter.circle_filled(
                        srect.left_top() + Vec2::splat(7.0),
                        2.5,
                        Color32::from_rgba_premultiplied(0, 0, 0, 110),
                    );
                }

                // Delete button, visible while hovering the block
                let del_center = Pos2::new(srect.right() - 11.0, srect.top() + 11.0);
                let del_resp = ui.allocate_rect(
                    Rect::from_center_size(del_center, Vec2::splat(14.0)),
                    Sense::click(),
                );
                if resp.hovered() || del_resp.hovered() {
                    let col = if del_resp.hovered() {
                        Color32::from_rgb(230, 90, 90)
                    } else {
                        Color32::from_rgba_premultiplied(0, 0, 0, 120)
                    };
                    painter.text(
                        del_center,
                        Align2::CENTER_CENTER,
                        "✕",
                        FontId::proportional(11.0),
                        col,
                    );
                }
                if del_resp.clicked() {
                    self.store.working_mut().remove_block(*id);
                    self.store.mark_dirty();
                    match self.mode {
                        PointerMode::DraggingBlock(bid)
                        | PointerMode::ResizingBlock(bid)
                        | PointerMode::Connecting { from: bid, .. }
                            if bid == *id =>
                        {
                            self.mode = PointerMode::Idle;
                        }
                        _ => {}
                    }
                    continue;
                }

                // Resize handle in the bottom-right corner
                let h_rect = Rect::from_center_size(srect.right_bottom(), Vec2::splat(12.0));
                let h_resp = ui
                    .allocate_rect(h_rect, Sense::drag())
                    .on_hover_cursor(egui::CursorIcon::ResizeNwSe);
                if resp.hovered() || h_resp.hovered() || self.mode == PointerMode::ResizingBlock(*id)
                {
                    painter.rect_filled(
                        Rect::from_center_size(srect.right_bottom(), Vec2::splat(8.0)),
                        2.0,
                        Color32::from_rgba_premultiplied(0, 0, 0, 140),
                    );
                }
                if h_resp.drag_started() && self.mode == PointerMode::Idle {
                    self.mode = PointerMode::ResizingBlock(*id);
                }
                if h_resp.dragged() && self.mode == PointerMode::ResizingBlock(*id) {
                    let delta = h_resp.drag_delta() / vp.zoom;
                    self.store
                        .working_mut()
                        .resize_block(*id, wrect.size() + delta);
                    self.store.mark_dirty();
                }
                if h_resp.drag_stopped() && self.mode == PointerMode::ResizingBlock(*id) {
                    self.mode = PointerMode::Idle;
                }

                // Connection handle at the right edge center
                let c_center = Pos2::new(srect.right(), srect.center().y);
                let c_resp = ui.allocate_rect(
                    Rect::from_center_size(c_center, Vec2::splat(12.0)),
                    Sense::click(),
                );
                if resp.hovered() || c_resp.hovered() || armed_from {
                    let col = if armed_from {
                        Color32::from_rgb(80, 220, 120)
                    } else if c_resp.hovered() {
                        Color32::from_rgb(120, 200, 255)
                    } else {
                        Color32::from_rgba_premultiplied(0, 0, 0, 140)
                    };
                    painter.circle_filled(c_center, 4.5, col);
                }
                if c_resp.clicked() && self.mode == PointerMode::Idle {
                    // Arm with the exact handle coordinate, in world space
                    self.mode = PointerMode::Connecting {
                        from: *id,
                        from_point: Pos2::new(wrect.right(), wrect.center().y),
                    };
                }

                // Body drag moves the block; endpoints refresh inside move_block
                if resp.drag_started() && self.mode == PointerMode::Idle {
                    self.mode = PointerMode::DraggingBlock(*id);
                }
                if resp.dragged() && self.mode == PointerMode::DraggingBlock(*id) {
                    let delta = resp.drag_delta() / vp.zoom;
                    self.store.working_mut().move_block(*id, wrect.min + delta);
                    self.store.mark_dirty();
                }
                if resp.drag_stopped() && self.mode == PointerMode::DraggingBlock(*id) {
                    self.mode = PointerMode::Idle;
                }

                if resp.clicked() {
                    match self.mode {
                        PointerMode::Connecting { from, from_point } if from != *id => {
                            if self
                                .store
                                .working_mut()
                                .add_connection(from, *id, from_point, ConnectorStyle::default())
                                .is_some()
                            {
                                self.store.mark_dirty();
                            }
                            self.mode = PointerMode::Idle;
                        }
                        PointerMode::Connecting { .. } => {}
                        _ => {
                            if let Some(src) = source {
                                self.jump_to_message(*src);
                            }
                        }
                    }
                }
            }

            // Rubber line while a connection is armed
            if let PointerMode::Connecting { from_point, .. } = self.mode {
                if let Some(pointer) = ui.ctx().pointer_hover_pos() {
                    let a = vp.to_screen(available, from_point);
                    painter.line_segment(
                        [a, pointer],
                        Stroke::new(1.5, Color32::from_rgb(80, 220, 120)),
                    );
                }
            }

            // Transient zoom readout after scrolling
            if let Some(until) = self.zoom_hud_until {
                let now = Instant::now();
                if now < until {
                    let text = format!("{:.2}x", vp.zoom);
                    let font = FontId::proportional(14.0);
                    let galley = painter.layout_no_wrap(text, font, Color32::WHITE);
                    let pad = Vec2::new(8.0, 4.0);
                    let size = galley.size() + pad * 2.0;
                    let pos = Pos2::new(available.center().x - size.x * 0.5, available.top() + 12.0);
                    let rect = Rect::from_min_size(pos, size);
                    painter.rect_filled(rect, 8.0, Color32::from_rgba_premultiplied(20, 20, 20, 200));
                    painter.galley(pos + pad, galley, Color32::WHITE);
                    ui.ctx().request_repaint_after(Duration::from_millis(16));
                } else {
                    self.zoom_hud_until = None;
                }
            }

            self.set_viewport(vp);
        });
    }

    fn render_canvas_switcher(&mut self, ctx: &egui::Context) {
        if !self.show_canvas_switcher {
            return;
        }
        let mut open = true;
        let mut select: Option<CanvasId> = None;
        let mut delete: Option<CanvasId> = None;
        let mut create = false;
        egui::Window::new("Canvases")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_TOP, egui::vec2(0.0, 64.0))
            .open(&mut open)
            .show(ctx, |ui| {
                let resp = ui.add(
                    egui::TextEdit::singleline(&mut self.canvas_search)
                        .hint_text("Search canvases"),
                );
                if self.switcher_needs_focus {
                    resp.request_focus();
                    self.switcher_needs_focus = false;
                }
                ui.separator();
                let filter = self.canvas_search.to_lowercase();
                let active = self.store.active_id();
                let sole = self.store.canvases().len() <= 1;
                let mut any = false;
                for c in self.store.canvases() {
                    if !filter.is_empty() && !c.title.to_lowercase().contains(&filter) {
                        continue;
                    }
                    any = true;
                    ui.horizontal(|ui| {
                        if ui.selectable_label(c.id == active, &c.title).clicked() {
                            select = Some(c.id);
                        }
                        ui.small(format!(
                            "{} blocks, {} links",
                            c.blocks.len(),
                            c.connections.len()
                        ));
                        ui.with_layout(egui::Layout::right_to_left(Align::Center), |ui| {
                            if ui
                                .add_enabled(!sole, egui::Button::new("✕").small())
                                .on_hover_text("Delete canvas")
                                .clicked()
                            {
                                delete = Some(c.id);
                            }
                        });
                    });
                }
                if !any {
                    ui.weak("No canvases match");
                }
                ui.separator();
                if ui.button("New canvas (Ctrl+Shift+N)").clicked() {
                    create = true;
                }
            });
        if let Some(id) = select {
            if self.store.select_canvas(id) {
                self.mode = PointerMode::Idle;
                self.open_connection = None;
            }
            open = false;
        }
        if let Some(id) = delete {
            // Guarded: deleting the sole remaining canvas is a no-op
            if self.store.delete_canvas(id) {
                self.mode = PointerMode::Idle;
                self.open_connection = None;
            }
        }
        if create {
            self.create_canvas();
            open = false;
        }
        self.show_canvas_switcher = open;
    }

    fn render_connection_window(&mut self, ctx: &egui::Context) {
        let Some(cid) = self.open_connection else {
            return;
        };
        // The connection may have been cascade-deleted under us
        let Some((style, label)) = self
            .store
            .working()
            .connection(cid)
            .map(|c| (c.style, c.label.clone()))
        else {
            self.open_connection = None;
            return;
        };

        let mut open = true;
        let mut new_style = style;
        let mut apply_label = false;
        let mut delete = false;
        egui::Window::new("Connection")
            .id(egui::Id::new(("connection_window", cid)))
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label("Style");
                    ui.selectable_value(&mut new_style, ConnectorStyle::Straight, "Straight");
                    ui.selectable_value(&mut new_style, ConnectorStyle::Curved, "Curved");
                    ui.selectable_value(&mut new_style, ConnectorStyle::Angled, "Angled");
                });
                ui.horizontal(|ui| {
                    ui.label("Label");
                    ui.text_edit_singleline(&mut self.connection_label_edit);
                    if ui.button("Apply").clicked() {
                        apply_label = true;
                    }
                });
                ui.separator();
                if ui.button("Delete connection").clicked() {
                    delete = true;
                }
            });

        if new_style != style {
            if let Some(c) = self.store.working_mut().connection_mut(cid) {
                c.style = new_style;
            }
            self.store.mark_dirty();
        }
        if apply_label {
            let trimmed = self.connection_label_edit.trim();
            let new_label = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
            if new_label != label {
                if let Some(c) = self.store.working_mut().connection_mut(cid) {
                    c.label = new_label;
                }
                self.store.mark_dirty();
            }
        }
        if delete {
            if self.store.working_mut().remove_connection(cid) {
                self.store.mark_dirty();
            }
            open = false;
        }
        if !open {
            self.open_connection = None;
        }
    }

    // Ghost of the dragged message text, following the pointer
    fn render_drag_ghost(&mut self, ctx: &egui::Context) {
        let Some(payload) = &self.message_drag else {
            return;
        };
        let Some(pos) = ctx.pointer_latest_pos() else {
            return;
        };
        ctx.output_mut(|o| o.cursor_icon = egui::CursorIcon::Grabbing);
        let painter = ctx.layer_painter(egui::LayerId::new(
            egui::Order::Tooltip,
            egui::Id::new("message_drag_ghost"),
        ));
        let mut preview: String = payload.text.chars().take(40).collect();
        if payload.text.chars().count() > 40 {
            preview.push('…');
        }
        let font = FontId::proportional(13.0);
        let galley = painter.layout_no_wrap(preview, font, Color32::WHITE);
        let pad = Vec2::new(8.0, 4.0);
        let rect = Rect::from_min_size(pos + Vec2::new(12.0, 12.0), galley.size() + pad * 2.0);
        painter.rect_filled(rect, 6.0, Color32::from_rgba_premultiplied(25, 25, 25, 220));
        painter.galley(rect.min + pad, galley, Color32::WHITE);
    }
}

impl Default for BoardApp {
    fn default() -> Self {
        Self::new()
    }
}

impl eframe::App for BoardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_visuals(match self.settings.theme {
            Theme::Dark => egui::Visuals::dark(),
            Theme::Light => egui::Visuals::light(),
        });

        let now = Instant::now();
        // Deliver due simulated replies into their target chats
        let delivered = self.chat.poll_replies(now);
        if delivered.contains(&self.chat.active_id()) {
            self.scroll_to_bottom = true;
        }
        if let Some(h) = self.highlight {
            if h.until <= now {
                self.highlight = None;
            }
        }

        self.handle_shortcuts(ctx);
        self.render_top_bar(ctx);
        self.render_chat_panel(ctx);
        self.render_canvas(ctx);
        self.render_canvas_switcher(ctx);
        self.render_connection_window(ctx);
        self.render_drag_ghost(ctx);

        // Debounced commit of the working canvas back into the canvas list
        self.store.maybe_commit(now);
        if self.store.dirty() {
            ctx.request_repaint_after(COMMIT_DEBOUNCE);
        }
        if let Some(due) = self.chat.next_reply_due() {
            let wait = due.saturating_duration_since(Instant::now());
            ctx.request_repaint_after(wait.max(Duration::from_millis(30)));
        }
        if self.highlight.is_some() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

// Faint world-aligned grid to anchor pan/zoom visually
fn paint_grid(painter: &egui::Painter, rect: Rect, vp: Viewport, dark: bool) {
    let step = 64.0 * vp.zoom;
    if step < 12.0 {
        return;
    }
    let color = if dark {
        Color32::from_rgba_premultiplied(255, 255, 255, 8)
    } else {
        Color32::from_rgba_premultiplied(0, 0, 0, 10)
    };
    let stroke = Stroke::new(1.0, color);
    let origin = vp.to_screen(rect, Pos2::ZERO);
    let mut x = rect.left() + (origin.x - rect.left()).rem_euclid(step);
    while x < rect.right() {
        painter.vline(x, rect.y_range(), stroke);
        x += step;
    }
    let mut y = rect.top() + (origin.y - rect.top()).rem_euclid(step);
    while y < rect.bottom() {
        painter.hline(rect.x_range(), y, stroke);
        y += step;
    }
}

// Draw one connector; returns the visual midpoint used for the label/editor dot
fn paint_connection(
    painter: &egui::Painter,
    a: Pos2,
    b: Pos2,
    style: ConnectorStyle,
    stroke: Stroke,
) -> Pos2 {
    match style {
        ConnectorStyle::Straight => {
            painter.line_segment([a, b], stroke);
            Pos2::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5)
        }
        ConnectorStyle::Curved => {
            // Horizontal-bias cubic, like a typical flowchart connector
            let dx = (b.x - a.x) * 0.5;
            let c1 = Pos2::new(a.x + dx, a.y);
            let c2 = Pos2::new(b.x - dx, b.y);
            painter.add(egui::epaint::CubicBezierShape::from_points_stroke(
                [a, c1, c2, b],
                false,
                Color32::TRANSPARENT,
                stroke,
            ));
            // Point at t = 0.5 of the cubic
            Pos2::new(
                (a.x + 3.0 * c1.x + 3.0 * c2.x + b.x) / 8.0,
                (a.y + 3.0 * c1.y + 3.0 * c2.y + b.y) / 8.0,
            )
        }
        ConnectorStyle::Angled => {
            let mid_x = (a.x + b.x) * 0.5;
            let p1 = Pos2::new(mid_x, a.y);
            let p2 = Pos2::new(mid_x, b.y);
            painter.line_segment([a, p1], stroke);
            painter.line_segment([p1, p2], stroke);
            painter.line_segment([p2, b], stroke);
            Pos2::new(mid_x, (a.y + b.y) * 0.5)
        }
    }
}

fn paint_arrowhead(
    painter: &egui::Painter,
    a: Pos2,
    b: Pos2,
    style: ConnectorStyle,
    size: f32,
    stroke: Stroke,
) {
    // Incoming direction at the destination endpoint
    let incoming = match style {
        ConnectorStyle::Straight => b - a,
        ConnectorStyle::Curved => {
            // Tangent at the end of the horizontal-bias cubic
            let h = Vec2::new((b.x - a.x) * 0.5, 0.0);
            if h.length() > f32::EPSILON { h } else { b - a }
        }
        ConnectorStyle::Angled => b - Pos2::new((a.x + b.x) * 0.5, b.y),
    };
    let len = incoming.length();
    if len <= f32::EPSILON {
        return;
    }
    let d = incoming / len;
    let n = Vec2::new(-d.y, d.x);
    let back = b - d * size;
    painter.line_segment([b, back + n * (size * 0.5)], stroke);
    painter.line_segment([b, back - n * (size * 0.5)], stroke);
}

use std::time::{Duration, Instant};

use chatboard::board::canvas::{
    BoardStore, Canvas, ConnectorStyle, MAX_BLOCK_HEIGHT, MAX_BLOCK_WIDTH, MIN_BLOCK_HEIGHT,
    MIN_BLOCK_WIDTH,
};
use chatboard::board::view::{MAX_ZOOM, MIN_ZOOM, Viewport, block_size_for_text};
use chatboard::bridge::{DragBridge, DragPayload};
use chatboard::chat::session::{Author, ChatStore};
use egui::{Rect, pos2, vec2};
use uuid::Uuid;

fn block_canvas() -> Canvas {
    Canvas::new("test")
}

#[test]
fn canvas_add_block_connection_and_cascade_delete() {
    let mut canvas = block_canvas();
    let a = canvas.add_block("alpha".into(), pos2(0.0, 0.0), vec2(200.0, 100.0), None);
    let b = canvas.add_block("beta".into(), pos2(400.0, 0.0), vec2(200.0, 100.0), None);
    let cid = canvas
        .add_connection(a, b, pos2(200.0, 50.0), ConnectorStyle::default())
        .expect("connection should be created");

    assert!(canvas.connection(cid).is_some());
    assert!(canvas.remove_block(a), "should remove block a");
    // Connection should be removed too
    assert!(canvas.connection(cid).is_none());
}

#[test]
fn cascade_delete_removes_only_touching_connections() {
    let mut canvas = block_canvas();
    let a = canvas.add_block("a".into(), pos2(0.0, 0.0), vec2(200.0, 100.0), None);
    let b = canvas.add_block("b".into(), pos2(300.0, 0.0), vec2(200.0, 100.0), None);
    let c = canvas.add_block("c".into(), pos2(600.0, 0.0), vec2(200.0, 100.0), None);
    let ab = canvas
        .add_connection(a, b, pos2(200.0, 50.0), ConnectorStyle::Straight)
        .unwrap();
    let bc = canvas
        .add_connection(b, c, pos2(500.0, 50.0), ConnectorStyle::Straight)
        .unwrap();

    assert!(canvas.remove_block(a));
    assert!(canvas.connection(ab).is_none());
    assert!(canvas.connection(bc).is_some(), "b-c must survive");
}

#[test]
fn add_connection_rejects_missing_endpoints_and_self_loops() {
    let mut canvas = block_canvas();
    let a = canvas.add_block("a".into(), pos2(0.0, 0.0), vec2(200.0, 100.0), None);
    let ghost = Uuid::now_v7();

    assert!(
        canvas
            .add_connection(a, ghost, pos2(0.0, 0.0), ConnectorStyle::Curved)
            .is_none()
    );
    assert!(
        canvas
            .add_connection(ghost, a, pos2(0.0, 0.0), ConnectorStyle::Curved)
            .is_none()
    );
    assert!(
        canvas
            .add_connection(a, a, pos2(0.0, 0.0), ConnectorStyle::Curved)
            .is_none()
    );
}

#[test]
fn connection_caches_handle_coordinate_and_target_center() {
    let mut canvas = block_canvas();
    // A's center lands at (100, 100), B's at (300, 150)
    let a = canvas.add_block("a".into(), pos2(0.0, 50.0), vec2(200.0, 100.0), None);
    let b = canvas.add_block("b".into(), pos2(200.0, 100.0), vec2(200.0, 100.0), None);

    // Handle clicked at A's right-edge center, not A's center
    let handle = pos2(200.0, 100.0);
    let cid = canvas
        .add_connection(a, b, handle, ConnectorStyle::Curved)
        .unwrap();
    let conn = canvas.connection(cid).unwrap();
    assert_eq!(conn.from_point, handle);
    assert_eq!(conn.to_point, pos2(300.0, 150.0));
}

#[test]
fn moving_or_resizing_endpoint_recomputes_cached_points() {
    let mut canvas = block_canvas();
    let a = canvas.add_block("a".into(), pos2(0.0, 50.0), vec2(200.0, 100.0), None);
    let b = canvas.add_block("b".into(), pos2(200.0, 100.0), vec2(200.0, 100.0), None);
    let cid = canvas
        .add_connection(a, b, pos2(200.0, 100.0), ConnectorStyle::Straight)
        .unwrap();

    // Moving A snaps the cached from-endpoint to A's new center
    assert!(canvas.move_block(a, pos2(100.0, 100.0)));
    let conn = canvas.connection(cid).unwrap();
    assert_eq!(conn.from_point, pos2(200.0, 150.0));
    assert_eq!(conn.to_point, pos2(300.0, 150.0), "b untouched");

    // Resizing B recomputes the to-endpoint from B's new center
    assert!(canvas.resize_block(b, vec2(400.0, 200.0)));
    let conn = canvas.connection(cid).unwrap();
    assert_eq!(conn.to_point, pos2(400.0, 200.0));
}

#[test]
fn block_sizes_clamp_to_documented_bounds() {
    let mut canvas = block_canvas();
    let tiny = canvas.add_block("t".into(), pos2(0.0, 0.0), vec2(10.0, 10.0), None);
    let huge = canvas.add_block("h".into(), pos2(0.0, 0.0), vec2(10_000.0, 10_000.0), None);

    let t = canvas.block(tiny).unwrap();
    assert_eq!(t.size, vec2(MIN_BLOCK_WIDTH, MIN_BLOCK_HEIGHT));
    let h = canvas.block(huge).unwrap();
    assert_eq!(h.size, vec2(MAX_BLOCK_WIDTH, MAX_BLOCK_HEIGHT));

    assert!(canvas.resize_block(tiny, vec2(50_000.0, 1.0)));
    let t = canvas.block(tiny).unwrap();
    assert_eq!(t.size, vec2(MAX_BLOCK_WIDTH, MIN_BLOCK_HEIGHT));
}

#[test]
fn dropped_text_size_is_monotonic_within_bounds() {
    let lengths = [0usize, 1, 5, 20, 60, 120, 250, 500, 1000, 4000];
    let mut prev = vec2(0.0, 0.0);
    for len in lengths {
        let text: String = "x".repeat(len);
        let size = block_size_for_text(&text);
        assert!(size.x >= MIN_BLOCK_WIDTH && size.x <= MAX_BLOCK_WIDTH, "w for {len}");
        assert!(size.y >= MIN_BLOCK_HEIGHT && size.y <= MAX_BLOCK_HEIGHT, "h for {len}");
        assert!(size.x >= prev.x, "width must not shrink at {len}");
        assert!(size.y >= prev.y, "height must not shrink at {len}");
        prev = size;
    }
}

#[test]
fn viewport_screen_world_round_trip_is_identity() {
    let canvas_rect = Rect::from_min_size(pos2(300.0, 40.0), vec2(900.0, 650.0));
    let cases = [
        Viewport { pan: vec2(0.0, 0.0), zoom: 1.0 },
        Viewport { pan: vec2(120.0, -340.0), zoom: 0.5 },
        Viewport { pan: vec2(-55.5, 17.25), zoom: 3.0 },
        Viewport { pan: vec2(999.0, 2.0), zoom: 1.337 },
    ];
    let points = [pos2(0.0, 0.0), pos2(-250.0, 410.0), pos2(123.4, -567.8)];
    for vp in cases {
        for p in points {
            let round = vp.from_screen(canvas_rect, vp.to_screen(canvas_rect, p));
            assert!((round.x - p.x).abs() < 1e-2, "{vp:?} {p:?} -> {round:?}");
            assert!((round.y - p.y).abs() < 1e-2, "{vp:?} {p:?} -> {round:?}");
        }
        // And the visible center maps back onto the rect center
        let center_world = vp.visible_center(canvas_rect);
        let back = vp.to_screen(canvas_rect, center_world);
        assert!((back - canvas_rect.center()).length() < 1e-2);
    }
}

#[test]
fn zoom_stays_clamped_and_compounds_multiplicatively() {
    let mut vp = Viewport::default();
    // Three x1.2 steps from 1.0 land on 1.728
    for _ in 0..3 {
        vp.zoom_by(1.2);
    }
    assert!((vp.zoom - 1.728).abs() < 1e-3);

    for _ in 0..200 {
        vp.zoom_notches(1.0);
    }
    assert_eq!(vp.zoom, MAX_ZOOM);
    for _ in 0..500 {
        vp.zoom_notches(-1.0);
    }
    assert_eq!(vp.zoom, MIN_ZOOM);
}

#[test]
fn bridge_transfer_is_consumed_exactly_once() {
    let mut bridge = DragBridge::new();
    assert!(!bridge.is_pending());
    let payload = DragPayload {
        text: "pinned text".into(),
        message_id: Uuid::now_v7(),
        chat_id: Uuid::now_v7(),
    };
    bridge.begin(payload.clone());
    assert!(bridge.is_pending());
    assert_eq!(bridge.take(), Some(payload));
    assert_eq!(bridge.take(), None, "second take must be empty");

    bridge.begin(DragPayload {
        text: "other".into(),
        message_id: Uuid::now_v7(),
        chat_id: Uuid::now_v7(),
    });
    bridge.cancel();
    assert_eq!(bridge.take(), None, "cancel clears without consuming");
}

#[test]
fn board_store_commits_after_debounce_window() {
    let mut store = BoardStore::new();
    store
        .working_mut()
        .add_block("note".into(), pos2(0.0, 0.0), vec2(200.0, 100.0), None);
    store.mark_dirty();

    // Inside the window: nothing written back yet
    assert!(!store.maybe_commit(Instant::now()));
    assert!(store.canvases()[0].blocks.is_empty());

    // Past the window: the edit lands in the canvas list
    assert!(store.maybe_commit(Instant::now() + Duration::from_millis(600)));
    assert_eq!(store.canvases()[0].blocks.len(), 1);
    assert!(!store.dirty());
}

#[test]
fn switching_canvases_swaps_working_copy_without_corruption() {
    let mut store = BoardStore::new();
    let first = store.active_id();
    let second = store.create_canvas("Canvas 2");
    assert_eq!(store.active_id(), second);

    store
        .working_mut()
        .add_block("on second".into(), pos2(0.0, 0.0), vec2(200.0, 100.0), None);
    store.mark_dirty();

    // Switching flushes the pending edit into its own canvas only
    assert!(store.select_canvas(first));
    let canvases = store.canvases();
    let c1 = canvases.iter().find(|c| c.id == first).unwrap();
    let c2 = canvases.iter().find(|c| c.id == second).unwrap();
    assert!(c1.blocks.is_empty(), "first canvas must stay untouched");
    assert_eq!(c2.blocks.len(), 1);
    assert!(store.working().blocks.is_empty());

    // Round trip back: the edit is still there
    assert!(store.select_canvas(second));
    assert_eq!(store.working().blocks.len(), 1);
}

#[test]
fn sole_canvas_cannot_be_deleted() {
    let mut store = BoardStore::new();
    let only = store.active_id();
    assert!(!store.delete_canvas(only));
    assert_eq!(store.canvases().len(), 1);

    let second = store.create_canvas("Canvas 2");
    assert!(store.delete_canvas(second));
    assert_eq!(store.canvases().len(), 1);
    assert_eq!(store.active_id(), only);
}

#[test]
fn deleting_active_canvas_selects_survivor() {
    let mut store = BoardStore::new();
    let first = store.active_id();
    let second = store.create_canvas("Canvas 2");
    assert_eq!(store.active_id(), second);
    assert!(store.delete_canvas(second));
    assert_eq!(store.active_id(), first);
}

#[test]
fn chat_store_create_select_delete_guard() {
    let mut chat = ChatStore::new();
    let first = chat.active_id();
    assert!(!chat.delete_session(first), "sole chat must survive");

    let second = chat.create_session();
    assert_eq!(chat.active_id(), second);
    assert!(chat.select(first));
    assert!(chat.delete_session(second));
    assert_eq!(chat.sessions().len(), 1);
    assert_eq!(chat.active_id(), first);
}

#[test]
fn user_message_appends_and_schedules_one_reply() {
    let mut chat = ChatStore::new();
    chat.push_user_message("hello there");
    let session = chat.active();
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].author, Author::User);
    assert_eq!(session.messages[0].text, "hello there");
    assert_eq!(chat.pending_reply_count(), 1);

    // Not due yet: delays start at one second
    assert!(chat.poll_replies(Instant::now()).is_empty());
    assert_eq!(chat.active().messages.len(), 1);
}

#[test]
fn reply_lands_in_originating_chat_after_switch() {
    let mut chat = ChatStore::new();
    let first = chat.active_id();
    chat.push_user_message("ping");
    let second = chat.create_session();
    assert_eq!(chat.active_id(), second);

    // Well past the 1-3s delay window
    let touched = chat.poll_replies(Instant::now() + Duration::from_secs(4));
    assert_eq!(touched, vec![first]);
    assert_eq!(chat.pending_reply_count(), 0);

    let origin = chat.session(first).unwrap();
    assert_eq!(origin.messages.len(), 2);
    assert_eq!(origin.messages[1].author, Author::Assistant);
    assert_eq!(origin.unread, 1, "inactive chat gains an unread marker");
    assert!(chat.session(second).unwrap().messages.is_empty());

    // Selecting the chat clears its unread counter
    assert!(chat.select(first));
    assert_eq!(chat.session(first).unwrap().unread, 0);
}

#[test]
fn deleting_chat_drops_its_scheduled_replies() {
    let mut chat = ChatStore::new();
    chat.push_user_message("will be orphaned");
    let doomed = chat.active_id();
    chat.create_session();
    assert!(chat.delete_session(doomed));
    assert_eq!(chat.pending_reply_count(), 0);
    assert!(
        chat.poll_replies(Instant::now() + Duration::from_secs(4))
            .is_empty()
    );
}

#[test]
fn session_navigation_wraps_around() {
    let mut chat = ChatStore::new();
    let first = chat.active_id();
    let second = chat.create_session();
    let third = chat.create_session();
    assert_eq!(chat.active_id(), third);

    chat.select_adjacent(1);
    assert_eq!(chat.active_id(), first, "forward from last wraps to first");
    chat.select_adjacent(-1);
    assert_eq!(chat.active_id(), third, "backward from first wraps to last");
    chat.select_adjacent(-1);
    assert_eq!(chat.active_id(), second);
}

#[test]
fn palette_assignment_cycles_in_creation_order() {
    let mut canvas = block_canvas();
    let n = chatboard::board::view::BLOCK_PALETTE.len();
    let mut ids = Vec::new();
    for i in 0..(n + 2) {
        ids.push(canvas.add_block(format!("b{i}"), pos2(0.0, 0.0), vec2(200.0, 100.0), None));
    }
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(canvas.block(*id).unwrap().color_index, i % n);
    }
}

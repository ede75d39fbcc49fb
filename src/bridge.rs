use uuid::Uuid;

/// One chat→canvas text transfer: the dragged text plus where it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DragPayload {
    pub text: String,
    pub message_id: Uuid,
    pub chat_id: Uuid,
}

/// Single-slot bridge between the chat panel and the canvas. Only one
/// transfer is pending at a time; a new `begin` replaces the old one, and
/// `take` consumes it exactly once.
#[derive(Default)]
pub struct DragBridge {
    pending: Option<DragPayload>,
}

impl DragBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, payload: DragPayload) {
        self.pending = Some(payload);
    }

    pub fn take(&mut self) -> Option<DragPayload> {
        self.pending.take()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

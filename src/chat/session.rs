use std::time::{Duration, Instant};

use time::OffsetDateTime;
use uuid::Uuid;

pub type ChatId = Uuid;
pub type MessageId = Uuid;

// Simulated assistant replies arrive between these two delays after a user message
const REPLY_DELAY_MIN_MS: u64 = 1000;
const REPLY_DELAY_MAX_MS: u64 = 3000;

const REPLY_TEMPLATES: &[&str] = &[
    "That's an interesting point. Could you elaborate on what you mean?",
    "I see what you're getting at. Have you considered the opposite angle?",
    "Good question. The short answer is: it depends on the context.",
    "Let me think about that. A useful way to frame it is as a trade-off.",
    "That lines up with what we discussed earlier. Worth pinning down.",
    "Noted. I'd suggest breaking that into smaller pieces first.",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Author {
    User,
    Assistant,
}

#[derive(Clone, Debug)]
pub struct Message {
    pub id: MessageId,
    pub author: Author,
    pub text: String,
    pub sent_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub struct ChatSession {
    pub id: ChatId,
    pub title: String,
    // append-only, chronological
    pub messages: Vec<Message>,
    pub last_activity: OffsetDateTime,
    pub unread: u32,
}

impl ChatSession {
    fn new(title: impl Into<String>) -> Self {
        ChatSession {
            id: Uuid::now_v7(),
            title: title.into(),
            messages: Vec::new(),
            last_activity: OffsetDateTime::now_utc(),
            unread: 0,
        }
    }
}

// A scheduled simulated reply. Carries its target chat so it still lands in
// the right session if the user switches away before it fires.
struct PendingReply {
    chat_id: ChatId,
    text: &'static str,
    due: Instant,
}

/// In-memory chat sessions plus the queue of scheduled simulated replies.
/// The store always holds at least one session.
pub struct ChatStore {
    sessions: Vec<ChatSession>,
    active: ChatId,
    pending: Vec<PendingReply>,
    created_count: usize,
}

impl ChatStore {
    pub fn new() -> Self {
        let first = ChatSession::new("Chat 1");
        let active = first.id;
        ChatStore {
            sessions: vec![first],
            active,
            pending: Vec::new(),
            created_count: 1,
        }
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn active_id(&self) -> ChatId {
        self.active
    }

    pub fn active(&self) -> &ChatSession {
        // invariant: `active` always names an existing session
        self.sessions
            .iter()
            .find(|s| s.id == self.active)
            .unwrap_or(&self.sessions[0])
    }

    pub fn session(&self, id: ChatId) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn session_mut(&mut self, id: ChatId) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn message(&self, chat_id: ChatId, message_id: MessageId) -> Option<&Message> {
        self.session(chat_id)?
            .messages
            .iter()
            .find(|m| m.id == message_id)
    }

    pub fn create_session(&mut self) -> ChatId {
        self.created_count += 1;
        let session = ChatSession::new(format!("Chat {}", self.created_count));
        let id = session.id;
        self.sessions.push(session);
        self.select(id);
        id
    }

    /// Make `id` the active session and clear its unread counter.
    pub fn select(&mut self, id: ChatId) -> bool {
        let Some(session) = self.session_mut(id) else {
            return false;
        };
        session.unread = 0;
        self.active = id;
        true
    }

    /// Arrow-key navigation: step the active session up or down the list.
    pub fn select_adjacent(&mut self, offset: isize) {
        let Some(idx) = self.sessions.iter().position(|s| s.id == self.active) else {
            return;
        };
        let len = self.sessions.len() as isize;
        let next = (idx as isize + offset).rem_euclid(len) as usize;
        let id = self.sessions[next].id;
        self.select(id);
    }

    /// Delete a session. Deleting the sole remaining one is a no-op; deleting
    /// the active one selects the first survivor. Replies still scheduled for
    /// the deleted chat are dropped.
    pub fn delete_session(&mut self, id: ChatId) -> bool {
        if self.sessions.len() <= 1 {
            return false;
        }
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return false;
        }
        self.pending.retain(|p| p.chat_id != id);
        if self.active == id {
            let fallback = self.sessions[0].id;
            self.select(fallback);
        }
        true
    }

    /// Append a user message to the active session and schedule a simulated
    /// reply for it.
    pub fn push_user_message(&mut self, text: impl Into<String>) -> MessageId {
        let message = Message {
            id: Uuid::now_v7(),
            author: Author::User,
            text: text.into(),
            sent_at: OffsetDateTime::now_utc(),
        };
        let id = message.id;
        let chat_id = self.active;

        // Unweighted template pick and delay, derived by hashing the message id
        let mut seed = id.as_u128();
        seed ^= seed >> 33;
        let reply = REPLY_TEMPLATES[(seed % REPLY_TEMPLATES.len() as u128) as usize];
        let span = REPLY_DELAY_MAX_MS - REPLY_DELAY_MIN_MS;
        let delay_ms = REPLY_DELAY_MIN_MS + ((seed >> 8) % (span as u128 + 1)) as u64;

        self.pending.push(PendingReply {
            chat_id,
            text: reply,
            due: Instant::now() + Duration::from_millis(delay_ms),
        });

        if let Some(session) = self.session_mut(chat_id) {
            session.last_activity = message.sent_at;
            session.messages.push(message);
        }
        id
    }

    /// Deliver every due reply into its target chat. Replies landing in a
    /// non-active session bump its unread counter. Returns the chats touched.
    pub fn poll_replies(&mut self, now: Instant) -> Vec<ChatId> {
        let mut touched = Vec::new();
        let mut remaining = Vec::new();
        for reply in self.pending.drain(..) {
            if reply.due > now {
                remaining.push(reply);
                continue;
            }
            let active = self.active;
            if let Some(session) = self.sessions.iter_mut().find(|s| s.id == reply.chat_id) {
                let sent_at = OffsetDateTime::now_utc();
                session.messages.push(Message {
                    id: Uuid::now_v7(),
                    author: Author::Assistant,
                    text: reply.text.to_string(),
                    sent_at,
                });
                session.last_activity = sent_at;
                if session.id != active {
                    session.unread += 1;
                }
                touched.push(reply.chat_id);
            }
        }
        self.pending = remaining;
        touched
    }

    /// Earliest scheduled reply deadline, for repaint scheduling.
    pub fn next_reply_due(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.due).min()
    }

    pub fn pending_reply_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Two-panel chat + canvas workspace: chat sessions on the left, a freeform
//! block canvas on the right, bridged by a one-slot drag transfer.

pub mod board;
pub mod bridge;
pub mod chat;
pub mod gui;
pub mod persistence;

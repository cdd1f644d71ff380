//! Courier Models - the message record and the page shape the backend returns.
//!
//! Messages are immutable values keyed by a stable string `id`. The backend
//! mirrors group-chat rows (optionally grouped into topics by `thread_id`)
//! and hands them out in pages bounded by an opaque `Cursor`.

pub mod message;
pub mod page;

pub use message::Message;
pub use page::{Cursor, FetchPage};

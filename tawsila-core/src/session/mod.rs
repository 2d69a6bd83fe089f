//! User session: in-memory context plus persistence adapters

pub mod context;
pub mod store;

pub use context::SessionContext;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};

//! Session identity and conversation state.
//!
//! The [`SessionIdRegistry`] is the single source of truth for entity
//! identity within a turn: interpreters only ever see opaque short refs,
//! and every translation between refs and canonical identifiers happens
//! here, at the I/O boundary. The conversation store carries the registry
//! snapshot, the rolling turn history, and the accumulated session
//! constraints across turns.

pub mod constraints;
pub mod conversation;
pub mod refs;
pub mod registry;

pub use constraints::SessionConstraints;
pub use conversation::{ConversationRecord, ConversationStore, ConversationTurn};
pub use registry::{RefAction, RefEntry, SessionIdRegistry};

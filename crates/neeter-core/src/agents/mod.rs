//! Agent protocols and the canonical event vocabulary.

pub mod claude;
pub mod event;

//! Debug Adapter Protocol client engine.

pub mod callbacks;
pub mod capabilities;
pub mod child;
pub mod codec;
pub mod dispatcher;
pub mod handler;
pub mod message;
pub mod queue;
pub mod retained;
pub mod seq;
pub mod session;
pub mod state;
pub mod store;
pub mod types;

pub use session::{EndSessionHow, Session, TickOutcome};

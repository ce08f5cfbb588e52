//! Host control and chat layered on the transport's data channel.
//!
//! Everything here is a cooperative broadcast: envelopes are sent once,
//! never retried, never acknowledged. True enforcement of host actions
//! (forcibly muting or disconnecting a participant) requires the transport
//! provider's server-side management API, which lives outside this codebase;
//! the broadcasts exist for immediate feedback between well-behaved clients.

mod chat;
mod host;

pub use chat::{CallChat, ChatMessage};
pub use host::{CameraPrompt, CameraRequestListener, HostControls};

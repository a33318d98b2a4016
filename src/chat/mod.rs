//! Real-time chat with the astrologer assistant
//!
//! The chat connection is modelled as a synchronous state machine
//! ([`session::ChatSession`]) driven by a single async task
//! ([`client::ChatClient`]). The UI side talks to the driver through a
//! cloneable [`client::ChatHandle`] and observes changes as
//! [`event::ChatEvent`]s.
//!
//! ```text
//! ChatHandle --commands--> ChatClient --&mut--> ChatSession --send--> Transport
//!     ^                        ^                    |
//!     |                        +--TransportEvent----+ (Opened / Frame / Closed)
//!     +------- ChatEvent (broadcast) ---------------+
//! ```
//!
//! Submodules:
//!
//! - [`message`] -- chat message records
//! - [`frame`] -- the JSON wire frames
//! - [`reconnect`] -- exponential backoff policy
//! - [`usage`] -- advisory usage gate
//! - [`event`] -- observer notifications
//! - [`transport`] -- the connector/transport seam and its WebSocket implementation

pub mod client;
pub mod event;
pub mod frame;
pub mod message;
pub mod reconnect;
pub mod session;
pub mod transport;
pub mod usage;

pub use client::{ChatClient, ChatHandle, ChatSnapshot, UsageSource};
pub use event::{ChatEvent, NoticeLevel};
pub use message::{ChatMessage, Role, ToolCallRecord};
pub use reconnect::ReconnectPolicy;
pub use session::{ChatSession, ConnectionState, SendOutcome};
pub use usage::{UsageGate, UsageSnapshot};

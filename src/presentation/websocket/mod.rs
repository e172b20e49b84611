//! WebSocket Gateway
//!
//! Real-time delivery of server-pushed events to authenticated users, one
//! live connection per user.

pub mod connection;
pub mod gateway;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod session;

pub use connection::Connection;
pub use gateway::Gateway;
pub use handler::ws_handler;
pub use messages::{ClientMessage, InitPayload, ServerMessage};
pub use registry::{ListenerRegistry, ListenerSink, SinkSignal};
pub use session::{ConnectionState, Session};

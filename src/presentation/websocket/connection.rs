//! Gateway Connection
//!
//! Drives one socket through `AwaitingInit -> Authenticating -> Ready`,
//! always ending in `Closed`. The connection is generic over its transport
//! halves so the protocol can be exercised without a real socket.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use validator::Validate;

use super::gateway::Gateway;
use super::messages::{errors, ClientMessage, InitPayload, ServerMessage};
use super::registry::{ListenerSink, SinkSignal};
use super::session::{ConnectionState, Session};
use crate::domain::PublicUser;

/// A peer frame with transport details stripped.
enum Frame {
    Message(ClientMessage),
    Undecodable,
    /// Ping/pong, handled below the protocol
    Transport,
    Closed,
}

fn classify<E: Display>(frame: Option<Result<Message, E>>) -> Frame {
    match frame {
        Some(Ok(Message::Text(text))) => decode(text.as_str()),
        Some(Ok(Message::Binary(_))) => Frame::Undecodable,
        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Frame::Transport,
        Some(Ok(Message::Close(_))) | None => Frame::Closed,
        Some(Err(e)) => {
            debug!(error = %e, "WebSocket error");
            Frame::Closed
        }
    }
}

fn decode(text: &str) -> Frame {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => serde_json::from_value(value)
            .map(Frame::Message)
            .unwrap_or(Frame::Undecodable),
        _ => Frame::Undecodable,
    }
}

fn init_token(data: Value) -> Option<String> {
    let payload: InitPayload = serde_json::from_value(data).ok()?;
    payload.validate().ok()?;
    Some(payload.token)
}

/// Serialize and send one message. Returns false once the peer is gone.
async fn send<W>(outbound: &mut W, message: &ServerMessage) -> bool
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "Failed to serialize gateway message");
            return false;
        }
    };

    match outbound.send(Message::Text(text.into())).await {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "Failed to send gateway message");
            false
        }
    }
}

enum Authentication {
    Verified(PublicUser),
    Rejected,
    /// Peer left before the verdict
    Abandoned,
}

/// One live gateway connection
pub struct Connection {
    gateway: Arc<Gateway>,
    session: Session,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.gateway.connection_closed();
    }
}

impl Connection {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        gateway.connection_opened();
        Self {
            gateway,
            session: Session::new(),
        }
    }

    /// Run the connection to completion.
    pub async fn run<W, R, E>(mut self, mut outbound: W, mut inbound: R)
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let connection_id = self.session.connection_id();
        debug!(connection_id = %connection_id, "Connection opened");

        let listener = if send(&mut outbound, &ServerMessage::Hello).await {
            self.handshake(&mut outbound, &mut inbound).await
        } else {
            None
        };

        if let Some((sink, mut signals)) = listener {
            self.serve(&mut outbound, &mut inbound, &mut signals).await;
            if let Some(identity) = self.session.identity() {
                self.gateway.registry().unregister(identity, &sink);
            }
        }

        self.session.transition(ConnectionState::Closed);
        let _ = outbound.send(Message::Close(None)).await;
        let _ = outbound.close().await;

        debug!(
            connection_id = %connection_id,
            age_ms = self.session.age().as_millis() as u64,
            "Connection closed"
        );
    }

    /// Wait for `init`, authenticate, and register. Returns the registered
    /// sink and its signal receiver once the session is ready.
    async fn handshake<W, R, E>(
        &mut self,
        outbound: &mut W,
        inbound: &mut R,
    ) -> Option<(ListenerSink, mpsc::UnboundedReceiver<SinkSignal>)>
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let token = self.await_init(outbound, inbound).await?;
        self.session.transition(ConnectionState::Authenticating);

        let user = match self.authenticate(&token, inbound).await {
            Authentication::Verified(user) => user,
            Authentication::Rejected => {
                send(outbound, &ServerMessage::fatal(errors::INVALID_TOKEN)).await;
                return None;
            }
            Authentication::Abandoned => return None,
        };

        let connection_id = self.session.connection_id();
        let (sink, signals) = ListenerSink::channel(connection_id);
        let identity = user.id.clone();

        self.session.transition(ConnectionState::Ready {
            identity: identity.clone(),
        });
        self.gateway.registry().register(&identity, sink.clone());

        if !send(outbound, &ServerMessage::Ready { user }).await {
            self.gateway.registry().unregister(&identity, &sink);
            return None;
        }

        info!(connection_id = %connection_id, user_id = %identity, "User connected");
        Some((sink, signals))
    }

    async fn await_init<W, R, E>(&mut self, outbound: &mut W, inbound: &mut R) -> Option<String>
    where
        W: Sink<Message> + Unpin,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let deadline = tokio::time::sleep(self.gateway.init_timeout());
        tokio::pin!(deadline);

        loop {
            let frame = tokio::select! {
                _ = &mut deadline => {
                    debug!(connection_id = %self.session.connection_id(), "Init timeout");
                    send(outbound, &ServerMessage::fatal(errors::INIT_TIMEOUT)).await;
                    return None;
                }
                frame = inbound.next() => classify(frame),
            };

            let reply = match frame {
                Frame::Closed => return None,
                Frame::Transport => continue,
                Frame::Undecodable => errors::UNDECODABLE,
                Frame::Message(message) if message.op != "init" => errors::BEFORE_READY,
                Frame::Message(message) => match init_token(message.data) {
                    Some(token) => return Some(token),
                    None => errors::INVALID_INIT,
                },
            };

            if !send(outbound, &ServerMessage::error(reply)).await {
                return None;
            }
        }
    }

    /// Verify the token while watching the socket. Frames are ignored; a
    /// closing socket cancels the pending verification.
    async fn authenticate<R, E>(&self, token: &str, inbound: &mut R) -> Authentication
    where
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let verification = self.gateway.verifier().verify(token);
        tokio::pin!(verification);

        loop {
            tokio::select! {
                user = &mut verification => {
                    return match user {
                        Some(user) => Authentication::Verified(user),
                        None => Authentication::Rejected,
                    };
                }
                frame = inbound.next() => {
                    if let Frame::Closed = classify(frame) {
                        debug!(
                            connection_id = %self.session.connection_id(),
                            "Peer left during authentication"
                        );
                        return Authentication::Abandoned;
                    }
                }
            }
        }
    }

    async fn serve<W, R, E>(
        &mut self,
        outbound: &mut W,
        inbound: &mut R,
        signals: &mut mpsc::UnboundedReceiver<SinkSignal>,
    ) where
        W: Sink<Message> + Unpin,
        W::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        loop {
            tokio::select! {
                frame = inbound.next() => {
                    let reply = match classify(frame) {
                        Frame::Closed => return,
                        Frame::Transport => continue,
                        Frame::Undecodable => errors::UNDECODABLE,
                        Frame::Message(_) => errors::AFTER_READY,
                    };
                    if !send(outbound, &ServerMessage::error(reply)).await {
                        return;
                    }
                }
                signal = signals.recv() => match signal {
                    Some(SinkSignal::Dispatch(payload)) => {
                        if !send(outbound, &ServerMessage::Dispatch(payload)).await {
                            return;
                        }
                    }
                    Some(SinkSignal::Disconnect) | None => {
                        debug!(
                            connection_id = %self.session.connection_id(),
                            "Disconnect requested"
                        );
                        return;
                    }
                }
            }
        }
    }
}

//! Connection lifecycle events.
//!
//! `ConnectionTracker::observe` turns one event-loop poll outcome into zero or more
//! lifecycle events. It does no I/O, so the mapping is tested without a broker.

use std::fmt;

use rumqttc::{ConnectionError, Event, Outgoing, Packet};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// CONNACK accepted.
    Connect,
    /// A new connection attempt is about to start.
    Reconnect,
    /// The network connection went away.
    Close,
    /// The broker sent DISCONNECT.
    Disconnect,
    /// Lost a previously established connection.
    Offline,
    /// A connection attempt failed.
    Error(String),
    /// Closed on request; the event loop stops.
    End,
}

impl ConnectionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::Connect => "connect",
            ConnectionEvent::Reconnect => "reconnect",
            ConnectionEvent::Close => "close",
            ConnectionEvent::Disconnect => "disconnect",
            ConnectionEvent::Offline => "offline",
            ConnectionEvent::Error(_) => "error",
            ConnectionEvent::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionEvent::End)
    }

    /// Emit the event at its severity.
    pub fn log(&self) {
        match self {
            ConnectionEvent::Connect => info!("Connected"),
            ConnectionEvent::Reconnect => warn!("Reconnection starting"),
            ConnectionEvent::Close => {
                warn!("Connection closed, the server probably went away")
            }
            ConnectionEvent::Disconnect => warn!("Server sent a disconnect"),
            ConnectionEvent::Offline => {
                error!("Offline reported, possibly a duplicate client id")
            }
            ConnectionEvent::Error(reason) => {
                error!("Error connecting to the MQTT server: {reason}")
            }
            ConnectionEvent::End => info!("Connection closed by request"),
        }
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Error(reason) => write!(f, "error: {reason}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Remembers whether the client is currently connected.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    connected: bool,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn observe(&mut self, outcome: &Result<Event, ConnectionError>) -> Vec<ConnectionEvent> {
        match outcome {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                self.connected = true;
                vec![ConnectionEvent::Connect]
            }
            Ok(Event::Incoming(Packet::Disconnect)) => vec![ConnectionEvent::Disconnect],
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                self.connected = false;
                vec![ConnectionEvent::End]
            }
            Ok(_) => Vec::new(),
            // every client handle is gone; nothing left to send
            Err(ConnectionError::RequestsDone) => {
                self.connected = false;
                vec![ConnectionEvent::End]
            }
            Err(_) if self.connected => {
                self.connected = false;
                vec![ConnectionEvent::Close, ConnectionEvent::Offline]
            }
            Err(e) => vec![ConnectionEvent::Error(e.to_string()), ConnectionEvent::Close],
        }
    }
}

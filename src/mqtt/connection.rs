//! Live broker connection: client handle for publishing plus the spawned event loop
//! that drives the network and logs lifecycle events.

use std::time::Duration;

use rumqttc::{AsyncClient, ClientError, EventLoop, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::BrokerOptions;
use super::events::{ConnectionEvent, ConnectionTracker};
use crate::forward::{Publish, PublishError};

/// Capacity of the client request queue; publishes beyond it are dropped.
pub const REQUEST_QUEUE_CAPACITY: usize = 1024;

/// Delay before reconnecting after a failure.
pub const RECONNECT_PERIOD: Duration = Duration::from_secs(1);

pub struct BrokerConnection {
    client: AsyncClient,
    event_loop: JoinHandle<()>,
}

/// Open the connection in the background. Publishes made before the CONNACK are
/// queued by the client.
pub fn connect(options: &BrokerOptions) -> BrokerConnection {
    info!("Connecting to {}", options.endpoint);
    let (client, event_loop) = AsyncClient::new(options.to_mqtt_options(), REQUEST_QUEUE_CAPACITY);
    let event_loop = tokio::spawn(run_event_loop(event_loop));
    BrokerConnection { client, event_loop }
}

async fn run_event_loop(mut event_loop: EventLoop) {
    let mut tracker = ConnectionTracker::new();
    loop {
        let outcome = event_loop.poll().await;
        if let Err(e) = &outcome {
            debug!(error = %e, connected = tracker.is_connected(), "MQTT poll failed");
        }

        let events = tracker.observe(&outcome);
        for event in &events {
            event.log();
        }
        if events.iter().any(ConnectionEvent::is_terminal) {
            break;
        }

        // poll() reconnects on the next call after an error
        if outcome.is_err() {
            tokio::time::sleep(RECONNECT_PERIOD).await;
            ConnectionEvent::Reconnect.log();
        }
    }
}

impl BrokerConnection {
    /// Request a clean DISCONNECT after everything already queued, then wait up to
    /// `grace` for the event loop to finish.
    pub async fn close(self, grace: Duration) {
        let BrokerConnection {
            client,
            mut event_loop,
        } = self;

        // the queue may be full while offline, so queuing the disconnect is bounded too
        let finished = tokio::time::timeout(grace, async {
            if let Err(e) = client.disconnect().await {
                warn!(error = %e, "Failed to queue disconnect");
            }
            (&mut event_loop).await
        })
        .await;

        match finished {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "MQTT event loop task failed"),
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs(),
                    "Broker did not confirm disconnect in time, unsent lines are lost"
                );
                event_loop.abort();
            }
        }
    }
}

impl Publish for BrokerConnection {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| PublishError {
                topic: topic.to_string(),
                reason: describe(&e),
            })
    }
}

fn describe(e: &ClientError) -> String {
    match e {
        ClientError::TryRequest(_) => "request queue full or closed".to_string(),
        other => other.to_string(),
    }
}

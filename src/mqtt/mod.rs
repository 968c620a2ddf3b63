//! MQTT publishing for board readings
//!
//! Two topics mirror the two output streams: every valid reading goes out
//! raw, and the classification loop publishes who is on the board. The
//! connection is driven by a background event-loop task; publishing is
//! fire-and-forget at QoS 0.

pub mod publisher;

pub use publisher::WeightPublisher;

use serde::{Deserialize, Serialize};

// MQTT settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub raw_topic: String,
    pub occupant_topic: String,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "boardscale".to_string(),
            user: None,
            password: None,
            keep_alive_secs: 5,
            raw_topic: "sensors/wiiboard/raw".to_string(),
            occupant_topic: "sensors/wiiboard/last".to_string(),
        }
    }
}

// Publish errors
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("couldn't queue mqtt message: {0}")]
    Client(#[from] rumqttc::ClientError),
}

//! Weight publisher: rumqttc client plus its event-loop driver task

use std::time::Duration;

use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{MqttSettings, PublishError};

/// Publishing half of the MQTT connection.
///
/// Cheap to clone; all clones share one connection. The event loop runs on
/// its own task and keeps polling through connection errors so the broker
/// can come and go without taking the readings pipeline down.
#[derive(Clone)]
pub struct WeightPublisher {
    client: AsyncClient,
    raw_topic: String,
    occupant_topic: String,
}

impl WeightPublisher {
    /// Opens the broker connection and spawns the event-loop driver.
    pub fn connect(settings: &MqttSettings) -> Self {
        info!(
            "connecting to mqtt broker at {}:{}",
            settings.host, settings.port
        );

        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
        if let (Some(user), Some(password)) = (&settings.user, &settings.password) {
            options.set_credentials(user.clone(), password.clone());
        }

        let (client, mut event_loop) = AsyncClient::new(options, 100);

        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(event) => debug!("mqtt event: {event:?}"),
                    Err(e) => {
                        warn!("mqtt connection error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            raw_topic: settings.raw_topic.clone(),
            occupant_topic: settings.occupant_topic.clone(),
        }
    }

    /// Publishes one raw reading as `{"weight": <kg>}`.
    pub async fn publish_raw(&self, kg: f64) -> Result<(), PublishError> {
        let payload = json!({ "weight": round_centi(kg) }).to_string();
        self.client
            .publish(&self.raw_topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    /// Publishes a classified reading as `{"<name>": <kg>}`.
    pub async fn publish_occupant(&self, name: &str, kg: f64) -> Result<(), PublishError> {
        let mut body = serde_json::Map::new();
        body.insert(name.to_string(), json!(round_centi(kg)));
        let payload = serde_json::Value::Object(body).to_string();
        self.client
            .publish(&self.occupant_topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }
}

/// Two decimal places is plenty for a bathroom scale.
fn round_centi(kg: f64) -> f64 {
    (kg * 100.0).round() / 100.0
}

use crate::domain::{ConnectionState, IngestionPipeline, MessageDisposition, ReadinessState};
use crate::mqtt::subscription_filters;
use chrono::Utc;
use common::domain::{DomainError, DomainResult};
use rumqttc::{
    AsyncClient, Event, MqttOptions, Packet, QoS, SubscribeFilter, SubscribeReasonCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, instrument, warn};

#[derive(Debug, Clone)]
pub struct MqttSubscriberConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub clean_session: bool,
    /// Delivery quality level for all subscriptions, 0 to 2
    pub qos: u8,
    pub topic_prefix: String,
    pub max_retry_attempts: u32,
    pub retry_delay: Duration,
    /// Capacity of the client request channel
    pub channel_capacity: usize,
}

impl Default for MqttSubscriberConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "mqtt-collector".to_string(),
            keep_alive: Duration::from_secs(60),
            clean_session: true,
            qos: 1,
            topic_prefix: "iot".to_string(),
            max_retry_attempts: 10,
            retry_delay: Duration::from_secs(5),
            channel_capacity: 100,
        }
    }
}

pub fn qos_from_level(level: u8) -> DomainResult<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(DomainError::InvalidConfiguration(format!(
            "MQTT QoS must be 0, 1 or 2, got {}",
            other
        ))),
    }
}

/// Run the MQTT subscriber until cancelled
///
/// Each failed session is retried after `retry_delay`. The attempt counter resets
/// whenever a session reached `subscribed`; running out of attempts is an error so
/// the service exits.
#[instrument(
    name = "mqtt_subscriber",
    skip_all,
    fields(host = %config.host, port = config.port, client_id = %config.client_id)
)]
pub async fn run_mqtt_subscriber(
    config: MqttSubscriberConfig,
    pipeline: Arc<IngestionPipeline>,
    readiness: Arc<ReadinessState>,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    let qos = qos_from_level(config.qos)?;
    info!(topic_prefix = %config.topic_prefix, qos = config.qos, "starting MQTT subscriber");

    let mut retry_count = 0;

    loop {
        if ctx.is_cancelled() {
            debug!("MQTT subscriber cancelled before connection");
            break;
        }

        readiness.transition(ConnectionState::Connecting);
        let mut reached_subscribed = false;

        let session = run_mqtt_connection(
            &config,
            qos,
            &pipeline,
            &readiness,
            &ctx,
            &mut reached_subscribed,
        )
        .await;
        readiness.transition(ConnectionState::Disconnected);

        match session {
            Ok(()) => {
                debug!("MQTT subscriber stopped cleanly");
                break;
            }
            Err(e) => {
                error!(error = %e, "MQTT connection error");

                if reached_subscribed {
                    retry_count = 0;
                }
                retry_count += 1;
                if retry_count >= config.max_retry_attempts {
                    error!(
                        max_retries = config.max_retry_attempts,
                        "max retry attempts reached, stopping MQTT subscriber"
                    );
                    return Err(anyhow::anyhow!(
                        "MQTT broker unreachable after {} attempts: {}",
                        config.max_retry_attempts,
                        e
                    ));
                }

                warn!(
                    attempt = retry_count,
                    max_attempts = config.max_retry_attempts,
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = tokio::time::sleep(config.retry_delay) => {}
                }
            }
        }
    }

    info!("MQTT subscriber stopped");
    Ok(())
}

/// One broker session: connect, subscribe, then consume until error or cancellation
async fn run_mqtt_connection(
    config: &MqttSubscriberConfig,
    qos: QoS,
    pipeline: &IngestionPipeline,
    readiness: &ReadinessState,
    ctx: &CancellationToken,
    reached_subscribed: &mut bool,
) -> DomainResult<()> {
    let mut mqtt_options = MqttOptions::new(&config.client_id, &config.host, config.port);
    mqtt_options.set_keep_alive(config.keep_alive);
    mqtt_options.set_clean_session(config.clean_session);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, config.channel_capacity);
    let filters = subscription_filters(&config.topic_prefix);
    let mut awaiting_suback = false;

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!("cancellation received, disconnecting");
                let _ = client.disconnect().await;
                return Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                        readiness.transition(ConnectionState::Connected);

                        client
                            .subscribe_many(
                                filters.iter().map(|f| SubscribeFilter::new(f.clone(), qos)),
                            )
                            .await
                            .map_err(|e| {
                                DomainError::RepositoryError(anyhow::anyhow!(
                                    "Failed to subscribe: {}",
                                    e
                                ))
                            })?;
                        awaiting_suback = true;
                        debug!(filters = ?filters, "subscription requested");
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        if ack
                            .return_codes
                            .iter()
                            .any(|code| matches!(code, SubscribeReasonCode::Failure))
                        {
                            return Err(DomainError::RepositoryError(anyhow::anyhow!(
                                "broker rejected subscription: {:?}",
                                ack.return_codes
                            )));
                        }
                        if awaiting_suback {
                            awaiting_suback = false;
                            readiness.transition(ConnectionState::Subscribed);
                            *reached_subscribed = true;
                            info!(filters = ?filters, "subscribed to MQTT topics");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if readiness.connection_state().accepts_messages() {
                            handle_mqtt_message(pipeline, &publish.topic, &publish.payload).await;
                        } else {
                            debug!(topic = %publish.topic, "dropping message received while not connected");
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        return Err(DomainError::RepositoryError(anyhow::anyhow!(
                            "broker closed the connection"
                        )));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(DomainError::RepositoryError(anyhow::anyhow!(
                            "MQTT event loop error: {}",
                            e
                        )));
                    }
                }
            }
        }
    }
}

/// Handle an incoming MQTT message in its own trace
pub async fn handle_mqtt_message(
    pipeline: &IngestionPipeline,
    topic: &str,
    payload: &[u8],
) -> MessageDisposition {
    let span = info_span!(
        parent: Span::none(),
        "mqtt_message",
        topic = %topic,
        payload_size = payload.len(),
        device_id = tracing::field::Empty,
    );

    pipeline
        .process(topic, payload, Utc::now())
        .instrument(span)
        .await
}

use common::domain::{Category, DomainError, DomainResult};

/// Device id and category carried by an inbound topic
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTopic {
    pub device_id: String,
    /// `None` when the suffix is absent or not one of the five known categories
    pub category: Option<Category>,
}

/// Parse a topic of the form `{prefix}/{device_id}/{category...}`
///
/// The category may span several segments (`command/ack`). The prefix itself is
/// not checked; the subscriptions already restrict what arrives.
///
/// # Examples
/// ```
/// use common::domain::Category;
/// use ingestion_worker::mqtt::parse_topic;
///
/// let parsed = parse_topic("iot/dc-meter-007/command/ack").unwrap();
/// assert_eq!(parsed.device_id, "dc-meter-007");
/// assert_eq!(parsed.category, Some(Category::CommandAck));
/// ```
pub fn parse_topic(topic: &str) -> DomainResult<ParsedTopic> {
    let mut parts = topic.splitn(3, '/');
    let _prefix = parts.next();

    let device_id = match parts.next().map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => {
            return Err(DomainError::InvalidTopic(format!(
                "topic '{}' has no device segment",
                topic
            )));
        }
    };

    let category = parts.next().and_then(Category::from_topic_suffix);

    Ok(ParsedTopic {
        device_id: device_id.to_string(),
        category,
    })
}

/// Wildcard filters for every consumed category, e.g. `iot/+/ota/status`
pub fn subscription_filters(prefix: &str) -> Vec<String> {
    Category::ALL
        .iter()
        .map(|category| format!("{}/+/{}", prefix, category.topic_suffix()))
        .collect()
}

use crate::error::{Error, Result};

/// Default topic prefix for all meter measurements.
pub const TOPIC_PREFIX: &str = "power/sdm630/";

/// Builder for measurement topics.
///
/// Topics follow the pattern `<prefix><device_address>/<measurement>`. The prefix
/// is used verbatim, so it normally ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    prefix: String,
}

impl TopicBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Build the topic for one measurement of one device.
    ///
    /// # Example
    /// ```
    /// use sdm630_common::topic::TopicBuilder;
    ///
    /// let topics = TopicBuilder::new("power/sdm630/");
    /// assert_eq!(topics.build(1, "Total_Power_Watt"), "power/sdm630/1/Total_Power_Watt");
    /// ```
    pub fn build(&self, device: u8, measurement: &str) -> String {
        format!("{}{}/{}", self.prefix, device, measurement)
    }
}

/// Check that `level` can be used as a single MQTT topic level.
pub fn validate_topic_level(level: &str) -> Result<()> {
    if level.is_empty() {
        return Err(Error::Topic("topic level cannot be empty".to_string()));
    }
    if let Some(c) = level.chars().find(|c| matches!(c, '/' | '+' | '#' | '\0')) {
        return Err(Error::Topic(format!(
            "'{}' contains reserved character {:?}",
            level, c
        )));
    }
    Ok(())
}

/// Check that `prefix` is a valid topic prefix for publishing.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.contains(['+', '#', '\0']) {
        return Err(Error::Topic(format!(
            "prefix '{}' must not contain wildcards",
            prefix
        )));
    }
    if prefix.starts_with('$') {
        return Err(Error::Topic(format!(
            "prefix '{}' must not start with '$'",
            prefix
        )));
    }
    Ok(())
}

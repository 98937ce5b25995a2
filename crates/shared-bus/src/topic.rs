//! # Topic Filters
//!
//! MQTT-style topic matching:
//!
//! - `+` matches exactly one level
//! - `#` matches any number of trailing levels (including zero) and must be
//!   the last level
//! - wildcards must occupy a whole level

use crate::TOPIC_SEPARATOR;
use std::fmt;
use thiserror::Error;

/// Errors from topic validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// Empty topic or filter.
    #[error("topic is empty")]
    Empty,

    /// A wildcard appeared inside a level (e.g. `a/b+`).
    #[error("wildcard must occupy a whole level: {0}")]
    PartialWildcard(String),

    /// `#` appeared somewhere other than the last level.
    #[error("multi-level wildcard must be last: {0}")]
    MisplacedMultiLevel(String),

    /// A topic name used for publishing contained a wildcard.
    #[error("wildcards are not allowed in topic names: {0}")]
    WildcardInName(String),
}

/// A validated subscription filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicFilter {
    raw: String,
}

impl TopicFilter {
    /// Parse and validate a filter.
    pub fn parse(filter: &str) -> Result<Self, TopicError> {
        if filter.is_empty() {
            return Err(TopicError::Empty);
        }

        let levels: Vec<&str> = filter.split(TOPIC_SEPARATOR).collect();
        let last = levels.len() - 1;

        for (i, level) in levels.iter().enumerate() {
            let has_wildcard = level.contains('+') || level.contains('#');
            if has_wildcard && level.len() > 1 {
                return Err(TopicError::PartialWildcard(filter.to_string()));
            }
            if *level == "#" && i != last {
                return Err(TopicError::MisplacedMultiLevel(filter.to_string()));
            }
        }

        Ok(Self {
            raw: filter.to_string(),
        })
    }

    /// The filter as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the filter contains no wildcard.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        !self.raw.contains(['+', '#'])
    }

    /// Check whether a concrete topic name matches this filter.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        let mut filter_levels = self.raw.split(TOPIC_SEPARATOR);
        let mut topic_levels = topic.split(TOPIC_SEPARATOR);

        loop {
            match (filter_levels.next(), topic_levels.next()) {
                (Some("#"), _) => return true,
                (Some("+"), Some(_)) => continue,
                (Some(f), Some(t)) if f == t => continue,
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Validate a topic name used for publishing.
pub fn validate_topic_name(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if topic.contains(['+', '#']) {
        return Err(TopicError::WildcardInName(topic.to_string()));
    }
    Ok(())
}

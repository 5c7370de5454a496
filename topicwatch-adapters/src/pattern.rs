//! Topic subscription patterns.

use std::fmt;
use std::str::FromStr;

use crate::error::PatternError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`: exactly one segment.
    Single,
    /// `**`: any remainder, including nothing. Always last.
    Rest,
}

/// A `/`-separated topic pattern.
///
/// `*` matches exactly one segment and a trailing `**` matches any number of
/// segments, including none. `**` on its own matches every topic.
///
/// # Example
///
/// ```rust
/// use topicwatch_adapters::TopicPattern;
///
/// let pattern: TopicPattern = "robot/*/imu".parse().unwrap();
/// assert!(pattern.matches("robot/left/imu"));
/// assert!(!pattern.matches("robot/left/arm/imu"));
///
/// assert!(TopicPattern::all().matches("anything/at/all"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        let parts: Vec<&str> = raw.split('/').collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());

        for (i, part) in parts.into_iter().enumerate() {
            let segment = match part {
                "" => return Err(PatternError::EmptySegment(raw.to_string())),
                "*" => Segment::Single,
                "**" if i == last => Segment::Rest,
                "**" => return Err(PatternError::MisplacedRecursive(raw.to_string())),
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The all-topics wildcard.
    pub fn all() -> Self {
        Self {
            raw: "**".to_string(),
            segments: vec![Segment::Rest],
        }
    }

    pub fn is_all(&self) -> bool {
        self.segments == [Segment::Rest]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split('/');

        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::Single => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(literal) => {
                    if parts.next() != Some(literal.as_str()) {
                        return false;
                    }
                }
            }
        }

        parts.next().is_none()
    }

    /// Translate into a NATS subject filter (`.` separators, `>` for `**`).
    pub fn to_subject(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => literal.as_str(),
                Segment::Single => "*",
                Segment::Rest => ">",
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl FromStr for TopicPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// True when `topic` matches any of `patterns`.
pub fn matches_any(patterns: &[TopicPattern], topic: &str) -> bool {
    patterns.iter().any(|p| p.matches(topic))
}

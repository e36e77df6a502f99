use chrono::{DateTime, Duration, TimeZone};
use serde::Serialize;
use std::fmt::Display;

/// Reply used when no other reply can be produced safely.
pub const GENERIC_FAILURE: &str = "Sorry, something went wrong while answering that.";

/// The fulfillment reply envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub speech: String,
    #[serde(rename = "displayText")]
    pub display_text: String,
    pub source: String,
}

impl ResponseEnvelope {
    pub fn new(speech: impl Into<String>, source: impl Into<String>) -> Self {
        let speech = speech.into();
        Self {
            display_text: speech.clone(),
            speech,
            source: source.into(),
        }
    }
}

/// What the webhook answers: an envelope, or `{}` when the request carried
/// nothing to act on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Envelope(ResponseEnvelope),
    Empty {},
}

impl Reply {
    pub fn empty() -> Self {
        Self::Empty {}
    }

    pub fn speech(&self) -> Option<&str> {
        match self {
            Self::Envelope(envelope) => Some(&envelope.speech),
            Self::Empty {} => None,
        }
    }
}

impl From<ResponseEnvelope> for Reply {
    fn from(envelope: ResponseEnvelope) -> Self {
        Self::Envelope(envelope)
    }
}

/// Renders a signed duration as "3 hours, 11 minutes later" or
/// "5 minutes ago". A zero duration is "now".
pub fn format_wait(wait: Duration) -> String {
    let total = wait.num_seconds();
    let seconds = total.unsigned_abs();
    let (hours, minutes, seconds) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);

    let parts: Vec<String> = [(hours, "hour"), (minutes, "minute"), (seconds, "second")]
        .into_iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| {
            if amount == 1 {
                format!("1 {unit}")
            } else {
                format!("{amount} {unit}s")
            }
        })
        .collect();

    if parts.is_empty() {
        return "now".to_string();
    }
    let suffix = if total > 0 { "later" } else { "ago" };
    format!("{} {suffix}", parts.join(", "))
}

/// Renders a timestamp in `zone`, e.g. "26 December 2016 15:21:55".
pub fn format_timestamp<T, Z>(timestamp: &DateTime<T>, zone: &Z) -> String
where
    T: TimeZone,
    Z: TimeZone,
    Z::Offset: Display,
{
    timestamp
        .with_timezone(zone)
        .format("%d %B %Y %H:%M:%S")
        .to_string()
}

//! Case content, responses and reveal grants
use super::error::{CaseError, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

pub const MAX_SITUATION_LEN: usize = 10_000;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    #[n(0)]
    Submitted,
    #[n(1)]
    Responded,
    #[n(2)]
    ProfileRevealed,
    // reserved, nothing in this crate moves a case here
    #[n(3)]
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Submitted => "submitted",
            CaseStatus::Responded => "responded",
            CaseStatus::ProfileRevealed => "profile_revealed",
            CaseStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// `Utc` itself is not `Ord`, so ordering goes through the instant
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> std::result::Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _: &mut C,
    ) -> std::result::Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl Serialize for TimeStamp<Utc> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// What the user tells us about their situation. Immutable once submitted.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase", default)]
pub struct CaseDetails {
    #[n(0)]
    pub situation: String,
    #[n(1)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unclear: Option<String>,
    #[n(2)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub looking_for: Option<String>,
    #[n(3)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub based_in: Option<String>,
    #[n(4)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_horizon: Option<String>,
    #[n(5)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub had_advice_before: Option<bool>,
    #[n(6)]
    pub perspectives: BTreeSet<String>,
    #[n(7)]
    pub areas: BTreeSet<String>,
}

impl CaseDetails {
    /// Construct an empty draft, fill it with the setters below
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_situation(mut self, situation: &str) -> Self {
        self.situation = situation.to_string();
        self
    }
    pub fn set_unclear(mut self, unclear: &str) -> Self {
        self.unclear = Some(unclear.to_string());
        self
    }
    pub fn set_looking_for(mut self, looking_for: &str) -> Self {
        self.looking_for = Some(looking_for.to_string());
        self
    }
    pub fn set_based_in(mut self, based_in: &str) -> Self {
        self.based_in = Some(based_in.to_string());
        self
    }
    pub fn set_time_horizon(mut self, horizon: &str) -> Self {
        self.time_horizon = Some(horizon.to_string());
        self
    }
    pub fn set_had_advice_before(mut self, had_advice: bool) -> Self {
        self.had_advice_before = Some(had_advice);
        self
    }
    pub fn add_perspective(mut self, tag: &str) -> Self {
        self.perspectives.insert(tag.to_string());
        self
    }
    pub fn add_area(mut self, tag: &str) -> Self {
        self.areas.insert(tag.to_string());
        self
    }

    /// Trims every field, drops blank optionals and blank tags, and rejects a
    /// case without a situation.
    pub fn validate_and_finalise(self) -> Result<Self> {
        let situation = self.situation.trim().to_string();
        if situation.is_empty() {
            return Err(CaseError::invalid("situation is required"));
        }
        if situation.chars().count() > MAX_SITUATION_LEN {
            return Err(CaseError::invalid(format!(
                "situation is longer than {MAX_SITUATION_LEN} characters"
            )));
        }

        Ok(Self {
            situation,
            unclear: non_blank(self.unclear),
            looking_for: non_blank(self.looking_for),
            based_in: non_blank(self.based_in),
            time_horizon: non_blank(self.time_horizon),
            had_advice_before: self.had_advice_before,
            perspectives: normalise_tags(self.perspectives),
            areas: normalise_tags(self.areas),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalise_tags(tags: BTreeSet<String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// The structured form of an advisor's answer.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseSections {
    #[n(0)]
    pub approach: String,
    #[n(1)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarify_before_advice: Option<String>,
    #[n(2)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub how_decisions_made: Option<String>,
    #[n(3)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_philosophy: Option<String>,
    #[n(4)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub who_this_suits: Option<String>,
}

impl ResponseSections {
    pub fn new(approach: &str) -> Self {
        Self {
            approach: approach.to_string(),
            ..Self::default()
        }
    }
    pub fn set_clarify_before_advice(mut self, text: &str) -> Self {
        self.clarify_before_advice = Some(text.to_string());
        self
    }
    pub fn set_how_decisions_made(mut self, text: &str) -> Self {
        self.how_decisions_made = Some(text.to_string());
        self
    }
    pub fn set_fee_philosophy(mut self, text: &str) -> Self {
        self.fee_philosophy = Some(text.to_string());
        self
    }
    pub fn set_who_this_suits(mut self, text: &str) -> Self {
        self.who_this_suits = Some(text.to_string());
        self
    }

    pub fn has_approach(&self) -> bool {
        !self.approach.trim().is_empty()
    }

    /// Sections in rendering order
    pub fn in_order(&self) -> [Option<&str>; 5] {
        [
            Some(self.approach.as_str()),
            self.clarify_before_advice.as_deref(),
            self.how_decisions_made.as_deref(),
            self.fee_philosophy.as_deref(),
            self.who_this_suits.as_deref(),
        ]
    }

    pub(crate) fn trimmed(&self) -> Self {
        Self {
            approach: self.approach.trim().to_string(),
            clarify_before_advice: non_blank(self.clarify_before_advice.clone()),
            how_decisions_made: non_blank(self.how_decisions_made.clone()),
            fee_philosophy: non_blank(self.fee_philosophy.clone()),
            who_this_suits: non_blank(self.who_this_suits.clone()),
        }
    }
}

/// One advisor's answer to a case, embedded in the case document.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct Response {
    #[n(0)]
    pub advisor_id: String,
    // name and firm as they were when the advisor responded
    #[n(1)]
    pub advisor_name: String,
    #[n(2)]
    pub advisor_firm: Option<String>,
    #[n(3)]
    pub response: String,
    #[n(4)]
    pub response_sections: Option<ResponseSections>,
    #[n(5)]
    pub submitted_at: TimeStamp<Utc>,
    #[n(6)]
    pub profile_revealed: bool,
    #[n(7)]
    pub profile_revealed_at: Option<TimeStamp<Utc>>,
}

impl Response {
    pub fn new(
        advisor_id: String,
        advisor_name: String,
        advisor_firm: Option<String>,
        response: String,
        response_sections: Option<ResponseSections>,
        submitted_at: TimeStamp<Utc>,
    ) -> Self {
        Self {
            advisor_id,
            advisor_name,
            advisor_firm,
            response,
            response_sections,
            submitted_at,
            profile_revealed: false,
            profile_revealed_at: None,
        }
    }
}

/// Records that the case owner's identity was handed to an advisor.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealGrant {
    #[n(0)]
    pub advisor_id: String,
    #[n(1)]
    pub revealed_at: TimeStamp<Utc>,
}

//! Advisor response input, validated at the boundary before the engine sees it
use super::case::ResponseSections;
use super::error::{CaseError, Result};
use serde::Deserialize;

const SECTION_SEPARATOR: &str = "\n\n";

/// The two accepted shapes of a response submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespondInput {
    Structured(ResponseSections),
    LegacyFlatText(String),
}

/// Raw request body, either key may be present.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondBody {
    #[serde(default)]
    pub response_sections: Option<ResponseSections>,
    #[serde(default)]
    pub response: Option<String>,
}

/// A response the engine can store as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedResponse {
    pub body: String,
    pub sections: Option<ResponseSections>,
}

impl TryFrom<RespondBody> for RespondInput {
    type Error = CaseError;

    // structured wins when it carries an approach, otherwise fall back to flat text
    fn try_from(value: RespondBody) -> Result<Self> {
        if let Some(sections) = value.response_sections {
            if sections.has_approach() {
                return Ok(RespondInput::Structured(sections));
            }
        }
        match value.response {
            Some(text) if !text.trim().is_empty() => Ok(RespondInput::LegacyFlatText(text)),
            _ => Err(missing_approach()),
        }
    }
}

impl RespondInput {
    pub fn validate(self) -> Result<ValidatedResponse> {
        match self {
            RespondInput::Structured(sections) => {
                let sections = sections.trimmed();
                if sections.approach.is_empty() {
                    return Err(missing_approach());
                }
                Ok(ValidatedResponse {
                    body: synthesise(&sections),
                    sections: Some(sections),
                })
            }
            RespondInput::LegacyFlatText(text) => {
                let body = text.trim().to_string();
                if body.is_empty() {
                    return Err(missing_approach());
                }
                Ok(ValidatedResponse {
                    body,
                    sections: None,
                })
            }
        }
    }
}

/// Joins the non-empty sections with blank lines, approach first.
pub fn synthesise(sections: &ResponseSections) -> String {
    sections
        .in_order()
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

fn missing_approach() -> CaseError {
    CaseError::invalid("a response needs a non-empty approach")
}

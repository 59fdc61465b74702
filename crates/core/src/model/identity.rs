use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Name,
    CandidateId,
}

impl std::fmt::Display for IdentityField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityField::Name => f.write_str("name"),
            IdentityField::CandidateId => f.write_str("candidate id"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentityError {
    #[error("{0} is required")]
    Missing(IdentityField),
}

/// Raw identity input as typed by the candidate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityDraft {
    pub name: String,
    pub candidate_id: Option<String>,
}

impl IdentityDraft {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            candidate_id: None,
        }
    }

    #[must_use]
    pub fn with_candidate_id(mut self, id: impl Into<String>) -> Self {
        self.candidate_id = Some(id.into());
        self
    }

    /// True when every required field is non-empty after trimming.
    #[must_use]
    pub fn is_complete(&self, require_candidate_id: bool) -> bool {
        self.clone().validate(require_candidate_id).is_ok()
    }

    /// Trim and validate the draft.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Missing` for the first required field that is blank.
    pub fn validate(self, require_candidate_id: bool) -> Result<CandidateIdentity, IdentityError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(IdentityError::Missing(IdentityField::Name));
        }

        let candidate_id = normalize_optional(self.candidate_id);
        if require_candidate_id && candidate_id.is_none() {
            return Err(IdentityError::Missing(IdentityField::CandidateId));
        }

        Ok(CandidateIdentity { name, candidate_id })
    }
}

/// Validated identity of the person taking the exam.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateIdentity {
    name: String,
    candidate_id: Option<String>,
}

impl CandidateIdentity {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn candidate_id(&self) -> Option<&str> {
        self.candidate_id.as_deref()
    }

    /// Filesystem-safe stem used for exported artifacts: `name` or `name_id`.
    #[must_use]
    pub fn file_stem(&self) -> String {
        let raw = match &self.candidate_id {
            Some(id) => format!("{}_{id}", self.name),
            None => self.name.clone(),
        };
        raw.chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect()
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::GenerationFailure;

pub type Result<T> = std::result::Result<T, ImageGenError>;

/// Machine-readable failure category carried by a [`GenerationFailure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Missing prompt or required image
    Validation,
    /// Operation cannot start (no image for edit/upscale, missing credential)
    Precondition,
    /// Non-success HTTP status or transport failure
    ProviderHttp,
    /// Provider answered with an explicit error envelope
    ProviderDomain,
    /// Output withheld by the provider's safety filter
    ContentFiltered,
    QuotaExhausted,
    AuthInvalid,
    RateLimited,
    /// Active credential ran out of balance, another one is now active
    CredentialRotated,
    /// Every configured credential ran out of balance
    CredentialsExhausted,
    UnrecognizedResponse,
    UnsupportedProvider,
    /// Provider queued an asynchronous job instead of returning a result
    TaskAccepted,
}

/// Errors raised inside the generation pipeline
///
/// These never reach callers of the dispatcher directly; they are folded
/// into a [`GenerationFailure`] by [`ImageGenError::into_failure`].
#[derive(Debug, Error)]
pub enum ImageGenError {
    /// Request failed validation before any network call
    #[error("{0}")]
    Validation(String),

    /// Operation precondition not met (e.g. no image to edit)
    #[error("{0}")]
    Precondition(String),

    /// Provider returned a non-success status
    #[error("Provider API error ({status}): {message}")]
    ProviderApi { status: u16, message: String },

    /// Provider returned an explicit error envelope
    #[error("{0}")]
    ProviderDomain(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Response body did not match the expected shape
    #[error("Unrecognized provider response: {0}")]
    UnrecognizedResponse(String),

    /// No adapter exists for the model's provider
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Model id not present in the registry
    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    /// Missing or invalid configuration (e.g. no API key)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider completed the job but withheld every image
    #[error("{message}")]
    ContentFiltered { message: String, flags: Vec<bool> },

    /// Credential balance ran out
    #[error("{}", balance_message(*rotated))]
    BalanceExhausted { rotated: bool },

    /// Provider queued the job asynchronously
    #[error("Upscale task accepted but not completed, task id: {task_id}")]
    TaskAccepted { task_id: String },

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

fn balance_message(rotated: bool) -> &'static str {
    if rotated {
        "Credential balance exhausted; switched to the next credential, please retry"
    } else {
        "All configured credentials have exhausted their balance"
    }
}

impl ImageGenError {
    /// Failure category before message reclassification
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Validation(_) | Self::ModelNotFound(_) => Some(ErrorCode::Validation),
            Self::Precondition(_) | Self::Config(_) => Some(ErrorCode::Precondition),
            Self::ProviderApi { status, .. } => Some(match *status {
                401 | 403 => ErrorCode::AuthInvalid,
                429 => ErrorCode::RateLimited,
                _ => ErrorCode::ProviderHttp,
            }),
            Self::Connection(_) => Some(ErrorCode::ProviderHttp),
            Self::ProviderDomain(_) => Some(ErrorCode::ProviderDomain),
            Self::UnrecognizedResponse(_) => Some(ErrorCode::UnrecognizedResponse),
            Self::UnsupportedProvider(_) => Some(ErrorCode::UnsupportedProvider),
            Self::ContentFiltered { .. } => Some(ErrorCode::ContentFiltered),
            Self::BalanceExhausted { rotated: true } => Some(ErrorCode::CredentialRotated),
            Self::BalanceExhausted { rotated: false } => Some(ErrorCode::CredentialsExhausted),
            Self::TaskAccepted { .. } => Some(ErrorCode::TaskAccepted),
            Self::Internal(_) => None,
        }
    }

    /// Whether the error came back from (or on the way to) a provider
    ///
    /// Only these are subject to message reclassification.
    fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::ProviderApi { .. } | Self::ProviderDomain(_) | Self::Connection(_) | Self::Internal(_)
        )
    }

    /// Convert into the failure half of the unified result
    ///
    /// Provider failures whose message contains a known vendor phrase are
    /// rewritten into a user-facing category; everything else keeps its
    /// raw message.
    pub fn into_failure(self) -> GenerationFailure {
        let message = self.to_string();

        if self.is_provider_failure()
            && let Some((code, friendly)) = classify_message(&message)
        {
            return GenerationFailure {
                error: friendly.to_owned(),
                error_code: Some(code),
                has_nsfw_concepts: None,
            };
        }

        let error_code = self.code();
        let has_nsfw_concepts = match self {
            Self::ContentFiltered { flags, .. } => Some(flags),
            _ => None,
        };

        GenerationFailure {
            error: message,
            error_code,
            has_nsfw_concepts,
        }
    }
}

/// Best-effort classification of a raw provider message
///
/// Matches known vendor phrases case-insensitively and returns the category
/// together with a user-facing message.
pub fn classify_message(message: &str) -> Option<(ErrorCode, &'static str)> {
    let lowered = message.to_lowercase();

    if lowered.contains("insufficient_quota") || lowered.contains("quota") {
        Some((ErrorCode::QuotaExhausted, "API quota exhausted, check your account balance"))
    } else if lowered.contains("invalid_api_key") || lowered.contains("unauthorized") {
        Some((ErrorCode::AuthInvalid, "API key is invalid, check your key settings"))
    } else if lowered.contains("rate_limit") || lowered.contains("too_many_requests") {
        Some((ErrorCode::RateLimited, "Too many requests, please try again later"))
    } else {
        None
    }
}

/// Whether a provider message reports an exhausted credential balance
pub fn is_balance_exhausted(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("exhausted balance") || lowered.contains("user is locked")
}

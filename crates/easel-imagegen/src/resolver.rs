//! Shapes raw user input into a provider payload
//!
//! Resolution is pure: the same model and request always produce the same
//! payload, and nothing here touches the network.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    error::{ImageGenError, Result},
    model::{Literal, Model},
    types::{GenerationRequest, Operation},
};

/// Provider-agnostic payload produced by [`resolve`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPayload {
    pub operation: Operation,
    /// Wire model id (may differ from the registry id for edits)
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Allow-listed, defaulted and normalized fields
    pub fields: Map<String, Value>,
}

/// Pick the operation for a request
///
/// Models that require an image always edit; otherwise uploads switch the
/// request from generate to edit.
pub fn operation_for(model: &Model, request: &GenerationRequest) -> Operation {
    if model.meta.requires_image || !request.images.is_empty() {
        Operation::Edit
    } else {
        Operation::Generate
    }
}

/// Resolve a request against a model's schema and metadata
///
/// # Errors
///
/// Returns `ImageGenError::Validation` when the model requires a prompt and
/// none was supplied, or `ImageGenError::Precondition` when more images were
/// uploaded than the model accepts
pub fn resolve(model: &Model, request: &GenerationRequest) -> Result<ResolvedPayload> {
    let prompt = request.prompt_text().map(str::to_owned);

    if model.meta.requires_prompt && prompt.is_none() {
        return Err(ImageGenError::Validation("Prompt must not be empty".to_owned()));
    }

    check_upload_count(model, request)?;

    let operation = operation_for(model, request);
    let meta = &model.meta;

    let (allow_list, defaults, model_id) = match operation {
        Operation::Generate => (meta.generation_params, meta.generation_defaults, model.id),
        Operation::Edit => (
            meta.edit_params,
            meta.edit_defaults,
            meta.edit_model_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .unwrap_or(model.id),
        ),
    };

    let allowed = allow_listed(allow_list, &request.params);

    let mut fields = Map::new();
    for (key, value) in defaults {
        fields.insert((*key).to_owned(), value.to_value());
    }

    for (key, value) in &allowed {
        if key == "size" || key == "size_tier" {
            continue;
        }
        if key == "seed" {
            match normalize_seed(value) {
                Some(seed) => {
                    fields.insert(key.clone(), Value::from(seed));
                }
                None => tracing::debug!(model = %model.id, "dropping malformed seed"),
            }
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }

    let size_applies = match operation {
        Operation::Generate => true,
        Operation::Edit => allow_list.contains(&"size"),
    };

    if size_applies && let Some(size) = derive_size(operation, &allowed, model) {
        fields.insert("size".to_owned(), Value::String(size));
    }

    tracing::debug!(
        model = %model.id,
        operation = %operation,
        fields = fields.len(),
        "resolved request payload"
    );

    Ok(ResolvedPayload {
        operation,
        model_id: model_id.to_owned(),
        prompt,
        fields,
    })
}

/// User values whose key is allow-listed and whose value is not null
fn allow_listed(allow_list: &[&str], params: &Map<String, Value>) -> Map<String, Value> {
    allow_list
        .iter()
        .filter_map(|key| {
            params
                .get(*key)
                .filter(|value| !value.is_null())
                .map(|value| ((*key).to_owned(), value.clone()))
        })
        .collect()
}

/// Size precedence: literal size, then tier, then the operation's default,
/// then the generation default
fn derive_size(operation: Operation, allowed: &Map<String, Value>, model: &Model) -> Option<String> {
    let user = |key: &str| {
        allowed
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };
    let default_in = |defaults: &[(&str, Literal)]| {
        defaults
            .iter()
            .find(|(key, _)| *key == "size")
            .and_then(|(_, value)| value.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };

    let operation_default = match operation {
        Operation::Generate => None,
        Operation::Edit => default_in(model.meta.edit_defaults),
    };

    user("size")
        .or_else(|| user("size_tier"))
        .or(operation_default)
        .or_else(|| default_in(model.meta.generation_defaults))
}

/// Normalize a seed to an integer
///
/// Accepts finite numbers and numeric strings, flooring fractions. Blank
/// strings and anything else yield `None`, meaning the field is dropped.
#[allow(clippy::cast_possible_truncation)]
pub fn normalize_seed(value: &Value) -> Option<i64> {
    let number = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            n.as_f64()?
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };

    number.is_finite().then(|| number.floor() as i64)
}

/// A limit of zero means the model declares no upload limit
fn check_upload_count(model: &Model, request: &GenerationRequest) -> Result<()> {
    let limit = model.meta.max_upload_images;
    let uploaded = request.images.len();

    if limit > 0 && uploaded > usize::try_from(limit).unwrap_or(usize::MAX) {
        return Err(ImageGenError::Precondition(format!(
            "{} accepts at most {limit} image(s), {uploaded} were uploaded",
            model.name
        )));
    }

    Ok(())
}

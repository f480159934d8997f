//! Model descriptors and their parameter schemas
//!
//! Everything here is `'static` data so the catalogue can be declared as a
//! plain list literal.

use std::fmt;

use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

/// Provider family a model is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// JSON generate + multipart edit image API
    RestImageApi,
    /// Multipart single-image upscaler
    UpscaleApi,
    /// Chat-completions endpoint returning inline images
    ChatMultimodal,
    /// Queue-based managed subscription service
    ManagedSubscription,
    /// Caller-defined endpoint without a built-in adapter
    CustomEndpoint,
}

impl ProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RestImageApi => "rest-image-api",
            Self::UpscaleApi => "upscale-api",
            Self::ChatMultimodal => "chat-multimodal",
            Self::ManagedSubscription => "managed-subscription",
            Self::CustomEndpoint => "custom-endpoint",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Enum,
    Image,
    File,
    Json,
}

/// Constant value usable in static schema data
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Str(&'static str),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Literal {
    pub fn to_value(self) -> Value {
        match self {
            Self::Str(s) => Value::from(s),
            Self::Int(i) => Value::from(i),
            Self::Float(f) => Value::from(f),
            Self::Bool(b) => Value::from(b),
        }
    }

    pub const fn as_str(self) -> Option<&'static str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Str(s), Value::String(v)) => v.as_str() == s,
            (Self::Bool(b), Value::Bool(v)) => b == *v,
            (Self::Int(_) | Self::Float(_), Value::Number(n)) => {
                n.as_f64().is_some_and(|n| (n - self.as_f64()).abs() < f64::EPSILON)
            }
            _ => false,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    const fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
            Self::Str(_) | Self::Bool(_) => f64::NAN,
        }
    }
}

/// Inclusive numeric bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Bounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// One entry of a model's input or output schema
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParameterDefinition {
    pub key: &'static str,
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Literal>,
    #[serde(skip_serializing_if = "<[Literal]>::is_empty")]
    pub options: &'static [Literal],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Bounds>,
    /// Display scale hint for numeric sliders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Not shown in parameter forms
    pub hidden: bool,
}

impl ParameterDefinition {
    pub const fn new(key: &'static str, kind: ParamType) -> Self {
        Self {
            key,
            kind,
            description: "",
            required: false,
            default: None,
            options: &[],
            validation: None,
            scale: None,
            hidden: false,
        }
    }

    #[must_use]
    pub const fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn default_value(mut self, value: Literal) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub const fn options(mut self, options: &'static [Literal]) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn bounds(mut self, min: f64, max: f64) -> Self {
        self.validation = Some(Bounds {
            min: Some(min),
            max: Some(max),
        });
        self
    }

    #[must_use]
    pub const fn scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Check a user-supplied value against type, bounds, and options
    ///
    /// The resolver does not call this; it is for callers that validate
    /// forms before dispatching.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated rule
    pub fn check(&self, value: &Value) -> Result<(), String> {
        let key = self.key;

        match self.kind {
            ParamType::Number => {
                let Some(number) = value.as_f64() else {
                    return Err(format!("'{key}' must be a number"));
                };
                if let Some(bounds) = self.validation
                    && (bounds.min.is_some_and(|min| number < min) || bounds.max.is_some_and(|max| number > max))
                {
                    return Err(format!(
                        "'{key}' must be between {} and {}",
                        bounds.min.unwrap_or(f64::NEG_INFINITY),
                        bounds.max.unwrap_or(f64::INFINITY)
                    ));
                }
            }
            ParamType::Boolean if !value.is_boolean() => return Err(format!("'{key}' must be a boolean")),
            ParamType::String if !value.is_string() => return Err(format!("'{key}' must be a string")),
            ParamType::Enum if !self.options.iter().any(|option| option.matches(value)) => {
                return Err(format!("'{key}' is not one of the allowed options"));
            }
            _ => {}
        }

        Ok(())
    }
}

/// Operation-shaping metadata
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelMeta {
    /// Keys forwarded on a generate call
    pub generation_params: &'static [&'static str],
    /// Keys forwarded on an edit call
    pub edit_params: &'static [&'static str],
    #[serde(serialize_with = "serialize_pairs")]
    pub generation_defaults: &'static [(&'static str, Literal)],
    #[serde(serialize_with = "serialize_pairs")]
    pub edit_defaults: &'static [(&'static str, Literal)],
    /// Wire model id used for edits when it differs from the model id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_model_id: Option<&'static str>,
    /// Upload cap checked during resolution, zero for no cap
    pub max_upload_images: u32,
    pub requires_prompt: bool,
    pub requires_image: bool,
    pub hide_parameters: bool,
    pub hide_prompt: bool,
}

impl ModelMeta {
    pub const DEFAULT: Self = Self {
        generation_params: &[],
        edit_params: &[],
        generation_defaults: &[],
        edit_defaults: &[],
        edit_model_id: None,
        max_upload_images: 0,
        requires_prompt: true,
        requires_image: false,
        hide_parameters: false,
        hide_prompt: false,
    };
}

impl Default for ModelMeta {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn serialize_pairs<S: Serializer>(pairs: &&'static [(&'static str, Literal)], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(pairs.len()))?;
    for (key, value) in *pairs {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

/// A selectable generation target
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Model {
    /// Registry key, also the wire model identifier
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub provider: ProviderKind,
    /// Endpoint for `custom-endpoint` models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<&'static str>,
    pub input_schema: &'static [ParameterDefinition],
    pub output_schema: &'static [ParameterDefinition],
    pub meta: ModelMeta,
}

impl Model {
    /// URL-safe identifier (`/` replaced with `-`)
    pub fn route_id(&self) -> String {
        self.id.replace('/', "-")
    }

    /// Input parameter definition by key
    pub fn input(&self, key: &str) -> Option<&'static ParameterDefinition> {
        self.input_schema.iter().find(|p| p.key == key)
    }
}

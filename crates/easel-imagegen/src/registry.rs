//! Built-in model catalogue and lookups

use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    error::{ImageGenError, Result},
    model::{Literal, Model, ModelMeta, ParamType, ParameterDefinition, ProviderKind},
};

const IMAGE_MODELS: &str = "Image models";
const MULTIMODAL_MODELS: &str = "Multimodal models";
const SUBSCRIPTION_MODELS: &str = "Subscription models";

const PROMPT: ParameterDefinition = ParameterDefinition::new("prompt", ParamType::String)
    .required()
    .describe("Describe the image to generate or the edit to apply");

const SEED: ParameterDefinition =
    ParameterDefinition::new("seed", ParamType::Number).describe("Random seed for reproducible output");

const IMAGES_OUT: ParameterDefinition =
    ParameterDefinition::new("images", ParamType::Array).describe("Generated images");

const USAGE_OUT: ParameterDefinition = ParameterDefinition::new("usage", ParamType::Object).describe("Billing usage");

pub const GPT_IMAGE_1: Model = Model {
    id: "gpt-image-1",
    name: "GPT Image 1",
    description: "OpenAI gpt-image-1, supports generation and editing",
    category: IMAGE_MODELS,
    provider: ProviderKind::RestImageApi,
    api_endpoint: None,
    input_schema: &[
        PROMPT,
        ParameterDefinition::new("n", ParamType::Number)
            .describe("Number of images (1-10)")
            .default_value(Literal::Int(1))
            .bounds(1.0, 10.0),
        ParameterDefinition::new("size", ParamType::Enum)
            .describe("Output dimensions")
            .default_value(Literal::Str("auto"))
            .options(&[
                Literal::Str("auto"),
                Literal::Str("1024x1024"),
                Literal::Str("1024x1536"),
                Literal::Str("1536x1024"),
            ]),
        ParameterDefinition::new("output_format", ParamType::Enum)
            .describe("Output format")
            .default_value(Literal::Str("png"))
            .options(&[Literal::Str("png"), Literal::Str("jpeg"), Literal::Str("webp")]),
        ParameterDefinition::new("background", ParamType::Enum)
            .describe("Background transparency (png/webp only)")
            .default_value(Literal::Str("auto"))
            .options(&[Literal::Str("auto"), Literal::Str("transparent"), Literal::Str("opaque")]),
        ParameterDefinition::new("output_compression", ParamType::Number)
            .describe("Output compression quality (1-100)")
            .bounds(1.0, 100.0),
    ],
    output_schema: &[IMAGES_OUT, USAGE_OUT],
    meta: ModelMeta {
        generation_params: &["n", "size", "output_format", "background", "output_compression"],
        edit_params: &["n", "size", "background"],
        max_upload_images: 4,
        ..ModelMeta::DEFAULT
    },
};

pub const GEMINI_FLASH_IMAGE: Model = Model {
    id: "gemini-2.5-flash-image-preview",
    name: "Gemini 2.5 Flash Image Preview",
    description: "Google Gemini 2.5 Flash Image Preview (nano-banana)",
    category: IMAGE_MODELS,
    provider: ProviderKind::RestImageApi,
    api_endpoint: None,
    input_schema: &[PROMPT],
    output_schema: &[IMAGES_OUT, USAGE_OUT],
    meta: ModelMeta {
        max_upload_images: 6,
        ..ModelMeta::DEFAULT
    },
};

pub const FLUX_KONTEXT_PRO: Model = Model {
    id: "flux-kontext-pro",
    name: "FLUX.1 Kontext Pro",
    description: "Black Forest Labs FLUX.1 Kontext Pro, text-to-image and in-context editing",
    category: IMAGE_MODELS,
    provider: ProviderKind::RestImageApi,
    api_endpoint: None,
    input_schema: &[
        PROMPT,
        SEED,
        ParameterDefinition::new("output_format", ParamType::Enum)
            .default_value(Literal::Str("png"))
            .options(&[Literal::Str("png"), Literal::Str("jpeg")]),
        ParameterDefinition::new("prompt_upsampling", ParamType::Boolean)
            .describe("Let the provider rewrite the prompt for more detail")
            .default_value(Literal::Bool(false)),
        ParameterDefinition::new("safety_tolerance", ParamType::Number)
            .describe("Moderation tolerance, 0 is strictest")
            .default_value(Literal::Int(2))
            .bounds(0.0, 6.0),
        ParameterDefinition::new("response_format", ParamType::Enum)
            .default_value(Literal::Str("url"))
            .options(&[Literal::Str("url"), Literal::Str("b64_json")]),
    ],
    output_schema: &[IMAGES_OUT, USAGE_OUT],
    meta: ModelMeta {
        generation_params: &["seed", "output_format", "prompt_upsampling", "safety_tolerance", "response_format"],
        edit_params: &["seed", "output_format", "prompt_upsampling", "safety_tolerance", "response_format"],
        generation_defaults: &[("output_format", Literal::Str("png"))],
        edit_defaults: &[("output_format", Literal::Str("png"))],
        max_upload_images: 1,
        ..ModelMeta::DEFAULT
    },
};

pub const SEEDREAM_4: Model = Model {
    id: "doubao-seedream-4-0",
    name: "Seedream 4.0",
    description: "ByteDance Seedream 4.0 with resolution tiers and multi-image editing",
    category: IMAGE_MODELS,
    provider: ProviderKind::RestImageApi,
    api_endpoint: None,
    input_schema: &[
        PROMPT,
        ParameterDefinition::new("size_tier", ParamType::Enum)
            .describe("Resolution tier")
            .default_value(Literal::Str("2K"))
            .options(&[Literal::Str("1K"), Literal::Str("2K"), Literal::Str("4K")]),
        ParameterDefinition::new("size", ParamType::String).describe("Exact dimensions, e.g. 2048x2048"),
        ParameterDefinition::new("n", ParamType::Number)
            .default_value(Literal::Int(1))
            .bounds(1.0, 4.0),
        SEED,
        ParameterDefinition::new("watermark", ParamType::Boolean).default_value(Literal::Bool(false)),
        ParameterDefinition::new("response_format", ParamType::Enum)
            .default_value(Literal::Str("url"))
            .options(&[Literal::Str("url"), Literal::Str("b64_json")]),
    ],
    output_schema: &[IMAGES_OUT, USAGE_OUT],
    meta: ModelMeta {
        generation_params: &["size_tier", "size", "n", "seed", "watermark", "response_format"],
        edit_params: &["size_tier", "size", "seed", "watermark", "response_format"],
        generation_defaults: &[
            ("size", Literal::Str("2K")),
            ("watermark", Literal::Bool(false)),
            ("response_format", Literal::Str("url")),
        ],
        edit_defaults: &[("watermark", Literal::Bool(false)), ("response_format", Literal::Str("url"))],
        max_upload_images: 10,
        ..ModelMeta::DEFAULT
    },
};

pub const IMAGE_UPSCALE: Model = Model {
    id: "image-upscale",
    name: "Image Upscale",
    description: "Lossless upscaling and sharpening of an existing image",
    category: IMAGE_MODELS,
    provider: ProviderKind::UpscaleApi,
    api_endpoint: None,
    input_schema: &[
        ParameterDefinition::new("type", ParamType::String)
            .describe("Upscale profile, `auto` lets the provider choose")
            .default_value(Literal::Str("auto"))
            .hidden(),
        ParameterDefinition::new("scale_factor", ParamType::String)
            .describe("Magnification factor, `auto` lets the provider choose")
            .default_value(Literal::Str("auto"))
            .hidden(),
    ],
    output_schema: &[ParameterDefinition::new("images", ParamType::Array).describe("Upscaled image")],
    meta: ModelMeta {
        edit_params: &["type", "scale_factor"],
        max_upload_images: 1,
        requires_prompt: false,
        requires_image: true,
        hide_parameters: true,
        hide_prompt: true,
        ..ModelMeta::DEFAULT
    },
};

pub const GEMINI_FLASH_IMAGE_CHAT: Model = Model {
    id: "google/gemini-2.5-flash-image-preview",
    name: "Google Gemini 2.5 Flash Image Preview",
    description: "Gemini image generation through the chat-completions interface",
    category: MULTIMODAL_MODELS,
    provider: ProviderKind::ChatMultimodal,
    api_endpoint: None,
    input_schema: &[
        ParameterDefinition::new("prompt", ParamType::String)
            .required()
            .describe("Prompt or question"),
        ParameterDefinition::new("image_url", ParamType::String).describe("Optional reference image URL"),
        ParameterDefinition::new("max_tokens", ParamType::Number)
            .describe("Maximum completion tokens")
            .default_value(Literal::Int(1000)),
        ParameterDefinition::new("temperature", ParamType::Number)
            .describe("Sampling temperature")
            .default_value(Literal::Float(0.7))
            .bounds(0.0, 2.0),
    ],
    output_schema: &[
        ParameterDefinition::new("content", ParamType::String).describe("Text reply"),
        IMAGES_OUT,
        ParameterDefinition::new("usage", ParamType::Object).describe("Token usage"),
    ],
    meta: ModelMeta {
        generation_params: &["image_url", "max_tokens", "temperature"],
        edit_params: &["image_url", "max_tokens", "temperature"],
        max_upload_images: 4,
        ..ModelMeta::DEFAULT
    },
};

const SUBSCRIPTION_OUTPUT: &[ParameterDefinition] = &[
    IMAGES_OUT,
    ParameterDefinition::new("seed", ParamType::Number).describe("Seed used for generation"),
    ParameterDefinition::new("timings", ParamType::Object).describe("Per-stage timings"),
    ParameterDefinition::new("has_nsfw_concepts", ParamType::Array).describe("Per-image content flags"),
];

pub const FLUX_DEV: Model = Model {
    id: "fal-ai/flux/dev",
    name: "FLUX.1 [dev]",
    description: "12B flow transformer for high-quality text-to-image",
    category: SUBSCRIPTION_MODELS,
    provider: ProviderKind::ManagedSubscription,
    api_endpoint: None,
    input_schema: &[
        PROMPT,
        ParameterDefinition::new("image_size", ParamType::Enum)
            .default_value(Literal::Str("landscape_4_3"))
            .options(&[
                Literal::Str("square_hd"),
                Literal::Str("square"),
                Literal::Str("portrait_4_3"),
                Literal::Str("portrait_16_9"),
                Literal::Str("landscape_4_3"),
                Literal::Str("landscape_16_9"),
            ]),
        ParameterDefinition::new("num_inference_steps", ParamType::Number)
            .default_value(Literal::Int(28))
            .bounds(1.0, 50.0),
        ParameterDefinition::new("guidance_scale", ParamType::Number)
            .default_value(Literal::Float(3.5))
            .bounds(1.0, 20.0)
            .scale(0.1),
        ParameterDefinition::new("num_images", ParamType::Number)
            .default_value(Literal::Int(1))
            .bounds(1.0, 4.0),
        SEED,
        ParameterDefinition::new("enable_safety_checker", ParamType::Boolean).default_value(Literal::Bool(true)),
    ],
    output_schema: SUBSCRIPTION_OUTPUT,
    meta: ModelMeta {
        generation_params: &[
            "image_size",
            "num_inference_steps",
            "guidance_scale",
            "num_images",
            "seed",
            "enable_safety_checker",
        ],
        generation_defaults: &[
            ("image_size", Literal::Str("landscape_4_3")),
            ("num_inference_steps", Literal::Int(28)),
            ("guidance_scale", Literal::Float(3.5)),
            ("num_images", Literal::Int(1)),
            ("enable_safety_checker", Literal::Bool(true)),
        ],
        ..ModelMeta::DEFAULT
    },
};

pub const FLUX_PRO_KONTEXT: Model = Model {
    id: "fal-ai/flux-pro/kontext",
    name: "FLUX.1 Kontext [pro]",
    description: "Targeted local edits and full scene transformations of a reference image",
    category: SUBSCRIPTION_MODELS,
    provider: ProviderKind::ManagedSubscription,
    api_endpoint: None,
    input_schema: &[
        PROMPT,
        ParameterDefinition::new("guidance_scale", ParamType::Number)
            .default_value(Literal::Float(3.5))
            .bounds(1.0, 20.0)
            .scale(0.1),
        ParameterDefinition::new("num_images", ParamType::Number)
            .default_value(Literal::Int(1))
            .bounds(1.0, 4.0),
        SEED,
        ParameterDefinition::new("output_format", ParamType::Enum)
            .default_value(Literal::Str("jpeg"))
            .options(&[Literal::Str("jpeg"), Literal::Str("png")]),
        ParameterDefinition::new("safety_tolerance", ParamType::Enum)
            .default_value(Literal::Str("2"))
            .options(&[
                Literal::Str("1"),
                Literal::Str("2"),
                Literal::Str("3"),
                Literal::Str("4"),
                Literal::Str("5"),
                Literal::Str("6"),
            ]),
    ],
    output_schema: SUBSCRIPTION_OUTPUT,
    meta: ModelMeta {
        edit_params: &["guidance_scale", "num_images", "seed", "output_format", "safety_tolerance"],
        edit_defaults: &[
            ("guidance_scale", Literal::Float(3.5)),
            ("num_images", Literal::Int(1)),
            ("output_format", Literal::Str("jpeg")),
        ],
        max_upload_images: 1,
        requires_image: true,
        ..ModelMeta::DEFAULT
    },
};

/// Every built-in model, in display order
pub static MODELS: &[Model] = &[
    GPT_IMAGE_1,
    GEMINI_FLASH_IMAGE,
    FLUX_KONTEXT_PRO,
    SEEDREAM_4,
    IMAGE_UPSCALE,
    GEMINI_FLASH_IMAGE_CHAT,
    FLUX_DEV,
    FLUX_PRO_KONTEXT,
];

/// Models grouped under a display title
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub title: &'static str,
    pub models: Vec<&'static Model>,
}

/// Read-only view over a model catalogue
#[derive(Debug, Clone, Copy)]
pub struct ModelRegistry {
    models: &'static [Model],
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelRegistry {
    /// Registry over the built-in catalogue
    pub const fn builtin() -> Self {
        Self { models: MODELS }
    }

    /// Registry over a caller-supplied catalogue
    pub const fn new(models: &'static [Model]) -> Self {
        Self { models }
    }

    /// All models in declaration order
    pub const fn list(&self) -> &'static [Model] {
        self.models
    }

    /// Find a model by its id
    pub fn by_id(&self, id: &str) -> Option<&'static Model> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Find a model by its route id (`/` replaced with `-`)
    pub fn by_route_id(&self, route_id: &str) -> Option<&'static Model> {
        self.models.iter().find(|m| m.route_id() == route_id)
    }

    /// Resolve an id or route id, failing with `ModelNotFound`
    pub fn lookup(&self, id: &str) -> Result<&'static Model> {
        self.by_id(id)
            .or_else(|| self.by_route_id(id))
            .ok_or_else(|| ImageGenError::ModelNotFound(id.to_owned()))
    }

    /// Models grouped by category, in order of first appearance
    pub fn categories(&self) -> Vec<Category> {
        let mut grouped: IndexMap<&'static str, Vec<&'static Model>> = IndexMap::new();

        for model in self.models {
            grouped.entry(model.category).or_default().push(model);
        }

        grouped
            .into_iter()
            .map(|(title, models)| Category { title, models })
            .collect()
    }

    /// Check catalogue invariants
    ///
    /// Ids must be unique, and every allow-listed or defaulted key must be
    /// declared in the model's input schema.
    ///
    /// # Errors
    ///
    /// Returns every violation found
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut problems = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for model in self.models {
            if !seen.insert(model.id) {
                problems.push(format!("duplicate model id '{}'", model.id));
            }

            let declared = |key: &str| model.input(key).is_some();
            let meta = &model.meta;

            let keys = meta
                .generation_params
                .iter()
                .map(|key| ("generation_params", *key))
                .chain(meta.edit_params.iter().map(|key| ("edit_params", *key)))
                .chain(meta.generation_defaults.iter().map(|(key, _)| ("generation_defaults", *key)))
                .chain(meta.edit_defaults.iter().map(|(key, _)| ("edit_defaults", *key)));

            for (field, key) in keys {
                if !declared(key) {
                    problems.push(format!("model '{}': {field} key '{key}' is not in the input schema", model.id));
                }
            }
        }

        if problems.is_empty() { Ok(()) } else { Err(problems) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalogue_is_valid() {
        ModelRegistry::builtin().validate().unwrap();
    }

    #[test]
    fn lookup_by_id_and_route_id() {
        let registry = ModelRegistry::builtin();

        assert_eq!(registry.by_id("gpt-image-1").unwrap().name, "GPT Image 1");
        assert_eq!(
            registry.by_route_id("google-gemini-2.5-flash-image-preview").unwrap().id,
            "google/gemini-2.5-flash-image-preview"
        );
        assert_eq!(registry.lookup("fal-ai-flux-dev").unwrap().id, "fal-ai/flux/dev");
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = ModelRegistry::builtin();

        assert!(registry.by_id("dall-e-9").is_none());
        assert!(matches!(registry.lookup("dall-e-9"), Err(ImageGenError::ModelNotFound(id)) if id == "dall-e-9"));
    }

    #[test]
    fn categories_preserve_order() {
        let categories = ModelRegistry::builtin().categories();
        let titles: Vec<_> = categories.iter().map(|c| c.title).collect();

        assert_eq!(titles, [IMAGE_MODELS, MULTIMODAL_MODELS, SUBSCRIPTION_MODELS]);
        assert_eq!(categories[0].models[0].id, "gpt-image-1");

        let total: usize = categories.iter().map(|c| c.models.len()).sum();
        assert_eq!(total, MODELS.len());
    }

    #[test]
    fn validate_reports_problems() {
        static BROKEN: &[Model] = &[
            Model {
                meta: ModelMeta {
                    generation_params: &["steps"],
                    ..ModelMeta::DEFAULT
                },
                ..GEMINI_FLASH_IMAGE
            },
            GEMINI_FLASH_IMAGE,
        ];

        let problems = ModelRegistry::new(BROKEN).validate().unwrap_err();

        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("duplicate model id")));
        assert!(problems.iter().any(|p| p.contains("'steps'")));
    }
}

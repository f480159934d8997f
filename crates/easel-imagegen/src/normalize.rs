//! Shared mapping from image-API response items to unified images and usage

use serde::Deserialize;

use crate::types::{CompletionTokensDetails, Image, Usage};

/// One entry of an image-API `data` array
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ImageDatum {
    pub url: Option<String>,
    pub b64_json: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ImageApiUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    pub input_tokens_details: Option<InputTokensDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InputTokensDetails {
    #[serde(default)]
    pub image_tokens: u64,
}

/// Flatten response items into images
///
/// A literal URL wins; otherwise base64 data becomes a PNG data URI. Items
/// carrying neither are dropped.
pub(crate) fn images_from_data(model: &str, data: Vec<ImageDatum>) -> Vec<Image> {
    data.into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let url = item.url.filter(|url| !url.is_empty());
            let b64 = item.b64_json.filter(|b64| !b64.is_empty());

            match (url, b64) {
                (Some(url), _) => Some(Image {
                    url,
                    width: None,
                    height: None,
                    content_type: None,
                }),
                (None, Some(b64)) => Some(Image {
                    url: format!("data:image/png;base64,{b64}"),
                    width: None,
                    height: None,
                    content_type: Some("image/png".to_owned()),
                }),
                (None, None) => {
                    tracing::warn!(model, index, "dropping unrecognized image item");
                    None
                }
            }
        })
        .collect()
}

/// Remap `input/output` token counts to the prompt/completion naming
pub(crate) fn remap_usage(usage: ImageApiUsage) -> Usage {
    Usage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.total_tokens,
        prompt_tokens_details: None,
        completion_tokens_details: Some(CompletionTokensDetails {
            reasoning_tokens: 0,
            image_tokens: usage.input_tokens_details.map_or(0, |details| details.image_tokens),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_preferred_over_base64() {
        let images = images_from_data(
            "m",
            vec![ImageDatum {
                url: Some("https://cdn/a.png".to_owned()),
                b64_json: Some("AAAA".to_owned()),
            }],
        );

        assert_eq!(images[0].url, "https://cdn/a.png");
        assert_eq!(images[0].content_type, None);
    }

    #[test]
    fn base64_becomes_png_data_uri() {
        let images = images_from_data(
            "m",
            vec![ImageDatum {
                b64_json: Some("AAAA".to_owned()),
                ..ImageDatum::default()
            }],
        );

        assert_eq!(images[0].url, "data:image/png;base64,AAAA");
        assert_eq!(images[0].content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn empty_items_are_dropped() {
        let images = images_from_data(
            "m",
            vec![
                ImageDatum::default(),
                ImageDatum {
                    url: Some("https://cdn/b.png".to_owned()),
                    ..ImageDatum::default()
                },
            ],
        );

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].url, "https://cdn/b.png");
    }

    #[test]
    fn usage_breakdown_defaults() {
        let usage = remap_usage(ImageApiUsage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
            input_tokens_details: None,
        });

        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 15);

        let details = usage.completion_tokens_details.unwrap();
        assert_eq!(details.reasoning_tokens, 0);
        assert_eq!(details.image_tokens, 0);
    }

    #[test]
    fn usage_reads_image_tokens() {
        let usage = remap_usage(ImageApiUsage {
            input_tokens_details: Some(InputTokensDetails { image_tokens: 7 }),
            ..ImageApiUsage::default()
        });

        assert_eq!(usage.completion_tokens_details.unwrap().image_tokens, 7);
    }
}

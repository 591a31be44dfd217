//! Style resolution: client catalog lookup, title keyword themes and
//! visual style presets combined into the prompt sent to the image model.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::layout::LayoutZones;
use crate::request::GenerationRequest;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Weight applied to a catalog style binding when none is configured.
pub const DEFAULT_BINDING_WEIGHT: f32 = 0.8;

/// Appended to every inferred prompt.
pub const QUALITY_SUFFIX: &str = "high quality, professional, clean composition, 8k resolution";

/// Always sent as the negative prompt; the overlays supply all text and branding.
pub const NEGATIVE_PROMPT: &str = "text, letters, words, titles, watermarks, logos, \
    central subjects, people faces, large objects in center bottom, busy center composition, \
    cluttered layout, text overlays, branding elements, signatures, \
    dominant foreground objects blocking title area";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Base aesthetic of the generated background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualStyle {
    #[default]
    Dark,
    Colorful,
    Light,
}

impl VisualStyle {
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value.to_ascii_lowercase().as_str() {
            "dark" => Ok(VisualStyle::Dark),
            "colorful" => Ok(VisualStyle::Colorful),
            "light" => Ok(VisualStyle::Light),
            other => Err(CoreError::Validation(format!(
                "Invalid style '{other}'. Must be one of: dark, colorful, light"
            ))),
        }
    }

    pub fn base_prompt(self) -> &'static str {
        match self {
            VisualStyle::Dark => {
                "dark cyberpunk tech background, neon blue and purple lights, \
                 3D blockchain cubes, digital data streams, holographic elements, \
                 deep black background with cyan accents, minimalist composition"
            }
            VisualStyle::Colorful => {
                "cosmic purple and pink gradient background, ethereal space atmosphere, \
                 floating spheres and planets, light beams and aurora effects, \
                 nebula colors, vibrant but not overwhelming"
            }
            VisualStyle::Light => {
                "clean bright background, minimal modern design, soft gradients, \
                 professional corporate aesthetic, subtle geometric patterns, \
                 light blue and white tones"
            }
        }
    }
}

/// Reference to a named style-adaptation resource (a LoRA) and its weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleBinding {
    pub name: String,
    pub weight: f32,
}

/// Everything the generation stage needs to know about the look of a cover.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleProfile {
    pub base_prompt: String,
    pub negative_prompt: String,
    pub style_binding: Option<StyleBinding>,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Catalog entry for one client identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
    #[serde(default)]
    pub binding: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

/// A whole-word, case-insensitive title keyword and the fragment it adds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTheme {
    pub keyword: String,
    pub fragment: String,
}

/// Client and keyword lookup tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleCatalog {
    #[serde(default = "default_binding_weight")]
    pub binding_weight: f32,
    /// Keyed by lowercase client identifier.
    #[serde(default)]
    pub clients: HashMap<String, ClientProfile>,
    #[serde(default)]
    pub keywords: Vec<KeywordTheme>,
}

fn default_binding_weight() -> f32 {
    DEFAULT_BINDING_WEIGHT
}

impl StyleCatalog {
    /// Parse a catalog from JSON. Client keys are normalised to lowercase.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let mut catalog: StyleCatalog = serde_json::from_str(json)
            .map_err(|e| CoreError::Configuration(format!("Invalid style catalog: {e}")))?;
        if !(0.0..=2.0).contains(&catalog.binding_weight) {
            return Err(CoreError::Configuration(format!(
                "Style binding weight {} is outside 0.0..=2.0",
                catalog.binding_weight
            )));
        }
        catalog.clients = catalog
            .clients
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Ok(catalog)
    }

    /// The publisher's built-in client table.
    pub fn builtin() -> Self {
        let entries: &[(&str, &str, Option<&str>)] = &[
            ("xdc", "xdc_network_lora", Some("XDC network theme, enterprise blockchain, banking integration")),
            ("xdc_network", "xdc_network_lora", Some("XDC network theme, enterprise blockchain, banking integration")),
            ("hedera", "hedera_lora", Some("Hedera hashgraph theme, distributed ledger technology")),
            ("hbar", "hbar_lora", Some("Hedera hashgraph theme, distributed ledger technology")),
            ("hashpack", "hashpack_lora", Some("Hedera wallet theme, secure crypto storage")),
            ("constellation", "constellation_lora", Some("Constellation DAG theme, distributed network visualization")),
            ("dag", "constellation_lora", Some("Constellation DAG theme, distributed network visualization")),
            ("algorand", "algorand_lora", Some("Algorand blockchain theme, proof of stake, green technology")),
            ("algo", "algorand_lora", Some("Algorand blockchain theme, proof of stake, green technology")),
            ("tha", "tha_lora", Some("THA blockchain theme, professional crypto services")),
            ("genfinity", "genfinity_lora", Some("Genfinity media theme, crypto news and analysis")),
            ("gen", "genfinity_lora", Some("Genfinity media theme, crypto news and analysis")),
            ("bitcoin", "bitcoin_logo_lora", None),
            ("ethereum", "ethereum_logo_lora", None),
            ("binance", "binance_logo_lora", None),
            ("coinbase", "coinbase_logo_lora", None),
        ];
        let clients = entries
            .iter()
            .map(|(id, binding, theme)| {
                (
                    id.to_string(),
                    ClientProfile {
                        binding: Some(binding.to_string()),
                        theme: theme.map(str::to_string),
                    },
                )
            })
            .collect();

        let keywords = [
            ("bitcoin", "bitcoin orange theme"),
            ("ethereum", "ethereum blue theme"),
            ("defi", "decentralized finance symbols"),
            ("nft", "digital collectible artwork"),
        ]
        .iter()
        .map(|(keyword, fragment)| KeywordTheme {
            keyword: keyword.to_string(),
            fragment: fragment.to_string(),
        })
        .collect();

        Self {
            binding_weight: DEFAULT_BINDING_WEIGHT,
            clients,
            keywords,
        }
    }

    pub fn client(&self, client_id: &str) -> Option<&ClientProfile> {
        self.clients.get(&client_id.trim().to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Turns a request into a [`StyleProfile`]. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct StyleResolver {
    catalog: StyleCatalog,
    keyword_patterns: Vec<(Regex, String)>,
    layout_constraints: Vec<String>,
}

impl StyleResolver {
    /// Compile keyword patterns and capture the exclusive-zone hints.
    pub fn new(catalog: StyleCatalog, zones: &LayoutZones) -> Result<Self, CoreError> {
        let keyword_patterns = catalog
            .keywords
            .iter()
            .map(|k| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(k.keyword.trim()));
                Regex::new(&pattern)
                    .map(|re| (re, k.fragment.clone()))
                    .map_err(|e| {
                        CoreError::Configuration(format!("Invalid keyword '{}': {e}", k.keyword))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            catalog,
            keyword_patterns,
            layout_constraints: zones.layout_constraints(),
        })
    }

    pub fn resolve(&self, request: &GenerationRequest) -> StyleProfile {
        let client = request
            .client_id
            .as_deref()
            .and_then(|id| self.catalog.client(id));

        let mut prompt = match request.custom_prompt.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => custom.to_string(),
            _ => self.inferred_prompt(request, client),
        };
        if !self.layout_constraints.is_empty() {
            prompt.push_str(". Layout requirements: ");
            prompt.push_str(&self.layout_constraints.join(", "));
        }

        let style_binding = request.style_binding.clone().or_else(|| {
            client.and_then(|c| c.binding.as_ref()).map(|name| StyleBinding {
                name: name.clone(),
                weight: self.catalog.binding_weight,
            })
        });

        StyleProfile {
            base_prompt: prompt,
            negative_prompt: NEGATIVE_PROMPT.to_string(),
            style_binding,
        }
    }

    fn inferred_prompt(&self, request: &GenerationRequest, client: Option<&ClientProfile>) -> String {
        let mut parts: Vec<&str> = vec![request.visual_style.base_prompt()];

        if let Some(theme) = client.and_then(|c| c.theme.as_deref()) {
            parts.push(theme);
        }

        let subtitle = request.subtitle.as_deref().unwrap_or_default();
        for (pattern, fragment) in &self.keyword_patterns {
            if pattern.is_match(&request.title) || pattern.is_match(subtitle) {
                parts.push(fragment);
            }
        }

        parts.push(QUALITY_SUFFIX);
        parts.join(", ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! The style catalog and prompt expansion.
//!
//! A Brief carries a style id (`RL-01` and friends); this module turns
//! it into the tier-entitled number of concrete prompts. Expansion is
//! fully deterministic: the same Brief always yields the same prompt
//! list, which keeps re-runs of a redelivered Job idempotent.

use atelier_core::brief::Brief;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// One entry of the style catalog.
pub struct StyleTemplate {
    pub id: &'static str,
    pub display_name: &'static str,
    /// Base prompt every expansion starts from.
    pub base: &'static str,
    /// Per-style variation clauses, cycled over the prompt indices.
    pub variations: &'static [&'static str],
    /// Stylization model this style is tuned for.
    pub lora_type: &'static str,
    pub lora_strength: f32,
}

pub const STYLES: &[StyleTemplate] = &[
    StyleTemplate {
        id: "RL-01",
        display_name: "Realistic Studio Vogue",
        base: "photorealistic studio portrait, vogue magazine styling, natural skin texture, 85mm lens",
        variations: &[
            "looking at camera with a relaxed smile",
            "three-quarter profile, thoughtful gaze",
            "candid laugh, shallow depth of field",
            "arms crossed, confident posture",
        ],
        lora_type: "realism",
        lora_strength: 1.0,
    },
    StyleTemplate {
        id: "FN-02",
        display_name: "Fantasy Ethereal",
        base: "ethereal fantasy portrait, luminous atmosphere, intricate costume detail",
        variations: &[
            "elven features, forest light shafts",
            "celestial theme, glowing accents",
            "dark academia sorcerer, candle light",
        ],
        lora_type: "graphic-portrait",
        lora_strength: 0.8,
    },
    StyleTemplate {
        id: "CP-03",
        display_name: "Cyberpunk Neon City",
        base: "cyberpunk portrait, neon city lights, rain-slick streets, chromatic reflections",
        variations: &[
            "holographic signage glow, direct stare",
            "leather jacket, pink and teal rim light",
            "augmented-reality visor, low angle",
        ],
        lora_type: "graphic-portrait",
        lora_strength: 0.85,
    },
    StyleTemplate {
        id: "MJ6-04",
        display_name: "Midjourney V6 Look",
        base: "hyper-detailed stylized portrait, cinematic color grading, dramatic composition",
        variations: &[
            "volumetric backlight, fine fabric detail",
            "painterly depth, muted film palette",
            "editorial crop, intense expression",
        ],
        lora_type: "mjv6",
        lora_strength: 0.9,
    },
    StyleTemplate {
        id: "CEO-05",
        display_name: "Corporate Headshot",
        base: "professional corporate headshot, tailored attire, clean composition",
        variations: &[
            "seated at a desk, approachable expression",
            "standing, arms crossed, direct eye contact",
            "against office glass, soft bokeh",
        ],
        lora_type: "realism",
        lora_strength: 1.0,
    },
    StyleTemplate {
        id: "PST-06",
        display_name: "Pastel Dream",
        base: "dreamy pastel portrait, soft diffused light, airy color palette",
        variations: &[
            "lavender and peach tones, gentle smile",
            "floating fabric, mint backdrop",
            "flower crown, creamy bokeh",
        ],
        lora_type: "graphic-portrait",
        lora_strength: 0.8,
    },
    StyleTemplate {
        id: "CLS-07",
        display_name: "Classic B&W",
        base: "classic black and white portrait, fine grain, timeless studio lighting",
        variations: &[
            "rembrandt light, deep shadow side",
            "high-key profile, silver tones",
            "film noir mood, venetian blind shadows",
        ],
        lora_type: "realism",
        lora_strength: 0.9,
    },
    StyleTemplate {
        id: "CSP-08",
        display_name: "Cosplay Hero",
        base: "heroic cosplay photograph, character-accurate costume, dynamic pose",
        variations: &[
            "action stance, dramatic colored gels",
            "heroic low angle, smoke effects",
            "close-up portrait, prop in frame",
        ],
        lora_type: "graphic-portrait",
        lora_strength: 0.85,
    },
];

/// Expression clauses cycled in when a style runs out of variations.
const MOOD_MODIFIERS: &[&str] = &[
    "joyful expression",
    "calm and serene mood",
    "confident energy",
    "dreamy soft focus",
    "playful attitude",
    "intense dramatic mood",
];

const PREDEFINED_BACKGROUNDS: &[(&str, &str)] = &[
    ("studio", "neutral studio backdrop"),
    ("pastel", "soft pastel gradient background"),
    ("urban", "blurred city street background"),
    ("nature", "lush greenery background, golden hour"),
    ("minimal", "clean minimal white background"),
    ("textured", "textured concrete wall background"),
    ("gradient", "smooth color gradient background"),
];

const DEFAULT_BACKGROUND: &str = "neutral studio backdrop";

/// Free-form background text shorter than this is treated as noise.
const MIN_CUSTOM_BACKGROUND_LEN: usize = 6;

const MIN_PROMPT_LEN: usize = 10;
const MAX_PROMPT_LEN: usize = 1000;

/// Substrings a generated prompt must never contain.
const FORBIDDEN_TERMS: &[&str] = &["nude", "nsfw", "gore", "violence"];

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

/// Look up a style by id, falling back to the first catalog entry for
/// unknown ids. A stale front-end catalog must not fail a paid order.
pub fn style_for(style_id: &str) -> &'static StyleTemplate {
    STYLES
        .iter()
        .find(|s| s.id.eq_ignore_ascii_case(style_id))
        .unwrap_or(&STYLES[0])
}

/// Display name used as the motion prompt for video generation.
pub fn style_display_name(style_id: &str) -> &'static str {
    style_for(style_id).display_name
}

/// Stylization model parameters for a style.
pub fn lora_for(style_id: &str) -> (&'static str, f32) {
    let style = style_for(style_id);
    (style.lora_type, style.lora_strength)
}

/// Resolve the Brief's background choice to a prompt clause.
fn background_descriptor(background: &str) -> String {
    let trimmed = background.trim();
    if let Some((_, descriptor)) = PREDEFINED_BACKGROUNDS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
    {
        return (*descriptor).to_string();
    }
    if trimmed.len() >= MIN_CUSTOM_BACKGROUND_LEN {
        return format!("background: {trimmed}");
    }
    DEFAULT_BACKGROUND.to_string()
}

/// Purpose-specific emphasis clause.
fn purpose_modifier(purpose: &str) -> Option<&'static str> {
    match purpose.trim().to_ascii_lowercase().as_str() {
        "insta" => Some("instagram-ready framing"),
        "avatar" => Some("centered face, square crop friendly"),
        "career" => Some("professional and trustworthy impression"),
        "dating" => Some("warm and approachable impression"),
        _ => None,
    }
}

/// Expand a Brief into its tier-entitled prompt list.
///
/// Deterministic in the Brief alone: index `i` always yields the same
/// prompt text, and the list length depends only on the package tier.
pub fn prompts_for(brief: &Brief) -> Vec<String> {
    let style = style_for(&brief.style);
    let background = background_descriptor(&brief.background);
    let purpose = purpose_modifier(&brief.purpose);

    (0..brief.package_type.prompt_count())
        .map(|i| {
            let variation = style.variations[i % style.variations.len()];
            let mood = MOOD_MODIFIERS[i % MOOD_MODIFIERS.len()];

            let mut prompt = format!("{}, {}, {}, {}", style.base, background, variation, mood);
            if let Some(extra) = purpose {
                prompt.push_str(", ");
                prompt.push_str(extra);
            }
            prompt.push_str(&format!(
                " <lora:{}:{}>",
                style.lora_type, style.lora_strength
            ));
            prompt
        })
        .collect()
}

/// Sanity-check one expanded prompt.
pub fn validate_prompt(prompt: &str) -> bool {
    let len = prompt.chars().count();
    if !(MIN_PROMPT_LEN..=MAX_PROMPT_LEN).contains(&len) {
        return false;
    }
    let lowered = prompt.to_ascii_lowercase();
    !FORBIDDEN_TERMS.iter().any(|term| lowered.contains(term))
}

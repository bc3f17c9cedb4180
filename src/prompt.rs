use crate::types::{CapturedItem, Settings};
use serde_json::json;

/// Persona used when the user has not written their own instructions.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert Social Media Strategist and Ghostwriter.

**GOAL:**
Analyze these bookmarks to generate new, high-potential post ideas for me.
Do not explain *what* the bookmarks are. Explain *how* to use their patterns to create new content.";

/// Fewest ideas ever requested, whatever the style selection.
pub const MIN_IDEAS: usize = 5;

/// Tag that switches on the free-text custom style.
pub const CUSTOM_STYLE_TAG: &str = "custom";

const GENERIC_STYLE: &str = "- General engaging social media content";

const JSON_SHAPE: &str = r#"{
  "patterns": [
    "Brief bullet point on a recurring hook pattern found",
    "Brief bullet point on a recurring structure found"
  ],
  "ideas": [
    {
      "title": "Short catchy title for this content angle",
      "concept": "Explanation of the core idea/angle derived from the bookmarks",
      "hook": "Write a specific, compelling opening line/hook for this post"
    }
  ]
}"#;

/// Describes a known style tag. Unknown tags have no description and are echoed as-is.
pub fn style_description(tag: &str) -> Option<&'static str> {
    match tag {
        "polemic" => Some("Short & Polemic (Controversial, bold statements)"),
        "educational" => Some("Educational List (Value-packed, clear steps/points)"),
        "reflection" => Some("Personal Reflection (Vulnerable, storytelling, insight)"),
        "practical" => Some("Practical / How-To (Actionable advice)"),
        _ => None,
    }
}

/// The user's chosen output styles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSelection {
    pub styles: Vec<String>,
    /// Text of the custom style; only used when `custom` is among `styles`.
    pub custom_style: String,
}

impl StyleSelection {
    pub fn new(styles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            styles: styles.into_iter().map(Into::into).collect(),
            custom_style: String::new(),
        }
    }

    pub fn with_custom_style(mut self, text: impl Into<String>) -> Self {
        self.custom_style = text.into();
        self
    }

    /// Number of ideas to ask for: at least one per selected style, never fewer than [`MIN_IDEAS`].
    pub fn idea_count(&self) -> usize {
        MIN_IDEAS.max(self.styles.len())
    }

    /// One instruction line per selected style.
    fn instructions(&self) -> String {
        let mut lines: Vec<String> = self
            .styles
            .iter()
            .filter(|s| s.as_str() != CUSTOM_STYLE_TAG)
            .map(|s| match style_description(s) {
                Some(description) => format!("- {}", description),
                None => format!("- {}", s),
            })
            .collect();

        let custom = self.custom_style.trim();
        if self.styles.iter().any(|s| s == CUSTOM_STYLE_TAG) && !custom.is_empty() {
            lines.push(format!("- Custom Style: {}", custom));
        }

        if lines.is_empty() {
            return GENERIC_STYLE.to_string();
        }
        lines.join("\n")
    }
}

/// The `PromptBuilder` assembles the single analysis prompt sent to the provider.
///
/// Building is pure: the same inputs always render the same prompt.
pub struct PromptBuilder<'a> {
    instructions: String,
    language: String,
    styles: StyleSelection,
    items: Vec<&'a CapturedItem>,
}

impl<'a> PromptBuilder<'a> {
    /// Creates a new `PromptBuilder` with the given base instructions.
    ///
    /// # Arguments
    ///
    /// * `instructions` - The persona and task text opening the prompt. Blank instructions select
    ///   [`DEFAULT_SYSTEM_PROMPT`].
    ///
    /// # Returns
    ///
    /// A new instance of `PromptBuilder` with the default language, no styles and no items.
    pub fn new(instructions: impl Into<String>) -> Self {
        let instructions = instructions.into();
        let instructions = if instructions.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            instructions
        };

        Self {
            instructions,
            language: crate::DEFAULT_LANGUAGE.to_string(),
            styles: StyleSelection::default(),
            items: Vec::new(),
        }
    }

    /// Builder preloaded with the instructions, language and styles from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.custom_prompt.clone())
            .language(settings.language.clone())
            .styles(
                StyleSelection::new(settings.output_styles.iter().cloned())
                    .with_custom_style(settings.custom_style_text.clone()),
            )
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn styles(mut self, styles: StyleSelection) -> Self {
        self.styles = styles;
        self
    }

    pub fn with_items(mut self, items: impl IntoIterator<Item = &'a CapturedItem>) -> Self {
        self.items = items.into_iter().collect();
        self
    }

    pub fn idea_count(&self) -> usize {
        self.styles.idea_count()
    }

    /// Renders the prompt.
    ///
    /// Items are reduced to author and text; media and metadata stay out of the prompt.
    ///
    /// # Returns
    ///
    /// The full prompt text, asking for [`PromptBuilder::idea_count`] ideas in the JSON report shape.
    pub fn build(&self) -> String {
        let bookmarks = json!(self
            .items
            .iter()
            .map(|item| json!({ "author": item.author, "text": item.text }))
            .collect::<Vec<_>>());

        format!(
            "{instructions}

**LANGUAGE:**
Generate ALL output (Titles, Concepts, Hooks) in **{language}**.

**REQUIRED OUTPUT STYLES:**
For each idea, vary the tone/structure based on these selected styles:
{styles}

**OUTPUT FORMAT (Clean JSON Only):**
Return a single valid JSON object with this structure:
{shape}
(Generate exactly {count} distinct ideas, covering the selected styles)

**Bookmarks to Analyze:**
{bookmarks}
",
            instructions = self.instructions.trim(),
            language = self.language,
            styles = self.styles.instructions(),
            shape = JSON_SHAPE,
            count = self.idea_count(),
            bookmarks = bookmarks,
        )
    }
}

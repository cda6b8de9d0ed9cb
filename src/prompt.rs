//! Prompt template handling.
//!
//! The template is an external text file with a single `{kanji}` substitution
//! point. The pipeline treats it as an opaque string; nothing downstream ever
//! interprets prompt content.

use std::path::Path;

/// A prompt template with one `{kanji}` placeholder.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Loads the template from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let template = std::fs::read_to_string(path)?;
        Ok(Self { template })
    }

    /// Builds a template from an in-memory string.
    pub fn from_text(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Renders the prompt for one kanji.
    pub fn render(&self, kanji: &str) -> String {
        self.template.replace("{kanji}", kanji)
    }
}

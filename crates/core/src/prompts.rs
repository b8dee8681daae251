use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

const QUESTION_START: &str = "question_start";
const QUESTION_FOLLOW_UP: &str = "question_follow_up";
const EVALUATION: &str = "evaluation";

/// The prompt templates used by the LLM-backed interviewer.
///
/// Templates use `{name}` placeholders filled by [`render`].
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSet {
    pub question_start: String,
    pub question_follow_up: String,
    pub evaluation: String,
}

impl PromptSet {
    pub fn builtin() -> Self {
        Self {
            question_start: include_str!("../prompts/question_start.md").to_string(),
            question_follow_up: include_str!("../prompts/question_follow_up.md").to_string(),
            evaluation: include_str!("../prompts/evaluation.md").to_string(),
        }
    }

    /// Loads overrides from `dir`. Each `<name>.md` replaces the built-in
    /// template of that name; templates missing there keep their built-in text.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut prompts = Self::builtin();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read prompts directory: {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
                continue;
            }
            let key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem for prompt file")?;
            let Some(slot) = prompts.template_mut(key) else {
                tracing::warn!("Ignoring unknown prompt file '{}'", path.display());
                continue;
            };
            *slot = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
            tracing::info!("Using prompt override for '{}'", key);
        }

        Ok(prompts)
    }

    fn template_mut(&mut self, key: &str) -> Option<&mut String> {
        match key {
            QUESTION_START => Some(&mut self.question_start),
            QUESTION_FOLLOW_UP => Some(&mut self.question_follow_up),
            EVALUATION => Some(&mut self.evaluation),
            _ => None,
        }
    }
}

/// Substitutes each `{name}` in `template` with its value.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |text, (name, value)| {
        text.replace(&format!("{{{name}}}"), value)
    })
}

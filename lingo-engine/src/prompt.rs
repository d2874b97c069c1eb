//! Translation prompt rendering.
//!
//! Prompts are Tera templates with three variables: `text`, `source` and
//! `target`. Language codes are expanded to English names before rendering
//! since instruction-tuned models follow "from German to French" far more
//! reliably than "from de to fr".

use tera::{Context, Tera};

use crate::error::EngineError;

/// Built-in prompt used unless `model.prompt_template` overrides it.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Translate the following text from {{ source }} to {{ target }}. Only output the translation, nothing else:\n\n{{ text }}";

const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("ar", "Arabic"),
    ("bg", "Bulgarian"),
    ("cs", "Czech"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("es", "Spanish"),
    ("et", "Estonian"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hu", "Hungarian"),
    ("id", "Indonesian"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("lt", "Lithuanian"),
    ("lv", "Latvian"),
    ("nb", "Norwegian"),
    ("nl", "Dutch"),
    ("no", "Norwegian"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("sv", "Swedish"),
    ("th", "Thai"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("vi", "Vietnamese"),
    ("zh", "Chinese"),
];

/// A compiled-on-demand prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    template: String,
}

impl Default for Prompt {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl Prompt {
    /// `None` or a blank override selects [`DEFAULT_PROMPT_TEMPLATE`].
    pub fn new(template: Option<&str>) -> Self {
        match template.map(str::trim) {
            Some(t) if !t.is_empty() => Self {
                template: t.to_string(),
            },
            _ => Self::default(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn render(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, EngineError> {
        let mut context = Context::new();
        context.insert("text", text);
        context.insert("source", &language_name(source_lang));
        context.insert("target", &language_name(target_lang));
        Ok(Tera::one_off(&self.template, &context, false)?)
    }
}

/// Expand a BCP-47-ish code (`en`, `EN-us`, `zh_Hant`) to an English name.
///
/// Empty and `auto` codes become "the source language"; unknown codes are
/// passed through trimmed.
pub fn language_name(code: &str) -> String {
    let code = code.trim();
    if code.is_empty() || code.eq_ignore_ascii_case("auto") {
        return "the source language".to_string();
    }

    let lower = code.to_ascii_lowercase().replace('_', "-");
    match lower.as_str() {
        "zh-hant" | "zh-tw" | "zh-hk" => return "Traditional Chinese".to_string(),
        "zh-hans" | "zh-cn" | "zh-sg" => return "Simplified Chinese".to_string(),
        "pt-br" => return "Brazilian Portuguese".to_string(),
        "en-gb" => return "British English".to_string(),
        _ => {}
    }

    let primary = lower.split('-').next().unwrap_or_default();
    LANGUAGE_NAMES
        .iter()
        .find(|(c, _)| *c == primary)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_names_both_languages() {
        let prompt = Prompt::default()
            .render("Guten Morgen", "DE", "en-US")
            .expect("render");
        assert!(prompt.starts_with("Translate the following text from German to English."));
        assert!(prompt.ends_with("\n\nGuten Morgen"));
    }

    #[test]
    fn text_is_not_html_escaped() {
        let prompt = Prompt::default().render("a < b & \"c\"", "en", "fr").expect("render");
        assert!(prompt.ends_with("a < b & \"c\""));
    }

    #[test]
    fn blank_override_falls_back_to_default() {
        assert_eq!(Prompt::new(Some("   ")), Prompt::default());
        assert_eq!(Prompt::new(None), Prompt::default());
    }

    #[test]
    fn custom_template_is_used() {
        let prompt = Prompt::new(Some("[{{ target }}] {{ text }}"))
            .render("hello", "en", "ja")
            .expect("render");
        assert_eq!(prompt, "[Japanese] hello");
    }

    #[test]
    fn broken_template_reports_prompt_error() {
        let err = Prompt::new(Some("{{ text"))
            .render("hello", "en", "ja")
            .unwrap_err();
        assert!(matches!(err, EngineError::Prompt(_)), "got: {err:?}");
    }

    #[test]
    fn language_name_handles_regions_and_unknowns() {
        assert_eq!(language_name("zh_TW"), "Traditional Chinese");
        assert_eq!(language_name("PT-br"), "Brazilian Portuguese");
        assert_eq!(language_name("nl-BE"), "Dutch");
        assert_eq!(language_name(" auto "), "the source language");
        assert_eq!(language_name("tlh"), "tlh");
    }
}

//! Translation service seam.
//!
//! Nodes flagged `i18n` pass their text (and `title` / `placeholder`
//! attributes) through the engine's [`Translator`]; `@format` attributes
//! resolve a reference with parameters. Each such binding is re-run when the
//! engine language changes.

use indexmap::IndexMap;

use crate::value::Value;

/// Attributes translated on `i18n` elements.
pub const TRANSLATABLE_ATTRS: [&str; 2] = ["title", "placeholder"];

pub trait Translator {
    fn translate(&self, text: &str, lang: &str) -> String;

    /// Resolve `reference` with `params`; `None` when unknown.
    fn format(&self, reference: &str, params: &Value, lang: &str) -> Option<String>;
}

/// Returns text unchanged; formats references by substituting `{name}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(&self, text: &str, _lang: &str) -> String {
        text.to_string()
    }

    fn format(&self, reference: &str, params: &Value, _lang: &str) -> Option<String> {
        Some(substitute(reference, params))
    }
}

/// Per-language lookup table.
///
/// ```rust,ignore
/// let dictionary = Dictionary::new()
///     .entry("fr", "Hello", "Bonjour")
///     .entry("fr", "greeting", "Bonjour {name}");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    languages: IndexMap<String, IndexMap<String, String>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, lang: &str, key: &str, text: &str) -> Self {
        self.languages
            .entry(lang.to_string())
            .or_default()
            .insert(key.to_string(), text.to_string());
        self
    }

    fn lookup(&self, lang: &str, key: &str) -> Option<&str> {
        self.languages.get(lang)?.get(key).map(String::as_str)
    }
}

impl Translator for Dictionary {
    fn translate(&self, text: &str, lang: &str) -> String {
        self.lookup(lang, text.trim())
            .map_or_else(|| text.to_string(), str::to_string)
    }

    fn format(&self, reference: &str, params: &Value, lang: &str) -> Option<String> {
        self.lookup(lang, reference)
            .map(|pattern| substitute(pattern, params))
    }
}

/// Replace `{name}` placeholders with values from `params`.
fn substitute(pattern: &str, params: &Value) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let key = rest[open + 1..open + close].trim();
        out.push_str(&params.at(key).to_display());
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dictionary_falls_back_to_source_text() {
        let dictionary = Dictionary::new().entry("fr", "Hello", "Bonjour");
        assert_eq!(dictionary.translate("Hello", "fr"), "Bonjour");
        assert_eq!(dictionary.translate("Hello", "de"), "Hello");
    }

    #[test]
    fn format_substitutes_parameters() {
        let dictionary = Dictionary::new().entry("en", "greeting", "Hi {name}, {count} new");
        let params = Value::from(json!({"name": "Ada", "count": 3}));
        assert_eq!(
            dictionary.format("greeting", &params, "en").as_deref(),
            Some("Hi Ada, 3 new")
        );
        assert_eq!(dictionary.format("missing", &params, "en"), None);
    }
}

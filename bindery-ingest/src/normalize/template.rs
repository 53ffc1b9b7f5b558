//! Placeholder path templates
//!
//! A template such as `books/{Author}/{Title}.{ext}` is rendered from a map of
//! values. Each placeholder may carry a default (used when the value is
//! missing or blank) and a sanitizer (applied to whatever value is used).
//! Literal template text is never sanitized.

use super::PathError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]+)\}").expect("valid placeholder regex"));

/// Value transform applied to one placeholder
pub type Sanitizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone)]
pub struct PathTemplate {
    pattern: String,
    defaults: HashMap<String, String>,
    sanitizers: HashMap<String, Sanitizer>,
}

impl fmt::Debug for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathTemplate")
            .field("pattern", &self.pattern)
            .field("defaults", &self.defaults)
            .field("sanitized", &self.sanitizers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PathTemplate {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            defaults: HashMap::new(),
            sanitizers: HashMap::new(),
        }
    }

    /// Value used when `placeholder` is missing or blank
    pub fn with_default(mut self, placeholder: &str, value: impl Into<String>) -> Self {
        self.defaults.insert(placeholder.to_string(), value.into());
        self
    }

    /// Transform applied to the value of `placeholder`
    pub fn with_sanitizer<F>(mut self, placeholder: &str, sanitizer: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.sanitizers
            .insert(placeholder.to_string(), Arc::new(sanitizer));
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Placeholder names in order of first appearance
    pub fn placeholders(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&self.pattern) {
            if let Some(name) = caps.get(1).map(|m| m.as_str()) {
                if !seen.contains(&name) {
                    seen.push(name);
                }
            }
        }
        seen
    }

    /// Render the template
    ///
    /// A value that is blank, or becomes blank once sanitized, falls back to
    /// the placeholder's default (sanitized the same way).
    ///
    /// # Errors
    /// `PathError::MissingPlaceholder` when a placeholder has no usable value
    /// and no default.
    pub fn render(&self, values: &HashMap<String, String>) -> Result<String, PathError> {
        let mut rendered = String::with_capacity(self.pattern.len() + 64);
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(&self.pattern) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            rendered.push_str(&self.pattern[last..whole.start()]);
            rendered.push_str(&self.resolve(name.as_str(), values)?);
            last = whole.end();
        }
        rendered.push_str(&self.pattern[last..]);

        Ok(rendered)
    }

    fn resolve(&self, name: &str, values: &HashMap<String, String>) -> Result<String, PathError> {
        let sanitize = |value: &str| match self.sanitizers.get(name) {
            Some(sanitizer) => sanitizer(value),
            None => value.to_string(),
        };

        if let Some(value) = values.get(name).filter(|v| !v.trim().is_empty()) {
            let value = sanitize(value);
            if !is_blank_segment(&value) {
                return Ok(value);
            }
        }

        match self.defaults.get(name) {
            Some(default) => Ok(sanitize(default)),
            None => Err(PathError::MissingPlaceholder(name.to_string())),
        }
    }
}

/// Empty, or nothing but dots (which would become `.`/`..` segments)
fn is_blank_segment(value: &str) -> bool {
    value.trim().is_empty() || value.chars().all(|c| c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::sanitize_path;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_with_values() {
        let template = PathTemplate::new("books/{Author}/{Title}.{ext}");
        let path = template
            .render(&values(&[("Author", "A"), ("Title", "T"), ("ext", "pdf")]))
            .unwrap();
        assert_eq!(path, "books/A/T.pdf");
    }

    #[test]
    fn test_default_for_missing_and_blank() {
        let template = PathTemplate::new("{Author}/{Title}")
            .with_default("Author", "Unknown Author")
            .with_default("Title", "Untitled");
        let path = template.render(&values(&[("Title", "  ")])).unwrap();
        assert_eq!(path, "Unknown Author/Untitled");
    }

    #[test]
    fn test_missing_without_default_is_error() {
        let template = PathTemplate::new("{Author}/{Title}");
        let err = template.render(&values(&[("Title", "T")])).unwrap_err();
        assert!(matches!(err, PathError::MissingPlaceholder(ref name) if name == "Author"));
    }

    #[test]
    fn test_sanitizer_applies_to_values_not_literals() {
        let template = PathTemplate::new("a:b/{Title}").with_sanitizer("Title", sanitize_path);
        let path = template.render(&values(&[("Title", "x/y")])).unwrap();
        assert_eq!(path, "a:b/x-y");
    }

    #[test]
    fn test_value_blank_after_sanitizing_uses_default() {
        let template = PathTemplate::new("{Title}")
            .with_sanitizer("Title", sanitize_path)
            .with_default("Title", "Untitled");
        assert_eq!(template.render(&values(&[("Title", "???")])).unwrap(), "Untitled");
        assert_eq!(template.render(&values(&[("Title", "..")])).unwrap(), "Untitled");
    }

    #[test]
    fn test_placeholders_deduplicated_in_order() {
        let template = PathTemplate::new("{b}/{a}/{b}.{ext}");
        assert_eq!(template.placeholders(), vec!["b", "a", "ext"]);
    }
}

//! # Filler
//! Anything that fills placeholders in a prompt segment.
//!
//! The prompt builder composes two fillers: [MetadataFiller] for the flat `{{KEY}}` placeholders of
//! `metadados`, and [ContentFiller] for the reserved content blocks such as `{{ETP_CONTEUDO}}`.
//! A placeholder without a matching value is left as it is.

use serde_json::Value;

use crate::utils::json::{json_to_string_with, plain_string, IgnoreKeys};
use crate::utils::string::replace_placeholder;
use crate::utils::JsonMap;

pub trait FillPlaceholders {
    /// Names of the placeholders this filler can fill.
    fn placeholders_to_fill(&self) -> Vec<String>;
}

pub trait Fill: FillPlaceholders {
    /// Fills every occurrence of the placeholders it knows in `segment`. Returns the number of distinct
    /// placeholders that were found and replaced.
    fn fill(&self, segment: &mut String) -> usize;
}

/// Fills `{{KEY}}` with the plain string form of each `metadados` value.
#[derive(Debug, Clone)]
pub struct MetadataFiller<'a> {
    metadata: &'a JsonMap,
}

impl<'a> MetadataFiller<'a> {
    pub fn new(metadata: &'a JsonMap) -> Self {
        Self { metadata }
    }
}

impl FillPlaceholders for MetadataFiller<'_> {
    fn placeholders_to_fill(&self) -> Vec<String> {
        self.metadata.keys().cloned().collect()
    }
}

impl Fill for MetadataFiller<'_> {
    fn fill(&self, segment: &mut String) -> usize {
        self.metadata
            .iter()
            .map(|(key, value)| replace_placeholder(segment, key, &plain_string(value)))
            .filter(|replaced| *replaced)
            .count()
    }
}

/// Fills one reserved placeholder with a cleaned and rendered JSON content block.
#[derive(Debug, Clone)]
pub struct ContentFiller {
    placeholder: &'static str,
    rendered: String,
}

impl ContentFiller {
    /// Renders `content` once. An absent block renders as an empty string.
    pub fn new(placeholder: &'static str,
               content: Option<&Value>,
               json_indent: Option<usize>,
               ignore_keys: &IgnoreKeys) -> Self {
        let rendered = content
            .map(|content| json_to_string_with(content, json_indent, ignore_keys))
            .unwrap_or_default();
        Self { placeholder, rendered }
    }
}

impl FillPlaceholders for ContentFiller {
    fn placeholders_to_fill(&self) -> Vec<String> {
        vec![self.placeholder.to_string()]
    }
}

impl Fill for ContentFiller {
    fn fill(&self, segment: &mut String) -> usize {
        usize::from(replace_placeholder(segment, self.placeholder, &self.rendered))
    }
}

#[cfg(test)]
mod test_filler {
    use serde_json::json;

    use super::{ContentFiller, Fill, FillPlaceholders, MetadataFiller};
    use crate::utils::json::IgnoreKeys;

    #[test]
    fn test_metadata_filler() {
        let metadata = json!({"ORG": "ACME", "ANO": 2024, "UNUSED": "x"});
        let metadata = metadata.as_object().unwrap();
        let filler = MetadataFiller::new(metadata);
        assert_eq!(filler.placeholders_to_fill(), vec!["ORG", "ANO", "UNUSED"]);

        let mut segment = "{{ORG}} - {{ANO}} - {{ORG}} - {{OTHER}}".to_string();
        assert_eq!(filler.fill(&mut segment), 2);
        assert_eq!(segment, "ACME - 2024 - ACME - {{OTHER}}");
    }

    #[test]
    fn test_content_filler() {
        let content = json!({"id": 9, "objeto": "papel"});
        let filler = ContentFiller::new("TR_CONTEUDO", Some(&content), None, &IgnoreKeys::default());
        let mut segment = "TR: {{TR_CONTEUDO}}".to_string();
        assert_eq!(filler.fill(&mut segment), 1);
        assert_eq!(segment, "TR: {\"objeto\": \"papel\"}");
    }

    #[test]
    fn test_absent_content_renders_empty() {
        let filler = ContentFiller::new("ETP_CONTEUDO", None, Some(2), &IgnoreKeys::default());
        let mut segment = "[{{ETP_CONTEUDO}}]".to_string();
        filler.fill(&mut segment);
        assert_eq!(segment, "[]");
    }
}

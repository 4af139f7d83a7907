//! # Prompt
//! A prompt is a pair of strings: the system prompt with instructions for the model and the user
//! prompt with the document body.
//!
//! ## PromptTemplate
//! A single template text holds both halves, divided by a separator marker ([DEFAULT_SEPARATOR]).
//! Without a marker the whole text is the user segment and the system segment is empty.
//!
//! ## Placeholders
//! The user segment carries `{{KEY}}` placeholders, filled from the flat `metadados` object of the
//! input document, and two reserved placeholders, [ETP_PLACEHOLDER] and [TR_PLACEHOLDER], filled
//! with the cleaned `etp_conteudo` and `tr_conteudo` blocks rendered as JSON.
//! Unmatched placeholders stay in the text untouched.
//!
//! The system segment is never filled.

use log::debug;
use serde_json::Value;

use crate::filler::{ContentFiller, Fill, FillPlaceholders, MetadataFiller};
use crate::utils::json::IgnoreKeys;

/// Marker dividing a template into its system and user segments.
pub const DEFAULT_SEPARATOR: &str = "___SEPARADOR___";

/// Default indentation width of the rendered content blocks.
pub const DEFAULT_JSON_INDENT: Option<usize> = Some(2);

/// Reserved placeholder filled with the `etp_conteudo` block.
pub const ETP_PLACEHOLDER: &str = "ETP_CONTEUDO";

/// Reserved placeholder filled with the `tr_conteudo` block.
pub const TR_PLACEHOLDER: &str = "TR_CONTEUDO";

const METADATA_FIELD: &str = "metadados";
const ETP_FIELD: &str = "etp_conteudo";
const TR_FIELD: &str = "tr_conteudo";

/// A template split into its two segments, both trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[readonly::make]
pub struct PromptTemplate {
    /// Instructions for the model, readonly
    #[readonly]
    pub system: String,

    /// Body with placeholders, readonly
    #[readonly]
    pub user: String,
}

impl PromptTemplate {
    /// Splits `template_text` at the first occurrence of `separator`.
    ///
    /// # Example
    /// ```
    /// use automgr::prompt::PromptTemplate;
    ///
    /// let template = PromptTemplate::split(" Be formal. ##  Hello {{NAME}} ## bye ", "##");
    /// assert_eq!(template.system, "Be formal.");
    /// assert_eq!(template.user, "Hello {{NAME}} ## bye");
    /// ```
    pub fn split(template_text: &str, separator: &str) -> Self {
        let (system, user) = match template_text.split_once(separator) {
            Some((system, user)) if !separator.is_empty() => (system, user),
            _ => ("", template_text),
        };
        Self {
            system: system.trim().to_string(),
            user: user.trim().to_string(),
        }
    }

    /// Fills the user segment with `dados` and returns the finished prompt pair.
    pub fn fill(self, dados: &Value, json_indent: Option<usize>, ignore_keys: &IgnoreKeys) -> PromptPair {
        let Self { system, mut user } = self;

        if let Some(metadata) = dados.get(METADATA_FIELD).and_then(Value::as_object) {
            let filled = MetadataFiller::new(metadata).fill(&mut user);
            debug!("Filled {} of {} metadata placeholders", filled, metadata.len());
        }

        let content_fillers = [
            ContentFiller::new(ETP_PLACEHOLDER, dados.get(ETP_FIELD), json_indent, ignore_keys),
            ContentFiller::new(TR_PLACEHOLDER, dados.get(TR_FIELD), json_indent, ignore_keys),
        ];
        for filler in &content_fillers {
            if filler.fill(&mut user) == 0 {
                debug!("Template has no {:?} placeholder", filler.placeholders_to_fill());
            }
        }

        PromptPair { system, user }
    }
}

/// Splits a template into `(system, user)` segments, see [PromptTemplate::split].
pub fn split_template(template_text: &str, separator: &str) -> (String, String) {
    let template = PromptTemplate::split(template_text, separator);
    (template.system, template.user)
}

/// The assembled system and user prompts handed to the providers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[readonly::make]
pub struct PromptPair {
    #[readonly]
    pub system: String,
    #[readonly]
    pub user: String,
}

impl PromptPair {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Both halves under labeled sections, as written to the debug file.
    pub fn debug_text(&self) -> String {
        format!("=== SYSTEM ===\n{}\n\n=== USER ===\n{}\n", self.system, self.user)
    }
}

/// Builds the system and user prompts from an input document and a template text.
///
/// `dados` is expected to be an object with `metadados`, `etp_conteudo` and `tr_conteudo`; any of them
/// may be missing. Content blocks are cleaned with the default [IgnoreKeys].
///
/// # Example
/// ```
/// use serde_json::json;
/// use automgr::prompt::{build_prompts, DEFAULT_SEPARATOR};
///
/// let dados = json!({"metadados": {"X": "42"}, "etp_conteudo": {"a": 1, "id": 99}});
/// let prompt = build_prompts(&dados, "v={{X}} {{ETP_CONTEUDO}}", DEFAULT_SEPARATOR, None);
/// assert_eq!(prompt.system, "");
/// assert_eq!(prompt.user, "v=42 {\"a\": 1}");
/// ```
pub fn build_prompts(dados: &Value, template_text: &str, separator: &str, json_indent: Option<usize>) -> PromptPair {
    build_prompts_with(dados, template_text, separator, json_indent, &IgnoreKeys::default())
}

/// [build_prompts] with a caller-supplied ignore set for the content blocks.
pub fn build_prompts_with(dados: &Value,
                          template_text: &str,
                          separator: &str,
                          json_indent: Option<usize>,
                          ignore_keys: &IgnoreKeys) -> PromptPair {
    PromptTemplate::split(template_text, separator).fill(dados, json_indent, ignore_keys)
}

#[cfg(test)]
mod test_prompt {
    use serde_json::json;

    use super::{build_prompts, build_prompts_with, split_template, PromptPair, DEFAULT_SEPARATOR};
    use crate::utils::json::IgnoreKeys;

    #[test]
    fn test_split() {
        let sep = DEFAULT_SEPARATOR;
        assert_eq!(split_template(&format!("A{sep}B"), sep), ("A".to_string(), "B".to_string()));
        assert_eq!(split_template("B", sep), ("".to_string(), "B".to_string()));
        assert_eq!(split_template("  \n B \n", sep), ("".to_string(), "B".to_string()));
        assert_eq!(split_template(&format!("A{sep}B{sep}C"), sep), ("A".to_string(), format!("B{sep}C")));
        assert_eq!(split_template(&format!("{sep}B"), sep), ("".to_string(), "B".to_string()));
        assert_eq!(split_template("", sep), ("".to_string(), "".to_string()));
    }

    #[test]
    fn test_metadata_substitution() {
        let dados = json!({"metadados": {"X": "42"}});
        let prompt = build_prompts(&dados, "v={{X}}", DEFAULT_SEPARATOR, Some(2));
        assert_eq!(prompt.user, "v=42");
    }

    #[test]
    fn test_unmatched_placeholder_is_kept() {
        let dados = json!({"metadados": {"X": "42"}});
        let prompt = build_prompts(&dados, "v={{UNKNOWN}}", DEFAULT_SEPARATOR, Some(2));
        assert_eq!(prompt.user, "v={{UNKNOWN}}");
    }

    #[test]
    fn test_metadata_scalars_and_repeats() {
        let dados = json!({"metadados": {"N": 3, "OK": true, "VAZIO": null, "K.*": "lit"}});
        let prompt = build_prompts(&dados, "{{N}}/{{N}} {{OK}} [{{VAZIO}}] {{K.*}}", DEFAULT_SEPARATOR, Some(2));
        assert_eq!(prompt.user, "3/3 true [] lit");
    }

    #[test]
    fn test_content_substitution() {
        let dados = json!({"etp_conteudo": {"a": 1, "id": 99}});
        let prompt = build_prompts(&dados, "{{ETP_CONTEUDO}}", DEFAULT_SEPARATOR, Some(2));
        assert_eq!(prompt.user, "{\n  \"a\": 1\n}");
        let prompt = build_prompts(&dados, "{{ETP_CONTEUDO}}", DEFAULT_SEPARATOR, None);
        assert_eq!(prompt.user, "{\"a\": 1}");
    }

    #[test]
    fn test_system_segment_is_not_filled() {
        let dados = json!({"metadados": {"ORG": "ACME"}, "tr_conteudo": "texto"});
        let template = format!("Org {{{{ORG}}}} {{{{TR_CONTEUDO}}}}{}{{{{ORG}}}} {{{{TR_CONTEUDO}}}}", DEFAULT_SEPARATOR);
        let prompt = build_prompts(&dados, &template, DEFAULT_SEPARATOR, Some(2));
        assert_eq!(prompt.system, "Org {{ORG}} {{TR_CONTEUDO}}");
        assert_eq!(prompt.user, "ACME texto");
    }

    #[test]
    fn test_missing_fields() {
        let prompt = build_prompts(&json!({}), "a {{ETP_CONTEUDO}}|{{TR_CONTEUDO}} b", DEFAULT_SEPARATOR, Some(2));
        assert_eq!(prompt.user, "a | b");

        let prompt = build_prompts(&json!({"metadados": "not a map"}), "{{X}}", DEFAULT_SEPARATOR, Some(2));
        assert_eq!(prompt.user, "{{X}}");

        let prompt = build_prompts(&json!([1, 2]), "{{TR_CONTEUDO}}.", DEFAULT_SEPARATOR, Some(2));
        assert_eq!(prompt.user, ".");
    }

    #[test]
    fn test_end_to_end() {
        let dados = json!({
            "metadados": {"ORG": "ACME"},
            "etp_conteudo": {"id": "x", "desc": "ok"},
            "tr_conteudo": []
        });
        let template = "SYS TEXT___SEPARADOR___Org: {{ORG}}\nETP: {{ETP_CONTEUDO}}\nTR: {{TR_CONTEUDO}}";
        let prompt = build_prompts(&dados, template, DEFAULT_SEPARATOR, Some(2));
        assert_eq!(prompt.system, "SYS TEXT");
        assert_eq!(prompt.user, "Org: ACME\nETP: {\n  \"desc\": \"ok\"\n}\nTR: ");
    }

    #[test]
    fn test_custom_ignore_keys() {
        let dados = json!({"etp_conteudo": {"id": 1, "rascunho": "x", "texto": "y"}});
        let prompt = build_prompts_with(&dados, "{{ETP_CONTEUDO}}", DEFAULT_SEPARATOR, None, &IgnoreKeys::new(["rascunho"]));
        assert_eq!(prompt.user, "{\"id\": 1, \"texto\": \"y\"}");
    }

    #[test]
    fn test_debug_text() {
        let prompt = PromptPair::new("S", "U");
        assert_eq!(prompt.debug_text(), "=== SYSTEM ===\nS\n\n=== USER ===\nU\n");
    }
}

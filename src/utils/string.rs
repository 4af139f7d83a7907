use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PLACEHOLDER_MATCH_RE: Regex = Regex::new(r"\{\{[^\r\n{}]*?\}\}").unwrap();
}

#[inline]
fn strip_format(key: &str) -> &str {
    //! Strips "{{" and "}}" from a matched placeholder.
    //! Only call it on strings matched by `PLACEHOLDER_MATCH_RE`.
    &key[2..key.len() - 2]
}

/// Formats a placeholder name as it appears in a template, i.e. `name` becomes `{{name}}`.
#[inline]
pub fn placeholder(name: &str) -> String {
    format!("{{{{{}}}}}", name)
}

/// Replaces every literal occurrence of `{{name}}` in `text` with `value`.
///
/// The name is matched verbatim, so regex metacharacters in it have no special meaning.
/// Returns `true` if anything was replaced.
pub fn replace_placeholder(text: &mut String, name: &str, value: &str) -> bool {
    let token = placeholder(name);
    if !text.contains(&token) {
        return false;
    }
    *text = text.replace(&token, value);
    true
}

/// Names of all `{{name}}` placeholders found in a string. Names spanning a line break are not
/// placeholders.
pub fn get_placeholders(string: &str) -> HashSet<String> {
    PLACEHOLDER_MATCH_RE.find_iter(string)
        .map(|m| strip_format(m.as_str()).to_string())
        .collect()
}

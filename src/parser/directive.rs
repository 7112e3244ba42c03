//! # Metadata directive grammar
//!
//! Parses the body of a `{...}` metadata block into a [`MetadataDirective`]:
//! a keyword, followed by an optional comma-separated parameter list of
//! `key=value` pairs (or a single bare value taking the keyword's default
//! parameter name, e.g. `TEMPO 120` instead of `TEMPO value=120`).

use std::collections::HashMap;

use crate::ast::{DirectiveValue, Keyword, MetadataDirective};
use crate::error::{Diagnostics, GamelanError, TextLocation};

/// Splits a parameter list on top-level commas, treating `[...]` as opaque
/// so that `passes=[1,2], beats=all` doesn't split inside the list.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                result.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if start < s.len() {
        result.push(&s[start..]);
    }
    result
}

fn parse_value(key: &str, raw: &str) -> DirectiveValue {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        let items: Vec<String> = if inner.trim().is_empty() {
            Vec::new()
        } else {
            inner.split(',').map(|s| s.trim().to_string()).collect()
        };
        if key == "passes" {
            let passes = items.iter().filter_map(|s| s.parse::<u32>().ok()).collect();
            return DirectiveValue::PassList(passes);
        }
        return DirectiveValue::List(items);
    }
    if key == "status" {
        match raw.to_ascii_lowercase().as_str() {
            "on" => return DirectiveValue::Bool(true),
            "off" => return DirectiveValue::Bool(false),
            _ => {}
        }
    }
    if let Ok(i) = raw.parse::<i64>() {
        return DirectiveValue::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return DirectiveValue::Float(f);
    }
    if raw.eq_ignore_ascii_case("true") {
        return DirectiveValue::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return DirectiveValue::Bool(false);
    }
    DirectiveValue::Str(raw.trim_matches('"').to_string())
}

/// Parameters a directive must carry to be well-formed. `GONGAN`'s `type`
/// defaults to `regular` when absent, so it is not listed here even though
/// the directive catalog documents its allowed values.
fn required_params(keyword: Keyword) -> &'static [&'static str] {
    match keyword {
        Keyword::Gongan => &[],
        Keyword::Dynamics => &["value"],
        Keyword::Goto => &["label"],
        Keyword::Kempli => &["status"],
        Keyword::AutoKempyung => &["status"],
        Keyword::Label => &["name"],
        Keyword::Octavate => &["instrument", "octaves"],
        Keyword::Part => &["name"],
        Keyword::Repeat => &["count"],
        Keyword::Sequence => &["value"],
        Keyword::Suppress => &["positions"],
        Keyword::Tempo => &["value"],
        Keyword::Validation => &["ignore"],
        Keyword::Wait => &["seconds"],
    }
}

/// Parses the text between a metadata block's braces into a directive.
/// Returns `None` (after recording an error) if the keyword is unrecognized
/// or a required parameter is missing.
pub fn parse_directive(
    body: &str,
    location: TextLocation,
    diag: &mut Diagnostics,
) -> Option<MetadataDirective> {
    let body = body.trim();
    let (word, rest) = match body.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (body, ""),
    };

    let Some(keyword) = Keyword::parse(word) else {
        diag.push_error(GamelanError::MalformedDirective {
            location,
            keyword: word.to_string(),
            message: format!("unknown directive keyword '{word}'"),
        });
        return None;
    };

    let mut params: HashMap<String, DirectiveValue> = HashMap::new();
    if !rest.is_empty() {
        for token in split_top_level(rest) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.split_once('=') {
                Some((k, v)) => {
                    let k = k.trim().to_string();
                    let v = parse_value(&k, v.trim());
                    params.insert(k, v);
                }
                None => {
                    let key = keyword.default_param_name().to_string();
                    let value = parse_value(&key, token);
                    params.insert(key, value);
                }
            }
        }
    }

    for required in required_params(keyword) {
        if !params.contains_key(*required) {
            diag.push_error(GamelanError::MalformedDirective {
                location,
                keyword: keyword.as_str().to_string(),
                message: format!("missing required parameter '{required}'"),
            });
            return None;
        }
    }

    Some(MetadataDirective {
        keyword,
        params,
        location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_value_with_default_param_name() {
        let mut diag = Diagnostics::new();
        let directive =
            parse_directive("TEMPO 120", TextLocation::new(1, 1), &mut diag).unwrap();
        assert!(!diag.has_errors());
        assert_eq!(directive.keyword, Keyword::Tempo);
        assert_eq!(directive.get_int("value"), Some(120));
    }

    #[test]
    fn parses_keyed_params_and_pass_lists() {
        let mut diag = Diagnostics::new();
        let directive = parse_directive(
            "REPEAT count=3, passes=[1,2]",
            TextLocation::new(1, 1),
            &mut diag,
        )
        .unwrap();
        assert!(!diag.has_errors());
        assert_eq!(directive.get_int("count"), Some(3));
        assert_eq!(directive.get_passes("passes"), Some(&[1, 2][..]));
    }

    #[test]
    fn parses_status_as_bool() {
        let mut diag = Diagnostics::new();
        let directive =
            parse_directive("KEMPLI status=off", TextLocation::new(1, 1), &mut diag).unwrap();
        assert_eq!(directive.get_bool("status"), Some(false));
    }

    #[test]
    fn reports_unknown_keyword() {
        let mut diag = Diagnostics::new();
        let result = parse_directive("FROBNICATE value=1", TextLocation::new(1, 1), &mut diag);
        assert!(result.is_none());
        assert_eq!(diag.errors.len(), 1);
        assert!(matches!(
            diag.errors[0],
            GamelanError::MalformedDirective { .. }
        ));
    }

    #[test]
    fn reports_missing_required_param() {
        let mut diag = Diagnostics::new();
        let result = parse_directive("GOTO", TextLocation::new(1, 1), &mut diag);
        assert!(result.is_none());
        assert_eq!(diag.errors.len(), 1);
    }

    #[test]
    fn gongan_type_defaults_when_absent() {
        let mut diag = Diagnostics::new();
        let directive = parse_directive("GONGAN", TextLocation::new(1, 1), &mut diag).unwrap();
        assert!(!diag.has_errors());
        assert_eq!(directive.get_str("type"), None);
    }
}

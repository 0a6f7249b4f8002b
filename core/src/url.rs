//! URL templating helpers.
//!
//! Pure functions over strings: join path segments, substitute `{name}`
//! placeholders, append a query string. Values inserted into the path or the
//! query are percent-encoded the way `encodeURIComponent` does it.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde_json::Value;

/// Placeholder values and query parameters, keyed by name.
pub type Params = BTreeMap<String, Value>;

/// Join path segments with a single `/` between them.
///
/// Empty segments are skipped. The leading part of the first segment (a
/// scheme or a leading slash) and the trailing slash of the last segment are
/// kept as given.
pub fn path_join<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() {
            continue;
        }
        if out.is_empty() {
            out.push_str(segment);
            continue;
        }
        let kept = out.trim_end_matches('/').len();
        out.truncate(kept);
        out.push('/');
        out.push_str(segment.trim_start_matches('/'));
    }
    out
}

/// Replace every `{name}` in `template` with the encoded value of `name`.
///
/// Placeholders with no matching entry are left untouched so a later pass
/// (or the server) can still see them.
pub fn replace_url_params(template: &str, params: &Params) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match params.get(name) {
            Some(value) => out.push_str(&encode_component(&value_to_string(value))),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Append `params` to `url` as a query string.
///
/// Array values repeat their key; `null` values (and `null` array items) are
/// dropped. The existing part of `url` is never re-encoded.
pub fn append_query_params(url: &str, params: &Params) -> String {
    let mut pairs = Vec::new();
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|item| !item.is_null()) {
                    pairs.push(query_pair(key, item));
                }
            }
            other => pairs.push(query_pair(key, other)),
        }
    }
    if pairs.is_empty() {
        return url.to_string();
    }

    let separator = match url.find('?') {
        None => "?",
        Some(_) if url.ends_with('?') || url.ends_with('&') => "",
        Some(_) => "&",
    };
    format!("{url}{separator}{}", pairs.join("&"))
}

fn query_pair(key: &str, value: &Value) -> String {
    format!(
        "{}={}",
        encode_component(key),
        encode_component(&value_to_string(value))
    )
}

/// Percent-encode everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

/// Render a JSON value the way it reads inside a URL: strings bare, `null`
/// empty, whole floats without a fraction, everything else in its JSON form.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{f}"),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn params(value: Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    #[rstest]
    #[case(vec!["/items", "5"], "/items/5")]
    #[case(vec!["/items/", "/5"], "/items/5")]
    #[case(vec!["/items", ""], "/items")]
    #[case(vec!["http://localhost:3000", "api", "/items"], "http://localhost:3000/api/items")]
    #[case(vec!["", "/items"], "/items")]
    #[case(vec!["/", "items"], "/items")]
    #[case(vec!["/items", "{id}"], "/items/{id}")]
    fn joins_segments(#[case] segments: Vec<&str>, #[case] expected: &str) {
        assert_eq!(path_join(segments), expected);
    }

    #[rstest]
    #[case("/items/{id}", json!({"id": 5}), "/items/5")]
    #[case("/users/{user}/items/{id}", json!({"user": "a b", "id": "x/y"}), "/users/a%20b/items/x%2Fy")]
    #[case("/items/{id}", json!({}), "/items/{id}")]
    #[case("/items/{id}", json!({"id": null}), "/items/")]
    #[case("/items/{id", json!({"id": 1}), "/items/{id")]
    fn replaces_placeholders(#[case] template: &str, #[case] data: Value, #[case] expected: &str) {
        assert_eq!(replace_url_params(template, &params(data)), expected);
    }

    #[rstest]
    #[case(json!(5), "5")]
    #[case(json!(5.0), "5")]
    #[case(json!(-3.0), "-3")]
    #[case(json!(2.5), "2.5")]
    #[case(json!(true), "true")]
    #[case(json!(null), "")]
    #[case(json!("a b"), "a b")]
    fn renders_values_for_urls(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value_to_string(&value), expected);
    }

    #[test]
    fn appends_query_in_key_order() {
        let url = append_query_params("/items", &params(json!({"page": 2, "q": "red fox"})));
        assert_eq!(url, "/items?page=2&q=red%20fox");
    }

    #[test]
    fn array_values_repeat_key() {
        let url = append_query_params("/items", &params(json!({"tag": ["a", null, "b"]})));
        assert_eq!(url, "/items?tag=a&tag=b");
    }

    #[test]
    fn extends_existing_query() {
        let url = append_query_params("/items?sort=asc", &params(json!({"page": 1})));
        assert_eq!(url, "/items?sort=asc&page=1");
    }

    #[test]
    fn empty_params_leave_url_alone() {
        assert_eq!(append_query_params("/items/{id}", &Params::new()), "/items/{id}");
        assert_eq!(
            append_query_params("/items", &params(json!({"skip": null}))),
            "/items"
        );
    }

    #[test]
    fn encodes_like_encode_uri_component() {
        assert_eq!(encode_component("a-b_c.d!e~f*g'h(i)"), "a-b_c.d!e~f*g'h(i)");
        assert_eq!(encode_component("a&b=c/d?"), "a%26b%3Dc%2Fd%3F");
        assert_eq!(encode_component("é"), "%C3%A9");
    }
}

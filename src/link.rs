//! `Link` header values and URIs for adjacent cursor pages.

use crate::config::ArgumentNames;
use crate::document::scalar_text;
use crate::query::cursor::CursorLink;
use crate::query::Direction;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use url::form_urlencoded;

pub fn format_link(uri: &str, rel: &str) -> String {
    format!("<{}>; rel=\"{}\"", uri, rel)
}

/// rel to URI for every `<uri>; rel="x"` entry. Commas inside the brackets are
/// part of the URI.
pub fn parse_link_header(value: &str) -> HashMap<String, String> {
    static LINK: OnceLock<Regex> = OnceLock::new();
    let re = LINK.get_or_init(|| {
        Regex::new(r#"<([^>]*)>\s*;\s*rel="?([^";,]+)"?"#).expect("static link pattern")
    });
    re.captures_iter(value)
        .map(|c| (c[2].trim().to_string(), c[1].to_string()))
        .collect()
}

/// Percent-encode one path segment; spaces become `%20`.
pub fn encode_segment(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn is_pagination_key(key: &str, names: &ArgumentNames) -> bool {
    key == names.cursor
        || key == names.last
        || key == names.dir
        || key == names.limit
        || key == names.last_id
        || key.strip_prefix(names.last_id.as_str()).map_or(false, |rest| rest.starts_with('['))
}

/// URI of an adjacent page. Unrelated query pairs of the current request are
/// kept; cursor arguments are replaced by the link's.
pub fn page_uri(base: &str, raw_query: &[(String, String)], names: &ArgumentNames, link: &CursorLink) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in raw_query {
        if !is_pagination_key(key, names) {
            query.append_pair(key, value);
        }
    }
    query.append_pair(&names.last, &scalar_text(&link.last).unwrap_or_else(|| link.last.to_string()));
    match &link.last_identity {
        Some(Value::Object(components)) => {
            for (component, value) in components {
                let text = scalar_text(value).unwrap_or_else(|| value.to_string());
                query.append_pair(&format!("{}[{}]", names.last_id, component), &text);
            }
        }
        Some(value) => {
            query.append_pair(&names.last_id, &scalar_text(value).unwrap_or_else(|| value.to_string()));
        }
        None => {}
    }
    if link.direction == Direction::Desc {
        query.append_pair(&names.dir, link.direction.as_str());
    }
    if let Some(limit) = link.limit {
        query.append_pair(&names.limit, &limit.to_string());
    }
    if let Some(cursor) = &link.cursor {
        query.append_pair(&names.cursor, cursor);
    }
    format!("{}?{}", base, query.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_multiple_links_with_commas_in_uris() {
        let header = r#"<http://h/a?fields=a,b&last=x>; rel="next", <http://h/a?last=y&dir=DESC>; rel="prev""#;
        let links = parse_link_header(header);
        assert_eq!(links["next"], "http://h/a?fields=a,b&last=x");
        assert_eq!(links["prev"], "http://h/a?last=y&dir=DESC");
    }

    #[test]
    fn page_uri_replaces_cursor_arguments() {
        let raw = vec![
            ("fields".to_string(), "title".to_string()),
            ("last".to_string(), "old".to_string()),
            ("lastId[code]".to_string(), "x".to_string()),
        ];
        let link = CursorLink {
            cursor: Some("title".into()),
            limit: Some(2),
            direction: Direction::Desc,
            last: json!("Foo Bar"),
            last_identity: Some(json!({"code": "A", "year": 2024})),
        };
        let uri = page_uri("http://h/a", &raw, &ArgumentNames::default(), &link);
        assert_eq!(
            uri,
            "http://h/a?fields=title&last=Foo+Bar&lastId%5Bcode%5D=A&lastId%5Byear%5D=2024&dir=DESC&limit=2&cursor=title"
        );
    }

    #[test]
    fn ascending_links_omit_direction() {
        let link = CursorLink {
            cursor: None,
            limit: None,
            direction: Direction::Asc,
            last: json!(3),
            last_identity: None,
        };
        assert_eq!(page_uri("/a", &[], &ArgumentNames::default(), &link), "/a?last=3");
    }

    #[test]
    fn segments_encode_spaces_and_slashes() {
        assert_eq!(encode_segment("a b/c"), "a%20b%2Fc");
        assert_eq!(encode_segment("[\"A\",1]"), "%5B%22A%22%2C1%5D");
    }
}

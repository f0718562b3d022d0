//! Caller-supplied query specification and its constructors.

use crate::config::TranslatorConfig;
use crate::errors::QueryMapError;
use crate::operators::split_key;
use bson::{Bson, Document};

/// Flat `key -> value` mapping as it arrives from a request: filter entries,
/// the reserved shaping keys and an optional base-filter object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(pub Document);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(doc: Document) -> Self {
        Self(doc)
    }

    /// # Errors
    /// Returns an error if `value` is not a JSON object or cannot be represented as BSON.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, QueryMapError> {
        if !value.is_object() {
            return Err(QueryMapError::InvalidInput("expected JSON object".into()));
        }
        let doc = bson::serialize_to_document(value).map_err(|e| QueryMapError::InvalidInput(e.to_string()))?;
        Ok(Self(doc))
    }

    /// # Errors
    /// Returns an error if the string is not a JSON object.
    pub fn from_json_str(json: &str) -> Result<Self, QueryMapError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_json(&value)
    }

    /// Parse an `application/x-www-form-urlencoded` style string with the
    /// default key layout. See [`QueryParams::from_query_string_with`].
    pub fn from_query_string(qs: &str, coerce: bool) -> Self {
        let cfg = TranslatorConfig { coerce_values: coerce, ..TranslatorConfig::default() };
        Self::from_query_string_with(qs, &cfg)
    }

    /// Parse an `application/x-www-form-urlencoded` style string.
    ///
    /// Repeated keys (or `key[]`) collect into an array in order. Bracketed keys
    /// nest: `where[age_gte]=4` becomes `{ where: { age_gte: 4 } }`. With
    /// `coerce_values`, a value is typed according to the modifier its key
    /// carries:
    /// - text and pattern modifiers keep the raw string;
    /// - ordered comparisons and `in`/`nin` read numbers and booleans;
    /// - everything else is typed only when the text is the canonical
    ///   rendering of the value, so `01234` stays a string.
    pub fn from_query_string_with(qs: &str, cfg: &TranslatorConfig) -> Self {
        let mut doc = Document::new();
        let qs = qs.strip_prefix('?').unwrap_or(qs);
        for pair in qs.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let key = percent_decode(k);
            if key.is_empty() {
                continue;
            }
            let path = key_path(&key);
            let raw = percent_decode(v);
            let value = if cfg.coerce_values { coerce_for_key(&path, raw, cfg) } else { Bson::String(raw) };
            insert_at(&mut doc, &path, value);
        }
        Self(doc)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bson)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Document> for QueryParams {
    fn from(doc: Document) -> Self {
        Self(doc)
    }
}

/// Turn a select string such as `"age -name"` into a projection document.
pub fn parse_select(select: &str) -> Document {
    let mut out = Document::new();
    for token in select.split(|c: char| c.is_whitespace() || c == ',').filter(|t| !t.is_empty()) {
        match token.strip_prefix('-') {
            Some(field) if !field.is_empty() => {
                out.insert(field, 0);
            }
            Some(_) => {}
            None => {
                out.insert(token.trim_start_matches('+'), 1);
            }
        }
    }
    out
}

/// Integers first, then finite floats, then booleans; anything else stays a string.
pub fn coerce_value(raw: &str) -> Bson {
    if let Ok(i) = raw.parse::<i64>() {
        return Bson::Int64(i);
    }
    if let Ok(f) = raw.parse::<f64>()
        && f.is_finite()
    {
        return Bson::Double(f);
    }
    match raw {
        "true" => Bson::Boolean(true),
        "false" => Bson::Boolean(false),
        _ => Bson::String(raw.to_string()),
    }
}

/// Like [`coerce_value`], but only when the text is exactly how the typed
/// value renders: `3` and `true` convert, `01234`, `1.50` and `1e3` do not.
pub fn coerce_exact(raw: &str) -> Bson {
    match coerce_value(raw) {
        Bson::Int64(i) if i.to_string() == raw => Bson::Int64(i),
        Bson::Double(f) if f.to_string() == raw => Bson::Double(f),
        b @ Bson::Boolean(_) => b,
        _ => Bson::String(raw.to_string()),
    }
}

fn coerce_for_key(path: &[String], raw: String, cfg: &TranslatorConfig) -> Bson {
    if path.len() == 1 && (path[0] == cfg.limit_key || path[0] == cfg.skip_key) {
        return coerce_value(&raw);
    }
    if path.len() == 1 && path[0] == cfg.sort_key {
        return Bson::String(raw);
    }
    let Some(key) = path.iter().rev().find(|seg| !seg.is_empty()) else {
        return coerce_exact(&raw);
    };
    match split_key(key, &cfg.delimiter) {
        (_, Some(m)) if m.takes_text() => Bson::String(raw),
        (_, Some(m)) if m.takes_number() => coerce_value(&raw),
        _ => coerce_exact(&raw),
    }
}

/// Split `a[b][c]` into `["a", "b", "c"]`; a trailing `[]` yields an empty last
/// segment. Keys that are not well-formed bracket paths stay whole.
fn key_path(key: &str) -> Vec<String> {
    let whole = || vec![key.to_string()];
    let Some(open) = key.find('[') else {
        return whole();
    };
    if open == 0 || !key.ends_with(']') {
        return whole();
    }
    let mut path = vec![key[..open].to_string()];
    for seg in key[open + 1..key.len() - 1].split("][") {
        if seg.contains(['[', ']']) {
            return whole();
        }
        path.push(seg.to_string());
    }
    if path[1..path.len() - 1].iter().any(String::is_empty) {
        return whole();
    }
    path
}

fn insert_at(doc: &mut Document, path: &[String], value: Bson) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() || (rest.len() == 1 && rest[0].is_empty()) {
        push_value(doc, first, value);
        return;
    }
    if let Some(Bson::Document(sub)) = doc.get_mut(first) {
        insert_at(sub, rest, value);
        return;
    }
    let mut sub = Document::new();
    insert_at(&mut sub, rest, value);
    doc.insert(first.clone(), sub);
}

fn push_value(doc: &mut Document, key: &str, value: Bson) {
    match doc.get_mut(key) {
        Some(Bson::Array(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::replace(existing, Bson::Null);
            *existing = Bson::Array(vec![first, value]);
        }
        None => {
            doc.insert(key, value);
        }
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(h), Some(l)) => {
                        out.push(h << 4 | l);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn query_string_repeated_keys_and_coercion() {
        let p = QueryParams::from_query_string("?age_in=4&age_in=5&name=lore&limit=2", true);
        assert_eq!(p.0, doc! { "age_in": [4_i64, 5_i64], "name": "lore", "limit": 2_i64 });
    }

    #[test]
    fn query_string_percent_decoding() {
        let p = QueryParams::from_query_string("name_contains=lorem+ipsum%21&sort=field%3Adesc&flag", false);
        assert_eq!(p.get("name_contains"), Some(&Bson::String("lorem ipsum!".into())));
        assert_eq!(p.get("sort"), Some(&Bson::String("field:desc".into())));
        assert_eq!(p.get("flag"), Some(&Bson::String(String::new())));
    }

    #[test]
    fn malformed_escape_kept_verbatim() {
        let p = QueryParams::from_query_string("a=100%&b=%zz", false);
        assert_eq!(p.get("a"), Some(&Bson::String("100%".into())));
        assert_eq!(p.get("b"), Some(&Bson::String("%zz".into())));
    }

    #[test]
    fn coercion_keeps_non_numeric_strings() {
        assert_eq!(coerce_value("1.5"), Bson::Double(1.5));
        assert_eq!(coerce_value("true"), Bson::Boolean(true));
        assert_eq!(coerce_value("NaN"), Bson::String("NaN".into()));
        assert_eq!(coerce_value("lore"), Bson::String("lore".into()));
    }

    #[test]
    fn text_modifiers_keep_raw_strings() {
        let p = QueryParams::from_query_string("phone_contains=0044&code_matches=1|2&tag_matchesIndex=42", true);
        assert_eq!(p.get("phone_contains"), Some(&Bson::String("0044".into())));
        assert_eq!(p.get("code_matches"), Some(&Bson::String("1|2".into())));
        assert_eq!(p.get("tag_matchesIndex"), Some(&Bson::String("42".into())));
    }

    #[test]
    fn equality_coerces_only_canonical_text() {
        let p = QueryParams::from_query_string("zip=01234&field=3&ratio_ne=1.50&on=true&age_gte=04", true);
        assert_eq!(p.get("zip"), Some(&Bson::String("01234".into())));
        assert_eq!(p.get("field"), Some(&Bson::Int64(3)));
        assert_eq!(p.get("ratio_ne"), Some(&Bson::String("1.50".into())));
        assert_eq!(p.get("on"), Some(&Bson::Boolean(true)));
        assert_eq!(p.get("age_gte"), Some(&Bson::Int64(4)));
    }

    #[test]
    fn sort_value_is_never_coerced() {
        let p = QueryParams::from_query_string("sort=1&limit=2", true);
        assert_eq!(p.0, doc! { "sort": "1", "limit": 2_i64 });
    }

    #[test]
    fn bracket_keys_nest() {
        let p = QueryParams::from_query_string("field=1&where[field]=3&where[name_contains]=007&a[b][c]=x", true);
        assert_eq!(
            p.0,
            doc! {
                "field": 1_i64,
                "where": { "field": 3_i64, "name_contains": "007" },
                "a": { "b": { "c": "x" } },
            }
        );
    }

    #[test]
    fn empty_brackets_collect() {
        let p = QueryParams::from_query_string("age_in[]=4&age_in[]=5&where[tag][]=x", true);
        assert_eq!(p.get("age_in"), Some(&Bson::Array(vec![Bson::Int64(4), Bson::Int64(5)])));
        assert_eq!(p.get("where"), Some(&Bson::Document(doc! { "tag": "x" })));
    }

    #[test]
    fn malformed_brackets_stay_literal() {
        let p = QueryParams::from_query_string("[x]=1&a[b=2&a[][c]=3", false);
        assert_eq!(p.0, doc! { "[x]": "1", "a[b": "2", "a[][c]": "3" });
    }

    #[test]
    fn custom_delimiter_drives_coercion() {
        let cfg = TranslatorConfig { delimiter: "__".into(), ..TranslatorConfig::default() };
        let p = QueryParams::from_query_string_with("code__contains=007&age__gt=7", &cfg);
        assert_eq!(p.get("code__contains"), Some(&Bson::String("007".into())));
        assert_eq!(p.get("age__gt"), Some(&Bson::Int64(7)));
    }

    #[test]
    fn json_must_be_object() {
        assert!(QueryParams::from_json_str("[1,2]").is_err());
        let p = QueryParams::from_json_str(r#"{"limit":2,"where":{"field":3}}"#).unwrap();
        assert!(matches!(p.get("where"), Some(Bson::Document(_))));
    }

    #[test]
    fn select_string() {
        assert_eq!(parse_select("age -name"), doc! { "age": 1, "name": 0 });
        assert_eq!(parse_select("  "), doc! {});
    }
}

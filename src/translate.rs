//! The operator-mapping translator.
//!
//! Turns [`QueryParams`] into a [`ResolvedQuery`]: reserved shaping keys are
//! pulled out, every other key is expanded through the modifier table, and the
//! base-filter object (`where`) is layered on top so it wins on conflicts.

use crate::config::TranslatorConfig;
use crate::exec::{FindQuery, FindTarget};
use crate::operators::{Expr, split_key};
use crate::params::QueryParams;
use crate::sort::{SortKey, parse_sort, sort_document};
use bson::{Bson, Document};

const TEXT_KEY: &str = "$text";

/// Filter, projection and cursor options ready for a find call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedQuery {
    pub filter: Document,
    pub projection: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    pub sort: Vec<SortKey>,
}

impl ResolvedQuery {
    /// Native sort document, or `None` when no sort was requested.
    pub fn sort_document(&self) -> Option<Document> {
        if self.sort.is_empty() { None } else { Some(sort_document(&self.sort)) }
    }

    /// Issue `find(filter, projection)` on `target` and chain the shaping calls
    /// that were requested. The builder is returned unexecuted.
    pub fn apply<T: FindTarget>(self, target: &T) -> T::Query {
        let sort = self.sort_document();
        let mut query = target.find(self.filter, self.projection);
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(skip) = self.skip {
            query = query.skip(skip);
        }
        if let Some(sort) = sort {
            query = query.sort(sort);
        }
        query
    }

    /// Relaxed extended-JSON rendering, used by the CLI.
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        out.insert("filter".into(), Bson::Document(self.filter.clone()).into_relaxed_extjson());
        out.insert(
            "projection".into(),
            self.projection
                .clone()
                .map_or(serde_json::Value::Null, |p| Bson::Document(p).into_relaxed_extjson()),
        );
        out.insert("limit".into(), self.limit.map_or(serde_json::Value::Null, Into::into));
        out.insert("skip".into(), self.skip.map_or(serde_json::Value::Null, Into::into));
        out.insert(
            "sort".into(),
            self.sort_document()
                .map_or(serde_json::Value::Null, |s| Bson::Document(s).into_relaxed_extjson()),
        );
        serde_json::Value::Object(out)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Translator {
    config: TranslatorConfig,
}

impl Translator {
    pub fn new(config: TranslatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    pub fn translate(&self, params: &QueryParams, projection: Option<Document>) -> ResolvedQuery {
        let cfg = &self.config;
        let mut resolved = ResolvedQuery { projection, ..ResolvedQuery::default() };
        let mut base: Option<&Document> = None;
        let mut entries: Vec<(&String, &Bson)> = Vec::new();

        for (key, value) in params.iter() {
            if !cfg.is_reserved(key) {
                entries.push((key, value));
            } else if *key == cfg.limit_key {
                resolved.limit = self.read_limit(value);
            } else if *key == cfg.skip_key {
                resolved.skip = read_skip(value);
            } else if *key == cfg.sort_key {
                resolved.sort = parse_sort(value, &cfg.sort_separator);
            } else if let Bson::Document(d) = value {
                base = Some(d);
            } else {
                log::warn!("{key:?} is not an object; matching it as a field");
                entries.push((key, value));
            }
        }

        let mut filter = self.translate_layer(entries);
        if let Some(base) = base {
            for (field, expr) in self.translate_layer(base.iter()) {
                if filter.contains_key(&field) {
                    log::debug!("base filter overrides top-level entry for {field:?}");
                }
                filter.insert(field, expr);
            }
        }
        resolved.filter = filter;
        log::debug!(
            "resolved query: filter={} limit={:?} skip={:?} sort={:?}",
            resolved.filter,
            resolved.limit,
            resolved.skip,
            resolved.sort
        );
        resolved
    }

    /// Translate one layer of filter entries. Entries constraining the same
    /// field merge when both are operator documents; otherwise the later wins.
    pub fn translate_layer<'a, I>(&self, entries: I) -> Document
    where
        I: IntoIterator<Item = (&'a String, &'a Bson)>,
    {
        let mut out = Document::new();
        for (key, value) in entries {
            if key.starts_with('$') {
                let v = match key.as_str() {
                    "$and" | "$or" | "$nor" => self.translate_logical(value),
                    _ => value.clone(),
                };
                out.insert(key.clone(), v);
                continue;
            }
            let (field, modifier) = split_key(key, &self.config.delimiter);
            let Some(modifier) = modifier else {
                merge_field(&mut out, key, value.clone());
                continue;
            };
            match modifier.apply(value) {
                Some(Expr::Field(expr)) => merge_field(&mut out, field, expr),
                Some(Expr::Text(text)) => {
                    out.insert(TEXT_KEY, text);
                }
                None => {
                    log::warn!(
                        "modifier {:?} cannot take value {value}; matching {key:?} by equality",
                        modifier.suffix()
                    );
                    merge_field(&mut out, key, value.clone());
                }
            }
        }
        out
    }

    fn translate_logical(&self, value: &Bson) -> Bson {
        match value {
            Bson::Array(items) => Bson::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Bson::Document(d) => Bson::Document(self.translate_layer(d.iter())),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn read_limit(&self, value: &Bson) -> Option<i64> {
        let Some(limit) = as_integer(value) else {
            log::warn!("ignoring non-integer limit: {value}");
            return None;
        };
        match self.config.max_limit.map(i64::saturating_abs) {
            Some(max) if limit.unsigned_abs() > max.unsigned_abs() => {
                log::warn!("limit {limit} exceeds max_limit {max}; clamping");
                Some(if limit < 0 { -max } else { max })
            }
            _ => Some(limit),
        }
    }
}

fn read_skip(value: &Bson) -> Option<u64> {
    match as_integer(value).map(u64::try_from) {
        Some(Ok(skip)) => Some(skip),
        _ => {
            log::warn!("ignoring invalid skip: {value}");
            None
        }
    }
}

fn as_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        #[allow(clippy::cast_possible_truncation)]
        Bson::Double(d) if d.fract() == 0.0 && d.abs() < 9.0e15 => Some(*d as i64),
        Bson::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn is_operator_doc(value: &Bson) -> bool {
    matches!(value, Bson::Document(d) if !d.is_empty() && d.keys().all(|k| k.starts_with('$')))
}

fn merge_field(out: &mut Document, field: &str, expr: Bson) {
    if let Some(existing) = out.get_mut(field)
        && is_operator_doc(existing)
        && is_operator_doc(&expr)
        && let (Bson::Document(current), Bson::Document(extra)) = (existing, expr.clone())
    {
        for (op, v) in extra {
            current.insert(op, v);
        }
        return;
    }
    out.insert(field, expr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::Order;
    use bson::doc;

    fn translate(d: Document) -> ResolvedQuery {
        Translator::default().translate(&QueryParams::from(d), None)
    }

    #[test]
    fn shaping_keys_are_extracted() {
        let r = translate(doc! { "limit": 2, "skip": "1", "sort": ["field:asc", "age:desc"], "name": "lore" });
        assert_eq!(r.limit, Some(2));
        assert_eq!(r.skip, Some(1));
        assert_eq!(r.sort, vec![SortKey::new("field", Order::Asc), SortKey::new("age", Order::Desc)]);
        assert_eq!(r.filter, doc! { "name": "lore" });
    }

    #[test]
    fn modifiers_expand() {
        let r = translate(doc! { "name_contains": "lore", "age_gte": 4 });
        assert_eq!(
            r.filter,
            doc! { "name": { "$regex": "lore", "$options": "i" }, "age": { "$gte": 4 } }
        );
    }

    #[test]
    fn same_field_operators_merge() {
        let r = translate(doc! { "age_gte": 4, "age_lt": 6 });
        assert_eq!(r.filter, doc! { "age": { "$gte": 4, "$lt": 6 } });
    }

    #[test]
    fn equality_after_operator_replaces() {
        let r = translate(doc! { "age_gte": 4, "age": 5 });
        assert_eq!(r.filter, doc! { "age": 5 });
    }

    #[test]
    fn where_wins_over_top_level() {
        let r = translate(doc! { "field": 1, "where": { "field": 3 } });
        assert_eq!(r.filter, doc! { "field": 3 });
        let r = translate(doc! { "age_gte": 1, "where": { "age_lt": 6 } });
        assert_eq!(r.filter, doc! { "age": { "$lt": 6 } });
    }

    #[test]
    fn shaping_names_inside_where_are_fields() {
        let r = translate(doc! { "limit": 1, "where": { "limit": 7, "sort_in": ["a"] } });
        assert_eq!(r.limit, Some(1));
        assert!(r.sort.is_empty());
        assert_eq!(r.filter, doc! { "limit": 7, "sort": { "$in": ["a"] } });
    }

    #[test]
    fn non_document_where_is_a_field() {
        let r = translate(doc! { "where": "here" });
        assert_eq!(r.filter, doc! { "where": "here" });
    }

    #[test]
    fn native_logical_operators_translate_members() {
        let r = translate(doc! { "where": { "$or": [ { "field": 1 }, { "field_gte": 3 } ] } });
        assert_eq!(r.filter, doc! { "$or": [ { "field": 1 }, { "field": { "$gte": 3 } } ] });
    }

    #[test]
    fn native_operator_passes_through() {
        let r = translate(doc! { "$where": "this.a > 1", "age": { "$gt": 3 } });
        assert_eq!(r.filter, doc! { "$where": "this.a > 1", "age": { "$gt": 3 } });
    }

    #[test]
    fn text_modifier_is_collection_wide() {
        let r = translate(doc! { "description_matchesIndex": "lorem" });
        assert_eq!(r.filter, doc! { "$text": { "$search": "lorem" } });
    }

    #[test]
    fn degraded_modifier_keeps_full_key() {
        let r = translate(doc! { "name_contains": ["a", "b"] });
        assert_eq!(r.filter, doc! { "name_contains": ["a", "b"] });
    }

    #[test]
    fn invalid_shaping_values_are_dropped() {
        let r = translate(doc! { "limit": "many", "skip": -3, "sort": 5 });
        assert_eq!(r.limit, None);
        assert_eq!(r.skip, None);
        assert!(r.sort.is_empty());
        assert!(r.filter.is_empty());
    }

    #[test]
    fn max_limit_clamps() {
        let cfg = TranslatorConfig { max_limit: Some(10), ..TranslatorConfig::default() };
        let r = Translator::new(cfg).translate(&QueryParams::from(doc! { "limit": 500 }), None);
        assert_eq!(r.limit, Some(10));
    }

    #[test]
    fn max_limit_clamps_extreme_negative_limit() {
        let cfg = TranslatorConfig { max_limit: Some(10), ..TranslatorConfig::default() };
        let t = Translator::new(cfg);
        let r = t.translate(&QueryParams::from_query_string("limit=-9223372036854775808", true), None);
        assert_eq!(r.limit, Some(-10));
        let r = t.translate(&QueryParams::from(doc! { "limit": i64::MAX }), None);
        assert_eq!(r.limit, Some(10));
        let r = t.translate(&QueryParams::from(doc! { "limit": -3 }), None);
        assert_eq!(r.limit, Some(-3));
    }

    #[test]
    fn custom_keys_and_delimiter() {
        let cfg = TranslatorConfig {
            delimiter: "__".into(),
            where_key: "filter".into(),
            limit_key: "take".into(),
            ..TranslatorConfig::default()
        };
        let params = QueryParams::from(doc! { "take": 3, "first_name__ne": "x", "filter": { "age__lte": 9 } });
        let r = Translator::new(cfg).translate(&params, None);
        assert_eq!(r.limit, Some(3));
        assert_eq!(r.filter, doc! { "first_name": { "$ne": "x" }, "age": { "$lte": 9 } });
    }

    #[test]
    fn json_rendering() {
        let r = translate(doc! { "limit": 2, "sort": "field:desc", "age_gt": 5 });
        let v = r.to_json();
        assert_eq!(v["limit"], serde_json::json!(2));
        assert_eq!(v["skip"], serde_json::Value::Null);
        assert_eq!(v["sort"], serde_json::json!({ "field": -1 }));
        assert_eq!(v["filter"], serde_json::json!({ "age": { "$gt": 5 } }));
    }
}

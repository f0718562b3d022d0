use crate::errors::QueryMapError;
use crate::operators::truthy;
use bson::{Bson, Document};

use super::types::{CmpOp, Filter, MAX_IN_SET, MAX_PROJECTION_FIELDS, Projection, TextSearch};

/// Parse a native filter document. `text_fields` are the collection's
/// text-indexed fields; a `$text` clause without any is an error.
///
/// # Errors
/// Returns `QueryMapError::Query` for unsupported operators, malformed operands
/// and invalid regular expressions.
pub fn parse_filter(doc: &Document, text_fields: &[String]) -> Result<Filter, QueryMapError> {
    let mut clauses = Vec::new();
    for (key, value) in doc {
        match key.as_str() {
            "$and" => clauses.push(Filter::And(parse_list(key, value, text_fields)?)),
            "$or" => clauses.push(Filter::Or(parse_list(key, value, text_fields)?)),
            "$nor" => clauses.push(Filter::Nor(parse_list(key, value, text_fields)?)),
            "$text" => clauses.push(Filter::Text(parse_text(value, text_fields)?)),
            k if k.starts_with('$') => {
                return Err(QueryMapError::Query(format!("unsupported top-level operator {k}")));
            }
            path => clauses.push(parse_field(path, value)?),
        }
    }
    Ok(match clauses.len() {
        0 => Filter::True,
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn parse_list(op: &str, value: &Bson, text_fields: &[String]) -> Result<Vec<Filter>, QueryMapError> {
    let items = value
        .as_array()
        .ok_or_else(|| QueryMapError::Query(format!("{op} requires an array")))?;
    if items.is_empty() {
        return Err(QueryMapError::Query(format!("{op} requires a non-empty array")));
    }
    items
        .iter()
        .map(|item| {
            let d = item
                .as_document()
                .ok_or_else(|| QueryMapError::Query(format!("{op} entries must be documents")))?;
            parse_filter(d, text_fields)
        })
        .collect()
}

fn is_operator_doc(d: &Document) -> bool {
    !d.is_empty() && d.keys().all(|k| k.starts_with('$'))
}

fn parse_field(path: &str, value: &Bson) -> Result<Filter, QueryMapError> {
    match value {
        Bson::Document(d) if is_operator_doc(d) => parse_ops(path, d),
        Bson::RegularExpression(re) => Ok(Filter::Regex {
            path: path.to_string(),
            regex: build_regex(re.pattern.as_str(), re.options.as_str())?,
        }),
        v => Ok(Filter::Cmp { path: path.to_string(), op: CmpOp::Eq, value: v.clone() }),
    }
}

fn parse_ops(path: &str, ops: &Document) -> Result<Filter, QueryMapError> {
    let mut out = Vec::new();
    let options = match ops.get("$options") {
        Some(Bson::String(s)) => s.as_str(),
        Some(_) => return Err(QueryMapError::Query("$options must be a string".into())),
        None => "",
    };
    let cmp = |op: CmpOp, value: &Bson| Filter::Cmp { path: path.to_string(), op, value: value.clone() };
    for (op, v) in ops {
        let f = match op.as_str() {
            "$eq" => cmp(CmpOp::Eq, v),
            "$ne" => cmp(CmpOp::Ne, v),
            "$gt" => cmp(CmpOp::Gt, v),
            "$gte" => cmp(CmpOp::Gte, v),
            "$lt" => cmp(CmpOp::Lt, v),
            "$lte" => cmp(CmpOp::Lte, v),
            "$in" => Filter::In { path: path.to_string(), values: set_values(op, v)? },
            "$nin" => Filter::Nin { path: path.to_string(), values: set_values(op, v)? },
            "$exists" => Filter::Exists { path: path.to_string(), exists: truthy(v) },
            "$regex" => {
                let regex = match v {
                    Bson::String(p) => build_regex(p, options)?,
                    Bson::RegularExpression(re) => {
                        let opts = if options.is_empty() { re.options.as_str() } else { options };
                        build_regex(re.pattern.as_str(), opts)?
                    }
                    _ => return Err(QueryMapError::Query("$regex requires a string".into())),
                };
                Filter::Regex { path: path.to_string(), regex }
            }
            "$options" => {
                if !ops.contains_key("$regex") {
                    return Err(QueryMapError::Query("$options without $regex".into()));
                }
                continue;
            }
            "$not" => {
                let inner = match v {
                    Bson::Document(d) if is_operator_doc(d) => parse_ops(path, d)?,
                    Bson::RegularExpression(re) => Filter::Regex {
                        path: path.to_string(),
                        regex: build_regex(re.pattern.as_str(), re.options.as_str())?,
                    },
                    _ => {
                        return Err(QueryMapError::Query(
                            "$not requires an operator document or regex".into(),
                        ));
                    }
                };
                Filter::Not(Box::new(inner))
            }
            other => return Err(QueryMapError::Query(format!("unsupported operator {other}"))),
        };
        out.push(f);
    }
    Ok(if out.len() == 1 { out.remove(0) } else { Filter::And(out) })
}

fn set_values(op: &str, v: &Bson) -> Result<Vec<Bson>, QueryMapError> {
    let items = v.as_array().ok_or_else(|| QueryMapError::Query(format!("{op} requires an array")))?;
    if items.len() > MAX_IN_SET {
        return Err(QueryMapError::Query(format!(
            "{op} set has {} values; at most {MAX_IN_SET} are allowed",
            items.len()
        )));
    }
    Ok(items.clone())
}

fn build_regex(pattern: &str, options: &str) -> Result<regex::Regex, QueryMapError> {
    let mut b = regex::RegexBuilder::new(pattern);
    for o in options.chars() {
        match o {
            'i' => b.case_insensitive(true),
            'm' => b.multi_line(true),
            's' => b.dot_matches_new_line(true),
            'x' => b.ignore_whitespace(true),
            other => return Err(QueryMapError::Query(format!("unsupported regex option {other:?}"))),
        };
    }
    b.build().map_err(|e| QueryMapError::Query(format!("invalid regex: {e}")))
}

fn parse_text(value: &Bson, text_fields: &[String]) -> Result<TextSearch, QueryMapError> {
    if text_fields.is_empty() {
        return Err(QueryMapError::Query("text index required for $text query".into()));
    }
    let d = value
        .as_document()
        .ok_or_else(|| QueryMapError::Query("$text requires a document".into()))?;
    let search = match d.get("$search") {
        Some(Bson::String(s)) => s.as_str(),
        _ => return Err(QueryMapError::Query("$text requires a $search string".into())),
    };
    let case_sensitive = match d.get("$caseSensitive") {
        Some(Bson::Boolean(b)) => *b,
        None => false,
        Some(_) => return Err(QueryMapError::Query("$caseSensitive must be a boolean".into())),
    };
    let mut out = tokenize_search(search);
    out.fields = text_fields.to_vec();
    out.case_sensitive = case_sensitive;
    Ok(out)
}

/// Split a `$search` string into terms, `"quoted phrases"` and `-excluded` terms.
pub fn tokenize_search(search: &str) -> TextSearch {
    let mut out = TextSearch::default();
    let mut rest = search;
    while let Some(start) = rest.find('"') {
        push_terms(&mut out, &rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('"').unwrap_or(after.len());
        let phrase = after[..end].trim();
        if !phrase.is_empty() {
            out.phrases.push(phrase.to_string());
        }
        rest = after.get(end + 1..).unwrap_or("");
    }
    push_terms(&mut out, rest);
    out
}

fn push_terms(out: &mut TextSearch, s: &str) {
    for tok in s.split_whitespace() {
        match tok.strip_prefix('-') {
            Some(neg) if !neg.is_empty() => out.excluded.push(neg.to_string()),
            Some(_) => {}
            None => out.terms.push(tok.to_string()),
        }
    }
}

/// Parse a projection document. An empty document means no projection.
///
/// # Errors
/// Returns an error when inclusion and exclusion are mixed (other than `_id`).
pub fn parse_projection(doc: &Document) -> Result<Option<Projection>, QueryMapError> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    let mut id_flag: Option<bool> = None;
    if doc.len() > MAX_PROJECTION_FIELDS {
        return Err(QueryMapError::Query(format!(
            "projection has {} fields; at most {MAX_PROJECTION_FIELDS} are allowed",
            doc.len()
        )));
    }
    for (field, v) in doc {
        let keep = match v {
            Bson::Boolean(b) => *b,
            Bson::Int32(i) => *i != 0,
            Bson::Int64(i) => *i != 0,
            Bson::Double(d) => *d != 0.0,
            other => {
                return Err(QueryMapError::Query(format!(
                    "unsupported projection value for {field}: {other}"
                )));
            }
        };
        if field == "_id" {
            id_flag = Some(keep);
        } else if keep {
            include.push(field.clone());
        } else {
            exclude.push(field.clone());
        }
    }
    if !include.is_empty() && !exclude.is_empty() {
        return Err(QueryMapError::Query("cannot mix inclusion and exclusion in projection".into()));
    }
    if !include.is_empty() {
        return Ok(Some(Projection::Include { fields: include, keep_id: id_flag.unwrap_or(true) }));
    }
    if id_flag == Some(false) {
        exclude.push("_id".into());
    }
    if exclude.is_empty() {
        // `{ _id: 1 }` alone keeps only the id
        return Ok(id_flag.map(|_| Projection::Include { fields: Vec::new(), keep_id: true }));
    }
    Ok(Some(Projection::Exclude(exclude)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn empty_filter_is_true() {
        assert!(matches!(parse_filter(&doc! {}, &[]).unwrap(), Filter::True));
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = parse_filter(&doc! { "a": { "$near": 1 } }, &[]).unwrap_err();
        assert!(matches!(err, QueryMapError::Query(_)));
        assert!(parse_filter(&doc! { "$where": "1" }, &[]).is_err());
    }

    #[test]
    fn options_need_regex() {
        assert!(parse_filter(&doc! { "a": { "$options": "i" } }, &[]).is_err());
        assert!(parse_filter(&doc! { "a": { "$regex": "(" } }, &[]).is_err());
    }

    #[test]
    fn text_requires_index() {
        let f = doc! { "$text": { "$search": "x" } };
        assert!(parse_filter(&f, &[]).is_err());
        assert!(parse_filter(&f, &["description".to_string()]).is_ok());
    }

    #[test]
    fn tokenizer_splits_terms_phrases_and_negations() {
        let t = tokenize_search("lorem \"dolor sit\" -amet ipsum");
        assert_eq!(t.terms, vec!["lorem", "ipsum"]);
        assert_eq!(t.phrases, vec!["dolor sit"]);
        assert_eq!(t.excluded, vec!["amet"]);
    }

    #[test]
    fn projection_modes() {
        assert_eq!(
            parse_projection(&doc! { "age": 1 }).unwrap(),
            Some(Projection::Include { fields: vec!["age".into()], keep_id: true })
        );
        assert_eq!(
            parse_projection(&doc! { "name": 0, "_id": 0 }).unwrap(),
            Some(Projection::Exclude(vec!["name".into(), "_id".into()]))
        );
        assert_eq!(parse_projection(&doc! {}).unwrap(), None);
        assert!(parse_projection(&doc! { "a": 1, "b": 0 }).is_err());
    }

    #[test]
    fn oversized_sets_and_projections_are_rejected() {
        let big: Vec<Bson> = (0..=MAX_IN_SET as i64).map(Bson::Int64).collect();
        let err = parse_filter(&doc! { "a": { "$nin": big.clone() } }, &[]).unwrap_err();
        assert!(matches!(err, QueryMapError::Query(_)));
        assert!(parse_filter(&doc! { "a": { "$in": big } }, &[]).is_err());
        let ok: Vec<Bson> = (0..MAX_IN_SET as i64).map(Bson::Int64).collect();
        assert!(parse_filter(&doc! { "a": { "$nin": ok } }, &[]).is_ok());

        let mut wide = Document::new();
        for i in 0..=MAX_PROJECTION_FIELDS {
            wide.insert(format!("f{i}"), 1);
        }
        assert!(matches!(parse_projection(&wide), Err(QueryMapError::Query(_))));
    }
}

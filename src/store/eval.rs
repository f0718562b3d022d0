use bson::{Bson, Document};
use std::cmp::Ordering;

use super::types::{CmpOp, Filter, MAX_IN_SET, MAX_PATH_DEPTH, MAX_SORT_FIELDS, Projection, TextSearch};
use crate::sort::{Order, SortKey};

pub fn eval_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => get_path(doc, path).is_some() == *exists,
        Filter::In { path, values } => match get_path(doc, path) {
            Some(v) => any_value(v, |x| is_in_set(x, values)),
            // missing fields only match a set holding null
            None => values.iter().any(|x| matches!(x, Bson::Null)),
        },
        Filter::Nin { path, values } => !match get_path(doc, path) {
            Some(v) => any_value(v, |x| is_in_set(x, values)),
            None => values.iter().any(|x| matches!(x, Bson::Null)),
        },
        Filter::Cmp { path, op, value } => match (get_path(doc, path), op) {
            (Some(v), CmpOp::Eq) => any_value(v, |x| bson_eq(x, value)),
            (Some(v), CmpOp::Ne) => !any_value(v, |x| bson_eq(x, value)),
            (Some(v), op) => any_value(v, |x| cmp_matches(x, *op, value)),
            (None, CmpOp::Eq) => matches!(value, Bson::Null),
            (None, CmpOp::Ne) => !matches!(value, Bson::Null),
            (None, _) => false,
        },
        Filter::Regex { path, regex } => get_path(doc, path)
            .is_some_and(|v| any_value(v, |x| matches!(x, Bson::String(s) if regex.is_match(s)))),
        Filter::Text(search) => eval_text(doc, search),
    }
}

/// Apply `pred` to the value, or to each element when it is an array.
fn any_value(v: &Bson, pred: impl Fn(&Bson) -> bool) -> bool {
    match v {
        Bson::Array(items) => pred(v) || items.iter().any(&pred),
        other => pred(other),
    }
}

fn cmp_matches(v: &Bson, op: CmpOp, value: &Bson) -> bool {
    // ordered comparisons only hold between comparable types
    if !comparable(v, value) {
        return false;
    }
    let c = compare_bson(v, value);
    match op {
        CmpOp::Gt => c == Ordering::Greater,
        CmpOp::Gte => c != Ordering::Less,
        CmpOp::Lt => c == Ordering::Less,
        CmpOp::Lte => c != Ordering::Greater,
        CmpOp::Eq => c == Ordering::Equal,
        CmpOp::Ne => c != Ordering::Equal,
    }
}

fn comparable(a: &Bson, b: &Bson) -> bool {
    (is_num(a) && is_num(b)) || std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    if is_num(a) && is_num(b) {
        return as_f64_num(a) == as_f64_num(b);
    }
    a == b
}

fn is_in_set(v: &Bson, set: &[Bson]) -> bool {
    set.iter().take(MAX_IN_SET).any(|x| bson_eq(x, v))
}

fn eval_text(doc: &Document, search: &TextSearch) -> bool {
    let fold = |s: &str| if search.case_sensitive { s.to_string() } else { s.to_lowercase() };
    let mut texts: Vec<String> = Vec::new();
    for field in &search.fields {
        match get_path(doc, field) {
            Some(Bson::String(s)) => texts.push(fold(s.as_str())),
            Some(Bson::Array(items)) => {
                texts.extend(items.iter().filter_map(|i| i.as_str()).map(fold));
            }
            _ => {}
        }
    }
    if texts.is_empty() {
        return false;
    }
    let has_word = |term: &str| {
        let term = fold(term);
        texts.iter().any(|t| t.split(|c: char| !c.is_alphanumeric()).any(|w| w == term))
    };
    if search.excluded.iter().any(|t| has_word(t.as_str())) {
        return false;
    }
    if !search.phrases.is_empty() {
        return search.phrases.iter().all(|p| {
            let p = fold(p.as_str());
            texts.iter().any(|t| t.contains(&p))
        });
    }
    search.terms.iter().any(|t| has_word(t.as_str()))
}

pub fn compare_docs(a: &Document, b: &Document, sort: &[SortKey]) -> Ordering {
    for s in sort.iter().take(MAX_SORT_FIELDS) {
        let va = get_path(a, &s.field);
        let vb = get_path(b, &s.field);
        let ord = match (va, vb) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

pub(crate) fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut cur = doc;
    let mut parts = path.split('.').peekable();
    let mut segs = 0usize;
    while let Some(part) = parts.next() {
        segs += 1;
        if segs > MAX_PATH_DEPTH {
            return None;
        }
        let v = cur.get(part)?;
        if parts.peek().is_none() {
            return Some(v);
        }
        match v {
            Bson::Document(d) => cur = d,
            _ => return None,
        }
    }
    None
}

fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

#[allow(clippy::cast_precision_loss)]
fn as_f64_num(x: &Bson) -> f64 {
    match x {
        Bson::Int32(i) => f64::from(*i),
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        Bson::Decimal128(d) => d.to_string().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    use bson::Bson as T;
    if is_num(a) && is_num(b) {
        return as_f64_num(a).total_cmp(&as_f64_num(b));
    }
    match (a, b) {
        (T::String(x), T::String(y)) => x.cmp(y),
        (T::Boolean(x), T::Boolean(y)) => x.cmp(y),
        (T::DateTime(x), T::DateTime(y)) => x.cmp(y),
        (T::ObjectId(x), T::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// Cross-type sort order, numbers share one rank.
fn type_rank(v: &Bson) -> u8 {
    use bson::Bson as T;
    match v {
        T::MinKey => 0,
        T::Null | T::Undefined => 1,
        T::Int32(_) | T::Int64(_) | T::Double(_) | T::Decimal128(_) => 2,
        T::Symbol(_) | T::String(_) => 3,
        T::Document(_) => 4,
        T::Array(_) => 5,
        T::Binary(_) => 6,
        T::ObjectId(_) => 7,
        T::Boolean(_) => 8,
        T::DateTime(_) => 9,
        T::Timestamp(_) => 10,
        T::RegularExpression(_) => 11,
        T::DbPointer(_) => 12,
        T::JavaScriptCode(_) | T::JavaScriptCodeWithScope(_) => 13,
        T::MaxKey => 255,
    }
}

pub fn project(doc: &Document, projection: &Projection) -> Document {
    match projection {
        Projection::Include { fields, keep_id } => {
            let mut out = Document::new();
            if *keep_id && let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
            for f in fields {
                if let Some(v) = get_path(doc, f) {
                    insert_path(&mut out, f, v.clone());
                }
            }
            out
        }
        Projection::Exclude(fields) => {
            let mut out = doc.clone();
            for f in fields {
                remove_path(&mut out, f);
            }
            out
        }
    }
}

fn insert_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(sub)) = doc.get_mut(head) {
                insert_path(sub, rest, value);
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(sub)) = doc.get_mut(head) {
                remove_path(sub, rest);
            }
        }
    }
}

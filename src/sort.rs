use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    /// Parse a direction token. Unknown tokens yield `None`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "" | "asc" | "ascending" | "1" => Some(Self::Asc),
            "desc" | "descending" | "-1" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }

    fn from_bson(v: &Bson) -> Option<Self> {
        match v {
            Bson::Int32(i) => Some(if *i < 0 { Self::Desc } else { Self::Asc }),
            Bson::Int64(i) => Some(if *i < 0 { Self::Desc } else { Self::Asc }),
            Bson::Double(d) => Some(if *d < 0.0 { Self::Desc } else { Self::Asc }),
            Bson::String(s) => Self::parse(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub order: Order,
}

impl SortKey {
    pub fn new(field: impl Into<String>, order: Order) -> Self {
        Self { field: field.into(), order }
    }
}

/// Parse one `field[<sep>direction]` item. Empty fields yield `None`; an
/// unknown direction degrades to ascending.
pub fn parse_sort_item(item: &str, separator: &str) -> Option<SortKey> {
    let item = item.trim();
    let (field, dir) = item.rsplit_once(separator).unwrap_or((item, ""));
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    let order = Order::parse(dir).unwrap_or_else(|| {
        log::warn!("unknown sort direction {dir:?} for field {field:?}; using ascending");
        Order::Asc
    });
    Some(SortKey::new(field, order))
}

/// Parse a sort directive: a string (comma separated items allowed), an array
/// of such strings, or a native `{ field: 1 | -1 }` document. Order is kept;
/// a field named again later is ignored.
pub fn parse_sort(value: &Bson, separator: &str) -> Vec<SortKey> {
    let mut keys: Vec<SortKey> = Vec::new();
    let mut push = |k: SortKey| {
        if keys.iter().any(|e| e.field == k.field) {
            log::debug!("duplicate sort field {:?} ignored", k.field);
        } else {
            keys.push(k);
        }
    };
    match value {
        Bson::String(s) => {
            s.split(',').filter_map(|i| parse_sort_item(i, separator)).for_each(&mut push);
        }
        Bson::Array(items) => {
            for item in items {
                match item {
                    Bson::String(s) => {
                        s.split(',').filter_map(|i| parse_sort_item(i, separator)).for_each(&mut push);
                    }
                    other => log::warn!("ignoring non-string sort item: {other}"),
                }
            }
        }
        Bson::Document(d) => {
            for (field, dir) in d {
                let order = Order::from_bson(dir).unwrap_or(Order::Asc);
                if !field.is_empty() {
                    push(SortKey::new(field.clone(), order));
                }
            }
        }
        other => log::warn!("ignoring unsupported sort value: {other}"),
    }
    keys
}

/// Render sort keys as the native sort document, keeping key order.
pub fn sort_document(keys: &[SortKey]) -> Document {
    let mut d = Document::new();
    for k in keys {
        d.insert(k.field.clone(), k.order.as_i32());
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn single_string() {
        let keys = parse_sort(&Bson::String("field:desc".into()), ":");
        assert_eq!(keys, vec![SortKey::new("field", Order::Desc)]);
    }

    #[test]
    fn array_keeps_order() {
        let v = Bson::Array(vec!["field:asc".into(), "age:DESC".into()]);
        let keys = parse_sort(&v, ":");
        assert_eq!(keys, vec![SortKey::new("field", Order::Asc), SortKey::new("age", Order::Desc)]);
        assert_eq!(sort_document(&keys), doc! { "field": 1, "age": -1 });
    }

    #[test]
    fn comma_list_and_missing_direction() {
        let keys = parse_sort(&Bson::String("name, age:-1".into()), ":");
        assert_eq!(keys, vec![SortKey::new("name", Order::Asc), SortKey::new("age", Order::Desc)]);
    }

    #[test]
    fn unknown_direction_is_ascending() {
        let keys = parse_sort(&Bson::String("age:sideways".into()), ":");
        assert_eq!(keys, vec![SortKey::new("age", Order::Asc)]);
    }

    #[test]
    fn duplicates_keep_first() {
        let keys = parse_sort(&Bson::String("a:desc,b,a:asc".into()), ":");
        assert_eq!(keys, vec![SortKey::new("a", Order::Desc), SortKey::new("b", Order::Asc)]);
    }

    #[test]
    fn native_document() {
        let keys = parse_sort(&Bson::Document(doc! { "a": -1, "b": 1 }), ":");
        assert_eq!(keys, vec![SortKey::new("a", Order::Desc), SortKey::new("b", Order::Asc)]);
    }

    #[test]
    fn empty_items_skipped() {
        assert!(parse_sort(&Bson::String(",:desc,".into()), ":").is_empty());
        assert!(parse_sort(&Bson::Int32(3), ":").is_empty());
    }
}

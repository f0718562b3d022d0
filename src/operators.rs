//! Modifier suffixes and the native operator expressions they expand into.
//!
//! A filter key is `field` or `field<delimiter>suffix`. The suffix selects a
//! [`Modifier`]; unknown suffixes are not modifiers and the whole key is then
//! treated as a plain field name.

use bson::{Bson, Document, doc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Contains,
    ContainsSensitive,
    NotContains,
    NotContainsSensitive,
    Matches,
    MatchesSensitive,
    ContainsIndex,
    ContainsIndexSensitive,
    MatchesIndex,
    MatchesIndexSensitive,
    Exists,
    Null,
}

/// Suffix lookup table. Matching is exact and case-sensitive.
pub const MODIFIERS: &[(&str, Modifier)] = &[
    ("eq", Modifier::Eq),
    ("ne", Modifier::Ne),
    ("gt", Modifier::Gt),
    ("gte", Modifier::Gte),
    ("lt", Modifier::Lt),
    ("lte", Modifier::Lte),
    ("in", Modifier::In),
    ("nin", Modifier::Nin),
    ("contains", Modifier::Contains),
    ("containss", Modifier::ContainsSensitive),
    ("ncontains", Modifier::NotContains),
    ("ncontainss", Modifier::NotContainsSensitive),
    ("matches", Modifier::Matches),
    ("matchess", Modifier::MatchesSensitive),
    ("containsIndex", Modifier::ContainsIndex),
    ("containssIndex", Modifier::ContainsIndexSensitive),
    ("matchesIndex", Modifier::MatchesIndex),
    ("matchessIndex", Modifier::MatchesIndexSensitive),
    ("exists", Modifier::Exists),
    ("null", Modifier::Null),
];

/// What a modifier produced for one filter entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Expression bound to the field: `{ field: <expr> }`.
    Field(Bson),
    /// Collection-wide `$text` clause; the field name is not used.
    Text(Document),
}

impl Modifier {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        MODIFIERS.iter().find(|(s, _)| *s == suffix).map(|(_, m)| *m)
    }

    pub fn suffix(self) -> &'static str {
        MODIFIERS.iter().find(|(_, m)| *m == self).map_or("", |(s, _)| *s)
    }

    /// Text and pattern modifiers read their value as a literal string.
    pub fn takes_text(self) -> bool {
        matches!(
            self,
            Self::Contains
                | Self::ContainsSensitive
                | Self::NotContains
                | Self::NotContainsSensitive
                | Self::Matches
                | Self::MatchesSensitive
                | Self::ContainsIndex
                | Self::ContainsIndexSensitive
                | Self::MatchesIndex
                | Self::MatchesIndexSensitive
        )
    }

    /// Ordered comparisons and set membership, where a numeric reading is intended.
    pub fn takes_number(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte | Self::In | Self::Nin)
    }

    /// Expand `value` into the native expression for this modifier.
    ///
    /// Returns `None` when the value has the wrong shape for the modifier
    /// (text modifiers given an array or document); callers fall back to an
    /// equality match on the unsplit key.
    pub fn apply(self, value: &Bson) -> Option<Expr> {
        let v = value.clone();
        let expr = match self {
            Self::Eq => doc! { "$eq": v },
            Self::Ne => doc! { "$ne": v },
            Self::Gt => doc! { "$gt": v },
            Self::Gte => doc! { "$gte": v },
            Self::Lt => doc! { "$lt": v },
            Self::Lte => doc! { "$lte": v },
            Self::In => doc! { "$in": as_array(v) },
            Self::Nin => doc! { "$nin": as_array(v) },
            Self::Contains => regex_expr(&regex::escape(&scalar_text(value)?), true),
            Self::ContainsSensitive => regex_expr(&regex::escape(&scalar_text(value)?), false),
            Self::NotContains => {
                doc! { "$not": regex_expr(&regex::escape(&scalar_text(value)?), true) }
            }
            Self::NotContainsSensitive => {
                doc! { "$not": regex_expr(&regex::escape(&scalar_text(value)?), false) }
            }
            Self::Matches => regex_expr(&scalar_text(value)?, true),
            Self::MatchesSensitive => regex_expr(&scalar_text(value)?, false),
            Self::ContainsIndex => return Some(Expr::Text(text_expr(phrase(value)?, false))),
            Self::ContainsIndexSensitive => {
                return Some(Expr::Text(text_expr(phrase(value)?, true)));
            }
            Self::MatchesIndex => return Some(Expr::Text(text_expr(scalar_text(value)?, false))),
            Self::MatchesIndexSensitive => {
                return Some(Expr::Text(text_expr(scalar_text(value)?, true)));
            }
            Self::Exists => doc! { "$exists": truthy(value) },
            Self::Null => {
                if truthy(value) {
                    doc! { "$eq": Bson::Null }
                } else {
                    doc! { "$ne": Bson::Null }
                }
            }
        };
        Some(Expr::Field(Bson::Document(expr)))
    }
}

/// Split `key` on the last `delimiter`. The suffix only counts when it is a known
/// modifier and the field part is non-empty; otherwise the whole key is the field.
pub fn split_key<'a>(key: &'a str, delimiter: &str) -> (&'a str, Option<Modifier>) {
    if let Some((field, suffix)) = key.rsplit_once(delimiter)
        && !field.is_empty()
        && let Some(m) = Modifier::from_suffix(suffix)
    {
        return (field, Some(m));
    }
    (key, None)
}

/// Loose truthiness used by `exists` and `null`: `false`, `0`, empty,
/// `"false"`, `"0"` and `"no"` are false.
pub fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(d) => *d != 0.0,
        Bson::String(s) => !matches!(s.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no"),
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

fn as_array(value: Bson) -> Bson {
    match value {
        Bson::Array(_) => value,
        other => Bson::Array(vec![other]),
    }
}

fn scalar_text(value: &Bson) -> Option<String> {
    match value {
        Bson::String(s) => Some(s.clone()),
        Bson::Int32(i) => Some(i.to_string()),
        Bson::Int64(i) => Some(i.to_string()),
        Bson::Double(d) => Some(d.to_string()),
        Bson::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn phrase(value: &Bson) -> Option<String> {
    scalar_text(value).map(|s| format!("\"{}\"", s.replace('"', "")))
}

fn regex_expr(pattern: &str, case_insensitive: bool) -> Document {
    if case_insensitive {
        doc! { "$regex": pattern, "$options": "i" }
    } else {
        doc! { "$regex": pattern }
    }
}

fn text_expr(search: String, case_sensitive: bool) -> Document {
    if case_sensitive {
        doc! { "$search": search, "$caseSensitive": true }
    } else {
        doc! { "$search": search }
    }
}

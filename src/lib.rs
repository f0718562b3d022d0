//! Translate URL-query-style filter maps into document-store queries.
//!
//! ```
//! use bson::doc;
//! use mongo_operators::{FindQuery, MemoryCollection, QueryParams, map_operators};
//!
//! let people = MemoryCollection::new("people");
//! people.insert_many(vec![doc! { "name": "Lore", "age": 4 }, doc! { "name": "ipsum", "age": 6 }]);
//!
//! let params = QueryParams::from_query_string("name_contains=lo&age_gte=4&sort=age:desc", true);
//! let docs = map_operators(&people, &params, None).exec().unwrap().to_vec();
//! assert_eq!(docs.len(), 1);
//! assert_eq!(docs[0].get_str("name").unwrap(), "Lore");
//! ```

pub mod config;
pub mod errors;
pub mod exec;
pub mod logger;
pub mod operators;
pub mod params;
pub mod sort;
pub mod store;
pub mod translate;

pub use config::TranslatorConfig;
pub use errors::QueryMapError;
pub use exec::{FindQuery, FindTarget};
pub use params::QueryParams;
pub use store::{Cursor, MemoryCollection, MemoryQuery};
pub use translate::{ResolvedQuery, Translator};

use bson::Document;

/// Translate `params` with the default configuration and start the find on
/// `target`. The returned builder has limit/skip/sort applied and is not yet
/// executed, so callers can keep chaining.
pub fn map_operators<T: FindTarget>(target: &T, params: &QueryParams, projection: Option<Document>) -> T::Query {
    Translator::default().translate(params, projection).apply(target)
}

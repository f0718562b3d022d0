//! Seam between the translator and whatever executes the query.
//!
//! A driver collection implements [`FindTarget`]; its find builder implements
//! [`FindQuery`]. The translator only ever calls `find` and then chains the
//! shaping calls, so builders are free to add their own extras (`select`,
//! read preferences, hints) for the caller to use afterwards.

use bson::Document;

pub trait FindTarget {
    type Query: FindQuery;

    /// Start a find with the given filter and optional projection.
    fn find(&self, filter: Document, projection: Option<Document>) -> Self::Query;
}

pub trait FindQuery: Sized {
    type Output;
    type Error;

    #[must_use]
    fn limit(self, limit: i64) -> Self;

    #[must_use]
    fn skip(self, skip: u64) -> Self;

    /// `sort` is a native sort document; key order is significant.
    #[must_use]
    fn sort(self, sort: Document) -> Self;

    /// # Errors
    /// Returns the executor's error when the query cannot be run.
    fn exec(self) -> Result<Self::Output, Self::Error>;
}

impl<T: FindTarget> FindTarget for &T {
    type Query = T::Query;

    fn find(&self, filter: Document, projection: Option<Document>) -> Self::Query {
        (**self).find(filter, projection)
    }
}

impl<T: FindTarget> FindTarget for std::sync::Arc<T> {
    type Query = T::Query;

    fn find(&self, filter: Document, projection: Option<Document>) -> Self::Query {
        (**self).find(filter, projection)
    }
}

use crate::errors::QueryMapError;
use crate::exec::{FindQuery, FindTarget};
use crate::params::parse_select;
use crate::sort::parse_sort;
use bson::{Bson, Document};
use parking_lot::RwLock;
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;

use super::cursor::Cursor;
use super::eval::{compare_docs, eval_filter, project};
use super::parse::{parse_filter, parse_projection};
use super::types::MAX_SORT_FIELDS;

struct Inner {
    name: String,
    docs: RwLock<Vec<Document>>,
    text_fields: RwLock<Vec<String>>,
}

/// Shared handle to an in-memory list of documents. Clones refer to the same data.
#[derive(Clone)]
pub struct MemoryCollection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .field("text_fields", &*self.inner.text_fields.read())
            .finish()
    }
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                docs: RwLock::new(Vec::new()),
                text_fields: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Declare the fields searched by `$text`. Replaces any earlier declaration.
    pub fn create_text_index<I, S>(&self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).filter(|f: &String| !f.is_empty()).collect();
        log::debug!("collection {}: text index on {:?}", self.inner.name, fields);
        *self.inner.text_fields.write() = fields;
    }

    pub fn text_fields(&self) -> Vec<String> {
        self.inner.text_fields.read().clone()
    }

    pub fn insert_one(&self, doc: Document) {
        self.inner.docs.write().push(doc);
    }

    pub fn insert_many<I: IntoIterator<Item = Document>>(&self, docs: I) -> usize {
        let mut guard = self.inner.docs.write();
        let before = guard.len();
        guard.extend(docs);
        guard.len() - before
    }

    pub fn len(&self) -> usize {
        self.inner.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load documents from a JSON array or newline-delimited JSON objects.
    /// Blank lines are skipped. Returns the number of documents inserted.
    ///
    /// # Errors
    /// Returns an error on I/O failure or when an entry is not a JSON object.
    pub fn import_json<R: Read>(&self, reader: R) -> Result<usize, QueryMapError> {
        let mut reader = BufReader::new(reader);
        let mut buf = String::new();
        let mut docs = Vec::new();
        let mut ndjson = false;
        let mut line_no = 0usize;
        loop {
            buf.clear();
            if reader.read_line(&mut buf)? == 0 {
                break;
            }
            line_no += 1;
            let line = buf.trim();
            if line.is_empty() {
                continue;
            }
            if !ndjson && line.starts_with('[') {
                let mut rest = String::new();
                reader.read_to_string(&mut rest)?;
                let all = format!("{line}\n{rest}");
                let val: serde_json::Value = serde_json::from_str(&all)?;
                let items = val
                    .as_array()
                    .ok_or_else(|| QueryMapError::InvalidInput("expected JSON array".into()))?;
                for v in items {
                    docs.push(json_to_document(v)?);
                }
                break;
            }
            ndjson = true;
            let v: serde_json::Value = serde_json::from_str(line).map_err(|e| {
                QueryMapError::InvalidInput(format!("line {line_no}: {e}"))
            })?;
            docs.push(json_to_document(&v)?);
        }
        Ok(self.insert_many(docs))
    }

    fn snapshot_matching(&self, filter: &super::types::Filter) -> Vec<Document> {
        self.inner.docs.read().iter().filter(|d| eval_filter(d, filter)).cloned().collect()
    }
}

fn json_to_document(v: &serde_json::Value) -> Result<Document, QueryMapError> {
    if !v.is_object() {
        return Err(QueryMapError::InvalidInput("expected JSON object".into()));
    }
    bson::serialize_to_document(v).map_err(|e| QueryMapError::InvalidInput(e.to_string()))
}

impl FindTarget for MemoryCollection {
    type Query = MemoryQuery;

    fn find(&self, filter: Document, projection: Option<Document>) -> MemoryQuery {
        MemoryQuery {
            collection: self.clone(),
            filter,
            projection,
            limit: None,
            skip: 0,
            sort: None,
        }
    }
}

/// Chainable find builder over a [`MemoryCollection`].
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    collection: MemoryCollection,
    filter: Document,
    projection: Option<Document>,
    limit: Option<i64>,
    skip: u64,
    sort: Option<Document>,
}

impl MemoryQuery {
    pub fn filter(&self) -> &Document {
        &self.filter
    }

    pub fn projection(&self) -> Option<&Document> {
        self.projection.as_ref()
    }

    /// Replace the projection.
    #[must_use]
    pub fn select(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Replace the projection from a select string such as `"age -name"`.
    #[must_use]
    pub fn select_fields(self, fields: &str) -> Self {
        self.select(parse_select(fields))
    }

    /// Execute and collect into a vector.
    ///
    /// # Errors
    /// See [`FindQuery::exec`].
    pub fn to_vec(self) -> Result<Vec<Document>, QueryMapError> {
        Ok(self.exec()?.to_vec())
    }
}

impl FindQuery for MemoryQuery {
    type Output = Cursor;
    type Error = QueryMapError;

    fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    fn exec(self) -> Result<Cursor, QueryMapError> {
        let text_fields = self.collection.text_fields();
        let filter = parse_filter(&self.filter, &text_fields)?;
        let projection = match &self.projection {
            Some(p) => parse_projection(p)?,
            None => None,
        };

        let mut docs = self.collection.snapshot_matching(&filter);

        if let Some(sort) = &self.sort {
            let mut keys = parse_sort(&Bson::Document(sort.clone()), ":");
            if keys.len() > MAX_SORT_FIELDS {
                log::warn!("sort spec too long: {}; using first {MAX_SORT_FIELDS}", keys.len());
                keys.truncate(MAX_SORT_FIELDS);
            }
            // stable: ties keep insertion order
            docs.sort_by(|a, b| compare_docs(a, b, &keys));
        }

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        // 0 means no limit; a negative limit behaves like its absolute value
        let limit = match self.limit.map(i64::unsigned_abs) {
            None | Some(0) => usize::MAX,
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
        };
        let mut docs: Vec<Document> = docs.into_iter().skip(skip).take(limit).collect();

        if let Some(p) = &projection {
            for d in &mut docs {
                *d = project(d, p);
            }
        }
        log::debug!(
            "collection {}: find matched {} docs (skip={}, limit={:?})",
            self.collection.name(),
            docs.len(),
            self.skip,
            self.limit
        );
        Ok(Cursor::new(docs))
    }
}

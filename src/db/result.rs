//! Cursor draining and typed decoding.
//!
//! Queries return a [`ManyResult`]: the cursor (or the error that prevented opening it),
//! consumed exactly once by one of the decode entry points. The element type is chosen
//! at the call site:
//!
//! ```ignore
//! let orders: Vec<Order> = coll.find_many(doc! {}, None).await.all().await?;
//! let boxed: Vec<Box<Order>> = coll.find_many(doc! {}, None).await.all_boxed().await?;
//! ```
//!
//! Documents are pulled raw and decoded here, so a document that does not fit `T`
//! ([`NosqlError::Decode`]) is distinguishable from a failing cursor ([`NosqlError::Cursor`]).
//! Any failure aborts the whole decode; there is no partial result.

use crate::error::{NosqlError, NosqlResult};
use bson::{Document, RawDocumentBuf};
use futures_util::{Stream, StreamExt};
use mongodb::Cursor;
use mongodb::options::{AggregateOptions, FindOptions};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::pin;
use tracing::debug;

/// Anything that can run a find and hand back a raw cursor.
pub trait Finder {
    fn find_raw(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> impl Future<Output = mongodb::error::Result<Cursor<RawDocumentBuf>>> + Send;
}

/// Anything that can run an aggregation pipeline and hand back a raw cursor.
pub trait Aggregater {
    fn aggregate_raw(
        &self,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> impl Future<Output = mongodb::error::Result<Cursor<RawDocumentBuf>>> + Send;
}

impl<T> Finder for mongodb::Collection<T>
where
    T: Send + Sync,
{
    fn find_raw(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> impl Future<Output = mongodb::error::Result<Cursor<RawDocumentBuf>>> + Send {
        let raw = self.clone_with_type::<RawDocumentBuf>();
        async move { raw.find(filter).with_options(options).await }
    }
}

impl<T> Aggregater for mongodb::Collection<T>
where
    T: Send + Sync,
{
    fn aggregate_raw(
        &self,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> impl Future<Output = mongodb::error::Result<Cursor<RawDocumentBuf>>> + Send {
        let raw = self.clone_with_type::<RawDocumentBuf>();
        async move {
            raw.aggregate(pipeline)
                .with_options(options)
                .with_type::<RawDocumentBuf>()
                .await
        }
    }
}

/// Find all documents matching `filter`.
///
/// Any driver collection conforms to [`Finder`].
pub async fn find_many<F>(
    finder: &F,
    filter: Document,
    options: impl Into<Option<FindOptions>>,
) -> ManyResult
where
    F: Finder,
{
    ManyResult::new(finder.find_raw(filter, options.into()).await)
}

/// Run an aggregation pipeline.
///
/// Any driver collection conforms to [`Aggregater`].
pub async fn aggregate_many<A>(
    aggregater: &A,
    pipeline: Vec<Document>,
    options: impl Into<Option<AggregateOptions>>,
) -> ManyResult
where
    A: Aggregater,
{
    ManyResult::new(aggregater.aggregate_raw(pipeline, options.into()).await)
}

/// Pending result of a query: an open cursor or the error that prevented it.
pub struct ManyResult {
    cursor: NosqlResult<Cursor<RawDocumentBuf>>,
}

impl std::fmt::Debug for ManyResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManyResult")
            .field("cursor_open", &self.cursor.is_ok())
            .field("error", &self.err())
            .finish()
    }
}

impl ManyResult {
    pub fn new(cursor: mongodb::error::Result<Cursor<RawDocumentBuf>>) -> Self {
        Self {
            cursor: cursor.map_err(NosqlError::from),
        }
    }

    /// The query error, if opening the cursor failed.
    pub fn err(&self) -> Option<&NosqlError> {
        self.cursor.as_ref().err()
    }

    /// The underlying cursor, for callers that want to stream.
    pub fn into_cursor(self) -> NosqlResult<Cursor<RawDocumentBuf>> {
        self.cursor
    }

    /// Decode every document into `T`.
    pub async fn all<T>(self) -> NosqlResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        decode_all(self.cursor?).await
    }

    /// Decode every document into a freshly boxed `T`.
    pub async fn all_boxed<T>(self) -> NosqlResult<Vec<Box<T>>>
    where
        T: DeserializeOwned,
    {
        decode_all_boxed(self.cursor?).await
    }

    /// Decode into `dest`, replacing its contents only on success.
    pub async fn all_into<T>(self, dest: &mut Vec<T>) -> NosqlResult<()>
    where
        T: DeserializeOwned,
    {
        decode_into(self.cursor?, dest).await
    }

    /// Boxed counterpart of [`ManyResult::all_into`].
    pub async fn all_boxed_into<T>(self, dest: &mut Vec<Box<T>>) -> NosqlResult<()>
    where
        T: DeserializeOwned,
    {
        *dest = decode_all_boxed(self.cursor?).await?;
        Ok(())
    }
}

/// Drain `docs`, decoding each document into `T`.
///
/// An exhausted stream with no documents yields an empty vector.
pub async fn decode_all<T, S>(docs: S) -> NosqlResult<Vec<T>>
where
    T: DeserializeOwned,
    S: Stream<Item = mongodb::error::Result<RawDocumentBuf>>,
{
    collect_with(docs, |record| record).await
}

/// Drain `docs`, decoding each document into a boxed `T`.
pub async fn decode_all_boxed<T, S>(docs: S) -> NosqlResult<Vec<Box<T>>>
where
    T: DeserializeOwned,
    S: Stream<Item = mongodb::error::Result<RawDocumentBuf>>,
{
    collect_with(docs, Box::new).await
}

/// Drain `docs` into `dest`. On error `dest` is left untouched.
pub async fn decode_into<T, S>(docs: S, dest: &mut Vec<T>) -> NosqlResult<()>
where
    T: DeserializeOwned,
    S: Stream<Item = mongodb::error::Result<RawDocumentBuf>>,
{
    *dest = decode_all(docs).await?;
    Ok(())
}

async fn collect_with<T, E, S, F>(docs: S, wrap: F) -> NosqlResult<Vec<E>>
where
    T: DeserializeOwned,
    S: Stream<Item = mongodb::error::Result<RawDocumentBuf>>,
    F: Fn(T) -> E,
{
    let mut docs = pin!(docs);
    let mut records = Vec::new();

    while let Some(doc) = docs.next().await {
        let raw = doc.map_err(|e| NosqlError::cursor(e.to_string()))?;
        let record: T = bson::from_slice(raw.as_bytes())
            .map_err(|e| NosqlError::decode(records.len(), e.to_string()))?;
        records.push(wrap(record));
    }

    debug!(count = records.len(), "Decoded documents");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures::stream;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        name: String,
        qty: i32,
    }

    fn raw(doc: Document) -> mongodb::error::Result<RawDocumentBuf> {
        Ok(RawDocumentBuf::from_document(&doc).unwrap())
    }

    fn items() -> Vec<mongodb::error::Result<RawDocumentBuf>> {
        vec![
            raw(doc! { "_id": 1, "name": "apple", "qty": 3 }),
            raw(doc! { "_id": 2, "name": "pear", "qty": 5 }),
        ]
    }

    #[tokio::test]
    async fn test_empty_cursor_yields_empty_vec() {
        let docs = stream::iter(Vec::<mongodb::error::Result<RawDocumentBuf>>::new());
        let result: Vec<Item> = decode_all(docs).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_decode_values_in_order() {
        let result: Vec<Item> = decode_all(stream::iter(items())).await.unwrap();
        assert_eq!(
            result,
            vec![
                Item {
                    name: "apple".to_string(),
                    qty: 3
                },
                Item {
                    name: "pear".to_string(),
                    qty: 5
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_decode_boxed() {
        let result: Vec<Box<Item>> = decode_all_boxed(stream::iter(items())).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].name, "pear");
    }

    #[tokio::test]
    async fn test_decode_as_documents() {
        let result: Vec<Document> = decode_all(stream::iter(items())).await.unwrap();
        assert_eq!(result[0].get_str("name").unwrap(), "apple");
    }

    #[tokio::test]
    async fn test_decode_failure_reports_index() {
        let docs = vec![
            raw(doc! { "name": "apple", "qty": 3 }),
            raw(doc! { "name": "pear" }),
            raw(doc! { "name": "plum", "qty": 1 }),
        ];
        let err = decode_all::<Item, _>(stream::iter(docs)).await.unwrap_err();
        assert!(matches!(err, NosqlError::Decode { index: 1, .. }));
    }

    #[tokio::test]
    async fn test_cursor_failure_surfaces() {
        let mut docs = items();
        docs.push(Err(mongodb::error::Error::custom("cursor killed")));
        let err = decode_all::<Item, _>(stream::iter(docs)).await.unwrap_err();
        assert!(matches!(err, NosqlError::Cursor { .. }));
    }

    #[tokio::test]
    async fn test_decode_into_replaces_on_success() {
        let mut dest = vec![Item {
            name: "stale".to_string(),
            qty: 0,
        }];
        decode_into(stream::iter(items()), &mut dest).await.unwrap();
        assert_eq!(dest.len(), 2);
        assert_eq!(dest[0].name, "apple");
    }

    #[tokio::test]
    async fn test_decode_into_leaves_dest_on_failure() {
        let mut dest = vec![Item {
            name: "kept".to_string(),
            qty: 7,
        }];
        let docs = vec![
            raw(doc! { "name": "apple", "qty": 3 }),
            raw(doc! { "name": 42 }),
        ];
        assert!(decode_into(stream::iter(docs), &mut dest).await.is_err());
        assert_eq!(
            dest,
            vec![Item {
                name: "kept".to_string(),
                qty: 7
            }]
        );
    }

    #[tokio::test]
    async fn test_many_result_query_error() {
        let result = ManyResult::new(Err(mongodb::error::Error::custom("find failed")));
        assert!(result.err().is_some());

        let mut dest: Vec<Item> = Vec::new();
        assert!(result.all_into(&mut dest).await.is_err());
        assert!(dest.is_empty());
    }
}

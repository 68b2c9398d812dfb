//! Thin wrappers around driver database and collection handles.

use crate::db::result::{self, Aggregater, Finder, ManyResult};
use bson::{Document, RawDocumentBuf};
use mongodb::options::{AggregateOptions, CollectionOptions, FindOptions};
use mongodb::{Client, Cursor};
use std::future::Future;

/// Database handle bound to the client that opened it.
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    inner: mongodb::Database,
}

impl Database {
    pub fn new(client: Client, inner: mongodb::Database) -> Self {
        Self { client, inner }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The driver client; shared by every handle opened through it.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The underlying driver database.
    pub fn inner(&self) -> &mongodb::Database {
        &self.inner
    }

    /// Get a typed collection handle.
    pub fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync,
    {
        Collection::new(self.inner.collection(name))
    }

    pub fn collection_with_options<T>(&self, name: &str, options: CollectionOptions) -> Collection<T>
    where
        T: Send + Sync,
    {
        Collection::new(self.inner.collection_with_options(name, options))
    }
}

/// Collection handle with cursor-draining query helpers.
pub struct Collection<T>
where
    T: Send + Sync,
{
    inner: mongodb::Collection<T>,
}

impl<T> Collection<T>
where
    T: Send + Sync,
{
    pub fn new(inner: mongodb::Collection<T>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Get the underlying collection for advanced operations
    pub fn inner(&self) -> &mongodb::Collection<T> {
        &self.inner
    }

    pub fn into_inner(self) -> mongodb::Collection<T> {
        self.inner
    }

    /// Find all documents that match the filter and options.
    pub async fn find_many(
        &self,
        filter: Document,
        options: impl Into<Option<FindOptions>>,
    ) -> ManyResult {
        result::find_many(&self.inner, filter, options).await
    }

    /// Run an aggregation pipeline against the collection.
    pub async fn aggregate_many(
        &self,
        pipeline: Vec<Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> ManyResult {
        result::aggregate_many(&self.inner, pipeline, options).await
    }
}

impl<T> Clone for Collection<T>
where
    T: Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Collection<T>
where
    T: Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("namespace", &self.inner.namespace().to_string())
            .finish()
    }
}

impl<T> Finder for Collection<T>
where
    T: Send + Sync,
{
    fn find_raw(
        &self,
        filter: Document,
        options: Option<FindOptions>,
    ) -> impl Future<Output = mongodb::error::Result<Cursor<RawDocumentBuf>>> + Send {
        self.inner.find_raw(filter, options)
    }
}

impl<T> Aggregater for Collection<T>
where
    T: Send + Sync,
{
    fn aggregate_raw(
        &self,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> impl Future<Output = mongodb::error::Result<Cursor<RawDocumentBuf>>> + Send {
        self.inner.aggregate_raw(pipeline, options)
    }
}

//! MongoDB client and typed collection wrapper
//!
//! Collections declare their own indexes through `IntoIndexes`; they are
//! applied once when the collection handle is built at startup.

use bson::{doc, DateTime, Document};
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, ClientSession, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::db::schemas::Metadata;
use crate::types::CheckpointError;

/// MongoDB server error code for unique index violations
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// Whether a driver error is a unique index violation
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn map_insert_error(err: mongodb::error::Error) -> CheckpointError {
    if is_duplicate_key(&err) {
        CheckpointError::Conflict("Document already exists".into())
    } else {
        CheckpointError::Database(format!("Insert failed: {}", err))
    }
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping once
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, CheckpointError> {
        // Fail fast on unreachable servers instead of waiting for the driver default
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| CheckpointError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| CheckpointError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Connect with a bounded number of attempts and a fixed pause between them.
    ///
    /// This is the only retry loop in the service.
    pub async fn connect_with_retry(
        uri: &str,
        db_name: &str,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Self, CheckpointError> {
        let attempts = attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match Self::new(uri, db_name).await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Waiting for MongoDB");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CheckpointError::Database("MongoDB connection was never attempted".into())
        }))
    }

    /// Get a typed collection, applying its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, CheckpointError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Open a client session with a started transaction
    pub async fn start_transaction(&self) -> Result<ClientSession, CheckpointError> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        Ok(session)
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, CheckpointError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<(), CheckpointError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| CheckpointError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    fn stamp(item: &mut T) {
        let metadata = item.mut_metadata();
        let now = DateTime::now();
        if metadata.created_at.is_none() {
            metadata.created_at = Some(now);
        }
        metadata.updated_at = Some(now);
    }

    /// Insert a document, setting metadata timestamps.
    /// Unique index violations surface as `Conflict`.
    pub async fn insert_one(&self, mut item: T) -> Result<(), CheckpointError> {
        Self::stamp(&mut item);
        self.inner.insert_one(item).await.map_err(map_insert_error)?;
        Ok(())
    }

    /// Insert a document inside a transaction
    pub async fn insert_one_in(
        &self,
        mut item: T,
        session: &mut ClientSession,
    ) -> Result<(), CheckpointError> {
        Self::stamp(&mut item);
        self.inner
            .insert_one(item)
            .session(session)
            .await
            .map_err(map_insert_error)?;
        Ok(())
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, CheckpointError> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| CheckpointError::Database(format!("Find failed: {}", e)))
    }

    /// Find many documents by filter, optionally sorted and limited
    pub async fn find_many(
        &self,
        filter: Document,
        sort: Option<Document>,
        limit: Option<i64>,
    ) -> Result<Vec<T>, CheckpointError> {
        use futures_util::StreamExt;

        let mut find = self.inner.find(filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        if let Some(limit) = limit {
            find = find.limit(limit);
        }

        let cursor = find
            .await
            .map_err(|e| CheckpointError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    /// Run an aggregation pipeline and decode each output document as `T`
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<T>, CheckpointError> {
        use futures_util::TryStreamExt;

        let cursor = self
            .inner
            .aggregate(pipeline)
            .await
            .map_err(|e| CheckpointError::Database(format!("Aggregate failed: {}", e)))?;

        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| CheckpointError::Database(format!("Aggregate failed: {}", e)))?;

        documents
            .into_iter()
            .map(|d| bson::from_document(d).map_err(CheckpointError::from))
            .collect()
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, CheckpointError> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| CheckpointError::Database(format!("Update failed: {}", e)))
    }

    /// Update one document inside a transaction
    pub async fn update_one_in(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        session: &mut ClientSession,
    ) -> Result<UpdateResult, CheckpointError> {
        self.inner
            .update_one(filter, update.into())
            .session(session)
            .await
            .map_err(|e| CheckpointError::Database(format!("Update failed: {}", e)))
    }

    /// Get the underlying collection for advanced operations
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}


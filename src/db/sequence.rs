//! Atomic sequence numbers backed by the `counters` collection.
//!
//! Each counter is a `{id, seq}` document. Increments go through a single
//! find-one-and-update round trip with upsert, so values handed out for one id are
//! strictly increasing and never reused, across tasks and processes alike.
//! `id` must be uniquely indexed (see [`Database::ensure_counter_index`]); without
//! the index two concurrent upserts of a brand-new counter can create duplicates.

use crate::db::database::Database;
use crate::error::{NosqlError, NosqlResult};
use bson::{Bson, doc};
use mongodb::IndexModel;
use mongodb::options::{IndexOptions, ReturnDocument};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

pub const SEQUENCE_COLLECTION: &str = "counters";
const COUNTER_INDEX_NAME: &str = "id_unique";

/// Persisted counter record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub id: String,
    /// Stored as Int64 by this crate; Int32 and whole-number Double (as written by the
    /// shell) are read too.
    #[serde(deserialize_with = "deserialize_seq")]
    pub seq: i64,
}

fn deserialize_seq<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Bson::deserialize(deserializer)? {
        Bson::Int32(v) => Ok(i64::from(v)),
        Bson::Int64(v) => Ok(v),
        Bson::Double(v) if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 => {
            Ok(v as i64)
        }
        other => Err(D::Error::custom(format!(
            "counter seq must be an integer, got {}",
            other
        ))),
    }
}

impl Database {
    fn counters(&self) -> mongodb::Collection<Counter> {
        self.inner().collection(SEQUENCE_COLLECTION)
    }

    /// Return the next value of `id_name`, starting at 1 for a new counter.
    pub async fn next_sequence(&self, id_name: &str) -> NosqlResult<i64> {
        self.increment(id_name, 1).await
    }

    /// Reserve `size` consecutive values of `id_name` and return the first one.
    pub async fn next_sequence_range(&self, id_name: &str, size: i64) -> NosqlResult<i64> {
        if size < 1 {
            return Err(NosqlError::invalid_input(format!(
                "sequence range size must be at least 1, got {}",
                size
            )));
        }
        let last = self.increment(id_name, size).await?;
        Ok(range_start(last, size))
    }

    /// Set the last used value of `id_name`. Meant for data migration only; not safe
    /// to run while other callers are drawing values.
    pub async fn init_sequence(&self, id_name: &str, value: i64) -> NosqlResult<()> {
        self.counters()
            .update_one(doc! { "id": id_name }, doc! { "$set": { "seq": value } })
            .upsert(true)
            .await?;

        info!(counter = %id_name, value, "Sequence initialized");
        Ok(())
    }

    /// Create the unique index on `counters.id`. Idempotent.
    pub async fn ensure_counter_index(&self) -> NosqlResult<()> {
        let index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name(COUNTER_INDEX_NAME.to_string())
                    .build(),
            )
            .build();

        self.counters().create_index(index).await?;
        debug!(database = %self.name(), "Counter index ensured");
        Ok(())
    }

    async fn increment(&self, id_name: &str, by: i64) -> NosqlResult<i64> {
        let counter = self
            .counters()
            .find_one_and_update(doc! { "id": id_name }, doc! { "$inc": { "seq": by } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| {
                NosqlError::database(format!("counter '{}' missing after upsert", id_name))
            })?;

        debug!(counter = %id_name, by, seq = counter.seq, "Sequence advanced");
        Ok(counter.seq)
    }
}

/// First value of a block of `size` values ending at `last`.
fn range_start(last: i64, size: i64) -> i64 {
    last - size + 1
}

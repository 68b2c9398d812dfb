//! Integration tests for cursor decoding and the connection pool.
//!
//! Set TEST_MONGODB_URI to run these tests.
//! Example: TEST_MONGODB_URI="mongodb://localhost:27017/nosql_test"

use bson::{Document, doc};
use mongo_nosql::config::{ClientDefaults, MapSource};
use mongo_nosql::db::{Collection, DatabasePool, find_many};
use mongo_nosql::error::NosqlError;
use mongodb::options::FindOptions;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Product {
    sku: String,
    price: i64,
}

#[derive(Debug, Deserialize)]
struct WrongShape {
    #[allow(dead_code)]
    sku: i64,
}

fn collection_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("products_{}", suffix)
}

fn test_pool() -> Option<DatabasePool> {
    let uri = match std::env::var("TEST_MONGODB_URI") {
        Ok(uri) => uri,
        Err(_) => {
            eprintln!("Skipping test: TEST_MONGODB_URI not set");
            return None;
        }
    };

    let source = MapSource::new().with("mongodb", "test", uri);
    Some(DatabasePool::open(Arc::new(source), ClientDefaults::default()))
}

async fn seeded(pool: &DatabasePool) -> Collection<Product> {
    let db = pool.get("test").await.unwrap();
    let products = db.collection::<Product>(&collection_name());
    products
        .inner()
        .insert_many(vec![
            Product {
                sku: "a-1".to_string(),
                price: 300,
            },
            Product {
                sku: "b-2".to_string(),
                price: 100,
            },
            Product {
                sku: "c-3".to_string(),
                price: 200,
            },
        ])
        .await
        .unwrap();
    products
}

#[tokio::test]
async fn test_find_many_values_and_boxed() {
    let Some(pool) = test_pool() else {
        return;
    };
    let products = seeded(&pool).await;

    let options = FindOptions::builder().sort(doc! { "price": 1 }).build();
    let values: Vec<Product> = products
        .find_many(doc! {}, options.clone())
        .await
        .all()
        .await
        .unwrap();
    assert_eq!(
        values.iter().map(|p| p.price).collect::<Vec<_>>(),
        vec![100, 200, 300]
    );

    let boxed: Vec<Box<Product>> = products
        .find_many(doc! {}, options)
        .await
        .all_boxed()
        .await
        .unwrap();
    assert_eq!(boxed.len(), 3);
    assert_eq!(boxed[0].sku, "b-2");

    products.inner().drop().await.unwrap();
    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_find_many_no_match_is_empty() {
    let Some(pool) = test_pool() else {
        return;
    };
    let products = seeded(&pool).await;

    let mut dest = vec![Product {
        sku: "stale".to_string(),
        price: 0,
    }];
    find_many(products.inner(), doc! { "sku": "missing" }, None::<FindOptions>)
        .await
        .all_into(&mut dest)
        .await
        .unwrap();
    assert!(dest.is_empty());

    products.inner().drop().await.unwrap();
    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_decode_failure_leaves_destination() {
    let Some(pool) = test_pool() else {
        return;
    };
    let products = seeded(&pool).await;

    let mut dest: Vec<WrongShape> = Vec::new();
    let err = products
        .find_many(doc! {}, None::<FindOptions>)
        .await
        .all_into(&mut dest)
        .await
        .unwrap_err();
    assert!(matches!(err, NosqlError::Decode { index: 0, .. }));
    assert!(dest.is_empty());

    products.inner().drop().await.unwrap();
    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_aggregate_many() {
    let Some(pool) = test_pool() else {
        return;
    };
    let products = seeded(&pool).await;

    let pipeline = vec![
        doc! { "$match": { "price": { "$gte": 200 } } },
        doc! { "$group": { "_id": null, "total": { "$sum": "$price" } } },
    ];
    let totals: Vec<Document> = products
        .aggregate_many(pipeline, None)
        .await
        .all()
        .await
        .unwrap();
    assert_eq!(totals.len(), 1);
    assert_eq!(totals[0].get_i64("total").unwrap(), 500);

    products.inner().drop().await.unwrap();
    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_pool_reuses_and_closes() {
    let Some(pool) = test_pool() else {
        return;
    };

    let first = pool.get("test").await.unwrap();
    let second = pool.get("test").await.unwrap();
    assert_eq!(first.name(), second.name());
    assert_eq!(pool.len().await, 1);

    pool.close().await.unwrap();
    assert!(pool.is_empty().await);
}

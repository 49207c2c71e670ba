use chrono::NaiveDate;
use tempfile::TempDir;

use incident_rag::config::{parse_config, Config};
use incident_rag::db;
use incident_rag::migrate;
use incident_rag::models::{ContentType, Entity, NewEmbedding, NewIncident};
use incident_rag::store::sqlite::SqliteStore;
use incident_rag::store::{RecordStore, SimilarityQuery};

fn test_config(tmp: &TempDir) -> Config {
    let content = format!(
        "[db]\npath = \"{}\"\n",
        tmp.path().join("data/irag.sqlite").display()
    );
    parse_config(&content).unwrap()
}

async fn open_store(tmp: &TempDir) -> SqliteStore {
    let config = test_config(tmp);
    migrate::run_migrations(&config).await.unwrap();
    // Running twice must be harmless.
    migrate::run_migrations(&config).await.unwrap();
    SqliteStore::new(db::connect(&config).await.unwrap())
}

fn incident(number: &str, product: &str, created_on: Option<NaiveDate>) -> NewIncident {
    NewIncident {
        incident_number: number.to_string(),
        product: product.to_string(),
        description: format!("{} description", number),
        closing_notes: Some("restarted service".to_string()),
        resolution_tier_1: Some("Software".to_string()),
        resolution_tier_2: None,
        resolution_tier_3: None,
        problem_id: None,
        created_on,
        created_by: Some("amy".to_string()),
        priority: Some(4),
    }
}

fn embedding(content_type: ContentType, vector: Vec<f32>) -> NewEmbedding {
    NewEmbedding {
        content_type,
        content_text: format!("{} text", content_type),
        vector,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_incident_number_is_unique() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    assert!(!store.exists("INC1").await.unwrap());
    store
        .insert_incident(&incident("INC1", "Billing", None))
        .await
        .unwrap();
    assert!(store.exists("INC1").await.unwrap());

    let err = store
        .insert_incident(&incident("INC1", "Billing", None))
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("UNIQUE"));
    assert_eq!(store.count(Entity::Incidents).await.unwrap(), 1);
}

#[tokio::test]
async fn test_persist_rolls_back_on_failure() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .persist_incident(
            &incident("INC1", "Billing", None),
            &[embedding(ContentType::Description, vec![1.0, 0.0])],
        )
        .await
        .unwrap();
    assert!(store
        .persist_incident(
            &incident("INC1", "Billing", None),
            &[embedding(ContentType::Combined, vec![0.0, 1.0])],
        )
        .await
        .is_err());

    assert_eq!(store.count(Entity::Incidents).await.unwrap(), 1);
    assert_eq!(store.count(Entity::Embeddings).await.unwrap(), 1);
}

#[tokio::test]
async fn test_deleting_incident_cascades_to_embeddings() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    let id = store
        .persist_incident(
            &incident("INC1", "Billing", None),
            &[
                embedding(ContentType::Description, vec![1.0, 0.0]),
                embedding(ContentType::Combined, vec![0.5, 0.5]),
            ],
        )
        .await
        .unwrap();
    assert_eq!(store.count(Entity::Embeddings).await.unwrap(), 2);

    sqlx::query("DELETE FROM incidents WHERE id = ?")
        .bind(id)
        .execute(store.pool())
        .await
        .unwrap();
    assert_eq!(store.count(Entity::Embeddings).await.unwrap(), 0);
}

#[tokio::test]
async fn test_similarity_search_ordering_and_filters() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .persist_incident(
            &incident("INC1", "Billing Portal", None),
            &[
                embedding(ContentType::Description, vec![1.0, 0.0, 0.0]),
                embedding(ContentType::Combined, vec![0.6, 0.8, 0.0]),
            ],
        )
        .await
        .unwrap();
    store
        .persist_incident(
            &incident("INC2", "Payroll", None),
            &[
                embedding(ContentType::Description, vec![0.8, 0.6, 0.0]),
                embedding(ContentType::Resolution, vec![0.0, 0.0, 1.0]),
            ],
        )
        .await
        .unwrap();

    let query = SimilarityQuery {
        vector: &[1.0, 0.0, 0.0],
        content_type: None,
        product_filter: None,
        threshold: 0.5,
        limit: 10,
    };

    let all = store.similarity_search(&query).await.unwrap();
    let ranked: Vec<(&str, ContentType)> = all
        .iter()
        .map(|m| (m.incident.incident_number.as_str(), m.content_type))
        .collect();
    assert_eq!(
        ranked,
        vec![
            ("INC1", ContentType::Description),
            ("INC2", ContentType::Description),
            ("INC1", ContentType::Combined),
        ]
    );
    assert!(all[0].similarity_score > 0.99);
    assert_eq!(all[0].incident.product, "Billing Portal");
    assert_eq!(all[0].incident.priority, Some(4));

    let limited = store
        .similarity_search(&SimilarityQuery {
            limit: 1,
            ..query.clone()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);

    let filtered = store
        .similarity_search(&SimilarityQuery {
            content_type: Some(ContentType::Description),
            product_filter: Some("portal"),
            ..query.clone()
        })
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].incident.incident_number, "INC1");

    // Vectors of another dimension never match.
    let other_dims = store
        .similarity_search(&SimilarityQuery {
            vector: &[1.0, 0.0],
            ..query
        })
        .await
        .unwrap();
    assert!(other_dims.is_empty());
}

#[tokio::test]
async fn test_incidents_created_between() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    for (number, created_on) in [
        ("INC1", Some(date(2024, 6, 1))),
        ("INC2", Some(date(2024, 6, 9))),
        ("INC3", Some(date(2024, 5, 20))),
        ("INC4", None),
        ("INC5", Some(date(2024, 6, 12))),
    ] {
        store
            .insert_incident(&incident(number, "Billing", created_on))
            .await
            .unwrap();
    }

    let found = store
        .incidents_created_between(date(2024, 6, 1), date(2024, 6, 10))
        .await
        .unwrap();
    let numbers: Vec<&str> = found.iter().map(|i| i.incident_number.as_str()).collect();
    assert_eq!(numbers, vec!["INC2", "INC1"]);
    assert_eq!(found[1].created_on, Some(date(2024, 6, 1)));
    assert_eq!(found[1].closing_notes.as_deref(), Some("restarted service"));
}

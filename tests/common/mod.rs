//! Shared helpers for the end-to-end suites

#![allow(dead_code)]

use quarry::{Document, MockGenerator, QaPipeline, SqliteIndex, OpenIndex, TestCase};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const PRICING: &str = "# Pricing\n\nApply discount code SAVE15 at checkout for 15% off the order total.";
pub const SHIPPING: &str = "Orders ship within two business days. Tracking numbers arrive by email.";

/// A well-formed test case response citing `pricing.md`.
pub const PRICING_CASES: &str = r#"```json
[
  {"test_id": "TC-001", "feature": "Discount Code", "scenario": "Apply SAVE15 at checkout", "expected_result": "Order total drops by 15%", "grounded_in": "pricing.md"},
  {"test_id": "TC-002", "feature": "Discount Code", "scenario": "Apply an unknown code", "expected_result": "An invalid code message is shown", "grounded_in": "pricing.md"}
]
```"#;

pub fn pricing_docs() -> Vec<Document> {
    vec![
        Document::new("pricing.md", PRICING),
        Document::new("shipping.txt", SHIPPING),
    ]
}

/// In-memory pipeline answering from `mock`.
pub fn memory_pipeline(mock: &Arc<MockGenerator>) -> QaPipeline {
    QaPipeline::builder()
        .generator(mock.clone())
        .build()
        .expect("pipeline builds")
}

/// In-memory pipeline with a short generation timeout.
pub fn pipeline_with_timeout(mock: &Arc<MockGenerator>, timeout: Duration) -> QaPipeline {
    QaPipeline::builder()
        .generator(mock.clone())
        .timeout(timeout)
        .build()
        .expect("pipeline builds")
}

/// Pipeline backed by a SQLite file at `db`.
pub fn sqlite_pipeline(db: &Path, collection: &str, mock: &Arc<MockGenerator>) -> QaPipeline {
    let index = SqliteIndex::open(db, collection).expect("open sqlite index");
    QaPipeline::builder()
        .index(Arc::new(index))
        .generator(mock.clone())
        .collection(collection)
        .build()
        .expect("pipeline builds")
}

pub fn discount_case() -> TestCase {
    TestCase {
        test_id: "TC-001".into(),
        feature: "Discount Code".into(),
        scenario: "Apply SAVE15 at checkout".into(),
        expected_result: "Order total drops by 15%".into(),
        grounded_in: Some("pricing.md".into()),
    }
}

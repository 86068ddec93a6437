// Infrastructure layer - 基础设施层
// 负责外部服务的访问：Firestore REST、指标导出

pub mod firestore;
pub mod firestore_value;
pub mod metrics;

pub use firestore::{FirestoreClient, DEFAULT_DATABASE_ID, FIRESTORE_BASE_URL};
pub use firestore_value::{decode_fields, decode_value, FirestoreDocument};

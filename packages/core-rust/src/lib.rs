//! `Orbit` Core — condition model, schema metadata, and query planning.

pub mod conditions;
pub mod plan;
pub mod schema;
pub mod types;

pub use conditions::{Condition, ConditionValue, Conditions, FieldIdentifier, Operator};
pub use plan::{IteratorType, PlanError, ProxyCondition, ProxyQuery, SelectRequest};
pub use schema::{FieldMetadata, IndexMetadata, IndexPartMetadata, SchemaSnapshot, SpaceMetadata};
pub use types::{FieldValue, Tuple};

pub mod dynamodb;
pub mod model;
pub mod store;

pub use dynamodb::DynamoDbJobStore;
pub use model::{JobRecord, JobUpdate};
pub use store::{InMemoryJobStore, JobStore, StoreError};

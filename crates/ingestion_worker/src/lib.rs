pub mod clickhouse;
pub mod domain;
pub mod health;
pub mod ingestion_worker;
pub mod mqtt;
pub mod nats;

pub use ingestion_worker::*;

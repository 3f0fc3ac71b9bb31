pub mod catalog;
pub mod ingest;
pub mod notify;
pub mod probe;
pub mod store;
pub mod videos;

pub mod in_memory;
pub mod notifications;
pub mod realtime;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod stripe;

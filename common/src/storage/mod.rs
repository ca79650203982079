pub mod db;
#[cfg(any(test, feature = "test-utils"))]
pub mod flaky_store;
pub mod store;
pub mod types;

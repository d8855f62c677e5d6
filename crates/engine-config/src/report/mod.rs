pub mod reconcile;
pub mod summary;

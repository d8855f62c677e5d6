pub mod barrier;
pub mod coordinator;
pub mod destinations;
pub mod error;
pub mod pool;
pub mod reconciler;
pub mod scheduler;

#[cfg(test)]
mod tests;

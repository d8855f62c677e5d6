mod common;
mod coordinator;
mod pool;
mod reconciler;

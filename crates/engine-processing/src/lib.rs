pub mod cb;
pub mod chunk;
pub mod client;
pub mod error;
pub mod identity;
pub mod retry;
pub mod transform;

pub mod chunk;
pub mod feed;
pub mod product;

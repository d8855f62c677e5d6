#![allow(dead_code)]

pub mod resilience;
pub mod utils;

pub mod document;
pub mod error;
pub mod interpolate;
pub mod report;
pub mod settings;
pub mod validation;

//! Input layer - documents and the bundles they arrive in

pub mod bundle;
pub mod document;

pub use bundle::Bundle;
pub use document::{Document, Fields, Value};

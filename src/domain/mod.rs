// Domain layer - Data model shared by every other layer
pub mod card;
pub mod dashboard;
pub mod dataset;
pub mod error;
pub mod payload;
pub mod rules;
pub mod source;
pub mod table;

// Application layer - Use cases over the domain model
pub mod cache_layer;
pub mod card_binding;
pub mod composer;
pub mod normalizer;
pub mod source_adapter;
pub mod streaming_service;

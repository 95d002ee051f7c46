pub mod classifier;
pub mod image_check;
pub mod name_matcher;
pub mod object_store;
pub mod path_builder;
pub mod reconciler;
pub mod relocation;
pub mod scheduler;
pub mod storage_service;

#[cfg(test)]
pub mod memory_store;

// src/storage/mod.rs
pub mod file_store;
pub mod gist_client;
pub mod memory_store;
pub mod publisher;

#[cfg(test)]
pub(crate) mod testing;

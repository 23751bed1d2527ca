// src/models/mod.rs
pub mod credential;
pub mod issuer_profile;
pub mod revocation_list;

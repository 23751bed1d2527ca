pub mod api_server;
pub mod credential_assembler;
pub mod credential_issuer;
pub mod profile_builder;
pub mod revocation_manager;
pub mod verifier;

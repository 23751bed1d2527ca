pub mod jwt_signer;
pub mod key_management;

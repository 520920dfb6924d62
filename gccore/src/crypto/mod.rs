pub mod gcm;
pub mod hkdf;

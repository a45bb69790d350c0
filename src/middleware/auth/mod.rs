pub mod access;
pub mod credentials;

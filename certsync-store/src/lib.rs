pub mod cache;
pub mod store;

pub use cache::{SecretCache, SecretChange};
pub use store::{CertStore, StoreOp};

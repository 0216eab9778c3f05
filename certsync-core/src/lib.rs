pub mod certificate;
pub mod config;
pub mod desired;
pub mod diff;
pub mod error;
pub mod secret;

pub use certificate::{CertificateRecord, normalize_hostname};
pub use config::CertSyncConfig;
pub use desired::{DesiredState, HostConfig, TlsBinding};
pub use diff::{ChangeSet, ReloadClass};
pub use error::{CertError, CertSyncError};
pub use secret::{SecretEvent, SecretEventKind, SecretMaterial, SecretRef};

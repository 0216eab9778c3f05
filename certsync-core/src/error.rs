use thiserror::Error;

/// Why a piece of certificate material was rejected.
///
/// Rejections never surface to TLS clients: the affected host keeps its
/// previous record, or the default certificate if it never had one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertError {
    #[error("no certificate found in PEM data")]
    NoCertificate,

    #[error("no private key found in PEM data")]
    NoPrivateKey,

    #[error("invalid PEM data: {0}")]
    Pem(String),

    #[error("invalid X.509 certificate: {0}")]
    X509(String),

    #[error("private key rejected: {0}")]
    Key(String),

    #[error("secret event carries no certificate material")]
    MissingMaterial,
}

/// Unified error type for certsync.
#[derive(Error, Debug)]
pub enum CertSyncError {
    #[error("Malformed certificate material for {secret}: {source}")]
    MalformedCertificate {
        secret: String,
        #[source]
        source: CertError,
    },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid desired state: {0}")]
    InvalidDesiredState(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Internal: {0}")]
    Internal(String),
}

impl CertSyncError {
    /// Map to HTTP status code (admin API).
    pub fn status_code(&self) -> u16 {
        match self {
            CertSyncError::MalformedCertificate { .. } => 422,
            CertSyncError::InvalidDesiredState(_) => 400,
            CertSyncError::InvalidRequest(_) => 400,
            CertSyncError::Serde(_) => 400,
            _ => 500,
        }
    }

    /// JSON error body.
    pub fn to_json_body(&self) -> Vec<u8> {
        serde_json::json!({
            "error": self.to_string(),
            "status": self.status_code(),
        })
        .to_string()
        .into_bytes()
    }
}

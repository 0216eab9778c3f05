pub mod default_cert;
pub mod listener;
pub mod resolver;

pub use default_cert::{DefaultCertificateProvider, FAKE_CERTIFICATE_CN};
pub use listener::{TlsListener, build_server_config};
pub use resolver::SniResolver;

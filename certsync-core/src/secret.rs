use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Identity of a TLS secret in the orchestration layer (`namespace/name`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
}

impl SecretRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for SecretRef {
    type Err = String;

    /// Parses `namespace/name`; a bare `name` lands in the `default` namespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            None if !s.is_empty() => Ok(Self::new("default", s)),
            _ => Err(format!("invalid secret reference: {s:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretEventKind {
    Added,
    Modified,
    Removed,
}

/// Raw PEM material carried by an Added/Modified event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMaterial {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

/// A change notification for one TLS secret.
///
/// Delivery is at-least-once: applying the same event twice must leave the
/// store exactly as applying it once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEvent {
    pub kind: SecretEventKind,
    pub identity: SecretRef,

    /// Hosts the observer believes are bound to this secret.
    #[serde(default)]
    pub host_bindings: BTreeSet<String>,

    #[serde(default)]
    pub material: Option<SecretMaterial>,
}

impl SecretEvent {
    pub fn added(identity: SecretRef, material: SecretMaterial) -> Self {
        Self {
            kind: SecretEventKind::Added,
            identity,
            host_bindings: BTreeSet::new(),
            material: Some(material),
        }
    }

    pub fn modified(identity: SecretRef, material: SecretMaterial) -> Self {
        Self {
            kind: SecretEventKind::Modified,
            identity,
            host_bindings: BTreeSet::new(),
            material: Some(material),
        }
    }

    pub fn removed(identity: SecretRef) -> Self {
        Self {
            kind: SecretEventKind::Removed,
            identity,
            host_bindings: BTreeSet::new(),
            material: None,
        }
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.host_bindings = hosts.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_ref_parses_namespace_and_name() {
        let r: SecretRef = "ingress/foo.com".parse().unwrap();
        assert_eq!(r, SecretRef::new("ingress", "foo.com"));
        assert_eq!(r.to_string(), "ingress/foo.com");
    }

    #[test]
    fn bare_secret_name_uses_default_namespace() {
        let r: SecretRef = "foo.com".parse().unwrap();
        assert_eq!(r.namespace, "default");
    }

    #[test]
    fn malformed_secret_refs_are_rejected() {
        assert!("".parse::<SecretRef>().is_err());
        assert!("/name".parse::<SecretRef>().is_err());
        assert!("ns/".parse::<SecretRef>().is_err());
        assert!("a/b/c".parse::<SecretRef>().is_err());
    }

    #[test]
    fn removed_event_deserializes_without_material() {
        let json = r#"{"kind":"removed","identity":{"namespace":"default","name":"foo.com"}}"#;
        let ev: SecretEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.kind, SecretEventKind::Removed);
        assert!(ev.material.is_none());
        assert!(ev.host_bindings.is_empty());
    }

    #[test]
    fn with_hosts_collects_bindings() {
        let ev = SecretEvent::removed(SecretRef::new("default", "s")).with_hosts(["b.com", "a.com"]);
        let hosts: Vec<_> = ev.host_bindings.iter().cloned().collect();
        assert_eq!(hosts, vec!["a.com", "b.com"]);
    }
}

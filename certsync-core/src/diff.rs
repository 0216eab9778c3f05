use crate::desired::DesiredState;
use crate::secret::SecretRef;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// How a configuration transition has to be applied.
///
/// Ordered by severity so the stronger class wins when combining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadClass {
    NoChange,
    CertificateOnly,
    StructuralReload,
}

impl ReloadClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadClass::NoChange => "no_change",
            ReloadClass::CertificateOnly => "certificate_only",
            ReloadClass::StructuralReload => "structural_reload",
        }
    }
}

impl fmt::Display for ReloadClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of comparing two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub class: ReloadClass,
    /// Hosts added, removed, or with changed structural attributes.
    pub structural_hosts: BTreeSet<String>,
    /// TLS hosts whose certificate changed (binding or secret content).
    pub certificate_hosts: BTreeSet<String>,
}

impl ChangeSet {
    /// Every host touched by the transition.
    pub fn hosts(&self) -> BTreeSet<String> {
        self.structural_hosts
            .union(&self.certificate_hosts)
            .cloned()
            .collect()
    }

    /// Treat certificate changes as structural (certificates compiled into the
    /// static configuration).
    pub fn without_dynamic_certificates(mut self) -> Self {
        if self.class == ReloadClass::CertificateOnly {
            self.class = ReloadClass::StructuralReload;
        }
        self
    }
}

/// Classify the transition `prev → next`.
///
/// `changed_secrets` holds the secrets whose effective content changed since
/// `prev` was applied (appeared, replaced, or deleted). Structural changes
/// dominate certificate changes; the result depends only on the inputs.
pub fn classify(
    prev: &DesiredState,
    next: &DesiredState,
    changed_secrets: &BTreeSet<SecretRef>,
) -> ChangeSet {
    let mut structural_hosts = BTreeSet::new();
    let mut certificate_hosts = BTreeSet::new();

    for (name, old) in &prev.hosts {
        match next.hosts.get(name) {
            None => {
                structural_hosts.insert(name.clone());
            }
            Some(new) if old.structural() != new.structural() => {
                structural_hosts.insert(name.clone());
            }
            Some(_) => {}
        }
    }

    for (name, new) in &next.hosts {
        let Some(old) = prev.hosts.get(name) else {
            structural_hosts.insert(name.clone());
            continue;
        };
        if !new.is_tls() {
            continue;
        }
        let secret = new.tls_secret();
        let rebound = old.tls_secret() != secret;
        let content_changed = secret.is_some_and(|s| changed_secrets.contains(s));
        if rebound || content_changed {
            certificate_hosts.insert(name.clone());
        }
    }

    // New TLS hosts pick up their certificate during the structural pass, but
    // record them so observers see which certificates were installed.
    for name in &structural_hosts {
        if let Some(new) = next.hosts.get(name)
            && new.tls_secret().is_some_and(|s| changed_secrets.contains(s))
        {
            certificate_hosts.insert(name.clone());
        }
    }

    let class = if !structural_hosts.is_empty() {
        ReloadClass::StructuralReload
    } else if !certificate_hosts.is_empty() {
        ReloadClass::CertificateOnly
    } else {
        ReloadClass::NoChange
    };

    ChangeSet {
        class,
        structural_hosts,
        certificate_hosts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desired::HostConfig;

    fn secret(name: &str) -> SecretRef {
        SecretRef::new("default", name)
    }

    #[test]
    fn identical_snapshots_are_no_change() {
        let state = DesiredState::new().with_host(
            "foo.com",
            HostConfig::default().with_tls(Some(secret("foo"))),
        );
        let cs = classify(&state, &state, &BTreeSet::new());
        assert_eq!(cs.class, ReloadClass::NoChange);
        assert!(cs.hosts().is_empty());
    }

    #[test]
    fn class_ordering_puts_structural_on_top() {
        assert!(ReloadClass::StructuralReload > ReloadClass::CertificateOnly);
        assert!(ReloadClass::CertificateOnly > ReloadClass::NoChange);
    }

    #[test]
    fn dynamic_certificates_off_upgrades_certificate_only() {
        let prev = DesiredState::new().with_host(
            "foo.com",
            HostConfig::default().with_tls(Some(secret("foo"))),
        );
        let changed = BTreeSet::from([secret("foo")]);
        let cs = classify(&prev, &prev, &changed).without_dynamic_certificates();
        assert_eq!(cs.class, ReloadClass::StructuralReload);
    }

    #[test]
    fn no_change_stays_no_change_without_dynamic_certificates() {
        let prev = DesiredState::new();
        let cs = classify(&prev, &prev, &BTreeSet::new()).without_dynamic_certificates();
        assert_eq!(cs.class, ReloadClass::NoChange);
    }

    #[test]
    fn display_uses_snake_case() {
        assert_eq!(ReloadClass::CertificateOnly.to_string(), "certificate_only");
        assert_eq!(
            serde_json::to_string(&ReloadClass::StructuralReload).unwrap(),
            "\"structural_reload\""
        );
    }
}

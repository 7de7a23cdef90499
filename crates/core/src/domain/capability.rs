use serde::{Deserialize, Serialize};

/// Disjoint permission groups a capability belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityGroup {
    InfraRead,
    InfraWrite,
    NetworkProbe,
    Utility,
}

impl CapabilityGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InfraRead => "infra_read",
            Self::InfraWrite => "infra_write",
            Self::NetworkProbe => "network_probe",
            Self::Utility => "utility",
        }
    }
}

/// Enablement flags gating the active capability set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub infra_read: bool,
    pub infra_write: bool,
    pub network_probe: bool,
    pub utility: bool,
}

impl Permissions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn read_only() -> Self {
        Self { infra_read: true, ..Self::default() }
    }

    pub fn all() -> Self {
        Self { infra_read: true, infra_write: true, network_probe: true, utility: true }
    }

    pub fn allows(&self, group: CapabilityGroup) -> bool {
        match group {
            CapabilityGroup::InfraRead => self.infra_read,
            CapabilityGroup::InfraWrite => self.infra_write,
            CapabilityGroup::NetworkProbe => self.network_probe,
            CapabilityGroup::Utility => self.utility,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.infra_read || self.infra_write || self.network_probe || self.utility)
    }
}

#[cfg(test)]
mod tests {
    use super::{CapabilityGroup, Permissions};

    #[test]
    fn read_only_permissions_gate_write_group() {
        let permissions = Permissions::read_only();
        assert!(permissions.allows(CapabilityGroup::InfraRead));
        assert!(!permissions.allows(CapabilityGroup::InfraWrite));
        assert!(!permissions.allows(CapabilityGroup::NetworkProbe));
        assert!(!permissions.allows(CapabilityGroup::Utility));
    }

    #[test]
    fn none_is_empty() {
        assert!(Permissions::none().is_empty());
        assert!(!Permissions::all().is_empty());
    }
}

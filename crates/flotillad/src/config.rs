//! fleet.toml configuration parser.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use flotilla_core::{TagMatch, WaitBudget};
use flotilla_dns::DnsSettings;
use flotilla_edge::EdgeSettings;
use flotilla_fleet::LifecycleSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub dns: DnsSection,
    #[serde(default)]
    pub fleet: FleetSection,
    #[serde(default)]
    pub edge: EdgeSection,
    #[serde(default)]
    pub timers: TimerSection,
    #[serde(default)]
    pub waits: WaitSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsSection {
    /// Hosted zone holding the fleet's weighted record set.
    pub zone_id: String,
    /// The public name every member registers under.
    pub record_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSection {
    pub group_tag_key: String,
    pub group_tag_value: String,
    pub name_prefix: String,
    pub listener_port: u16,
    pub target_port: u16,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            group_tag_key: "fleet:group".to_string(),
            group_tag_value: "default".to_string(),
            name_prefix: "fleet-lb".to_string(),
            listener_port: 80,
            target_port: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeSection {
    pub disassociation_grace_secs: u64,
}

impl Default for EdgeSection {
    fn default() -> Self {
        Self { disassociation_grace_secs: 15 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSection {
    pub monitor_rate_secs: u64,
    pub enforcer_rate_secs: u64,
}

impl Default for TimerSection {
    fn default() -> Self {
        Self { monitor_rate_secs: 300, enforcer_rate_secs: 600 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaitConfig {
    pub attempts: u32,
    pub delay_secs: u64,
}

impl WaitConfig {
    pub fn budget(&self) -> WaitBudget {
        WaitBudget::new(self.attempts, Duration::from_secs(self.delay_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSection {
    pub dns_change: WaitConfig,
    pub provision: WaitConfig,
    pub teardown: WaitConfig,
    pub group_delete: WaitConfig,
}

impl Default for WaitSection {
    fn default() -> Self {
        Self {
            dns_change: WaitConfig { attempts: 30, delay_secs: 10 },
            provision: WaitConfig { attempts: 40, delay_secs: 15 },
            teardown: WaitConfig { attempts: 40, delay_secs: 15 },
            group_delete: WaitConfig { attempts: 30, delay_secs: 10 },
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FleetConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults suited to the simulator: everything in-memory, fast
    /// timers out of the box still come from `TimerSection::default`.
    pub fn simulator() -> Self {
        Self {
            dns: DnsSection {
                zone_id: "Z-FLEET-SIM".to_string(),
                record_name: "app.fleet.example.com".to_string(),
            },
            fleet: FleetSection::default(),
            edge: EdgeSection::default(),
            timers: TimerSection::default(),
            waits: WaitSection::default(),
        }
    }

    pub fn group_tag(&self) -> TagMatch {
        TagMatch::new(&self.fleet.group_tag_key, &self.fleet.group_tag_value)
    }

    pub fn dns_settings(&self) -> DnsSettings {
        DnsSettings::new(&self.dns.zone_id, &self.dns.record_name)
            .with_change_wait(self.waits.dns_change.budget())
    }

    pub fn edge_settings(&self) -> EdgeSettings {
        EdgeSettings {
            disassociation_grace: Duration::from_secs(self.edge.disassociation_grace_secs),
        }
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            name_prefix: self.fleet.name_prefix.clone(),
            listener_port: self.fleet.listener_port,
            target_port: self.fleet.target_port,
            provision_wait: self.waits.provision.budget(),
            teardown_wait: self.waits.teardown.budget(),
            group_delete_retry: self.waits.group_delete.budget(),
            member_tags: HashMap::from([(
                self.fleet.group_tag_key.clone(),
                self.fleet.group_tag_value.clone(),
            )]),
            ..LifecycleSettings::default()
        }
    }

    pub fn monitor_rate(&self) -> Duration {
        Duration::from_secs(self.timers.monitor_rate_secs)
    }

    pub fn enforcer_rate(&self) -> Duration {
        Duration::from_secs(self.timers.enforcer_rate_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let toml = r#"
            [dns]
            zone_id = "Z123PRIVATE"
            record_name = "app.internal.example.com"

            [fleet]
            group_tag_key = "fleet:group"
            group_tag_value = "blue"
            name_prefix = "blue-lb"
            listener_port = 8080
            target_port = 8080

            [timers]
            monitor_rate_secs = 120
            enforcer_rate_secs = 240

            [waits.dns_change]
            attempts = 5
            delay_secs = 2
        "#;
        let config: FleetConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.dns.zone_id, "Z123PRIVATE");
        assert_eq!(config.fleet.name_prefix, "blue-lb");
        assert_eq!(config.monitor_rate(), Duration::from_secs(120));
        assert_eq!(config.waits.dns_change.budget(), WaitBudget::new(5, Duration::from_secs(2)));
        // unspecified waits keep their defaults
        assert_eq!(config.waits.provision.attempts, 40);
    }

    #[test]
    fn minimal_config_needs_only_the_dns_section() {
        let config: FleetConfig = toml::from_str(
            r#"
            [dns]
            zone_id = "Z0"
            record_name = "app.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.group_tag(), TagMatch::new("fleet:group", "default"));
        assert_eq!(config.edge_settings().disassociation_grace, Duration::from_secs(15));
        assert_eq!(config.lifecycle_settings().name_prefix, "fleet-lb");
    }
}

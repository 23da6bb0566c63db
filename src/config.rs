use std::collections::HashSet;

use crate::error::ConfigError;

/// Static per-vehicle forwarding assignment. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// Logical vehicle number, used only for reporting.
    pub vehicle_id: u32,
    /// Inbound UDP port the simulator broadcasts on.
    pub source_port: u16,
    /// Outbound UDP port the filtered stream is relayed to.
    pub destination_port: u16,
    /// Only frames declaring this source system id are forwarded.
    pub expected_system_id: u8,
}

/// Parse a comma-separated list of `vehicle:src_port:dst_port:sysid` specs,
/// e.g. `1:14540:14550:1,2:14541:14551:2`.
pub fn parse_vehicle_specs(specs: &str) -> Result<Vec<ForwarderConfig>, ConfigError> {
    let mut configs = Vec::new();

    for spec in specs.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }

        let fields: Vec<&str> = spec.split(':').collect();
        if fields.len() != 4 {
            return Err(ConfigError::InvalidSpec {
                spec: spec.to_string(),
                reason: "expected vehicle:src_port:dst_port:sysid".to_string(),
            });
        }

        let invalid = |reason: &str| ConfigError::InvalidSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        configs.push(ForwarderConfig {
            vehicle_id: fields[0].parse().map_err(|_| invalid("bad vehicle id"))?,
            source_port: fields[1].parse().map_err(|_| invalid("bad source port"))?,
            destination_port: fields[2]
                .parse()
                .map_err(|_| invalid("bad destination port"))?,
            expected_system_id: fields[3].parse().map_err(|_| invalid("bad system id"))?,
        });
    }

    if configs.is_empty() {
        return Err(ConfigError::Empty);
    }

    validate(&configs)?;
    Ok(configs)
}

/// Reject configurations where two forwarders would bind the same inbound port.
pub fn validate(configs: &[ForwarderConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for config in configs {
        if !seen.insert(config.source_port) {
            return Err(ConfigError::DuplicateSourcePort(config.source_port));
        }
    }
    Ok(())
}

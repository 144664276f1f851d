use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// the whole mappings file, keyed by the logical domain name
///
/// btree so the admin dump comes out in a stable order
pub type MappingTable = BTreeMap<String, MappingRule>;

/// one entry of the mappings file:
///
/// ```json
/// { "cvideo.yanhekt.cn": { "type": "single", "ip": "10.0.0.5" } }
/// { "cvideo.yanhekt.cn": { "type": "loadbalance", "ips": ["10.0.0.5", "10.0.0.6"], "strategy": "random" } }
/// ```
///
/// rules are read leniently so one odd entry never takes the whole file down: any `type` other
/// than `single` is load balanced and a missing `ip` is just an empty one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", from = "RawMappingRule")]
pub enum MappingRule {
    #[serde(rename = "single")]
    Single { ip: String },

    #[serde(rename = "loadbalance")]
    LoadBalanced {
        #[serde(default)]
        ips: Vec<String>,
        #[serde(default)]
        strategy: Strategy,
    },
}

#[derive(Deserialize)]
struct RawMappingRule {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    ip: String,
    #[serde(default)]
    ips: Vec<String>,
    #[serde(default)]
    strategy: Option<Strategy>,
}

impl From<RawMappingRule> for MappingRule {
    fn from(raw: RawMappingRule) -> Self {
        if raw.kind == "single" {
            return Self::Single { ip: raw.ip };
        }

        Self::LoadBalanced {
            ips: raw.ips,
            strategy: raw.strategy.unwrap_or_default(),
        }
    }
}

/// missing or empty means round robin, anything unrecognised means first available
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Strategy {
    #[default]
    RoundRobin,
    Random,
    FirstAvailable,
}

impl From<String> for Strategy {
    fn from(name: String) -> Self {
        match name.as_str() {
            "" | "round_robin" => Self::RoundRobin,
            "random" => Self::Random,
            _ => Self::FirstAvailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_rule_types() {
        let table: MappingTable = serde_json::from_str(
            r#"{
                "a.example.cn": { "type": "single", "ip": "10.0.0.1" },
                "b.example.cn": { "type": "loadbalance", "ips": ["10.0.0.2", "10.0.0.3"] },
                "c.example.cn": { "type": "loadbalance", "ips": ["10.0.0.4"], "strategy": "first_available" }
            }"#,
        )
        .unwrap();

        assert_eq!(
            table["a.example.cn"],
            MappingRule::Single {
                ip: "10.0.0.1".to_string()
            }
        );
        assert_eq!(
            table["b.example.cn"],
            MappingRule::LoadBalanced {
                ips: vec!["10.0.0.2".to_string(), "10.0.0.3".to_string()],
                strategy: Strategy::RoundRobin,
            }
        );
        assert!(matches!(
            table["c.example.cn"],
            MappingRule::LoadBalanced {
                strategy: Strategy::FirstAvailable,
                ..
            }
        ));
    }

    #[test]
    fn unknown_strategy_falls_back_to_first_available() {
        let table: MappingTable = serde_json::from_str(
            r#"{
                "a.example.cn": { "type": "loadbalance", "ips": ["10.0.0.1"], "strategy": "least_conn" },
                "b.example.cn": { "type": "loadbalance", "ips": ["10.0.0.2"], "strategy": "" }
            }"#,
        )
        .unwrap();

        assert!(matches!(
            table["a.example.cn"],
            MappingRule::LoadBalanced {
                strategy: Strategy::FirstAvailable,
                ..
            }
        ));
        assert!(matches!(
            table["b.example.cn"],
            MappingRule::LoadBalanced {
                strategy: Strategy::RoundRobin,
                ..
            }
        ));
    }

    #[test]
    fn odd_rules_do_not_break_the_table() {
        let table: MappingTable = serde_json::from_str(
            r#"{
                "a.example.cn": { "type": "weighted", "ips": ["10.0.0.1", "10.0.0.2"] },
                "b.example.cn": { "type": "single" },
                "c.example.cn": { "type": "single", "ip": "10.0.0.3" }
            }"#,
        )
        .unwrap();

        assert_eq!(
            table["a.example.cn"],
            MappingRule::LoadBalanced {
                ips: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
                strategy: Strategy::RoundRobin,
            }
        );
        assert_eq!(table["b.example.cn"], MappingRule::Single { ip: String::new() });
        assert_eq!(
            table["c.example.cn"],
            MappingRule::Single {
                ip: "10.0.0.3".to_string()
            }
        );
    }

    #[test]
    fn serializes_back_to_file_format() {
        let rule = MappingRule::LoadBalanced {
            ips: vec!["10.0.0.2".to_string()],
            strategy: Strategy::Random,
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "loadbalance", "ips": ["10.0.0.2"], "strategy": "random" })
        );
    }
}

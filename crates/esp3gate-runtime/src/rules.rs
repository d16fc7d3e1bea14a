//! Rule evaluation seam and a declarative YAML rule engine.
//!
//! A rule file lists rules of the form "when a device parameter changes to a
//! value matching the condition, write these parameters":
//!
//! ```yaml
//! rules:
//!   - name: coffee machine idle
//!     when:
//!       device: coffee_machine
//!       parameter: POWER_W
//!       below: 5
//!     then:
//!       - device: hall_switch
//!         parameter: ROCKER_A
//!         value: press_o
//! ```
//!
//! Conditions fire on the transition into the matching range: a change
//! whose previous value already matched does not fire again.

use std::fs;
use std::path::Path;

use esp3gate_device::{ParameterChange, ParameterId, ParameterValue};
use esp3gate_frame::DeviceAddress;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RouterError, RuleError};

/// A parameter change enriched with the device's logical name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterFact {
    pub name: String,
    pub change: ParameterChange,
}

/// Accepts parameter writes issued by a rule engine.
pub trait CommandSink: Send + Sync {
    /// Write `parameter` on the device(s) at `target`, a logical name or an
    /// address. Returns the number of instances that accepted.
    fn set_parameter(
        &self,
        target: &str,
        parameter: ParameterId,
        value: ParameterValue,
    ) -> Result<usize, RouterError>;
}

/// Consumes parameter facts and may issue commands in response.
pub trait RuleEngine: Send + Sync {
    fn evaluate(&self, fact: &ParameterFact, commands: &dyn CommandSink) -> Result<(), RuleError>;
}

/// Which device and parameter a rule reacts to, and the value range.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    /// Logical name or address.
    pub device: String,
    pub parameter: ParameterId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<ParameterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below: Option<f64>,
}

impl Condition {
    fn matches_source(&self, fact: &ParameterFact) -> bool {
        if fact.change.parameter != self.parameter {
            return false;
        }
        if self.device == fact.name {
            return true;
        }
        self.device
            .parse::<DeviceAddress>()
            .is_ok_and(|address| address == fact.change.source.address)
    }

    fn matches_value(&self, value: Option<&ParameterValue>) -> bool {
        let Some(value) = value else {
            return false;
        };
        if let Some(expected) = &self.equals {
            let equal = match (expected.as_f64(), value.as_f64()) {
                (Some(expected), Some(actual)) => expected == actual,
                _ => expected == value,
            };
            if !equal {
                return false;
            }
        }
        if self.above.is_some() || self.below.is_some() {
            let Some(number) = value.as_f64() else {
                return false;
            };
            if self.above.is_some_and(|limit| number <= limit) {
                return false;
            }
            if self.below.is_some_and(|limit| number >= limit) {
                return false;
            }
        }
        true
    }

    /// True when the change enters the matching range.
    pub fn fires_on(&self, fact: &ParameterFact) -> bool {
        self.matches_source(fact)
            && self.matches_value(fact.change.new.as_ref())
            && !self.matches_value(fact.change.old.as_ref())
    }
}

/// One parameter write.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Action {
    pub device: String,
    pub parameter: ParameterId,
    pub value: ParameterValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub name: String,
    pub when: Condition,
    pub then: Vec<Action>,
}

/// A set of declarative rules loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let text = fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rules: Self = serde_yaml::from_str(&text).map_err(|source| RuleError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        rules.validate()?;
        info!(path = %path.display(), rules = rules.rules.len(), "rules loaded");
        Ok(rules)
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        for (index, rule) in self.rules.iter().enumerate() {
            let invalid = |reason: &str| RuleError::Invalid {
                rule: rule.name.clone(),
                reason: reason.to_string(),
            };
            if rule.name.trim().is_empty() {
                return Err(RuleError::Invalid {
                    rule: format!("#{}", index + 1),
                    reason: "name is empty".to_string(),
                });
            }
            if self.rules[..index].iter().any(|other| other.name == rule.name) {
                return Err(invalid("name is used more than once"));
            }
            if rule.when.device.trim().is_empty() {
                return Err(invalid("condition device is empty"));
            }
            if let (Some(above), Some(below)) = (rule.when.above, rule.when.below) {
                if above >= below {
                    return Err(invalid("`above` must be less than `below`"));
                }
            }
            if rule.then.is_empty() {
                return Err(invalid("no actions"));
            }
            if rule.then.iter().any(|action| action.device.trim().is_empty()) {
                return Err(invalid("action device is empty"));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleEngine for RuleSet {
    /// Runs every action of every firing rule; reports the first failure.
    fn evaluate(&self, fact: &ParameterFact, commands: &dyn CommandSink) -> Result<(), RuleError> {
        let mut first_failure = None;
        for rule in self.rules.iter().filter(|rule| rule.when.fires_on(fact)) {
            debug!(rule = %rule.name, device = %fact.name, parameter = %fact.change.parameter, "rule fired");
            for action in &rule.then {
                if let Err(source) =
                    commands.set_parameter(&action.device, action.parameter, action.value.clone())
                {
                    warn!(rule = %rule.name, device = %action.device, error = %source, "rule action failed");
                    first_failure.get_or_insert(RuleError::Action {
                        rule: rule.name.clone(),
                        source,
                    });
                }
            }
        }
        first_failure.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use esp3gate_device::{DeviceRef, Initiation, RockerAction};

    use super::*;

    const METER: DeviceAddress = DeviceAddress::new([0x01, 0x82, 0x5D, 0xAB]);

    const RULES: &str = r#"
rules:
  - name: coffee machine idle
    when:
      device: coffee_machine
      parameter: POWER_W
      below: 5
    then:
      - device: hall_switch
        parameter: ROCKER_A
        value: press_o
  - name: coffee machine busy
    when:
      device: "01:82:5D:AB"
      parameter: POWER_W
      above: 1000
    then:
      - device: hall_switch
        parameter: ROCKER_A
        value: press_i
      - device: missing
        parameter: ROCKER_B
        value: press_i
"#;

    #[derive(Default)]
    struct Commands {
        issued: Mutex<Vec<(String, ParameterId, ParameterValue)>>,
    }

    impl CommandSink for Commands {
        fn set_parameter(
            &self,
            target: &str,
            parameter: ParameterId,
            value: ParameterValue,
        ) -> Result<usize, RouterError> {
            if target == "missing" {
                return Err(RouterError::NoDevice(target.to_string()));
            }
            self.issued
                .lock()
                .unwrap()
                .push((target.to_string(), parameter, value));
            Ok(1)
        }
    }

    fn fact(old: Option<u64>, new: u64) -> ParameterFact {
        ParameterFact {
            name: "coffee_machine".to_string(),
            change: ParameterChange {
                source: DeviceRef {
                    address: METER,
                    device_type: "RD_A5-12-01",
                },
                parameter: ParameterId::PowerW,
                old: old.map(ParameterValue::Unsigned),
                new: Some(ParameterValue::Unsigned(new)),
                initiation: Initiation::RadioFrame,
            },
        }
    }

    fn rules() -> RuleSet {
        let rules: RuleSet = serde_yaml::from_str(RULES).unwrap();
        rules.validate().unwrap();
        rules
    }

    #[test]
    fn rule_fires_on_entering_range() {
        let rules = rules();
        let commands = Commands::default();

        rules.evaluate(&fact(Some(900), 3), &commands).unwrap();
        // Already below the limit: no repeat.
        rules.evaluate(&fact(Some(3), 2), &commands).unwrap();

        assert_eq!(
            *commands.issued.lock().unwrap(),
            vec![(
                "hall_switch".to_string(),
                ParameterId::RockerA,
                ParameterValue::Rocker(RockerAction::PressO)
            )]
        );
    }

    #[test]
    fn address_condition_and_failed_action() {
        let rules = rules();
        let commands = Commands::default();

        let err = rules.evaluate(&fact(None, 1500), &commands).unwrap_err();
        assert!(matches!(err, RuleError::Action { rule, .. } if rule == "coffee machine busy"));
        // The action before the failing one still ran.
        assert_eq!(commands.issued.lock().unwrap().len(), 1);
    }

    #[test]
    fn other_parameters_do_not_fire() {
        let rules = rules();
        let commands = Commands::default();
        let mut energy = fact(None, 1);
        energy.change.parameter = ParameterId::EnergyWs;
        rules.evaluate(&energy, &commands).unwrap();
        assert!(commands.issued.lock().unwrap().is_empty());
    }

    #[test]
    fn equals_compares_rocker_values() {
        let condition = Condition {
            device: "hall_switch".to_string(),
            parameter: ParameterId::RockerA,
            equals: Some(ParameterValue::Rocker(RockerAction::PressI)),
            above: None,
            below: None,
        };
        assert!(condition.matches_value(Some(&ParameterValue::Rocker(RockerAction::PressI))));
        assert!(!condition.matches_value(Some(&ParameterValue::Rocker(RockerAction::Released))));
        assert!(!condition.matches_value(None));
    }

    #[test]
    fn validation_rejects_bad_rules() {
        let duplicate = format!("{RULES}\n  - name: coffee machine idle\n    when: {{device: x, parameter: POWER_W}}\n    then: [{{device: y, parameter: ROCKER_A, value: press_i}}]\n");
        let rules: RuleSet = serde_yaml::from_str(&duplicate).unwrap();
        assert!(matches!(rules.validate(), Err(RuleError::Invalid { reason, .. }) if reason.contains("more than once")));

        let empty_actions: RuleSet =
            serde_yaml::from_str("rules:\n  - name: r\n    when: {device: x, parameter: POWER_W}\n    then: []\n").unwrap();
        assert!(empty_actions.validate().is_err());

        let inverted: RuleSet = serde_yaml::from_str(
            "rules:\n  - name: r\n    when: {device: x, parameter: POWER_W, above: 10, below: 5}\n    then: [{device: y, parameter: ROCKER_A, value: press_i}]\n",
        )
        .unwrap();
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "rules: [").unwrap();
        assert!(matches!(RuleSet::load(&path), Err(RuleError::Parse { .. })));

        std::fs::write(&path, RULES).unwrap();
        assert_eq!(RuleSet::load(&path).unwrap().len(), 2);

        let missing = dir.path().join("absent.yaml");
        assert!(matches!(RuleSet::load(&missing), Err(RuleError::Io { .. })));
    }
}

// Chaincode endorsement policies in the YAML layout used by Fabric tooling:
//
// identities:
//   - user1: { role: { name: member, mspId: Org1MSP } }
//   - user2: { role: { name: member, mspId: Org2MSP } }
// policy:
//   1-of:
//     - signed-by: user1
//     - signed-by: user2

use crate::error::PolicyError;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::{collections::HashSet, fs, path::Path};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoleName {
    Member,
    Admin,
    Client,
    Peer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRole {
    pub name: RoleName,
    #[serde(rename = "mspId")]
    pub msp_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyIdentity {
    pub alias: String,
    pub role: PolicyRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyRule {
    // Index into the identities of the policy
    SignedBy(usize),
    OutOf { n: usize, rules: Vec<PolicyRule> },
}

impl PolicyRule {
    fn is_satisfied(&self, identities: &[PolicyIdentity], msp_ids: &HashSet<&str>) -> bool {
        match self {
            Self::SignedBy(index) => identities
                .get(*index)
                .is_some_and(|identity| msp_ids.contains(identity.role.msp_id.as_str())),
            Self::OutOf { n, rules } => {
                rules
                    .iter()
                    .filter(|rule| rule.is_satisfied(identities, msp_ids))
                    .count()
                    >= *n
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementPolicy {
    identities: Vec<PolicyIdentity>,
    rule: PolicyRule,
}

impl EndorsementPolicy {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, PolicyError> {
        #[derive(Deserialize)]
        struct Document {
            identities: Vec<Mapping>,
            policy: Value,
        }

        #[derive(Deserialize)]
        struct IdentityBody {
            role: PolicyRole,
        }

        let document: Document = serde_yaml::from_str(content)?;
        if document.identities.is_empty() {
            return Err(PolicyError::NoIdentities);
        }

        let mut identities = Vec::with_capacity(document.identities.len());
        for entry in document.identities {
            let (alias, body) = single_entry(&entry)?;
            let body: IdentityBody = serde_yaml::from_value(body.clone())?;
            identities.push(PolicyIdentity {
                alias: alias.to_owned(),
                role: body.role,
            });
        }

        let rule = parse_rule(&document.policy, &identities)?;
        Ok(Self { identities, rule })
    }

    pub fn identities(&self) -> &[PolicyIdentity] {
        &self.identities
    }

    pub fn rule(&self) -> &PolicyRule {
        &self.rule
    }

    // Check whether endorsements from the given MSPs satisfy the policy
    pub fn is_satisfied_by(&self, msp_ids: &HashSet<&str>) -> bool {
        self.rule.is_satisfied(&self.identities, msp_ids)
    }

    // Encoded form attached to install and instantiate proposals
    pub fn to_bytes(&self) -> Vec<u8> {
        // Plain data without maps keyed by non-strings: serialization cannot fail
        serde_json::to_vec(self).unwrap_or_default()
    }
}

fn single_entry(mapping: &Mapping) -> Result<(&str, &Value), PolicyError> {
    if mapping.len() != 1 {
        return Err(PolicyError::MalformedRule);
    }

    let (key, value) = mapping.iter().next().ok_or(PolicyError::MalformedRule)?;
    let key = key.as_str().ok_or(PolicyError::MalformedRule)?;
    Ok((key, value))
}

fn parse_rule(value: &Value, identities: &[PolicyIdentity]) -> Result<PolicyRule, PolicyError> {
    let mapping = value.as_mapping().ok_or(PolicyError::MalformedRule)?;
    let (key, body) = single_entry(mapping)?;

    if key == "signed-by" {
        let alias = body.as_str().ok_or(PolicyError::MalformedRule)?;
        let index = identities
            .iter()
            .position(|identity| identity.alias == alias)
            .ok_or_else(|| PolicyError::UnknownIdentity(alias.to_owned()))?;
        return Ok(PolicyRule::SignedBy(index));
    }

    let n = key
        .strip_suffix("-of")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| PolicyError::UnknownRule(key.to_owned()))?;

    let rules = body
        .as_sequence()
        .ok_or(PolicyError::MalformedRule)?
        .iter()
        .map(|rule| parse_rule(rule, identities))
        .collect::<Result<Vec<_>, _>>()?;

    if rules.len() < n {
        return Err(PolicyError::NotEnoughRules {
            n,
            got: rules.len(),
        });
    }

    Ok(PolicyRule::OutOf { n, rules })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_ORGS_ANY: &str = r#"
identities:
  - user1: { role: { name: member, mspId: ClinicMSP } }
  - user2: { role: { name: member, mspId: InsurerMSP } }
policy:
  1-of:
    - signed-by: user1
    - signed-by: user2
"#;

    const NESTED: &str = r#"
identities:
  - clinic: { role: { name: member, mspId: ClinicMSP } }
  - insurer: { role: { name: admin, mspId: InsurerMSP } }
  - provider: { role: { name: member, mspId: ProviderMSP } }
policy:
  2-of:
    - signed-by: clinic
    - 1-of:
        - signed-by: insurer
        - signed-by: provider
"#;

    #[test]
    fn test_parse_any_of_two() {
        let policy = EndorsementPolicy::from_yaml_str(TWO_ORGS_ANY).unwrap();
        assert_eq!(policy.identities().len(), 2);
        assert_eq!(policy.identities()[1].role.msp_id, "InsurerMSP");
        assert_eq!(policy.identities()[0].role.name, RoleName::Member);
        assert!(policy.is_satisfied_by(&HashSet::from(["ClinicMSP"])));
        assert!(policy.is_satisfied_by(&HashSet::from(["InsurerMSP"])));
        assert!(!policy.is_satisfied_by(&HashSet::from(["ProviderMSP"])));
    }

    #[test]
    fn test_nested_rules() {
        let policy = EndorsementPolicy::from_yaml_str(NESTED).unwrap();
        assert!(!policy.is_satisfied_by(&HashSet::from(["ClinicMSP"])));
        assert!(!policy.is_satisfied_by(&HashSet::from(["InsurerMSP", "ProviderMSP"])));
        assert!(policy.is_satisfied_by(&HashSet::from(["ClinicMSP", "ProviderMSP"])));
    }

    #[test]
    fn test_unknown_identity() {
        let yaml = TWO_ORGS_ANY.replace("signed-by: user2", "signed-by: user3");
        assert!(matches!(
            EndorsementPolicy::from_yaml_str(&yaml),
            Err(PolicyError::UnknownIdentity(alias)) if alias == "user3"
        ));
    }

    #[test]
    fn test_not_enough_rules() {
        let yaml = TWO_ORGS_ANY.replace("1-of", "3-of");
        assert!(matches!(
            EndorsementPolicy::from_yaml_str(&yaml),
            Err(PolicyError::NotEnoughRules { n: 3, got: 2 })
        ));
    }

    #[test]
    fn test_unknown_rule() {
        let yaml = TWO_ORGS_ANY.replace("1-of", "any-of");
        assert!(matches!(
            EndorsementPolicy::from_yaml_str(&yaml),
            Err(PolicyError::UnknownRule(rule)) if rule == "any-of"
        ));
    }

    #[test]
    fn test_encoding_is_stable() {
        let policy = EndorsementPolicy::from_yaml_str(TWO_ORGS_ANY).unwrap();
        let decoded: EndorsementPolicy = serde_json::from_slice(&policy.to_bytes()).unwrap();
        assert_eq!(decoded, policy);
    }
}

//! Persona records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::CoreResult;

/// A synthetic participant. `number` runs `1..=N` within a panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub number: u32,
    #[serde(flatten)]
    pub profile: PersonaProfile,
}

/// Attribute set or free-text description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersonaProfile {
    Attributes { attributes: BTreeMap<String, String> },
    Description { description: String },
}

impl Persona {
    pub fn with_attributes(number: u32, attributes: BTreeMap<String, String>) -> Self {
        Self {
            number,
            profile: PersonaProfile::Attributes { attributes },
        }
    }

    pub fn with_description(number: u32, description: impl Into<String>) -> Self {
        Self {
            number,
            profile: PersonaProfile::Description {
                description: description.into(),
            },
        }
    }

    /// Single-line identity used in prompts, e.g. `Age: 34, Gender: Woman`.
    pub fn describe(&self) -> String {
        match &self.profile {
            PersonaProfile::Attributes { attributes } => attributes
                .iter()
                .map(|(label, value)| format!("{label}: {value}"))
                .collect::<Vec<_>>()
                .join(", "),
            PersonaProfile::Description { description } => description.clone(),
        }
    }

    pub fn attributes(&self) -> Option<&BTreeMap<String, String>> {
        match &self.profile {
            PersonaProfile::Attributes { attributes } => Some(attributes),
            PersonaProfile::Description { .. } => None,
        }
    }

    pub fn to_value(&self) -> CoreResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: serde_json::Value) -> CoreResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attribute_persona_json_shape() {
        let mut attrs = BTreeMap::new();
        attrs.insert("Age".to_string(), "34".to_string());
        let persona = Persona::with_attributes(1, attrs);

        let value = persona.to_value().unwrap();
        assert_eq!(
            value,
            json!({"number": 1, "kind": "attributes", "attributes": {"Age": "34"}})
        );
        assert_eq!(Persona::from_value(value).unwrap(), persona);
    }

    #[test]
    fn describe_joins_attributes_in_key_order() {
        let mut attrs = BTreeMap::new();
        attrs.insert("Gender".to_string(), "Woman".to_string());
        attrs.insert("Age".to_string(), "34".to_string());
        assert_eq!(
            Persona::with_attributes(1, attrs).describe(),
            "Age: 34, Gender: Woman"
        );
        assert_eq!(
            Persona::with_description(2, "A retired nurse").describe(),
            "A retired nurse"
        );
    }
}

//! Action assertion: the edit history of the asset
//!
//! Each action names an operation from the controlled vocabulary and may
//! reference the ingredients it operated on. The V1 serialization stores a
//! single `ingredient` reference per action; V2 stores an `ingredients`
//! array and adds assertion-level template and software-agent tables that
//! actions reference by index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    claim::{GeneratorInfo, HashedUri, HashedUriWire},
    error::{Error, Result},
    jumbf::{ChildBox, SuperBox, CBOR_ASSERTION_UUID},
};

use super::{labels, Relationship};

/// Controlled vocabulary of C2PA action types
pub mod c2pa_action {
    pub const CREATED: &str = "c2pa.created";
    pub const OPENED: &str = "c2pa.opened";
    pub const PLACED: &str = "c2pa.placed";
    pub const REMOVED: &str = "c2pa.removed";
    pub const REPACKAGED: &str = "c2pa.repackaged";
    pub const TRANSCODED: &str = "c2pa.transcoded";
    pub const REDACTED: &str = "c2pa.redacted";
    pub const EDITED: &str = "c2pa.edited";
    pub const UNKNOWN: &str = "c2pa.unknown";
}

/// Whether an action of this type must reference at least one ingredient
///
/// `c2pa.placed` is documented to allow a missing ingredient reference.
pub fn requires_ingredient(action: &str) -> bool {
    matches!(
        action,
        c2pa_action::OPENED
            | c2pa_action::REMOVED
            | c2pa_action::REPACKAGED
            | c2pa_action::TRANSCODED
    )
}

/// Whether an action of this type takes ingredient references at all
pub fn takes_ingredients(action: &str) -> bool {
    requires_ingredient(action) || action == c2pa_action::PLACED
}

/// The ingredient relationship an action of this type must point at
pub fn expected_relationship(action: &str) -> Option<Relationship> {
    match action {
        c2pa_action::OPENED | c2pa_action::REPACKAGED | c2pa_action::TRANSCODED => {
            Some(Relationship::ParentOf)
        }
        c2pa_action::PLACED | c2pa_action::REMOVED => Some(Relationship::ComponentOf),
        _ => None,
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ActionWire {
    action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    when: Option<String>,
    #[serde(rename = "softwareAgent", skip_serializing_if = "Option::is_none")]
    software_agent: Option<serde_cbor::Value>,
    #[serde(rename = "softwareAgentIndex", skip_serializing_if = "Option::is_none")]
    software_agent_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(rename = "digitalSourceType", skip_serializing_if = "Option::is_none")]
    digital_source_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<BTreeMap<String, serde_cbor::Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct TemplateWire {
    action: String,
    #[serde(rename = "softwareAgent", skip_serializing_if = "Option::is_none")]
    software_agent: Option<serde_cbor::Value>,
    #[serde(rename = "softwareAgentIndex", skip_serializing_if = "Option::is_none")]
    software_agent_index: Option<usize>,
    #[serde(rename = "digitalSourceType", skip_serializing_if = "Option::is_none")]
    digital_source_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "templateParameters", skip_serializing_if = "Option::is_none")]
    template_parameters: Option<BTreeMap<String, serde_cbor::Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ActionsWire {
    actions: Vec<ActionWire>,
    #[serde(rename = "allActionsIncluded", skip_serializing_if = "Option::is_none")]
    all_actions_included: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    templates: Option<Vec<TemplateWire>>,
    #[serde(rename = "softwareAgents", skip_serializing_if = "Option::is_none")]
    software_agents: Option<Vec<GeneratorInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_cbor::Value>,
}

/// One entry in the edit history
#[derive(Debug, Clone, Default)]
pub struct Action {
    /// Action type from the controlled vocabulary
    pub action: String,

    /// ISO 8601 timestamp
    pub when: Option<String>,

    /// Inline software agent: a name string (V1) or a generator record (V2)
    pub software_agent: Option<serde_cbor::Value>,

    /// Index into the assertion's software-agents table (V2)
    pub software_agent_index: Option<usize>,

    pub reason: Option<String>,
    pub digital_source_type: Option<String>,
    pub description: Option<String>,

    /// Ingredient references from `parameters`
    pub ingredients: Vec<HashedUri>,

    /// Redaction target URI from `parameters.redacted`
    pub redacted: Option<String>,

    /// Remaining free-form parameter entries
    pub parameters: BTreeMap<String, serde_cbor::Value>,
}

impl Action {
    /// An action of the given type with no parameters
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    fn from_wire(wire: ActionWire, label: &str) -> Result<Self> {
        let invalid = |reason: String| Error::AssertionInvalid {
            label: label.to_string(),
            reason,
        };

        let mut ingredients = Vec::new();
        let mut redacted = None;
        let mut parameters = BTreeMap::new();

        for (key, value) in wire.parameters.unwrap_or_default() {
            match key.as_str() {
                "ingredient" => {
                    let uri: HashedUriWire = serde_cbor::value::from_value(value)
                        .map_err(|e| invalid(format!("bad ingredient reference: {e}")))?;
                    ingredients.push(uri.into_model()?);
                }
                "ingredients" => {
                    let uris: Vec<HashedUriWire> = serde_cbor::value::from_value(value)
                        .map_err(|e| invalid(format!("bad ingredients list: {e}")))?;
                    for uri in uris {
                        ingredients.push(uri.into_model()?);
                    }
                }
                "redacted" => match value {
                    serde_cbor::Value::Text(url) => redacted = Some(url),
                    _ => return Err(invalid("redacted parameter is not a URI".to_string())),
                },
                _ => {
                    parameters.insert(key, value);
                }
            }
        }

        Ok(Self {
            action: wire.action,
            when: wire.when,
            software_agent: wire.software_agent,
            software_agent_index: wire.software_agent_index,
            reason: wire.reason,
            digital_source_type: wire.digital_source_type,
            description: wire.description,
            ingredients,
            redacted,
            parameters,
        })
    }

    fn to_wire(&self, version: u8) -> Result<ActionWire> {
        let mut parameters = self.parameters.clone();
        if version >= 2 {
            if !self.ingredients.is_empty() {
                let uris: Vec<serde_cbor::Value> = self
                    .ingredients
                    .iter()
                    .map(|u| serde_cbor::value::to_value(HashedUriWire::from_model(u)))
                    .collect::<std::result::Result<_, _>>()?;
                parameters.insert("ingredients".to_string(), serde_cbor::Value::Array(uris));
            }
        } else {
            match self.ingredients.len() {
                0 => {}
                1 => {
                    parameters.insert(
                        "ingredient".to_string(),
                        serde_cbor::value::to_value(HashedUriWire::from_model(
                            &self.ingredients[0],
                        ))?,
                    );
                }
                _ => return Err(Error::ActionIngredientCardinality),
            }
        }
        if let Some(redacted) = &self.redacted {
            parameters.insert(
                "redacted".to_string(),
                serde_cbor::Value::Text(redacted.clone()),
            );
        }

        Ok(ActionWire {
            action: self.action.clone(),
            when: self.when.clone(),
            software_agent: self.software_agent.clone(),
            software_agent_index: self.software_agent_index,
            reason: self.reason.clone(),
            digital_source_type: self.digital_source_type.clone(),
            description: self.description.clone(),
            parameters: if parameters.is_empty() {
                None
            } else {
                Some(parameters)
            },
        })
    }
}

/// An action template referenced by V2 actions
#[derive(Debug, Clone, Default)]
pub struct ActionTemplate {
    pub action: String,
    pub software_agent: Option<serde_cbor::Value>,
    pub software_agent_index: Option<usize>,
    pub digital_source_type: Option<String>,
    pub description: Option<String>,
    pub template_parameters: BTreeMap<String, serde_cbor::Value>,
}

/// The ordered edit history of a manifest
#[derive(Debug, Clone)]
pub struct ActionsAssertion {
    pub label: String,
    pub label_suffix: Option<u32>,

    /// Serialization generation, 1 or 2
    pub version: u8,

    pub actions: Vec<Action>,

    /// Action templates (V2)
    pub templates: Vec<ActionTemplate>,

    /// Software-agent table referenced by index (V2)
    pub software_agents: Vec<GeneratorInfo>,

    /// Whether the history is declared complete (V2)
    pub all_actions_included: Option<bool>,

    pub metadata: Option<serde_cbor::Value>,

    pub(crate) source_box: Option<SuperBox>,
}

impl ActionsAssertion {
    /// An empty actions assertion of the given generation
    pub fn new(version: u8) -> Self {
        let label = if version >= 2 {
            labels::ACTIONS_V2
        } else {
            labels::ACTIONS
        };
        Self {
            label: label.to_string(),
            label_suffix: None,
            version: version.clamp(1, 2),
            actions: Vec::new(),
            templates: Vec::new(),
            software_agents: Vec::new(),
            all_actions_included: None,
            metadata: None,
            source_box: None,
        }
    }

    /// Append an action
    pub fn add_action(&mut self, action: Action) -> &mut Self {
        self.source_box = None;
        self.actions.push(action);
        self
    }

    /// Parse from the assertion superbox
    pub fn from_jumbf(sb: &SuperBox, base_label: &str, suffix: Option<u32>) -> Result<Self> {
        let version = match base_label {
            labels::ACTIONS => 1,
            labels::ACTIONS_V2 => 2,
            other => {
                return Err(Error::AssertionInvalid {
                    label: other.to_string(),
                    reason: "not an actions label".to_string(),
                })
            }
        };
        let invalid = |reason: String| Error::AssertionInvalid {
            label: base_label.to_string(),
            reason,
        };

        let cbor = sb
            .cbor_content()
            .ok_or_else(|| invalid("missing CBOR content box".to_string()))?;
        let wire: ActionsWire =
            serde_cbor::from_slice(cbor).map_err(|e| invalid(format!("bad CBOR: {e}")))?;

        let actions = wire
            .actions
            .into_iter()
            .map(|a| Action::from_wire(a, base_label))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            label: base_label.to_string(),
            label_suffix: suffix,
            version,
            actions,
            templates: wire
                .templates
                .unwrap_or_default()
                .into_iter()
                .map(|t| ActionTemplate {
                    action: t.action,
                    software_agent: t.software_agent,
                    software_agent_index: t.software_agent_index,
                    digital_source_type: t.digital_source_type,
                    description: t.description,
                    template_parameters: t.template_parameters.unwrap_or_default(),
                })
                .collect(),
            software_agents: wire.software_agents.unwrap_or_default(),
            all_actions_included: wire.all_actions_included,
            metadata: wire.metadata,
            source_box: Some(sb.clone()),
        })
    }

    /// The full wire label
    pub fn full_label(&self) -> String {
        super::full_label(&self.label, self.label_suffix)
    }

    /// Serialize into the assertion superbox
    pub fn to_jumbf(&self) -> Result<SuperBox> {
        if let Some(sb) = &self.source_box {
            return Ok(sb.clone());
        }

        let wire = ActionsWire {
            actions: self
                .actions
                .iter()
                .map(|a| a.to_wire(self.version))
                .collect::<Result<Vec<_>>>()?,
            all_actions_included: self.all_actions_included,
            templates: if self.templates.is_empty() {
                None
            } else {
                Some(
                    self.templates
                        .iter()
                        .map(|t| TemplateWire {
                            action: t.action.clone(),
                            software_agent: t.software_agent.clone(),
                            software_agent_index: t.software_agent_index,
                            digital_source_type: t.digital_source_type.clone(),
                            description: t.description.clone(),
                            template_parameters: if t.template_parameters.is_empty() {
                                None
                            } else {
                                Some(t.template_parameters.clone())
                            },
                        })
                        .collect(),
                )
            },
            software_agents: if self.software_agents.is_empty() {
                None
            } else {
                Some(self.software_agents.clone())
            },
            metadata: self.metadata.clone(),
        };

        let mut sb = SuperBox::new(CBOR_ASSERTION_UUID, self.full_label());
        sb.push_child(ChildBox::Cbor(serde_cbor::to_vec(&wire)?));
        Ok(sb)
    }

    /// The software agent for an action, resolving V2 table references
    pub fn resolved_software_agent<'a>(&'a self, action: &'a Action) -> Option<serde_cbor::Value> {
        if let Some(agent) = &action.software_agent {
            return Some(agent.clone());
        }
        let index = action.software_agent_index?;
        let info = self.software_agents.get(index)?;
        serde_cbor::value::to_value(info.clone()).ok()
    }

    /// Whether the history contains a `c2pa.created` or `c2pa.opened` entry
    pub fn has_origin_action(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.action == c2pa_action::CREATED || a.action == c2pa_action::OPENED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v1_single_ingredient_roundtrip() {
        let mut assertion = ActionsAssertion::new(1);
        let mut opened = Action::new(c2pa_action::OPENED);
        opened.ingredients.push(HashedUri::new(
            "self#jumbf=c2pa.assertions/c2pa.ingredient",
            None,
            vec![0x11; 32],
        ));
        assertion.add_action(opened);

        let sb = assertion.to_jumbf().unwrap();
        let parsed = ActionsAssertion::from_jumbf(&sb, labels::ACTIONS, None).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.actions.len(), 1);
        assert_eq!(parsed.actions[0].ingredients.len(), 1);
        assert_eq!(
            parsed.to_jumbf().unwrap().to_vec().unwrap(),
            sb.to_vec().unwrap()
        );
    }

    #[test]
    fn test_v1_rejects_multiple_ingredients() {
        let mut assertion = ActionsAssertion::new(1);
        let mut placed = Action::new(c2pa_action::PLACED);
        placed
            .ingredients
            .push(HashedUri::new("self#jumbf=a", None, vec![0; 32]));
        placed
            .ingredients
            .push(HashedUri::new("self#jumbf=b", None, vec![0; 32]));
        assertion.add_action(placed);

        assert!(matches!(
            assertion.to_jumbf(),
            Err(Error::ActionIngredientCardinality)
        ));
    }

    #[test]
    fn test_v2_many_ingredients_and_agent_table() {
        let mut assertion = ActionsAssertion::new(2);
        assertion
            .software_agents
            .push(GeneratorInfo::new("editor", Some("2.1".to_string())));

        let mut placed = Action::new(c2pa_action::PLACED);
        placed
            .ingredients
            .push(HashedUri::new("self#jumbf=a", None, vec![1; 32]));
        placed
            .ingredients
            .push(HashedUri::new("self#jumbf=b", None, vec![2; 32]));
        placed.software_agent_index = Some(0);
        assertion.add_action(placed);

        let sb = assertion.to_jumbf().unwrap();
        let parsed = ActionsAssertion::from_jumbf(&sb, labels::ACTIONS_V2, None).unwrap();
        assert_eq!(parsed.actions[0].ingredients.len(), 2);

        let agent = parsed.resolved_software_agent(&parsed.actions[0]).unwrap();
        let info: GeneratorInfo = serde_cbor::value::from_value(agent).unwrap();
        assert_eq!(info.name, "editor");
    }

    #[test]
    fn test_redacted_parameter_roundtrip() {
        let mut assertion = ActionsAssertion::new(2);
        let mut redaction = Action::new(c2pa_action::REDACTED);
        redaction.redacted = Some("self#jumbf=c2pa.assertions/stds.exif".to_string());
        assertion.add_action(redaction);

        let parsed =
            ActionsAssertion::from_jumbf(&assertion.to_jumbf().unwrap(), labels::ACTIONS_V2, None)
                .unwrap();
        assert_eq!(
            parsed.actions[0].redacted.as_deref(),
            Some("self#jumbf=c2pa.assertions/stds.exif")
        );
    }

    #[test]
    fn test_free_form_parameters_preserved() {
        let mut assertion = ActionsAssertion::new(2);
        let mut edited = Action::new(c2pa_action::EDITED);
        edited.parameters.insert(
            "name".to_string(),
            serde_cbor::Value::Text("gradient".to_string()),
        );
        assertion.add_action(edited);

        let parsed =
            ActionsAssertion::from_jumbf(&assertion.to_jumbf().unwrap(), labels::ACTIONS_V2, None)
                .unwrap();
        assert_eq!(
            parsed.actions[0].parameters.get("name"),
            Some(&serde_cbor::Value::Text("gradient".to_string()))
        );
    }

    #[test]
    fn test_vocabulary_rules() {
        assert!(requires_ingredient(c2pa_action::OPENED));
        assert!(!requires_ingredient(c2pa_action::PLACED));
        assert!(takes_ingredients(c2pa_action::PLACED));
        assert!(!takes_ingredients(c2pa_action::CREATED));
        assert_eq!(
            expected_relationship(c2pa_action::TRANSCODED),
            Some(Relationship::ParentOf)
        );
        assert_eq!(
            expected_relationship(c2pa_action::REMOVED),
            Some(Relationship::ComponentOf)
        );
        assert_eq!(expected_relationship(c2pa_action::CREATED), None);
    }

    #[test]
    fn test_templates_roundtrip() {
        let mut assertion = ActionsAssertion::new(2);
        assertion.templates.push(ActionTemplate {
            action: c2pa_action::EDITED.to_string(),
            description: Some("default edit".to_string()),
            ..Default::default()
        });
        assertion.add_action(Action::new(c2pa_action::EDITED));

        let parsed =
            ActionsAssertion::from_jumbf(&assertion.to_jumbf().unwrap(), labels::ACTIONS_V2, None)
                .unwrap();
        assert_eq!(parsed.templates.len(), 1);
        assert_eq!(parsed.templates[0].description.as_deref(), Some("default edit"));
    }
}

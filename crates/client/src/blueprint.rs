use std::collections::BTreeMap;

use simlink_common::ActorKind;

/// Attribute carrying the actor's role name.
pub const ROLE_NAME: &str = "role_name";
/// Attribute some walker blueprints expose to make them ignore damage.
pub const IS_INVINCIBLE: &str = "is_invincible";

/// A spawnable template resolved by the simulator.
///
/// Attributes are kept in a BTreeMap so that serialized spawn requests are
/// byte-for-byte stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blueprint {
    id: String,
    attributes: BTreeMap<String, String>,
}

impl Blueprint {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ActorKind {
        ActorKind::from_blueprint_id(&self.id)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

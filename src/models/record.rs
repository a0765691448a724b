//! Flattened building element records.

use serde::{Deserialize, Serialize};

use crate::ifc::PropertySets;

/// One building element, flattened for the assistant.
///
/// Serialized with the key names of the exchange format the assistant's
/// instructions describe (`ExpressID`, `GlobalId`, `Class`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedEntityRecord {
    /// Model-local express id.
    #[serde(rename = "ExpressID")]
    pub express_id: u64,
    /// Globally unique id within the model.
    #[serde(rename = "GlobalId")]
    pub global_id: String,
    /// Entity class, e.g. `IfcWall`. Never empty.
    #[serde(rename = "Class")]
    pub entity_class: String,
    /// Predefined type, empty when unset.
    #[serde(rename = "PredefinedType", default)]
    pub predefined_type: String,
    /// Element name, empty when unset.
    #[serde(rename = "Name", default)]
    pub name: String,
    /// Name of the containing spatial structure, empty when there is none.
    #[serde(rename = "Level", default)]
    pub containing_level_name: String,
    /// Name of the assigned type object, empty when there is none.
    #[serde(rename = "ObjectType", default)]
    pub type_name: String,
    /// Quantity sets.
    #[serde(rename = "QuantitySets", default)]
    pub quantity_properties: PropertySets,
    /// Descriptive property sets.
    #[serde(rename = "PropertySets", default)]
    pub general_properties: PropertySets,
}

impl FlattenedEntityRecord {
    /// Creates a record with only the identifying fields set.
    #[must_use]
    pub fn new(
        express_id: u64,
        global_id: impl Into<String>,
        entity_class: impl Into<String>,
    ) -> Self {
        Self {
            express_id,
            global_id: global_id.into(),
            entity_class: entity_class.into(),
            predefined_type: String::new(),
            name: String::new(),
            containing_level_name: String::new(),
            type_name: String::new(),
            quantity_properties: PropertySets::new(),
            general_properties: PropertySets::new(),
        }
    }

    /// Returns true when the element has a spatial container.
    #[must_use]
    pub fn is_contained(&self) -> bool {
        !self.containing_level_name.is_empty()
    }
}

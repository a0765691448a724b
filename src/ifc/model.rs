//! In-memory IFC model with relationship indices.

use std::collections::{BTreeMap, HashMap};

use super::schema::{self, SchemaVersion, attr};
use super::step::{Instance, StepFile, Value};
use crate::{Error, Result};

/// An entity instance of a parsed model.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Express id (`#42`), unique within one file only.
    pub id: u64,
    /// Upper-case STEP keyword, e.g. `IFCWALL`.
    pub keyword: String,
    /// Canonical class name when the class is known, e.g. `IfcWall`.
    pub class: Option<&'static str>,
    /// Attribute values in schema order.
    pub attributes: Vec<Value>,
}

impl Entity {
    /// Attribute at `index`, `None` when out of range or unset.
    #[must_use]
    pub fn attribute(&self, index: usize) -> Option<&Value> {
        self.attributes.get(index).filter(|value| !value.is_unset())
    }

    /// String attribute at `index`.
    #[must_use]
    pub fn str_attribute(&self, index: usize) -> Option<&str> {
        self.attribute(index).and_then(Value::as_str)
    }

    /// Enumeration attribute at `index`.
    #[must_use]
    pub fn enum_attribute(&self, index: usize) -> Option<&str> {
        self.attribute(index).and_then(Value::as_enum)
    }

    /// `IfcRoot.GlobalId`.
    #[must_use]
    pub fn global_id(&self) -> Option<&str> {
        self.str_attribute(attr::GLOBAL_ID)
    }

    /// `IfcRoot.Name`.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.str_attribute(attr::NAME)
    }

    /// Class name as the schema spells it, falling back to the raw keyword.
    #[must_use]
    pub fn class_name(&self) -> &str {
        self.class.unwrap_or(self.keyword.as_str())
    }

    /// Returns true when the keyword matches `keyword` (upper case).
    #[must_use]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.keyword.eq_ignore_ascii_case(keyword)
    }
}

/// A parsed IFC model: entities by express id plus inverse relationship indices.
#[derive(Debug, Clone)]
pub struct IfcModel {
    schema: SchemaVersion,
    entities: BTreeMap<u64, Entity>,
    /// element -> spatial structure (`IfcRelContainedInSpatialStructure`)
    contained_in: HashMap<u64, u64>,
    /// part -> whole (`IfcRelAggregates`)
    decomposes: HashMap<u64, u64>,
    /// occurrence -> type object (`IfcRelDefinesByType`)
    typed_by: HashMap<u64, u64>,
    /// object -> property definitions, in relationship order (`IfcRelDefinesByProperties`)
    defined_by: HashMap<u64, Vec<u64>>,
}

impl IfcModel {
    /// Builds a model from a parsed STEP file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModelFile`] when the header names no IFC schema or an
    /// express id is used twice.
    pub fn from_step(file: StepFile) -> Result<Self> {
        let identifier = file
            .schema_identifier()
            .ok_or_else(|| Error::InvalidModelFile("FILE_SCHEMA header missing".to_string()))?;
        let schema = SchemaVersion::parse(identifier)?;

        let mut entities = BTreeMap::new();
        for Instance {
            id,
            keyword,
            attributes,
        } in file.instances
        {
            let class = schema::canonical_name(&keyword);
            let entity = Entity {
                id,
                keyword,
                class,
                attributes,
            };
            if entities.insert(id, entity).is_some() {
                return Err(Error::InvalidModelFile(format!(
                    "duplicate instance #{id}"
                )));
            }
        }

        let mut model = Self {
            schema,
            entities,
            contained_in: HashMap::new(),
            decomposes: HashMap::new(),
            typed_by: HashMap::new(),
            defined_by: HashMap::new(),
        };
        model.index_relationships();
        Ok(model)
    }

    fn index_relationships(&mut self) {
        for entity in self.entities.values() {
            let related = || {
                entity
                    .attributes
                    .get(attr::REL_RELATED)
                    .map(Value::refs)
                    .unwrap_or_default()
            };
            let relating = entity
                .attributes
                .get(attr::REL_RELATING)
                .and_then(Value::as_ref_id);

            match entity.keyword.as_str() {
                "IFCRELCONTAINEDINSPATIALSTRUCTURE" => {
                    if let Some(structure) = relating {
                        for element in related() {
                            self.contained_in.entry(element).or_insert(structure);
                        }
                    }
                },
                "IFCRELDEFINESBYTYPE" => {
                    if let Some(type_object) = relating {
                        for object in related() {
                            self.typed_by.entry(object).or_insert(type_object);
                        }
                    }
                },
                "IFCRELDEFINESBYPROPERTIES" => {
                    // IFC4X3 allows a set of definitions in the relating slot.
                    let definitions = entity
                        .attributes
                        .get(attr::REL_RELATING)
                        .map(Value::refs)
                        .unwrap_or_default();
                    for object in related() {
                        self.defined_by
                            .entry(object)
                            .or_default()
                            .extend(definitions.iter().copied());
                    }
                },
                "IFCRELAGGREGATES" => {
                    let whole = entity
                        .attributes
                        .get(attr::AGGREGATE_WHOLE)
                        .and_then(Value::as_ref_id);
                    let parts = entity
                        .attributes
                        .get(attr::AGGREGATE_PARTS)
                        .map(Value::refs)
                        .unwrap_or_default();
                    if let Some(whole) = whole {
                        for part in parts {
                            self.decomposes.entry(part).or_insert(whole);
                        }
                    }
                },
                _ => {},
            }
        }
    }

    /// Schema release of the file.
    #[must_use]
    pub const fn schema(&self) -> SchemaVersion {
        self.schema
    }

    /// Number of entity instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true when the data section was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity by express id.
    #[must_use]
    pub fn by_id(&self, id: u64) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// All instances of `class` and its subtypes, in express id order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the class does not exist in the file's schema.
    pub fn by_type(&self, class: &str) -> Result<Vec<&Entity>> {
        let target = self.schema.resolve_class(class).ok_or_else(|| {
            Error::InvalidInput(format!("class '{class}' not found in schema {}", self.schema))
        })?;
        Ok(self
            .entities
            .values()
            .filter(|entity| {
                entity
                    .class
                    .is_some_and(|name| self.schema.is_subtype_of(name, target))
            })
            .collect())
    }

    /// Spatial structure element directly containing `id`.
    #[must_use]
    pub fn direct_container(&self, id: u64) -> Option<&Entity> {
        self.contained_in.get(&id).and_then(|c| self.by_id(*c))
    }

    /// Whole that `id` is an aggregated part of.
    #[must_use]
    pub fn aggregate(&self, id: u64) -> Option<&Entity> {
        self.decomposes.get(&id).and_then(|w| self.by_id(*w))
    }

    /// Type object assigned to `id`.
    #[must_use]
    pub fn type_object(&self, id: u64) -> Option<&Entity> {
        self.typed_by.get(&id).and_then(|t| self.by_id(*t))
    }

    /// Property definitions assigned to `id`, in file order of their relationships.
    pub fn property_definitions(&self, id: u64) -> impl Iterator<Item = &Entity> {
        self.defined_by
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|d| self.by_id(*d))
    }

    /// Resolves every reference in `value` to an entity, skipping dangling ones.
    pub fn resolve_refs<'a>(
        &'a self,
        value: Option<&'a Value>,
    ) -> impl Iterator<Item = &'a Entity> {
        value
            .map(Value::refs)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.by_id(id))
    }
}

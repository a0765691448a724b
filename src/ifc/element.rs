//! Element accessors: container, type, predefined type and property sets.
//!
//! These follow the lookup rules common IFC toolkits apply, so that the flattened
//! output matches what users see in other viewers.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Number, Value as Json};

use super::model::{Entity, IfcModel};
use super::schema::attr;
use super::step::Value;

/// Property sets of one element: set name to property name to value.
pub type PropertySets = BTreeMap<String, Map<String, Json>>;

/// Which property definitions [`get_psets`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsetFilter {
    /// `IfcElementQuantity` sets only.
    QuantitiesOnly,
    /// Everything except quantity sets.
    PropertiesOnly,
}

impl PsetFilter {
    fn accepts(self, definition: &Entity) -> bool {
        let is_quantity = definition.is_keyword("IFCELEMENTQUANTITY");
        match self {
            Self::QuantitiesOnly => is_quantity,
            Self::PropertiesOnly => !is_quantity,
        }
    }
}

/// Spatial container of an element.
///
/// An aggregated part reports the container of its whole; otherwise the direct
/// `IfcRelContainedInSpatialStructure` target is returned.
#[must_use]
pub fn get_container<'a>(model: &'a IfcModel, element: &Entity) -> Option<&'a Entity> {
    let mut visited = HashSet::from([element.id]);
    let mut current = element.id;
    while let Some(whole) = model.aggregate(current) {
        if !visited.insert(whole.id) {
            break;
        }
        current = whole.id;
    }
    model
        .direct_container(current)
        .or_else(|| model.direct_container(element.id))
}

/// Type object of an element.
#[must_use]
pub fn get_type<'a>(model: &'a IfcModel, element: &Entity) -> Option<&'a Entity> {
    model.type_object(element.id)
}

/// Predefined type of an element.
///
/// `USERDEFINED` resolves to `ObjectType`; a missing or `NOTDEFINED` value falls
/// back to the type object's predefined type, whose `USERDEFINED` resolves to its
/// `ElementType`.
#[must_use]
pub fn get_predefined_type(model: &IfcModel, element: &Entity) -> Option<String> {
    let own = element
        .class
        .and_then(|class| model.schema().predefined_type_index(class))
        .and_then(|index| element.enum_attribute(index));

    match own {
        Some("USERDEFINED") => {
            if let Some(object_type) = element.str_attribute(attr::OBJECT_TYPE) {
                return Some(object_type.to_string());
            }
        },
        Some("NOTDEFINED") | None => {},
        Some(value) => return Some(value.to_string()),
    }

    let type_object = get_type(model, element)?;
    match type_object.enum_attribute(attr::TYPE_PREDEFINED_TYPE) {
        Some("USERDEFINED") => type_object
            .str_attribute(attr::ELEMENT_TYPE)
            .map(str::to_string)
            .or_else(|| own.map(str::to_string)),
        Some("NOTDEFINED") | None => own.map(str::to_string),
        Some(value) => Some(value.to_string()),
    }
}

/// Property sets of an element, filtered by kind.
///
/// Sets inherited from the type object are merged with occurrence sets of the same
/// name, occurrence values winning. Each set carries an `id` entry with the express
/// id of the last definition merged into it.
#[must_use]
pub fn get_psets(model: &IfcModel, element: &Entity, filter: PsetFilter) -> PropertySets {
    let mut result = PropertySets::new();

    if let Some(type_object) = get_type(model, element) {
        let definitions =
            model.resolve_refs(type_object.attribute(attr::TYPE_HAS_PROPERTY_SETS));
        for definition in definitions.filter(|d| filter.accepts(d)) {
            insert_definition(model, definition, &mut result);
        }
    }

    for definition in model
        .property_definitions(element.id)
        .filter(|d| filter.accepts(d))
    {
        insert_definition(model, definition, &mut result);
    }

    result
}

fn insert_definition(model: &IfcModel, definition: &Entity, out: &mut PropertySets) {
    let values = match definition.keyword.as_str() {
        "IFCELEMENTQUANTITY" => quantities(model, definition.attribute(attr::QTO_QUANTITIES)),
        "IFCPROPERTYSET" => properties(model, definition.attribute(attr::PSET_PROPERTIES)),
        _ => return,
    };
    let Some(name) = definition.name() else {
        return;
    };
    let set = out.entry(name.to_string()).or_default();
    set.extend(values);
    set.insert("id".to_string(), Json::from(definition.id));
}

fn quantities(model: &IfcModel, refs: Option<&Value>) -> Map<String, Json> {
    let mut out = Map::new();
    for quantity in model.resolve_refs(refs) {
        let Some(name) = quantity.str_attribute(attr::PROP_NAME) else {
            continue;
        };
        let value = if quantity.is_keyword("IFCPHYSICALCOMPLEXQUANTITY") {
            let mut nested = quantities(model, quantity.attribute(attr::PROP_VALUE));
            nested.insert("id".to_string(), Json::from(quantity.id));
            Json::Object(nested)
        } else {
            quantity
                .attribute(attr::QUANTITY_VALUE)
                .map_or(Json::Null, to_json)
        };
        out.insert(name.to_string(), value);
    }
    out
}

fn properties(model: &IfcModel, refs: Option<&Value>) -> Map<String, Json> {
    let mut out = Map::new();
    for property in model.resolve_refs(refs) {
        let Some(name) = property.str_attribute(attr::PROP_NAME) else {
            continue;
        };
        let value = match property.keyword.as_str() {
            "IFCPROPERTYSINGLEVALUE" | "IFCPROPERTYENUMERATEDVALUE" | "IFCPROPERTYLISTVALUE" => {
                property
                    .attribute(attr::PROP_VALUE)
                    .map_or(Json::Null, to_json)
            },
            "IFCPROPERTYBOUNDEDVALUE" => {
                let mut bounds = Map::new();
                bounds.insert(
                    "UpperBoundValue".to_string(),
                    property.attribute(attr::PROP_VALUE).map_or(Json::Null, to_json),
                );
                bounds.insert(
                    "LowerBoundValue".to_string(),
                    property
                        .attribute(attr::PROP_LOWER_BOUND)
                        .map_or(Json::Null, to_json),
                );
                Json::Object(bounds)
            },
            "IFCCOMPLEXPROPERTY" => {
                let mut nested = properties(model, property.attribute(attr::COMPLEX_PROPERTIES));
                nested.insert("id".to_string(), Json::from(property.id));
                Json::Object(nested)
            },
            _ => continue,
        };
        out.insert(name.to_string(), value);
    }
    out
}

/// Converts a STEP value to JSON, unwrapping typed measures (`IFCLABEL('x')` becomes `"x"`).
#[must_use]
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Null | Value::Derived => Json::Null,
        Value::Integer(i) => Json::from(*i),
        Value::Real(r) => Number::from_f64(*r).map_or(Json::Null, Json::Number),
        Value::String(s) | Value::Binary(s) => Json::String(s.clone()),
        Value::Enum(e) => match e.as_str() {
            "T" => Json::Bool(true),
            "F" => Json::Bool(false),
            "U" => Json::Null,
            _ => Json::String(e.clone()),
        },
        Value::Ref(id) => Json::String(format!("#{id}")),
        Value::List(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Typed(_, inner) => to_json(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifc::step;

    fn model(data: &str) -> IfcModel {
        let src = format!(
            "ISO-10303-21;HEADER;FILE_SCHEMA(('IFC4'));ENDSEC;DATA;{data}ENDSEC;END-ISO-10303-21;"
        );
        IfcModel::from_step(step::parse(&src).unwrap()).unwrap()
    }

    #[test]
    fn test_container_via_aggregate_whole() {
        let m = model(
            "#1=IFCSTAIR('s',$,'Stair',$,$,$,$,$,.STRAIGHT_RUN_STAIR.);\
             #2=IFCSTAIRFLIGHT('f',$,'Flight',$,$,$,$,$,$,$,$,$,.STRAIGHT.);\
             #3=IFCRELAGGREGATES('a',$,$,$,#1,(#2));\
             #4=IFCBUILDINGSTOREY('l',$,'Ground Floor',$,$,$,$,$,.ELEMENT.,0.);\
             #5=IFCRELCONTAINEDINSPATIALSTRUCTURE('c',$,$,$,(#1),#4);",
        );
        let flight = m.by_id(2).unwrap();
        assert_eq!(
            get_container(&m, flight).and_then(Entity::name),
            Some("Ground Floor")
        );
        assert_eq!(get_predefined_type(&m, flight).as_deref(), Some("STRAIGHT"));
    }

    #[test]
    fn test_container_absent() {
        let m = model("#1=IFCWALL('w',$,$,$,$,$,$,$,$);");
        assert!(get_container(&m, m.by_id(1).unwrap()).is_none());
    }

    #[test]
    fn test_aggregate_cycle_terminates() {
        let m = model(
            "#1=IFCWALL('a',$,$,$,$,$,$,$,$);#2=IFCWALL('b',$,$,$,$,$,$,$,$);\
             #3=IFCRELAGGREGATES('x',$,$,$,#1,(#2));#4=IFCRELAGGREGATES('y',$,$,$,#2,(#1));",
        );
        assert!(get_container(&m, m.by_id(1).unwrap()).is_none());
    }

    #[test]
    fn test_predefined_type_userdefined_uses_object_type() {
        let m = model("#1=IFCWALL('w',$,$,$,'Acoustic',$,$,$,.USERDEFINED.);");
        assert_eq!(
            get_predefined_type(&m, m.by_id(1).unwrap()).as_deref(),
            Some("Acoustic")
        );
    }

    #[test]
    fn test_predefined_type_falls_back_to_type_object() {
        let m = model(
            "#1=IFCWALL('w',$,$,$,$,$,$,$,.NOTDEFINED.);\
             #2=IFCWALLTYPE('t',$,'Basic',$,$,$,$,$,$,.PARTITIONING.);\
             #3=IFCRELDEFINESBYTYPE('r',$,$,$,(#1),#2);\
             #4=IFCSLAB('s',$,$,$,$,$,$,$,$);\
             #5=IFCSLABTYPE('st',$,$,$,$,$,$,$,'Custom Deck',.USERDEFINED.);\
             #6=IFCRELDEFINESBYTYPE('r2',$,$,$,(#4),#5);",
        );
        assert_eq!(
            get_predefined_type(&m, m.by_id(1).unwrap()).as_deref(),
            Some("PARTITIONING")
        );
        assert_eq!(
            get_predefined_type(&m, m.by_id(4).unwrap()).as_deref(),
            Some("Custom Deck")
        );
    }

    #[test]
    fn test_psets_split_and_type_inheritance() {
        let m = model(
            "#1=IFCWALL('w',$,$,$,$,$,$,$,$);\
             #10=IFCPROPERTYSINGLEVALUE('IsExternal',$,IFCBOOLEAN(.T.),$);\
             #11=IFCPROPERTYSINGLEVALUE('FireRating',$,IFCLABEL('REI60'),$);\
             #12=IFCPROPERTYSET('p1',$,'Pset_WallCommon',$,(#10,#11));\
             #13=IFCRELDEFINESBYPROPERTIES('r1',$,$,$,(#1),#12);\
             #20=IFCQUANTITYLENGTH('Length',$,$,5.2,$);\
             #21=IFCQUANTITYAREA('NetSideArea',$,$,14.,$);\
             #22=IFCELEMENTQUANTITY('q1',$,'Qto_WallBaseQuantities',$,$,(#20,#21));\
             #23=IFCRELDEFINESBYPROPERTIES('r2',$,$,$,(#1),#22);\
             #30=IFCPROPERTYSINGLEVALUE('FireRating',$,IFCLABEL('REI30'),$);\
             #31=IFCPROPERTYSET('p2',$,'Pset_WallCommon',$,(#30));\
             #32=IFCPROPERTYSINGLEVALUE('Manufacturer',$,IFCLABEL('ACME'),$);\
             #33=IFCPROPERTYSET('p3',$,'Pset_ManufacturerTypeInformation',$,(#32));\
             #34=IFCWALLTYPE('t',$,'Basic',$,$,(#31,#33),$,$,$,.STANDARD.);\
             #35=IFCRELDEFINESBYTYPE('r3',$,$,$,(#1),#34);",
        );
        let wall = m.by_id(1).unwrap();

        let psets = get_psets(&m, wall, PsetFilter::PropertiesOnly);
        assert_eq!(psets.len(), 2);
        let common = &psets["Pset_WallCommon"];
        assert_eq!(common["FireRating"], Json::from("REI60"));
        assert_eq!(common["IsExternal"], Json::Bool(true));
        assert_eq!(common["id"], Json::from(12));
        assert_eq!(
            psets["Pset_ManufacturerTypeInformation"]["Manufacturer"],
            Json::from("ACME")
        );

        let qtos = get_psets(&m, wall, PsetFilter::QuantitiesOnly);
        assert_eq!(qtos.len(), 1);
        let base = &qtos["Qto_WallBaseQuantities"];
        assert_eq!(base["Length"], Json::from(5.2));
        assert_eq!(base["NetSideArea"], Json::from(14.0));
    }

    #[test]
    fn test_bounded_and_enumerated_properties() {
        let m = model(
            "#1=IFCCOLUMN('c',$,$,$,$,$,$,$,$);\
             #2=IFCPROPERTYBOUNDEDVALUE('Temperature',$,IFCREAL(40.),IFCREAL(-10.),$,$);\
             #3=IFCPROPERTYENUMERATEDVALUE('Status',$,(IFCLABEL('NEW'),IFCLABEL('EXISTING')),$);\
             #4=IFCPROPERTYSET('p',$,'Pset_Custom',$,(#2,#3));\
             #5=IFCRELDEFINESBYPROPERTIES('r',$,$,$,(#1),#4);",
        );
        let psets = get_psets(&m, m.by_id(1).unwrap(), PsetFilter::PropertiesOnly);
        let custom = &psets["Pset_Custom"];
        assert_eq!(custom["Temperature"]["UpperBoundValue"], Json::from(40.0));
        assert_eq!(custom["Temperature"]["LowerBoundValue"], Json::from(-10.0));
        assert_eq!(custom["Status"], serde_json::json!(["NEW", "EXISTING"]));
    }
}

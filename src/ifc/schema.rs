//! IFC class hierarchy and attribute layout.
//!
//! Covers the element subtree needed for class-membership queries over building
//! elements, the spatial structure, and the relationship and property entities the
//! flattener reads. Attribute indices follow the EXPRESS declaration order.

use std::fmt;

use crate::{Error, Result};

/// IFC schema release named in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// IFC2X3 (TC1).
    Ifc2x3,
    /// IFC4 (ADD2 TC1).
    Ifc4,
    /// IFC4X3 (ADD2).
    Ifc4x3,
}

impl SchemaVersion {
    /// Parses a `FILE_SCHEMA` identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModelFile`] for schemas other than IFC2X3, IFC4 and IFC4X3.
    pub fn parse(identifier: &str) -> Result<Self> {
        let upper = identifier.trim().to_ascii_uppercase();
        if upper.starts_with("IFC2X3") {
            Ok(Self::Ifc2x3)
        } else if upper.starts_with("IFC4X3") {
            Ok(Self::Ifc4x3)
        } else if upper.starts_with("IFC4") {
            Ok(Self::Ifc4)
        } else {
            Err(Error::InvalidModelFile(format!(
                "unsupported schema '{identifier}'"
            )))
        }
    }

    /// Canonical identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ifc2x3 => "IFC2X3",
            Self::Ifc4 => "IFC4",
            Self::Ifc4x3 => "IFC4X3",
        }
    }

    /// Resolves a class name to its canonical spelling in this schema.
    ///
    /// Lookup is case-insensitive. `IfcBuildingElement` resolves to `IfcBuiltElement`
    /// in IFC4X3, where the class was renamed.
    #[must_use]
    pub fn resolve_class(self, name: &str) -> Option<&'static str> {
        let canonical = canonical_name(name)?;
        match (self, canonical) {
            (Self::Ifc4x3, "IfcBuildingElement") => Some("IfcBuiltElement"),
            (Self::Ifc2x3 | Self::Ifc4, "IfcBuiltElement") => None,
            _ if self.parent(canonical).is_some() || canonical == "IfcRoot" => Some(canonical),
            _ => None,
        }
    }

    /// Returns true when `class` equals `ancestor` or inherits from it.
    #[must_use]
    pub fn is_subtype_of(self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.parent(name);
        }
        false
    }

    /// Direct supertype of a canonical class name.
    #[must_use]
    #[allow(clippy::match_same_arms)]
    pub fn parent(self, class: &str) -> Option<&'static str> {
        let building = self.building_element_root();
        let parent = match class {
            "IfcRoot" => return None,
            "IfcObjectDefinition" | "IfcPropertyDefinition" | "IfcRelationship" => "IfcRoot",
            "IfcObject" | "IfcTypeObject" => "IfcObjectDefinition",
            "IfcProduct" => "IfcObject",
            "IfcElement" => "IfcProduct",
            "IfcTypeProduct" => "IfcTypeObject",
            "IfcElementType" => "IfcTypeProduct",

            // Building elements
            "IfcBuildingElement" if self != Self::Ifc4x3 => "IfcElement",
            "IfcBuiltElement" if self == Self::Ifc4x3 => "IfcElement",
            "IfcBeam" | "IfcBuildingElementProxy" | "IfcColumn" | "IfcCovering"
            | "IfcCurtainWall" | "IfcDoor" | "IfcFooting" | "IfcMember" | "IfcPlate"
            | "IfcRailing" | "IfcRamp" | "IfcRampFlight" | "IfcRoof" | "IfcSlab"
            | "IfcStair" | "IfcStairFlight" | "IfcWall" | "IfcWindow" => building,
            "IfcChimney" | "IfcShadingDevice" if self != Self::Ifc2x3 => building,
            "IfcPile" if self == Self::Ifc4x3 => "IfcDeepFoundation",
            "IfcPile" => building,
            "IfcWallStandardCase" => "IfcWall",
            "IfcWallElementedCase" | "IfcBeamStandardCase" | "IfcColumnStandardCase"
            | "IfcDoorStandardCase" | "IfcMemberStandardCase" | "IfcPlateStandardCase"
            | "IfcSlabElementedCase" | "IfcSlabStandardCase" | "IfcWindowStandardCase"
                if self == Self::Ifc4 =>
            {
                standard_case_parent(class)?
            },
            "IfcBuildingElementComponent" if self == Self::Ifc2x3 => "IfcBuildingElement",
            "IfcElementComponent" if self != Self::Ifc2x3 => "IfcElement",
            "IfcBuildingElementPart" | "IfcReinforcingElement" => {
                if self == Self::Ifc2x3 {
                    "IfcBuildingElementComponent"
                } else {
                    "IfcElementComponent"
                }
            },
            "IfcReinforcingBar" | "IfcReinforcingMesh" | "IfcTendon" | "IfcTendonAnchor" => {
                "IfcReinforcingElement"
            },
            "IfcBearing" | "IfcCourse" | "IfcDeepFoundation" | "IfcEarthworksElement"
            | "IfcKerb" | "IfcPavement" | "IfcRail" | "IfcTrackElement"
            | "IfcNavigationElement" | "IfcMooringDevice"
                if self == Self::Ifc4x3 =>
            {
                "IfcBuiltElement"
            },
            "IfcCaissonFoundation" if self == Self::Ifc4x3 => "IfcDeepFoundation",

            // Other element branches, so queries for them resolve
            "IfcDistributionElement" | "IfcFurnishingElement" | "IfcFeatureElement"
            | "IfcTransportElement" | "IfcVirtualElement" | "IfcElementAssembly" => "IfcElement",
            "IfcOpeningElement" => "IfcFeatureElement",

            // Spatial structure
            "IfcSpatialElement" if self != Self::Ifc2x3 => "IfcProduct",
            "IfcSpatialStructureElement" => {
                if self == Self::Ifc2x3 {
                    "IfcProduct"
                } else {
                    "IfcSpatialElement"
                }
            },
            "IfcFacility" | "IfcFacilityPart" if self == Self::Ifc4x3 => {
                "IfcSpatialStructureElement"
            },
            "IfcBuilding" if self == Self::Ifc4x3 => "IfcFacility",
            "IfcBuilding" | "IfcBuildingStorey" | "IfcSite" | "IfcSpace" => {
                "IfcSpatialStructureElement"
            },

            _ => return None,
        };
        Some(parent)
    }

    const fn building_element_root(self) -> &'static str {
        match self {
            Self::Ifc4x3 => "IfcBuiltElement",
            Self::Ifc2x3 | Self::Ifc4 => "IfcBuildingElement",
        }
    }

    /// Attribute index of `PredefinedType` on an occurrence class, when it has one.
    #[must_use]
    pub fn predefined_type_index(self, class: &str) -> Option<usize> {
        match self {
            Self::Ifc2x3 => match class {
                "IfcCovering" | "IfcFooting" | "IfcPile" | "IfcRailing" | "IfcSlab" => Some(8),
                _ => None,
            },
            Self::Ifc4 | Self::Ifc4x3 => match class {
                "IfcDoor" | "IfcDoorStandardCase" | "IfcWindow" | "IfcWindowStandardCase" => {
                    Some(10)
                },
                "IfcStairFlight" => Some(12),
                "IfcElementAssembly" => Some(9),
                _ if self.is_subtype_of(class, self.building_element_root()) => Some(8),
                _ => None,
            },
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn standard_case_parent(class: &str) -> Option<&'static str> {
    let parent = match class {
        "IfcWallElementedCase" => "IfcWall",
        "IfcBeamStandardCase" => "IfcBeam",
        "IfcColumnStandardCase" => "IfcColumn",
        "IfcDoorStandardCase" => "IfcDoor",
        "IfcMemberStandardCase" => "IfcMember",
        "IfcPlateStandardCase" => "IfcPlate",
        "IfcSlabElementedCase" | "IfcSlabStandardCase" => "IfcSlab",
        "IfcWindowStandardCase" => "IfcWindow",
        _ => return None,
    };
    Some(parent)
}

/// Every class name this module knows, in canonical spelling.
const KNOWN_CLASSES: &[&str] = &[
    "IfcRoot",
    "IfcObjectDefinition",
    "IfcPropertyDefinition",
    "IfcRelationship",
    "IfcObject",
    "IfcTypeObject",
    "IfcProduct",
    "IfcElement",
    "IfcTypeProduct",
    "IfcElementType",
    "IfcBuildingElement",
    "IfcBuiltElement",
    "IfcBeam",
    "IfcBeamStandardCase",
    "IfcBuildingElementProxy",
    "IfcChimney",
    "IfcColumn",
    "IfcColumnStandardCase",
    "IfcCovering",
    "IfcCurtainWall",
    "IfcDoor",
    "IfcDoorStandardCase",
    "IfcFooting",
    "IfcMember",
    "IfcMemberStandardCase",
    "IfcPile",
    "IfcPlate",
    "IfcPlateStandardCase",
    "IfcRailing",
    "IfcRamp",
    "IfcRampFlight",
    "IfcRoof",
    "IfcShadingDevice",
    "IfcSlab",
    "IfcSlabElementedCase",
    "IfcSlabStandardCase",
    "IfcStair",
    "IfcStairFlight",
    "IfcWall",
    "IfcWallElementedCase",
    "IfcWallStandardCase",
    "IfcWindow",
    "IfcWindowStandardCase",
    "IfcBuildingElementComponent",
    "IfcElementComponent",
    "IfcBuildingElementPart",
    "IfcReinforcingElement",
    "IfcReinforcingBar",
    "IfcReinforcingMesh",
    "IfcTendon",
    "IfcTendonAnchor",
    "IfcBearing",
    "IfcCourse",
    "IfcDeepFoundation",
    "IfcCaissonFoundation",
    "IfcEarthworksElement",
    "IfcKerb",
    "IfcPavement",
    "IfcRail",
    "IfcTrackElement",
    "IfcNavigationElement",
    "IfcMooringDevice",
    "IfcDistributionElement",
    "IfcFurnishingElement",
    "IfcFeatureElement",
    "IfcOpeningElement",
    "IfcTransportElement",
    "IfcVirtualElement",
    "IfcElementAssembly",
    "IfcSpatialElement",
    "IfcSpatialStructureElement",
    "IfcFacility",
    "IfcFacilityPart",
    "IfcBuilding",
    "IfcBuildingStorey",
    "IfcSite",
    "IfcSpace",
];

/// Canonical spelling of a known class name (`IFCWALL` becomes `IfcWall`).
#[must_use]
pub fn canonical_name(name: &str) -> Option<&'static str> {
    KNOWN_CLASSES
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(name))
}

/// Attribute positions of the entities the flattener reads.
pub mod attr {
    /// `IfcRoot.GlobalId`
    pub const GLOBAL_ID: usize = 0;
    /// `IfcRoot.Name`
    pub const NAME: usize = 2;
    /// `IfcObject.ObjectType`
    pub const OBJECT_TYPE: usize = 4;
    /// `IfcTypeObject.HasPropertySets`
    pub const TYPE_HAS_PROPERTY_SETS: usize = 5;
    /// `IfcElementType.ElementType`
    pub const ELEMENT_TYPE: usize = 8;
    /// `PredefinedType` on `IfcElementType` subtypes.
    pub const TYPE_PREDEFINED_TYPE: usize = 9;

    /// `RelatedObjects` / `RelatedElements` of the assignment relationships
    /// (`IfcRelContainedInSpatialStructure`, `IfcRelDefinesByType`,
    /// `IfcRelDefinesByProperties`).
    pub const REL_RELATED: usize = 4;
    /// `RelatingStructure` / `RelatingType` / `RelatingPropertyDefinition`.
    pub const REL_RELATING: usize = 5;
    /// `IfcRelAggregates.RelatingObject` (the whole).
    pub const AGGREGATE_WHOLE: usize = 4;
    /// `IfcRelAggregates.RelatedObjects` (the parts).
    pub const AGGREGATE_PARTS: usize = 5;

    /// `IfcPropertySet.HasProperties`
    pub const PSET_PROPERTIES: usize = 4;
    /// `IfcElementQuantity.Quantities`
    pub const QTO_QUANTITIES: usize = 5;

    /// `IfcProperty.Name` / `IfcPhysicalQuantity.Name`
    pub const PROP_NAME: usize = 0;
    /// `IfcPropertySingleValue.NominalValue`, `IfcPropertyEnumeratedValue.EnumerationValues`,
    /// `IfcPropertyListValue.ListValues`, `IfcPropertyBoundedValue.UpperBoundValue`,
    /// `IfcComplexProperty.UsageName`, `IfcPhysicalComplexQuantity.HasQuantities`.
    pub const PROP_VALUE: usize = 2;
    /// `IfcPropertyBoundedValue.LowerBoundValue`
    pub const PROP_LOWER_BOUND: usize = 3;
    /// `IfcComplexProperty.HasProperties`
    pub const COMPLEX_PROPERTIES: usize = 3;
    /// Value slot of `IfcQuantityLength` and its siblings.
    pub const QUANTITY_VALUE: usize = 3;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("IFC2X3", SchemaVersion::Ifc2x3)]
    #[test_case("IFC4", SchemaVersion::Ifc4)]
    #[test_case("ifc4", SchemaVersion::Ifc4 ; "lower case")]
    #[test_case("IFC4X3_ADD2", SchemaVersion::Ifc4x3)]
    fn test_schema_parse(identifier: &str, expected: SchemaVersion) {
        assert_eq!(SchemaVersion::parse(identifier).unwrap(), expected);
    }

    #[test]
    fn test_schema_parse_rejects_unknown() {
        assert!(SchemaVersion::parse("AP214").is_err());
    }

    #[test]
    fn test_canonical_name_is_case_insensitive() {
        assert_eq!(canonical_name("IFCWALLSTANDARDCASE"), Some("IfcWallStandardCase"));
        assert_eq!(canonical_name("ifcbuildingstorey"), Some("IfcBuildingStorey"));
        assert_eq!(canonical_name("IFCPERSON"), None);
    }

    #[test_case(SchemaVersion::Ifc4, "IfcWallStandardCase", "IfcBuildingElement", true)]
    #[test_case(SchemaVersion::Ifc4, "IfcSlabElementedCase", "IfcBuildingElement", true)]
    #[test_case(SchemaVersion::Ifc2x3, "IfcReinforcingBar", "IfcBuildingElement", true)]
    #[test_case(SchemaVersion::Ifc4, "IfcReinforcingBar", "IfcBuildingElement", false)]
    #[test_case(SchemaVersion::Ifc4x3, "IfcPile", "IfcBuiltElement", true)]
    #[test_case(SchemaVersion::Ifc4, "IfcBuildingStorey", "IfcBuildingElement", false)]
    #[test_case(SchemaVersion::Ifc4, "IfcOpeningElement", "IfcElement", true)]
    fn test_subtype(schema: SchemaVersion, class: &str, ancestor: &str, expected: bool) {
        assert_eq!(schema.is_subtype_of(class, ancestor), expected);
    }

    #[test]
    fn test_resolve_building_element_alias() {
        assert_eq!(
            SchemaVersion::Ifc4x3.resolve_class("IfcBuildingElement"),
            Some("IfcBuiltElement")
        );
        assert_eq!(
            SchemaVersion::Ifc4.resolve_class("IFCBUILDINGELEMENT"),
            Some("IfcBuildingElement")
        );
        assert_eq!(SchemaVersion::Ifc4.resolve_class("IfcBuiltElement"), None);
        assert_eq!(SchemaVersion::Ifc2x3.resolve_class("IfcChimney"), None);
        assert_eq!(SchemaVersion::Ifc4.resolve_class("IfcUnknownThing"), None);
    }

    #[test_case(SchemaVersion::Ifc4, "IfcWall", Some(8))]
    #[test_case(SchemaVersion::Ifc4, "IfcDoor", Some(10))]
    #[test_case(SchemaVersion::Ifc4, "IfcStairFlight", Some(12))]
    #[test_case(SchemaVersion::Ifc2x3, "IfcWall", None)]
    #[test_case(SchemaVersion::Ifc2x3, "IfcSlab", Some(8))]
    #[test_case(SchemaVersion::Ifc4, "IfcBuildingStorey", None)]
    fn test_predefined_type_index(schema: SchemaVersion, class: &str, expected: Option<usize>) {
        assert_eq!(schema.predefined_type_index(class), expected);
    }
}

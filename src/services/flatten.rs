//! Model flattening.
//!
//! Turns the elements of one IFC class into [`FlattenedEntityRecord`]s and persists
//! them as the JSON document handed to the assistant.

use std::path::Path;

use crate::ifc::{self, Entity, IfcModel, PsetFilter};
use crate::models::FlattenedEntityRecord;
use crate::{Error, Result};

/// Flattens every instance of `class` (subtypes included), in express id order.
///
/// Missing optional data yields empty fields; no element is ever skipped.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `class` is not part of the model's schema.
pub fn flatten(model: &IfcModel, class: &str) -> Result<Vec<FlattenedEntityRecord>> {
    let elements = model.by_type(class)?;
    let records: Vec<FlattenedEntityRecord> = elements
        .into_iter()
        .map(|element| flatten_element(model, element))
        .collect();
    tracing::info!(
        class,
        schema = %model.schema(),
        count = records.len(),
        "Flattened model"
    );
    Ok(records)
}

/// Flattens one element.
#[must_use]
pub fn flatten_element(model: &IfcModel, element: &Entity) -> FlattenedEntityRecord {
    let mut record = FlattenedEntityRecord::new(
        element.id,
        element.global_id().unwrap_or_default(),
        element.class_name(),
    );
    record.predefined_type = ifc::get_predefined_type(model, element).unwrap_or_default();
    record.name = element.name().unwrap_or_default().to_string();
    record.containing_level_name = ifc::get_container(model, element)
        .and_then(Entity::name)
        .unwrap_or_default()
        .to_string();
    record.type_name = ifc::get_type(model, element)
        .and_then(Entity::name)
        .unwrap_or_default()
        .to_string();
    record.quantity_properties = ifc::get_psets(model, element, PsetFilter::QuantitiesOnly);
    record.general_properties = ifc::get_psets(model, element, PsetFilter::PropertiesOnly);
    record
}

/// Serializes records to the JSON document uploaded to the assistant.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if serialization fails.
pub fn records_to_json(records: &[FlattenedEntityRecord]) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(records).map_err(|e| Error::operation("serialize_records", e))
}

/// Writes records to `path`, replacing any previous file.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the directory or file cannot be written.
pub fn write_records(path: &Path, records: &[FlattenedEntityRecord]) -> Result<()> {
    let json = records_to_json(records)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_scratch_dir", e))?;
    }
    std::fs::write(path, json)
        .map_err(|e| Error::operation("write_model_data", format!("{}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), records = records.len(), "Wrote model data");
    Ok(())
}

/// Reads records previously written by [`write_records`].
///
/// # Errors
///
/// Returns [`Error::NoModelUploaded`] if the file does not exist and
/// [`Error::OperationFailed`] if it cannot be read or parsed.
pub fn read_records(path: &Path) -> Result<Vec<FlattenedEntityRecord>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Error::NoModelUploaded),
        Err(e) => {
            return Err(Error::operation(
                "read_model_data",
                format!("{}: {e}", path.display()),
            ));
        },
    };
    serde_json::from_slice(&data)
        .map_err(|e| Error::operation("parse_model_data", format!("{}: {e}", path.display())))
}

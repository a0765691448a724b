//! IFC building model reading.
//!
//! Parses IFC files in the STEP clear-text encoding and exposes the queries the
//! flattener needs: class membership, spatial containment, type assignment and
//! property sets.

mod element;
mod model;
pub mod schema;
pub mod step;

pub use element::{
    PropertySets, PsetFilter, get_container, get_predefined_type, get_psets, get_type, to_json,
};
pub use model::{Entity, IfcModel};
pub use schema::SchemaVersion;

use std::path::Path;

use crate::{Error, Result};

/// Parses IFC content held in memory.
///
/// # Errors
///
/// Returns [`Error::InvalidModelFile`] if the content is not a STEP file with an
/// IFC schema.
pub fn parse_str(content: &str) -> Result<IfcModel> {
    let file = step::parse(content)?;
    let model = IfcModel::from_step(file)?;
    tracing::debug!(
        schema = %model.schema(),
        entities = model.len(),
        "Parsed IFC model"
    );
    Ok(model)
}

/// Parses IFC content from raw upload bytes.
///
/// Non-UTF-8 bytes are replaced rather than rejected; STEP files are ASCII with
/// escapes, but exporters sometimes write Latin-1 names verbatim.
///
/// # Errors
///
/// Returns [`Error::InvalidModelFile`] on parse failure.
pub fn parse_bytes(content: &[u8]) -> Result<IfcModel> {
    parse_str(&String::from_utf8_lossy(content))
}

/// Reads and parses an IFC file.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the file cannot be read and
/// [`Error::InvalidModelFile`] if it cannot be parsed.
pub fn open(path: impl AsRef<Path>) -> Result<IfcModel> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| Error::OperationFailed {
        operation: "read_model_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    parse_bytes(&bytes)
}

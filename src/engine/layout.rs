//! Description of the feature table a tile query reads from.

use crate::error::ConfigError;

/// SRID of Web Mercator, the projection tiles are cut in.
pub const WEB_MERCATOR_SRID: i32 = 3857;

/// Default SRID of the stored geometries (the prepared dataset is already
/// reprojected to Web Mercator).
pub const DEFAULT_SOURCE_SRID: i32 = WEB_MERCATOR_SRID;

/// Feature table layout and the MVT layer it is published as.
///
/// All names are checked when the layout is built and are emitted
/// double-quoted, so they can be spliced into SQL safely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLayout {
    table: String,
    id_column: String,
    attributes: Vec<String>,
    geometry_column: String,
    layer: String,
    source_srid: i32,
}

impl FeatureLayout {
    /// Build a layout, validating every identifier.
    ///
    /// `table` may be schema-qualified (`schema.table`).
    pub fn new(
        table: impl Into<String>,
        id_column: impl Into<String>,
        attributes: Vec<String>,
        geometry_column: impl Into<String>,
        layer: impl Into<String>,
        source_srid: i32,
    ) -> Result<Self, ConfigError> {
        let table = table.into();
        let id_column = id_column.into();
        let geometry_column = geometry_column.into();
        let layer = layer.into();

        let mut parts = table.split('.');
        let qualified_ok = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => is_identifier(name),
            (Some(schema), Some(name), None) => is_identifier(schema) && is_identifier(name),
            _ => false,
        };
        if !qualified_ok {
            return Err(invalid("table", &table));
        }
        if !is_identifier(&id_column) {
            return Err(invalid("id_column", &id_column));
        }
        if let Some(bad) = attributes.iter().find(|a| !is_identifier(a)) {
            return Err(invalid("attributes", bad));
        }
        if !is_identifier(&geometry_column) {
            return Err(invalid("geometry_column", &geometry_column));
        }
        if !is_identifier(&layer) {
            return Err(invalid("layer", &layer));
        }
        if source_srid <= 0 {
            return Err(invalid("source_srid", &source_srid.to_string()));
        }

        Ok(Self {
            table,
            id_column,
            attributes,
            geometry_column,
            layer,
            source_srid,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn geometry_column(&self) -> &str {
        &self.geometry_column
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn source_srid(&self) -> i32 {
        self.source_srid
    }

    /// Whether stored geometries must be reprojected before tiling.
    pub fn needs_transform(&self) -> bool {
        self.source_srid != WEB_MERCATOR_SRID
    }

    /// The table name, quoted (`"schema"."table"`).
    pub fn quoted_table(&self) -> String {
        self.table
            .split('.')
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self {
            table: "mexico_city".to_string(),
            id_column: "gid".to_string(),
            attributes: vec!["clave".to_string(), "uso_suelo".to_string()],
            geometry_column: "geometry".to_string(),
            layer: "cadastre".to_string(),
            source_srid: DEFAULT_SOURCE_SRID,
        }
    }
}

/// Plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double-quote an identifier already checked by [`is_identifier`].
pub(crate) fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s)
}

fn invalid(field: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidIdentifier {
        field,
        value: value.to_string(),
    }
}

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::identity::IdentityReport;
use crate::tender::TenderAnalysis;
use crate::util::{is_blank, is_blank_text, join_values};

/// Version stamped on every JSON document stored in a workspace column.
pub const SCHEMA_VERSION: u32 = 1;

pub(crate) fn schema_version() -> u32 {
    SCHEMA_VERSION
}

/// RFC used by the source system when the bidder's tax id is unknown.
pub const PLACEHOLDER_RFC: &str = "XAXX010101000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Created,
    Analyzed,
    Generated,
}

impl WorkspaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Analyzed => "analyzed",
            Self::Generated => "generated",
        }
    }
}

impl FromStr for WorkspaceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "analyzed" => Ok(Self::Analyzed),
            "generated" => Ok(Self::Generated),
            _ => Err(format!("Invalid workspace status: {}", s)),
        }
    }
}

/// Kind of identity document attached to a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Tax-registration extract (Constancia de Situación Fiscal)
    Cif,
    /// Corporate charter (Acta Constitutiva)
    Acta,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cif => "cif",
            Self::Acta => "acta",
        }
    }
}

impl FromStr for IdentityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cif" => Ok(Self::Cif),
            "acta" => Ok(Self::Acta),
            _ => Err(format!("Unsupported context type: {}", s)),
        }
    }
}

/// Turn an LLM-produced object into flat string fields.
///
/// Nested objects and arrays are space-joined, nulls and blanks dropped,
/// and `representante` is mirrored into `representante_legal` when the
/// latter is missing.
pub fn flatten_fields(map: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in map {
        let text = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Object(o) => join_values(o.values()),
            Value::Array(a) => join_values(a.iter()),
            other => other.to_string(),
        };
        if !text.trim().is_empty() {
            out.insert(key, Value::String(text.trim().to_string()));
        }
    }
    if !out.contains_key("representante_legal") {
        if let Some(rep) = out.get("representante").cloned() {
            out.insert("representante_legal".to_string(), rep);
        }
    }
    out
}

/// Structured tax-registration data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CifData {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razon_social: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representante_legal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domicilio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domicilio_fiscal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo_persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regimen_fiscal: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CifData {
    pub fn from_fields(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(flatten_fields(map)))
            .context("Failed to build CIF record")
    }

    /// Marker stored when the LLM answer could not be parsed.
    pub fn format_error() -> Self {
        Self {
            rfc: Some("ERROR".to_string()),
            razon_social: Some("Error en formato CIF".to_string()),
            ..Self::empty()
        }
    }

    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            ..Default::default()
        }
    }

    pub fn address(&self) -> Option<&str> {
        non_blank(&self.domicilio_fiscal).or_else(|| non_blank(&self.domicilio))
    }
}

/// Structured corporate-charter data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActaData {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razon_social: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escritura_numero: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representante: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub representante_legal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cargo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tomo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notario_nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notario_numero: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciudad_estado: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_constitucion: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ActaData {
    pub fn from_fields(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(flatten_fields(map)))
            .context("Failed to build charter record")
    }

    pub fn format_error() -> Self {
        Self {
            razon_social: Some("Error en formato".to_string()),
            representante_legal: Some("ERROR".to_string()),
            cargo: Some("ERROR".to_string()),
            ..Self::empty()
        }
    }

    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            ..Default::default()
        }
    }

    /// Appointed representative, preferring the `representante` field.
    pub fn representative(&self) -> Option<&str> {
        non_blank(&self.representante).or_else(|| non_blank(&self.representante_legal))
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// One uploaded source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub filename: String,
    pub size: u64,
    pub sha256: String,
    pub uploaded_at: String,
}

/// A workspace row with its JSON columns decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: String,
    pub name: String,
    pub logo_path: Option<String>,
    pub cif_data: Option<CifData>,
    pub acta_data: Option<ActaData>,
    pub prices_data: Option<Value>,
    pub sources: Vec<SourceEntry>,
    pub analysis: Option<TenderAnalysis>,
    pub status: Option<String>,
    pub inconsistencias: Option<IdentityReport>,
    pub created_at: String,
}

/// Coalesce update for a workspace row.
///
/// Every `None` (and every JSON value that is null or an empty container)
/// leaves the stored column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceUpdate {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub logo_path: Option<String>,
    #[serde(default, deserialize_with = "json_text")]
    pub cif_data: Option<String>,
    #[serde(default, deserialize_with = "json_text")]
    pub acta_data: Option<String>,
    #[serde(default, deserialize_with = "json_text")]
    pub prices_data: Option<String>,
    #[serde(default, deserialize_with = "json_text")]
    pub sources: Option<String>,
    #[serde(default, deserialize_with = "json_text")]
    pub analysis: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "json_text")]
    pub inconsistencias: Option<String>,
}

impl WorkspaceUpdate {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn logo_path(mut self, path: &str) -> Self {
        self.logo_path = Some(path.to_string());
        self
    }

    pub fn status(mut self, status: WorkspaceStatus) -> Self {
        self.status = Some(status.as_str().to_string());
        self
    }

    pub fn cif(mut self, cif: &CifData) -> Result<Self> {
        self.cif_data = Some(encode(cif, "cif_data")?);
        Ok(self)
    }

    pub fn acta(mut self, acta: &ActaData) -> Result<Self> {
        self.acta_data = Some(encode(acta, "acta_data")?);
        Ok(self)
    }

    pub fn analysis(mut self, analysis: &TenderAnalysis) -> Result<Self> {
        self.analysis = Some(encode(analysis, "analysis")?);
        Ok(self)
    }

    pub fn sources(mut self, sources: &[SourceEntry]) -> Result<Self> {
        self.sources = Some(encode(&sources, "sources")?);
        Ok(self)
    }

    pub fn inconsistencias(mut self, report: &IdentityReport) -> Result<Self> {
        self.inconsistencias = Some(encode(report, "inconsistencias")?);
        Ok(self)
    }

    /// Name to apply on update: blank names and all-digit names of ten or
    /// more characters (timestamp ids sent as names) are ignored.
    pub(crate) fn effective_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| {
            !n.is_empty() && !(n.len() >= 10 && n.chars().all(|c| c.is_ascii_digit()))
        })
    }
}

/// Accept a JSON column either as encoded text or as a JSON value.
fn json_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn encode<T: Serialize + ?Sized>(value: &T, column: &str) -> Result<String> {
    serde_json::to_string(value).with_context(|| format!("Failed to encode {} column", column))
}

/// `None` for values that must not overwrite a stored column.
pub(crate) fn coalesce_value(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !is_blank_text(v))
}

/// JSON columns of a [`WorkspaceUpdate`] that may overwrite the stored row.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct JsonColumns<'a> {
    pub cif_data: Option<&'a str>,
    pub acta_data: Option<&'a str>,
    pub prices_data: Option<&'a str>,
    pub sources: Option<&'a str>,
    pub analysis: Option<&'a str>,
    pub inconsistencias: Option<&'a str>,
}

impl WorkspaceUpdate {
    /// Check every JSON column against its record type.
    ///
    /// Values that parse to null or an empty container are dropped; text that
    /// does not decode as the column's type is an error.
    pub(crate) fn json_columns(&self) -> Result<JsonColumns<'_>> {
        Ok(JsonColumns {
            cif_data: coalesce_json::<CifData>(&self.cif_data, "cif_data")?,
            acta_data: coalesce_json::<ActaData>(&self.acta_data, "acta_data")?,
            prices_data: coalesce_json::<Value>(&self.prices_data, "prices_data")?,
            sources: coalesce_json::<Vec<SourceEntry>>(&self.sources, "sources")?,
            analysis: coalesce_json::<TenderAnalysis>(&self.analysis, "analysis")?,
            inconsistencias: coalesce_json::<IdentityReport>(
                &self.inconsistencias,
                "inconsistencias",
            )?,
        })
    }

    /// Reject updates whose JSON columns would not read back.
    pub fn validate(&self) -> Result<()> {
        self.json_columns().map(|_| ())
    }
}

fn coalesce_json<'a, T: DeserializeOwned>(
    value: &'a Option<String>,
    column: &str,
) -> Result<Option<&'a str>> {
    let Some(raw) = coalesce_value(value) else {
        return Ok(None);
    };
    let parsed: Value = serde_json::from_str(raw)
        .with_context(|| format!("Invalid {} column: not JSON", column))?;
    if is_blank(&parsed) {
        return Ok(None);
    }
    serde_json::from_value::<T>(parsed).with_context(|| format!("Invalid {} column", column))?;
    Ok(Some(raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub convocante: String,
    pub numero_licitacion: String,
    pub objeto: String,
    #[serde(default)]
    pub presupuesto_estimado: Option<String>,
    #[serde(default)]
    pub fianzas_requeridas: Option<String>,
    #[serde(default)]
    pub certificaciones: Option<String>,
    #[serde(default)]
    pub fecha_apertura: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub razon_social: String,
    pub rfc: String,
    pub representante: Option<String>,
    pub cargo: Option<String>,
    pub domicilio: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCompany {
    pub razon_social: String,
    pub rfc: String,
    #[serde(default)]
    pub representante: Option<String>,
    #[serde(default)]
    pub cargo: Option<String>,
    #[serde(default)]
    pub domicilio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub companies: i64,
    pub bids: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    pub convocante: String,
    pub numero_licitacion: String,
    pub created_at: String,
}

/// Entry of a workspace folder listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_fields_joins_nested_values() {
        let map = json!({
            "rfc": "ABC010101AB1",
            "domicilio": {"calle": "Av. Juarez 10", "cp": "01000", "vacio": ""},
            "telefonos": ["555", "556"],
            "nada": null,
            "representante": "Juan Perez"
        });
        let out = flatten_fields(map.as_object().unwrap().clone());
        assert_eq!(out["domicilio"], "Av. Juarez 10 01000");
        assert_eq!(out["telefonos"], "555 556");
        assert_eq!(out["representante_legal"], "Juan Perez");
        assert!(!out.contains_key("nada"));
    }

    #[test]
    fn test_cif_from_fields_keeps_unknown_keys() -> Result<()> {
        let map = json!({"rfc": "ABC010101AB1", "curp": "XYZ", "regimen_fiscal": 601});
        let cif = CifData::from_fields(map.as_object().unwrap().clone())?;
        assert_eq!(cif.rfc.as_deref(), Some("ABC010101AB1"));
        assert_eq!(cif.regimen_fiscal.as_deref(), Some("601"));
        assert_eq!(cif.extra["curp"], "XYZ");
        assert_eq!(cif.schema_version, SCHEMA_VERSION);
        Ok(())
    }

    #[test]
    fn test_cif_address_prefers_fiscal() {
        let cif = CifData {
            domicilio: Some("A".to_string()),
            domicilio_fiscal: Some("B".to_string()),
            ..CifData::empty()
        };
        assert_eq!(cif.address(), Some("B"));
    }

    #[test]
    fn test_acta_representative_fallback() {
        let acta = ActaData {
            representante_legal: Some("Ana".to_string()),
            ..ActaData::empty()
        };
        assert_eq!(acta.representative(), Some("Ana"));
    }

    #[test]
    fn test_effective_name_ignores_timestamps() {
        assert_eq!(WorkspaceUpdate::new("x").name("1712345678901").effective_name(), None);
        assert_eq!(WorkspaceUpdate::new("x").name("  ").effective_name(), None);
        assert_eq!(
            WorkspaceUpdate::new("x").name("Obra 2024").effective_name(),
            Some("Obra 2024")
        );
        assert_eq!(WorkspaceUpdate::new("x").name("12345").effective_name(), Some("12345"));
    }

    #[test]
    fn test_coalesce_value_filters_placeholders() {
        assert_eq!(coalesce_value(&Some("{}".to_string())), None);
        assert_eq!(coalesce_value(&Some("null".to_string())), None);
        assert_eq!(coalesce_value(&None), None);
        assert_eq!(coalesce_value(&Some("{\"a\":1}".to_string())), Some("{\"a\":1}"));
    }

    #[test]
    fn test_identity_kind_from_str() {
        assert_eq!("CIF".parse::<IdentityKind>(), Ok(IdentityKind::Cif));
        assert_eq!("acta".parse::<IdentityKind>(), Ok(IdentityKind::Acta));
        assert!("logo".parse::<IdentityKind>().is_err());
    }

    #[test]
    fn test_update_accepts_json_columns_as_objects_or_text() {
        let update: WorkspaceUpdate = serde_json::from_value(json!({
            "id": "ws-1",
            "cif_data": {"rfc": "ACM010101AB1"},
            "acta_data": "{\"cargo\": \"Administrador\"}",
            "analysis": null
        }))
        .unwrap();
        assert_eq!(update.cif_data.as_deref(), Some(r#"{"rfc":"ACM010101AB1"}"#));
        assert_eq!(update.acta_data.as_deref(), Some(r#"{"cargo": "Administrador"}"#));
        assert!(update.analysis.is_none());
        assert!(update.sources.is_none());
    }
}

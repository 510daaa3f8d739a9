//! Typed tender analysis and the lenient merge of LLM output over defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::classify::{Classification, ProcedureType};
use crate::store::models::{Bid, schema_version};

pub const NOT_AVAILABLE: &str = "N/D";
pub const ELECTRONIC_NOTICE: &str = "NO APLICA - Procedimiento 100% electrónico vía ComprasMX";

fn nd() -> String {
    NOT_AVAILABLE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bonds {
    #[serde(default = "nd")]
    pub garantia_seriedad: String,
    #[serde(default = "nd")]
    pub cumplimiento: String,
    #[serde(default = "nd")]
    pub otros: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for Bonds {
    fn default() -> Self {
        Self {
            garantia_seriedad: nd(),
            cumplimiento: nd(),
            otros: nd(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorizedAnnexes {
    #[serde(default)]
    pub technical: Vec<String>,
    #[serde(default)]
    pub economic: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDates {
    #[serde(default = "nd")]
    pub visita: String,
    #[serde(default = "nd")]
    pub aclaraciones: String,
    #[serde(default = "nd")]
    pub apertura: String,
    #[serde(default = "nd")]
    pub fallo: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for KeyDates {
    fn default() -> Self {
        Self {
            visita: nd(),
            aclaraciones: nd(),
            apertura: nd(),
            fallo: nd(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalPoints {
    #[serde(default = "nd")]
    pub dirigido_a: String,
    #[serde(default = "nd")]
    pub firma_requerida: String,
    #[serde(default = "nd")]
    pub lugar_entrega: String,
    #[serde(default)]
    pub advertencias: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo_procedimiento: Option<ProcedureType>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for CriticalPoints {
    fn default() -> Self {
        Self {
            dirigido_a: nd(),
            firma_requerida: nd(),
            lugar_entrega: nd(),
            advertencias: Vec::new(),
            tipo_procedimiento: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Structured result of analysing one tender document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenderAnalysis {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default = "nd")]
    pub convocante: String,
    #[serde(default = "nd")]
    pub numero_licitacion: String,
    #[serde(default = "nd")]
    pub objeto: String,
    #[serde(default = "nd")]
    pub fecha_publicacion: String,
    #[serde(default)]
    pub fianzas_requeridas: Bonds,
    #[serde(default)]
    pub categorized_anexos: CategorizedAnnexes,
    #[serde(default)]
    pub fechas_clave: KeyDates,
    #[serde(default = "nd")]
    pub certificaciones_y_normas: String,
    #[serde(default)]
    pub puntos_criticos: CriticalPoints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo_entidad: Option<String>,
    /// Older analyses list required documents here instead of
    /// `categorized_anexos`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documentos_requeridos: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anexos_requeridos: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checklist_cumplimiento: Vec<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for TenderAnalysis {
    fn default() -> Self {
        Self {
            schema_version: schema_version(),
            convocante: nd(),
            numero_licitacion: nd(),
            objeto: nd(),
            fecha_publicacion: nd(),
            fianzas_requeridas: Bonds::default(),
            categorized_anexos: CategorizedAnnexes::default(),
            fechas_clave: KeyDates::default(),
            certificaciones_y_normas: nd(),
            puntos_criticos: CriticalPoints::default(),
            tipo_entidad: None,
            documentos_requeridos: Vec::new(),
            anexos_requeridos: Vec::new(),
            checklist_cumplimiento: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl TenderAnalysis {
    /// Merge an LLM answer over the default schema.
    ///
    /// Known fields override defaults one by one; a value of the wrong shape
    /// keeps the default. Unknown keys are preserved in `extra`.
    pub fn from_llm(map: Map<String, Value>) -> Self {
        let mut analysis = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "convocante" => set_text(&mut analysis.convocante, &value),
                "numero_licitacion" => set_text(&mut analysis.numero_licitacion, &value),
                "objeto" => set_text(&mut analysis.objeto, &value),
                "fecha_publicacion" => set_text(&mut analysis.fecha_publicacion, &value),
                "certificaciones_y_normas" => {
                    set_text(&mut analysis.certificaciones_y_normas, &value)
                }
                "fianzas_requeridas" => {
                    if let Some(fields) = text_object(&value) {
                        let mut bonds = Bonds::default();
                        for (k, v) in fields {
                            match k.as_str() {
                                "garantia_seriedad" => bonds.garantia_seriedad = v,
                                "cumplimiento" => bonds.cumplimiento = v,
                                "otros" => bonds.otros = v,
                                _ => {
                                    bonds.extra.insert(k, Value::String(v));
                                }
                            }
                        }
                        analysis.fianzas_requeridas = bonds;
                    }
                }
                "categorized_anexos" => {
                    if let Value::Object(obj) = &value {
                        analysis.categorized_anexos = CategorizedAnnexes {
                            technical: obj.get("technical").map(annex_names).unwrap_or_default(),
                            economic: obj.get("economic").map(annex_names).unwrap_or_default(),
                        };
                    }
                }
                "fechas_clave" => {
                    if let Some(fields) = text_object(&value) {
                        let mut dates = KeyDates::default();
                        for (k, v) in fields {
                            match k.as_str() {
                                "visita" => dates.visita = v,
                                "aclaraciones" => dates.aclaraciones = v,
                                "apertura" => dates.apertura = v,
                                "fallo" => dates.fallo = v,
                                _ => {
                                    dates.extra.insert(k, Value::String(v));
                                }
                            }
                        }
                        analysis.fechas_clave = dates;
                    }
                }
                "puntos_criticos" => {
                    if let Value::Object(obj) = &value {
                        analysis.puntos_criticos = critical_points(obj);
                    }
                }
                "tipo_entidad" => analysis.tipo_entidad = value_text(&value),
                "documentos_requeridos" => analysis.documentos_requeridos = annex_names(&value),
                "anexos_requeridos" => analysis.anexos_requeridos = annex_names(&value),
                "checklist_cumplimiento" => {
                    if let Value::Array(items) = value {
                        analysis.checklist_cumplimiento = items;
                    }
                }
                "schema_version" => {}
                _ => {
                    analysis.extra.insert(key, value);
                }
            }
        }
        analysis
    }

    /// Record the procedure classification; electronic procedures have no
    /// physical addressee, signature or delivery place.
    pub fn apply_classification(&mut self, classification: Classification) {
        let points = &mut self.puntos_criticos;
        points.tipo_procedimiento = Some(classification.procedure);
        if classification.procedure == ProcedureType::Electronic {
            points.dirigido_a = ELECTRONIC_NOTICE.to_string();
            points.firma_requerida = ELECTRONIC_NOTICE.to_string();
            points.lugar_entrega = ELECTRONIC_NOTICE.to_string();
        }
        self.tipo_entidad = Some(classification.entity.as_str().to_string());
    }

    /// Technical and economic documents to generate.
    ///
    /// When neither category lists anything, the legacy flat lists are
    /// treated as technical documents.
    pub fn requested_documents(&self) -> (Vec<String>, Vec<String>) {
        let annexes = &self.categorized_anexos;
        if annexes.technical.is_empty() && annexes.economic.is_empty() {
            let legacy = if !self.documentos_requeridos.is_empty() {
                self.documentos_requeridos.clone()
            } else {
                self.anexos_requeridos.clone()
            };
            return (legacy, Vec::new());
        }
        (annexes.technical.clone(), annexes.economic.clone())
    }

    /// Key under which the tender is indexed: the tender number with path
    /// separators replaced.
    pub fn tender_key(&self) -> String {
        self.numero_licitacion.replace(['/', '\\'], "_")
    }

    pub fn to_bid(&self) -> Bid {
        Bid {
            convocante: self.convocante.clone(),
            numero_licitacion: self.tender_key(),
            objeto: self.objeto.clone(),
            presupuesto_estimado: None,
            fianzas_requeridas: serde_json::to_string(&self.fianzas_requeridas).ok(),
            certificaciones: Some(self.certificaciones_y_normas.clone()),
            fecha_apertura: Some(self.fechas_clave.apertura.clone()),
        }
    }
}

fn critical_points(obj: &Map<String, Value>) -> CriticalPoints {
    let mut points = CriticalPoints::default();
    for (key, value) in obj {
        match key.as_str() {
            "dirigido_a" => set_text(&mut points.dirigido_a, value),
            "firma_requerida" => set_text(&mut points.firma_requerida, value),
            "lugar_entrega" => set_text(&mut points.lugar_entrega, value),
            "advertencias" => points.advertencias = annex_names(value),
            // Always recomputed by the classifier.
            "tipo_procedimiento" => {}
            _ => {
                points.extra.insert(key.clone(), value.clone());
            }
        }
    }
    points
}

fn set_text(slot: &mut String, value: &Value) {
    if let Some(text) = value_text(value) {
        *slot = text;
    }
}

/// Scalar-ish text for a JSON value; `None` for null and blank values.
fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(obj) => obj
            .values()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn text_object(value: &Value) -> Option<Vec<(String, String)>> {
    let obj = value.as_object()?;
    Some(
        obj.iter()
            .filter_map(|(k, v)| value_text(v).map(|t| (k.clone(), t)))
            .collect(),
    )
}

/// Document names from a list of strings or `{"nombre": ...}` objects.
fn annex_names(value: &Value) -> Vec<String> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => obj.get("nombre").and_then(value_text).or_else(|| value_text(item)),
            other => value_text(other),
        })
        .collect()
}

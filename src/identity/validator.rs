//! Cross-validation of the tax registration against the corporate charter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::normalize::{normalize_name, similarity};
use crate::store::models::{ActaData, CifData};

/// Names below this normalised similarity are flagged.
pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "baja")]
    Low,
    #[serde(rename = "media")]
    Medium,
    #[serde(rename = "alta")]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Ok,
    Warning,
    Block,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Block => "block",
        }
    }
}

/// Values compared between the two documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub rfc_cif: String,
    pub rfc_acta: String,
    pub razon_social_cif: String,
    pub razon_social_acta: String,
    pub similitud_razon_social: Option<f64>,
    pub representante_cif: String,
    pub representante_acta: String,
    pub cargo_acta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inconsistency {
    pub tipo: String,
    pub severidad: Severity,
    pub detalle: String,
    pub evidencia: BTreeMap<String, String>,
    pub recomendacion: String,
}

/// Advisory identity report; never gates a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityReport {
    pub comparacion: Comparison,
    pub inconsistencias: Vec<Inconsistency>,
    pub estado: ValidationStatus,
}

impl IdentityReport {
    pub fn highest_severity(&self) -> Option<Severity> {
        self.inconsistencias.iter().map(|i| i.severidad).max()
    }
}

fn text(value: &Option<String>) -> String {
    value.as_deref().unwrap_or("").trim().to_string()
}

fn evidence(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Compare both documents; either may be missing.
pub fn validate(cif: Option<&CifData>, acta: Option<&ActaData>) -> IdentityReport {
    let empty_cif = CifData::empty();
    let empty_acta = ActaData::empty();
    let cif = cif.unwrap_or(&empty_cif);
    let acta = acta.unwrap_or(&empty_acta);

    let rfc_cif = text(&cif.rfc).to_uppercase();
    let rfc_acta = text(&acta.rfc).to_uppercase();
    let rs_cif = text(&cif.razon_social);
    let rs_acta = text(&acta.razon_social);
    let rep_cif = text(&cif.representante_legal);
    let rep_acta = acta.representative().unwrap_or("").trim().to_string();
    let cargo_acta = text(&acta.cargo);

    let norm_cif = normalize_name(&rs_cif);
    let norm_acta = normalize_name(&rs_acta);
    let sim = (!norm_cif.is_empty() && !norm_acta.is_empty())
        .then(|| similarity(&norm_cif, &norm_acta));

    let mut inconsistencias = Vec::new();
    if !rfc_cif.is_empty() && !rfc_acta.is_empty() && rfc_cif != rfc_acta {
        inconsistencias.push(Inconsistency {
            tipo: "identidad".to_string(),
            severidad: Severity::High,
            detalle: format!("RFC distinto entre CIF ({}) y Acta ({}).", rfc_cif, rfc_acta),
            evidencia: evidence(&[("cif_rfc", rfc_cif.as_str()), ("acta_rfc", rfc_acta.as_str())]),
            recomendacion: "Editar identidad; priorizar RFC del CIF.".to_string(),
        });
    }
    if let Some(sim) = sim.filter(|s| *s < NAME_SIMILARITY_THRESHOLD) {
        inconsistencias.push(Inconsistency {
            tipo: "identidad".to_string(),
            severidad: Severity::Medium,
            detalle: format!(
                "Razón social con baja similitud ({:.2}) entre CIF y Acta.",
                sim
            ),
            evidencia: evidence(&[
                ("cif_razon_social", rs_cif.as_str()),
                ("acta_razon_social", rs_acta.as_str()),
            ]),
            recomendacion: "Verificar denominación; ajustar para coherencia.".to_string(),
        });
    }
    if rep_acta.is_empty() && !rep_cif.is_empty() {
        inconsistencias.push(Inconsistency {
            tipo: "identidad".to_string(),
            severidad: Severity::Low,
            detalle: "Acta sin representante, CIF sí lo indica.".to_string(),
            evidencia: evidence(&[("cif_representante", rep_cif.as_str())]),
            recomendacion: "Cargar acta con nombramiento o confirmar cargo.".to_string(),
        });
    }

    let estado = if inconsistencias.iter().any(|i| i.severidad == Severity::High) {
        ValidationStatus::Block
    } else if inconsistencias.is_empty() {
        ValidationStatus::Ok
    } else {
        ValidationStatus::Warning
    };

    IdentityReport {
        comparacion: Comparison {
            rfc_cif,
            rfc_acta,
            razon_social_cif: rs_cif,
            razon_social_acta: rs_acta,
            similitud_razon_social: sim,
            representante_cif: rep_cif,
            representante_acta: rep_acta,
            cargo_acta,
        },
        inconsistencias,
        estado,
    }
}

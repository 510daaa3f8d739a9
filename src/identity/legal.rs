//! Regex extraction of notarial fields from charter text.
//!
//! Fills whatever the LLM left empty; never overrides a value it returned.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::store::models::ActaData;

static RFC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([A-ZÑ&]{3,4}\d{6}[A-Z0-9]{3})\b").unwrap());
static DEED_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ESCRITURA\s*(?:P[ÚU]BLICA)?\s*(?:N[ÚU]MERO|NO\.?)\s*[:#]?\s*([\d,]+)").unwrap()
});
static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bN[ÚU]MERO\s+([\d,]+)\b").unwrap());
static VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bTOMO\s*[:#]?\s*([IVXLCDM]+|\d+)\b").unwrap());
static BOOK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIBRO\s*[:#]?\s*([IVXLCDM]+|\d+)\b").unwrap());
static NOTARY_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Notario\s+P[úu]blico\s+(?:No\.?|n[úu]mero)\s*[:#]?\s*(\d+)").unwrap()
});
static LICENCIADO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bLic\.?\s*([A-ZÁÉÍÓÚÑ\s]+)\b").unwrap());
static NOTARY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Notario\s+P[úu]blico\s*(?:No\.?|n[úu]mero)\s*\d+\s*,?\s*([A-ZÁÉÍÓÚÑ\s]+)")
        .unwrap()
});
static CITY_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b([A-ZÁÉÍÓÚÑ][a-záéíóúñ]+(?:\s+[A-ZÁÉÍÓÚÑ][a-záéíóúñ]+)?)\s*,\s*([A-ZÁÉÍÓÚÑ][a-záéíóúñ]+)\b",
    )
    .unwrap()
});
static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2}\s+de\s+[A-Za-zÁÉÍÓÚáéíóú]+(?:\s+de)?\s+\d{4})\b").unwrap()
});
static DENOMINATION_SRL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-ZÁÉÍÓÚÑ0-9\s\.\-]+S\.?\s*DE\s*[A-Z\.]+\s*DE\s*C\.?\s*V\.?)\b").unwrap()
});
static DENOMINATION_SA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-ZÁÉÍÓÚÑ0-9\s\.\-]+S\.?\s*A\.?\s*DE\s*C\.?\s*V\.?)\b").unwrap()
});

fn first_group(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Fields found by pattern matching; `None` when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LegalFields {
    pub razon_social: Option<String>,
    pub rfc: Option<String>,
    pub escritura_numero: Option<String>,
    pub tomo: Option<String>,
    pub libro: Option<String>,
    pub notario_nombre: Option<String>,
    pub notario_numero: Option<String>,
    pub ciudad_estado: Option<String>,
    pub fecha_constitucion: Option<String>,
}

impl LegalFields {
    pub fn extract(text: &str) -> Self {
        let notario_nombre = LICENCIADO
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|name| name.split_whitespace().count() >= 2)
            .or_else(|| first_group(&NOTARY_NAME, text));

        Self {
            razon_social: first_group(&DENOMINATION_SRL, text)
                .or_else(|| first_group(&DENOMINATION_SA, text)),
            rfc: first_group(&RFC, text),
            escritura_numero: first_group(&DEED_NUMBER, text)
                .or_else(|| first_group(&BARE_NUMBER, text)),
            tomo: first_group(&VOLUME, text),
            libro: first_group(&BOOK, text),
            notario_nombre,
            notario_numero: first_group(&NOTARY_NUMBER, text),
            ciudad_estado: first_group(&CITY_STATE, text),
            fecha_constitucion: first_group(&DATE, text),
        }
    }

    /// Copy every found field into `acta` where it is still empty.
    pub fn fill_missing(self, acta: &mut ActaData) {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if slot.as_deref().is_none_or(|s| s.trim().is_empty()) {
                if let Some(v) = value {
                    *slot = Some(v);
                }
            }
        }
        fill(&mut acta.razon_social, self.razon_social);
        fill(&mut acta.rfc, self.rfc);
        fill(&mut acta.escritura_numero, self.escritura_numero);
        fill(&mut acta.tomo, self.tomo);
        fill(&mut acta.libro, self.libro);
        fill(&mut acta.notario_nombre, self.notario_nombre);
        fill(&mut acta.notario_numero, self.notario_numero);
        fill(&mut acta.ciudad_estado, self.ciudad_estado);
        fill(&mut acta.fecha_constitucion, self.fecha_constitucion);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHARTER: &str = "ESCRITURA PÚBLICA NÚMERO 12,345 TOMO XIV LIBRO 3\n\
        En Monterrey, Nuevo León, a 15 de marzo de 2010, ante mí Lic. JUAN PEREZ GOMEZ\n\
        Notario Público No. 62, comparecen para constituir CONSTRUCTORA DEL NORTE S.A. DE C.V.\n\
        con RFC cno100315ab1.";

    #[test]
    fn test_extracts_notarial_fields() {
        let fields = LegalFields::extract(CHARTER);
        assert_eq!(fields.escritura_numero.as_deref(), Some("12,345"));
        assert_eq!(fields.tomo.as_deref(), Some("XIV"));
        assert_eq!(fields.libro.as_deref(), Some("3"));
        assert_eq!(fields.notario_numero.as_deref(), Some("62"));
        assert_eq!(fields.rfc.as_deref(), Some("cno100315ab1"));
        assert_eq!(fields.fecha_constitucion.as_deref(), Some("15 de marzo de 2010"));
        assert!(fields.razon_social.as_deref().unwrap().ends_with("S.A. DE C.V"));
        assert!(fields.notario_nombre.as_deref().unwrap().starts_with("JUAN PEREZ GOMEZ"));
    }

    #[test]
    fn test_nothing_found_in_plain_text() {
        assert_eq!(LegalFields::extract("sin datos"), LegalFields::default());
    }

    #[test]
    fn test_fill_missing_keeps_llm_values() {
        let mut acta = ActaData {
            escritura_numero: Some("999".to_string()),
            tomo: Some("  ".to_string()),
            ..ActaData::empty()
        };
        LegalFields::extract(CHARTER).fill_missing(&mut acta);
        assert_eq!(acta.escritura_numero.as_deref(), Some("999"));
        assert_eq!(acta.tomo.as_deref(), Some("XIV"));
        assert_eq!(acta.notario_numero.as_deref(), Some("62"));
    }
}

//! Canned answers for common workspace questions.
//!
//! Questions about dates, the bidder, the tender id, annexes or bonds are
//! answered straight from the analysis and profile; anything else goes to
//! the LLM.

use super::profile::Profile;
use super::schema::TenderAnalysis;

const DATE_KEYWORDS: &[&str] = &[
    "fecha",
    "cronograma",
    "apertura",
    "visita",
    "junta",
    "fallo",
    "publicación",
    "publicacion",
];
const BIDDER_KEYWORDS: &[&str] = &[
    "empresa",
    "licitante",
    "rfc",
    "representante",
    "domicilio",
    "razón",
    "razon",
];
const TENDER_KEYWORDS: &[&str] = &["convocante", "licitación", "licitacion", "número", "numero"];
const ANNEX_KEYWORDS: &[&str] = &["anexo", "formatos", "documentos requeridos"];
const BOND_KEYWORDS: &[&str] = &["fianza", "garantía", "garantia"];

fn mentions(question: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| question.contains(k))
}

/// "id" only counts as a standalone word; as a substring it matches
/// "requeridos" and friends.
fn mentions_id(question: &str) -> bool {
    question
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == "id")
}

fn dash(value: &str) -> &str {
    if value.trim().is_empty() { "-" } else { value }
}

/// Answer `question` without the LLM when it matches a known topic.
pub fn keyword_answer(
    question: &str,
    analysis: Option<&TenderAnalysis>,
    profile: &Profile,
) -> Option<String> {
    let q = question.to_lowercase();

    if mentions(&q, DATE_KEYWORDS) {
        let default = TenderAnalysis::default();
        let a = analysis.unwrap_or(&default);
        let dates = &a.fechas_clave;
        return Some(format!(
            "Cronograma:\n\
             - Publicación: {}\n\
             - Visita: {}\n\
             - Junta de aclaraciones: {}\n\
             - Presentación y apertura: {}\n\
             - Fallo: {}",
            dash(&a.fecha_publicacion),
            dash(&dates.visita),
            dash(&dates.aclaraciones),
            dash(&dates.apertura),
            dash(&dates.fallo)
        ));
    }

    if mentions(&q, BIDDER_KEYWORDS) {
        let bidder = &profile.licitante;
        return Some(format!(
            "Empresa licitante: {}\nRFC: {}\nRepresentante: {}\nCargo: {}\nDomicilio: {}",
            dash(&bidder.empresa),
            dash(&bidder.rfc),
            dash(&bidder.representante),
            dash(&bidder.cargo),
            dash(&bidder.domicilio)
        ));
    }

    if mentions(&q, TENDER_KEYWORDS) || mentions_id(&q) {
        let tender = &profile.tender;
        return Some(format!(
            "Convocante: {}\nID de licitación: {}\nObjeto: {}",
            dash(&tender.convocante),
            dash(&tender.numero_licitacion),
            dash(&tender.objeto)
        ));
    }

    if mentions(&q, ANNEX_KEYWORDS) {
        let annexes: Vec<&String> = match analysis {
            Some(a) if !a.anexos_requeridos.is_empty() => a.anexos_requeridos.iter().collect(),
            Some(a) => a
                .categorized_anexos
                .technical
                .iter()
                .chain(&a.categorized_anexos.economic)
                .collect(),
            None => Vec::new(),
        };
        if annexes.is_empty() {
            return Some("No se detectaron anexos o formatos en las bases actuales.".to_string());
        }
        let list = annexes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n- ");
        return Some(format!("Formatos/Anexos detectados:\n- {}", list));
    }

    if mentions(&q, BOND_KEYWORDS) {
        let Some(a) = analysis else {
            return Some("No se detectaron fianzas en las bases actuales.".to_string());
        };
        let bonds = &a.fianzas_requeridas;
        let mut parts = vec![
            format!("Garantia Seriedad: {}", bonds.garantia_seriedad),
            format!("Cumplimiento: {}", bonds.cumplimiento),
            format!("Otros: {}", bonds.otros),
        ];
        for (key, value) in &bonds.extra {
            let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            parts.push(format!("{}: {}", title_case(key), text));
        }
        return Some(format!("Fianzas requeridas:\n- {}", parts.join("\n- ")));
    }

    None
}

/// "vicios_ocultos" → "Vicios Ocultos".
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

//! Prompts for structuring identity documents, plus the targeted context
//! search that keeps charter prompts small.

use std::sync::LazyLock;

use regex::Regex;

use crate::util::{tail_chars, truncate_chars};

pub const CIF_TEXT_CHARS: usize = 10_000;
pub const CHARTER_CONTEXT_CHARS: usize = 8_000;

const SNIPPET_MAX_CHARS: usize = 2_000;
const CONTEXT_TARGET_CHARS: usize = 6_000;
const CONTEXT_MIN_CHARS: usize = 100;
const FALLBACK_HEAD_CHARS: usize = 15_000;
const FALLBACK_TAIL_CHARS: usize = 10_000;

/// Appointment and resolution headings, each with how much following text
/// to keep.
static APPOINTMENT_PATTERNS: LazyLock<Vec<(Regex, usize)>> = LazyLock::new(|| {
    [
        (r"(?i)RESOLUCIONES?\s+TRANSITORIAS?", 2000),
        (r"(?i)NOMBRAMIENTO", 1500),
        (r"(?i)recayendo", 500),
        (r"(?i)se\s+designa?", 500),
        (
            r"(?i)nombramiento\s+de\s+(?:Administrador|Representante|Apoderado|Gerente|Presidente)",
            800,
        ),
        (r"(?i)ADMINISTRADOR\s+[ÚU]NICO", 600),
        (r"(?i)REPRESENTANTE\s+LEGAL", 600),
    ]
    .into_iter()
    .map(|(p, tail)| (Regex::new(p).unwrap(), tail))
    .collect()
});

/// Byte offset `chars` characters after `from`, clamped to the end.
fn advance_chars(text: &str, from: usize, chars: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(chars)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

/// Collect the charter passages that name officers.
///
/// Every heading match is kept with the text that follows it; when too
/// little is found, the head and tail of the document are used instead.
pub fn charter_context(text: &str) -> String {
    let mut context = String::new();
    for (re, tail) in APPOINTMENT_PATTERNS.iter() {
        let mut pos = 0;
        while let Some(m) = re.find_at(text, pos) {
            let end = advance_chars(text, m.end(), *tail);
            let snippet = truncate_chars(&text[m.start()..end], SNIPPET_MAX_CHARS).trim();
            if !snippet.is_empty() && !context.contains(snippet) {
                context.push_str(snippet);
                context.push_str("\n\n---\n\n");
            }
            pos = end.max(m.end());
            if pos >= text.len() {
                break;
            }
        }
        if context.chars().count() > CONTEXT_TARGET_CHARS {
            break;
        }
    }

    if context.trim().chars().count() < CONTEXT_MIN_CHARS {
        tracing::warn!("no appointment sections found in charter; using head and tail");
        return format!(
            "{}\n\n[...]\n\n{}",
            truncate_chars(text, FALLBACK_HEAD_CHARS),
            tail_chars(text, FALLBACK_TAIL_CHARS)
        );
    }
    context
}

pub fn build_cif_prompt(text: &str) -> String {
    format!(
        "Eres un experto en documentos fiscales mexicanos. Analiza este texto del CIF \
         (Constancia de Situación Fiscal) y extrae un JSON con los siguientes campos exactos:\n\
         - rfc: El RFC de la empresa o persona\n\
         - razon_social: La denominación o razón social\n\
         - representante_legal: Nombre del representante legal o socio administrador (BÚSCALO con prioridad)\n\
         - domicilio: Dirección fiscal completa (Calle, No, CP, Municipio, Estado)\n\
         - tipo_persona: 'Moral' (si es SA, SRL, etc) o 'Fisica'\n\
         - regimen_fiscal: El régimen fiscal actual\n\n\
         Texto del CIF:\n{}\n\n\
         Responde ÚNICAMENTE con el objeto JSON.",
        truncate_chars(text, CIF_TEXT_CHARS)
    )
}

/// Charter prompt over the output of [`charter_context`].
pub fn build_charter_prompt(context: &str) -> String {
    format!(
        "Eres un notario experto en actas constitutivas mexicanas. Del siguiente extracto de un \
         Acta Constitutiva, extrae ÚNICAMENTE estos 4 campos en JSON:\n\n\
         EXTRACTO DEL ACTA (sección de nombramientos/resoluciones):\n{}\n\n\
         Devuelve SOLO este JSON (sin explicaciones):\n\
         {{\n  \
         \"razon_social\": \"Nombre completo de la sociedad con su tipo (S.A. de C.V., etc.)\",\n  \
         \"escritura_numero\": \"Número del instrumento notarial\",\n  \
         \"representante\": \"Nombre completo de la persona nombrada como Administrador Único o Representante Legal\",\n  \
         \"cargo\": \"Cargo exacto (Administrador Único, Representante Legal, etc.)\"\n\
         }}",
        truncate_chars(context, CHARTER_CONTEXT_CHARS)
    )
}

//! Prompt templates sent to the structuring LLM.
//!
//! Prompts are written in Spanish because the tender documents are; the
//! JSON shapes requested here are what [`TenderAnalysis::from_llm`] and the
//! generation pipeline parse back.
//!
//! [`TenderAnalysis::from_llm`]: super::TenderAnalysis::from_llm

use super::profile::{CompanyData, Profile};
use super::schema::TenderAnalysis;
use crate::util::truncate_chars;

/// Characters of tender text included in the analysis prompt.
pub const ANALYSIS_TEXT_CHARS: usize = 90_000;
/// Characters of workspace context included in the chat prompt.
pub const CHAT_CONTEXT_CHARS: usize = 10_000;

/// Writer persona used when drafting a proposal document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentRole {
    Technical,
    Economic,
}

impl DocumentRole {
    pub fn persona(&self) -> &'static str {
        match self {
            Self::Technical => "ABOGADO EXPERTO EN LICITACIONES TÉCNICAS",
            Self::Economic => "EXPERTO EN FINANZAS Y LICITACIONES ECONÓMICAS",
        }
    }

    /// Label used in progress messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Technical => "Técnico",
            Self::Economic => "Económico",
        }
    }

    pub fn agent(&self) -> &'static str {
        match self {
            Self::Technical => "TechnicalAgent",
            Self::Economic => "EconomicAgent",
        }
    }
}

/// Build the structuring prompt over already cleaned tender text.
pub fn build_analysis_prompt(text: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "ERES UN ANALISTA EXPERTO EN LICITACIONES MEXICANAS. \
         Tu única tarea es extraer datos y devolverlos en JSON.\n\n",
    );
    prompt.push_str("TEXTO DE LAS BASES:\n");
    prompt.push_str(truncate_chars(text, ANALYSIS_TEXT_CHARS));
    prompt.push_str("\n\n---\nINSTRUCCIONES DE EXTRACCIÓN (ROL: AUDITOR LEGAL):\n\n");

    let instructions = [
        "convocante: Quién convoca.",
        "numero_licitacion: ID oficial.",
        "objeto: Descripción de trabajos.",
        "fecha_publicacion: Fecha del documento.",
        "fianzas_requeridas: Objeto con garantías.",
        "categorized_anexos: Clasifica documentos con ID (T1, E1, etc.). Incluye también los \
         documentos obligatorios sin ID (Opinión SAT 32-D, Opinión IMSS, INFONAVIT, REPSE, \
         Inhabilitaciones) con prefijo [ADM - Sin Anexo].",
        "fechas_clave: Eventos con hora.",
        "certificaciones_y_normas: ISO, NOM, etc.",
        "puntos_criticos: Solo datos que aparezcan explícitamente en el texto. Indica si el \
         procedimiento es electrónico (ComprasMX, CompraNet) o presencial. Si un dato no aparece, \
         pon \"NO ESPECIFICADO EN LA CONVOCATORIA\". Nunca inventes direcciones ni protocolos de \
         firma física.",
        "checklist_cumplimiento: Requisitos de fondo cuya omisión sea causa de descalificación.",
    ];
    for (i, line) in instructions.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n\n", i + 1, line));
    }

    prompt.push_str("FORMATO DE RESPUESTA: SOLO JSON, SIN TEXTO ADICIONAL:\n");
    prompt.push_str(
        r#"{
  "convocante": "...",
  "numero_licitacion": "...",
  "objeto": "...",
  "fecha_publicacion": "...",
  "fianzas_requeridas": {"garantia_seriedad": "...", "cumplimiento": "...", "vicios_ocultos": "..."},
  "categorized_anexos": {"technical": ["DOCUMENTO T1 - ..."], "economic": ["DOCUMENTO E1 - ..."]},
  "fechas_clave": {"visita": "...", "aclaraciones": "...", "apertura": "...", "fallo": "..."},
  "certificaciones_y_normas": "...",
  "puntos_criticos": {
    "dirigido_a": "...",
    "firma_requerida": "...",
    "lugar_entrega": "...",
    "advertencias": ["..."],
    "tipo_procedimiento": "electrónico" | "presencial" | "mixto"
  },
  "checklist_cumplimiento": [
    {"punto": "...", "motivo_riesgo": "...", "accion_preventiva": "..."}
  ]
}"#,
    );
    prompt
}

/// Build the prompt asking for the paragraphs of one proposal document.
pub fn build_document_prompt(
    document: &str,
    analysis: &TenderAnalysis,
    company: &CompanyData,
    role: DocumentRole,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("ERES UN {}.\n", role.persona()));
    prompt.push_str(&format!(
        "Genera el contenido formal y detallado para el documento: '{}'.\n\n",
        document
    ));

    prompt.push_str("CONTEXTO DE LA LICITACIÓN:\n");
    prompt.push_str(&format!("- Institución Convocante: {}\n", analysis.convocante));
    prompt.push_str(&format!("- Número de Licitación: {}\n", analysis.numero_licitacion));
    prompt.push_str(&format!("- Objeto del Contrato: {}\n", analysis.objeto));
    prompt.push_str(&format!(
        "- Plazo de Entrega/Ejecución: {}\n\n",
        analysis.fechas_clave.fallo
    ));

    prompt.push_str("DATOS DEL LICITANTE (MI EMPRESA):\n");
    prompt.push_str(&format!("- Razón Social: {}\n", company.razon_social));
    prompt.push_str(&format!("- RFC: {}\n", company.rfc));
    prompt.push_str(&format!(
        "- Domicilio Fiscal: {}\n",
        company.domicilio.as_deref().unwrap_or("N/D")
    ));
    prompt.push_str(&format!(
        "- Representante Legal: {}\n\n",
        company.representante.as_deref().unwrap_or("N/D")
    ));

    prompt.push_str(
        "REQUISITOS TÉCNICOS LEGALES:\n\
         1. Usa un tono estrictamente formal, legal y jurídico mexicano.\n\
         2. Menciona explícitamente que se actúa \"BAJO PROTESTA DE DECIR VERDAD\".\n\
         3. Cita los artículos aplicables de la Ley de Adquisiciones, Arrendamientos y Servicios \
         del Sector Público (o la ley estatal equivalente).\n\
         4. Incluye declaraciones sobre no encontrarse en supuestos de inhabilitación, integridad \
         de la propuesta y compromiso de cumplimiento.\n\n",
    );
    prompt.push_str(
        "INSTRUCCIONES DE FORMATO:\n\
         - Divide el contenido en una lista de 4 a 6 párrafos bien redactados.\n\
         - No incluyas el encabezado ni la firma.\n\
         - Si falta algún dato específico usa [DATOS POR COMPLETAR].\n\n",
    );
    prompt.push_str(
        "Responde ÚNICAMENTE con un JSON con esta estructura exacta:\n\
         {\"parrafos\": [\"En mi carácter de representante legal de...\", \"...\"]}\n",
    );
    prompt
}

/// Build the free-form question prompt for the workspace assistant.
pub fn build_chat_prompt(
    question: &str,
    profile: &Profile,
    sources: &[String],
    context: &str,
) -> String {
    let bidder = &profile.licitante;
    let tender = &profile.tender;
    let sources_text = if sources.is_empty() {
        "No especificadas.".to_string()
    } else {
        sources
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut prompt = String::new();
    prompt.push_str("ERES EL ASISTENTE LEGAL DE LICITACIONES.\n");
    prompt.push_str(
        "Responde preguntas con precisión basándote solo en la información proporcionada.\n\n",
    );

    prompt.push_str("DATOS DE LA EMPRESA (LICITANTE):\n");
    prompt.push_str(&format!("- Nombre/Razón Social: {}\n", bidder.empresa));
    prompt.push_str(&format!("- RFC: {}\n", bidder.rfc));
    prompt.push_str(&format!("- Representante Legal: {}\n", bidder.representante));
    prompt.push_str(&format!("- Cargo: {}\n", bidder.cargo));
    prompt.push_str(&format!("- Domicilio Fiscal: {}\n\n", bidder.domicilio));

    prompt.push_str("DOCUMENTOS FUENTE CARGADOS:\n");
    prompt.push_str(&sources_text);
    prompt.push_str("\n\n");

    prompt.push_str("DATOS DE LA LICITACIÓN:\n");
    prompt.push_str(&format!("- Número: {}\n", tender.numero_licitacion));
    prompt.push_str(&format!("- Convocante: {}\n", tender.convocante));
    prompt.push_str(&format!("- Objeto: {}\n\n", tender.objeto));

    prompt.push_str("CONTEXTO EXTRAÍDO DE LOS DOCUMENTOS (BASES):\n");
    prompt.push_str(truncate_chars(context, CHAT_CONTEXT_CHARS));
    prompt.push_str("\n\n");

    prompt.push_str("PREGUNTA DEL USUARIO:\n");
    prompt.push_str(question);
    prompt.push_str(
        "\n\nREGLAS DE RESPUESTA:\n\
         1. Responde de forma profesional, clara y directa.\n\
         2. Para preguntas sobre la empresa usa los DATOS DE LA EMPRESA.\n\
         3. Para preguntas sobre los archivos usa la lista de DOCUMENTOS FUENTE.\n\
         4. Si la información no aparece, dilo amablemente.\n\
         5. No inventes datos.\n\n\
         Responde en español.\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_prompt_truncates_text() {
        let text = "x".repeat(ANALYSIS_TEXT_CHARS + 500);
        let prompt = build_analysis_prompt(&text);
        assert!(prompt.contains(&"x".repeat(ANALYSIS_TEXT_CHARS)));
        assert!(!prompt.contains(&"x".repeat(ANALYSIS_TEXT_CHARS + 1)));
        assert!(prompt.contains("categorized_anexos"));
    }

    #[test]
    fn test_document_prompt_mentions_document_and_company() {
        let analysis = TenderAnalysis {
            convocante: "CFE".to_string(),
            ..TenderAnalysis::default()
        };
        let company = CompanyData {
            razon_social: "ACME S.A. DE C.V.".to_string(),
            ..CompanyData::default()
        };
        let prompt =
            build_document_prompt("T1 - Carta", &analysis, &company, DocumentRole::Economic);
        assert!(prompt.starts_with("ERES UN EXPERTO EN FINANZAS"));
        assert!(prompt.contains("'T1 - Carta'"));
        assert!(prompt.contains("ACME S.A. DE C.V."));
        assert!(prompt.contains("Institución Convocante: CFE"));
        assert!(prompt.contains("\"parrafos\""));
    }

    #[test]
    fn test_chat_prompt_lists_sources() {
        let profile = Profile::consolidate(&TenderAnalysis::default(), &CompanyData::default());
        let prompt = build_chat_prompt(
            "¿Cuándo es el fallo?",
            &profile,
            &["bases.pdf".to_string()],
            "contexto",
        );
        assert!(prompt.contains("- bases.pdf"));
        assert!(prompt.contains("¿Cuándo es el fallo?"));

        let prompt = build_chat_prompt("x", &profile, &[], "");
        assert!(prompt.contains("No especificadas."));
    }
}

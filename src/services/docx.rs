//! Client for the document-render service (`POST {base}/docx/generate`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DocumentRenderer, check_status, trim_base_url};
use crate::errors::ServiceError;
use crate::tender::profile::CompanyData;
use crate::tender::{NOT_AVAILABLE, PersonType, TenderAnalysis};

const SERVICE: &str = "docx";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub tipo: String,
    pub texto: String,
}

impl Paragraph {
    pub fn text(texto: impl Into<String>) -> Self {
        Self {
            tipo: "parrafo".to_string(),
            texto: texto.into(),
        }
    }
}

/// Render request for one proposal document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocxPayload {
    pub convocante: String,
    pub licitacion_no: String,
    pub objeto: String,
    pub empresa_nombre: String,
    pub empresa_rfc: String,
    pub representante_legal: String,
    pub cargo_representante: String,
    pub tipo_persona: String,
    pub titulo_documento: String,
    pub logo_path: Option<String>,
    pub contenido: Vec<Paragraph>,
    pub domicilio_fiscal: String,
}

impl DocxPayload {
    /// Assemble the payload; an empty paragraph list gets a placeholder.
    pub fn build(
        title: &str,
        analysis: &TenderAnalysis,
        company: &CompanyData,
        paragraphs: Vec<String>,
    ) -> Self {
        let mut contenido: Vec<Paragraph> = paragraphs
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .map(Paragraph::text)
            .collect();
        if contenido.is_empty() {
            contenido.push(Paragraph::text(placeholder_paragraph(title)));
        }

        Self {
            convocante: analysis.convocante.clone(),
            licitacion_no: analysis.numero_licitacion.clone(),
            objeto: analysis.objeto.clone(),
            empresa_nombre: company.razon_social.clone(),
            empresa_rfc: company.rfc.clone(),
            representante_legal: company
                .representante
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            cargo_representante: company.cargo.clone(),
            tipo_persona: company
                .tipo_persona
                .unwrap_or(PersonType::Moral)
                .as_str()
                .to_string(),
            titulo_documento: title.to_string(),
            logo_path: company.logo_path.clone(),
            contenido,
            domicilio_fiscal: company
                .domicilio
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        }
    }
}

/// Stand-in paragraph for a document the LLM left empty.
pub fn placeholder_paragraph(title: &str) -> String {
    format!(
        "Documento {} generado automáticamente. Por favor revise el contenido.",
        title
    )
}

pub struct DocxClient {
    http: reqwest::Client,
    base_url: String,
}

impl DocxClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: trim_base_url(base_url),
        }
    }
}

#[async_trait]
impl DocumentRenderer for DocxClient {
    async fn render(
        &self,
        payload: &DocxPayload,
        timeout: Duration,
    ) -> Result<Vec<u8>, ServiceError> {
        let secs = timeout.as_secs();
        let response = self
            .http
            .post(format!("{}/docx/generate", self.base_url))
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, secs, e))?;
        let response = check_status(SERVICE, response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, secs, e))?;
        if bytes.is_empty() {
            return Err(ServiceError::Decode {
                service: SERVICE.to_string(),
                message: "empty document".to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company() -> CompanyData {
        CompanyData {
            razon_social: "ACME S.A. DE C.V.".to_string(),
            rfc: "ACM010101AB1".to_string(),
            representante: Some("Ana López".to_string()),
            cargo: "Administrador Único".to_string(),
            domicilio: None,
            logo_path: Some("/data/ws/logo.png".to_string()),
            tipo_persona: Some(PersonType::Physical),
        }
    }

    #[test]
    fn test_payload_fields() {
        let analysis = TenderAnalysis {
            convocante: "CFE".to_string(),
            numero_licitacion: "LA-018TOQ-2024".to_string(),
            ..TenderAnalysis::default()
        };
        let payload = DocxPayload::build(
            "Carta de aceptación",
            &analysis,
            &company(),
            vec!["Primero.".to_string(), "  ".to_string(), "Segundo.".to_string()],
        );
        assert_eq!(payload.licitacion_no, "LA-018TOQ-2024");
        assert_eq!(payload.tipo_persona, "PF");
        assert_eq!(payload.domicilio_fiscal, NOT_AVAILABLE);
        assert_eq!(payload.contenido.len(), 2);
        assert_eq!(payload.contenido[1], Paragraph::text("Segundo."));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["contenido"][0]["tipo"], "parrafo");
        assert_eq!(json["titulo_documento"], "Carta de aceptación");
    }

    #[test]
    fn test_empty_paragraphs_get_placeholder() {
        let payload = DocxPayload::build("Anexo 1", &TenderAnalysis::default(), &company(), Vec::new());
        assert_eq!(
            payload.contenido,
            vec![Paragraph::text(placeholder_paragraph("Anexo 1"))]
        );
        assert!(payload.contenido[0].texto.contains("Anexo 1"));
    }
}

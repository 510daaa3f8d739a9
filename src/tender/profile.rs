//! Bidder data resolution and the consolidated tender/bidder profile.

use serde::{Deserialize, Serialize};

use super::schema::{NOT_AVAILABLE, TenderAnalysis};
use crate::store::models::{ActaData, CifData, PLACEHOLDER_RFC, WorkspaceRecord, non_blank};
use crate::util::safe_text;

pub const DEFAULT_COMPANY_NAME: &str = "EMPRESA S.A. DE C.V.";
pub const DEFAULT_CARGO: &str = "Representante Legal";

/// Legal form of the bidder as expected by the document renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonType {
    #[serde(rename = "PM")]
    Moral,
    #[serde(rename = "PF")]
    Physical,
}

impl PersonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moral => "PM",
            Self::Physical => "PF",
        }
    }

    /// Map the free-text `tipo_persona` of a tax registration.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "moral" | "persona moral" | "empresa" => Some(Self::Moral),
            "fisica" | "física" | "persona física" | "persona fisica" => Some(Self::Physical),
            _ => None,
        }
    }
}

/// Bidder data resolved from a workspace's identity documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyData {
    pub razon_social: String,
    pub rfc: String,
    pub representante: Option<String>,
    pub cargo: String,
    pub domicilio: Option<String>,
    pub logo_path: Option<String>,
    pub tipo_persona: Option<PersonType>,
}

impl Default for CompanyData {
    fn default() -> Self {
        Self {
            razon_social: DEFAULT_COMPANY_NAME.to_string(),
            rfc: PLACEHOLDER_RFC.to_string(),
            representante: None,
            cargo: DEFAULT_CARGO.to_string(),
            domicilio: None,
            logo_path: None,
            tipo_persona: Some(PersonType::Moral),
        }
    }
}

impl CompanyData {
    /// Resolve bidder data from a workspace row; missing rows give defaults.
    pub fn from_workspace(record: Option<&WorkspaceRecord>) -> Self {
        let Some(record) = record else {
            return Self::default();
        };
        let empty_cif = CifData::empty();
        let empty_acta = ActaData::empty();
        let cif = record.cif_data.as_ref().unwrap_or(&empty_cif);
        let acta = record.acta_data.as_ref().unwrap_or(&empty_acta);

        Self {
            razon_social: non_blank(&cif.razon_social)
                .or_else(|| non_blank(&acta.razon_social))
                .unwrap_or(DEFAULT_COMPANY_NAME)
                .to_string(),
            rfc: non_blank(&cif.rfc).unwrap_or(PLACEHOLDER_RFC).to_string(),
            representante: acta
                .representative()
                .or_else(|| non_blank(&cif.representante_legal))
                .map(str::to_string),
            cargo: non_blank(&acta.cargo).unwrap_or(DEFAULT_CARGO).to_string(),
            domicilio: cif.address().map(str::to_string),
            logo_path: non_blank(&record.logo_path).map(str::to_string),
            tipo_persona: cif.tipo_persona.as_deref().and_then(PersonType::from_label),
        }
    }

    /// False while the RFC is still the placeholder.
    pub fn has_real_data(&self) -> bool {
        self.rfc != PLACEHOLDER_RFC
    }

    /// Fill from the first other workspace carrying a usable identity: a
    /// real RFC in its tax registration or a representative in its charter.
    /// Returns the id of the workspace used, if any.
    pub fn fill_from_global<'a>(
        &mut self,
        others: impl IntoIterator<Item = &'a WorkspaceRecord>,
    ) -> Option<String> {
        for record in others {
            let cif_rfc = record
                .cif_data
                .as_ref()
                .and_then(|c| non_blank(&c.rfc))
                .filter(|rfc| *rfc != PLACEHOLDER_RFC);
            let acta_rep = record.acta_data.as_ref().and_then(|a| non_blank(&a.representante));
            if cif_rfc.is_none() && acta_rep.is_none() {
                continue;
            }

            let cif = record.cif_data.as_ref();
            let acta = record.acta_data.as_ref();
            if let Some(name) = cif
                .and_then(|c| non_blank(&c.razon_social))
                .or_else(|| acta.and_then(|a| non_blank(&a.razon_social)))
            {
                self.razon_social = name.to_string();
            }
            if let Some(rfc) = cif.and_then(|c| non_blank(&c.rfc)) {
                self.rfc = rfc.to_string();
            }
            if let Some(rep) = acta_rep.or_else(|| cif.and_then(|c| non_blank(&c.representante_legal))) {
                self.representante = Some(rep.to_string());
            }
            if let Some(address) = cif.and_then(|c| non_blank(&c.domicilio_fiscal)) {
                self.domicilio = Some(address.to_string());
            }
            if let Some(logo) = non_blank(&record.logo_path) {
                self.logo_path = Some(logo.to_string());
            }
            if let Some(cargo) = acta.and_then(|a| non_blank(&a.cargo)) {
                self.cargo = cargo.to_string();
            }
            return Some(record.id.clone());
        }
        None
    }
}

/// Tender half of the consolidated profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenderProfile {
    pub convocante: String,
    pub numero_licitacion: String,
    pub objeto: String,
    pub fecha_publicacion: String,
}

/// Bidder half of the consolidated profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidderProfile {
    pub empresa: String,
    pub rfc: String,
    pub domicilio: String,
    pub representante: String,
    pub cargo: String,
    pub logo_path: String,
}

/// Tender and bidder data as presented to clients and document generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub tender: TenderProfile,
    pub licitante: BidderProfile,
}

impl Profile {
    pub fn consolidate(analysis: &TenderAnalysis, company: &CompanyData) -> Self {
        Self {
            tender: TenderProfile {
                convocante: safe_text(Some(&analysis.convocante), NOT_AVAILABLE),
                numero_licitacion: safe_text(Some(&analysis.numero_licitacion), NOT_AVAILABLE),
                objeto: safe_text(Some(&analysis.objeto), NOT_AVAILABLE),
                fecha_publicacion: safe_text(Some(&analysis.fecha_publicacion), NOT_AVAILABLE),
            },
            licitante: BidderProfile {
                empresa: safe_text(Some(&company.razon_social), NOT_AVAILABLE),
                rfc: safe_text(Some(&company.rfc), PLACEHOLDER_RFC),
                domicilio: safe_text(company.domicilio.as_deref(), NOT_AVAILABLE),
                representante: safe_text(company.representante.as_deref(), NOT_AVAILABLE),
                cargo: safe_text(Some(&company.cargo), DEFAULT_CARGO),
                logo_path: company.logo_path.clone().unwrap_or_default(),
            },
        }
    }

    /// Company data for document generation: identity fields come from the
    /// consolidated profile, cargo and legal form from the raw resolution.
    pub fn bidder_company(&self, raw: &CompanyData) -> CompanyData {
        let bidder = &self.licitante;
        CompanyData {
            razon_social: bidder.empresa.clone(),
            rfc: bidder.rfc.clone(),
            representante: Some(bidder.representante.clone()),
            cargo: raw.cargo.clone(),
            domicilio: Some(bidder.domicilio.clone()),
            logo_path: (!bidder.logo_path.is_empty()).then(|| bidder.logo_path.clone()),
            tipo_persona: Some(raw.tipo_persona.unwrap_or(PersonType::Moral)),
        }
    }
}

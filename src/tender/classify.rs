//! Keyword classifier for the tender procedure type, plus the clean-up of
//! OCR text where every letter is separated by a space.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcedureType {
    #[serde(rename = "electrónico")]
    Electronic,
    #[serde(rename = "presencial")]
    InPerson,
    #[serde(rename = "mixto")]
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "federal_electronica")]
    FederalElectronic,
    #[serde(rename = "local_presencial")]
    LocalInPerson,
    #[serde(rename = "mixta")]
    Mixed,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FederalElectronic => "federal_electronica",
            Self::LocalInPerson => "local_presencial",
            Self::Mixed => "mixta",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub procedure: ProcedureType,
    pub entity: EntityType,
}

pub fn classify_procedure(text: &str) -> Classification {
    let t = text.to_lowercase();
    let electronic = t.contains("comprasmx")
        || t.contains("compranet")
        || t.contains("proposiciones electrónicas")
        || t.contains("proposiciones electronicas")
        || (t.contains("plataforma") && t.contains("electr"));
    let municipal = t.contains("ayuntamiento")
        || t.contains("alcalde municipal")
        || t.contains("casa de la cultura");

    if electronic {
        Classification {
            procedure: ProcedureType::Electronic,
            entity: EntityType::FederalElectronic,
        }
    } else if municipal {
        Classification {
            procedure: ProcedureType::InPerson,
            entity: EntityType::LocalInPerson,
        }
    } else {
        Classification {
            procedure: ProcedureType::Mixed,
            entity: EntityType::Mixed,
        }
    }
}

static SPACED_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z]\b\s\b[a-zA-Z]\b").unwrap());

/// Pairs of isolated letters in the head of the text above which the whole
/// text is considered letter-spaced.
const SPACED_PAIR_THRESHOLD: usize = 20;
const SPACED_SAMPLE_CHARS: usize = 1000;

/// Join letter-spaced text ("B a s e s" → "Bases") when it dominates the
/// first thousand characters. Other text is returned unchanged.
pub fn join_spaced_letters(text: &str) -> Cow<'_, str> {
    let sample = crate::util::truncate_chars(text, SPACED_SAMPLE_CHARS);
    if SPACED_PAIR.find_iter(sample).count() <= SPACED_PAIR_THRESHOLD {
        return Cow::Borrowed(text);
    }

    let chars: Vec<char> = text.chars().collect();
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let lone_letter_at = |i: usize, before: Option<usize>, after: Option<usize>| {
        chars[i].is_ascii_alphabetic()
            && before.is_none_or(|b| !is_word(chars[b]))
            && after.is_none_or(|a| !is_word(chars[a]))
    };

    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        let droppable = c.is_whitespace()
            && i >= 1
            && i + 1 < chars.len()
            && lone_letter_at(i - 1, (i >= 2).then(|| i - 2), Some(i))
            && lone_letter_at(i + 1, Some(i), (i + 2 < chars.len()).then_some(i + 2));
        if !droppable {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_electronic_keywords() {
        for text in [
            "Licitación vía ComprasMX",
            "sistema CompraNet",
            "recepción de proposiciones electrónicas",
            "a través de la plataforma electrónica",
        ] {
            assert_eq!(classify_procedure(text).procedure, ProcedureType::Electronic, "{text}");
        }
    }

    #[test]
    fn test_municipal_keywords() {
        let c = classify_procedure("Entrega en la Casa de la Cultura");
        assert_eq!(c.procedure, ProcedureType::InPerson);
        assert_eq!(c.entity, EntityType::LocalInPerson);
    }

    #[test]
    fn test_electronic_wins_over_municipal() {
        let c = classify_procedure("El Ayuntamiento publica en CompraNet");
        assert_eq!(c.procedure, ProcedureType::Electronic);
    }

    #[test]
    fn test_default_is_mixed() {
        let c = classify_procedure("Bases de licitación pública");
        assert_eq!(c.procedure, ProcedureType::Mixed);
        assert_eq!(c.entity, EntityType::Mixed);
    }

    #[test]
    fn test_procedure_wire_names() {
        assert_eq!(
            serde_json::to_string(&ProcedureType::Electronic).unwrap(),
            "\"electrónico\""
        );
        assert_eq!(serde_json::to_string(&ProcedureType::Mixed).unwrap(), "\"mixto\"");
    }

    #[test]
    fn test_join_spaced_letters() {
        let spaced = "B a s e s d e l a l i c i t a c i o n p u b l i c a \
                      n a c i o n a l p a r a o b r a s y s e r v i c i o s";
        let joined = join_spaced_letters(spaced);
        assert_eq!(joined, "Basesdelalicitacionpublicanacionalparaobrasyservicios");
    }

    #[test]
    fn test_normal_text_is_untouched() {
        let text = "Bases de la licitación pública nacional y a la vez o no";
        assert!(matches!(join_spaced_letters(text), Cow::Borrowed(_)));
    }
}

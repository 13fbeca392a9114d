//! Tabulation request payload for the portal's `.def` form.
//!
//! The field grammar below is owned by the portal and mirrors what its own
//! form submits: line dimension is region of residence, the increment is the
//! case count, the year of diagnosis is pinned to the requested year, and
//! every other dimension is either suppressed or filtered. Values are
//! already percent-encoded; this module only assembles them.

use crate::constants::DEF_NAME;
use crate::filters::{AgeGroup, Cid, Sex};

const ALL_CATEGORIES: &str = "TODAS_AS_CATEGORIAS__";

const LINE_REGION_OF_RESIDENCE: &str =
    "Regi%E3o+-+resid%EAncia%7CSUBSTR%28CO_MUNICIPIO_RESIDENCIA%2C1%2C1%29%7C1%7Cterritorio%5Cbr_regiao.cnv";

/// Suppressed dimensions, in the order the portal form lists them before
/// and after the variable sex/age fields.
const FIELDS_BEFORE_DIAGNOSIS: [&str; 12] = [
    "XRegi%E3o+-+resid%EAncia",
    "XRegi%E3o+-+diagn%F3stico",
    "XRegi%E3o+-+tratamento",
    "XUF+da+resid%EAncia",
    "XUF+do+diagn%F3stico",
    "XUF+do+tratamento",
    "SRegi%E3o+de+Saude+-+resid%EAncia",
    "SRegi%E3o+de+Saude+-+diagn%F3stico",
    "SRegi%E3o+de+Saude+-+tratamento",
    "SMunic%ED%ADpio+da+resid%EAncia",
    "SMunic%ED%ADpio+do+diagn%F3stico",
    "SMunic%ED%ADpio+do+tratamento",
];

const FIELDS_AFTER_AGE: [&str; 10] = [
    "XIdade",
    "XM%EAs%2FAno+do+diagn%F3stico",
    "SAno+do+tratamento",
    "XM%EAs%2FAno+do+tratamento",
    "XModalidade+Terap%EAutica",
    "XEstadiamento",
    "XTempo+Tratamento",
    "XTempo+Tratamento+%28detalhado%29",
    "XEstabelecimento+de+tratamento",
    "XEstabelecimento+diagn%F3stico",
];

pub fn tabulation_payload(year: u16, sex: Sex, age: Option<AgeGroup>, cid: Option<Cid>) -> String {
    let mut fields: Vec<String> = Vec::with_capacity(32);
    fields.push(format!("Linha={LINE_REGION_OF_RESIDENCE}"));
    fields.push("Coluna=--N%E3o-Ativa--".to_string());
    fields.push("Incremento=Casos%7C%3D+count%28*%29".to_string());
    fields.push(format!("PAno+do+diagn%F3stico={year}%7C{year}%7C4"));

    for name in FIELDS_BEFORE_DIAGNOSIS {
        fields.push(format!("{name}={ALL_CATEGORIES}"));
    }

    fields.push(format!("XDiagn%F3stico={ALL_CATEGORIES}"));
    let detailed = match cid {
        Some(cid) => {
            let code = cid.code();
            format!("{code}%7C{code}%7C3")
        }
        None => ALL_CATEGORIES.to_string(),
    };
    fields.push(format!("XDiagn%F3stico+Detalhado={detailed}"));

    fields.push(format!("XSexo={}", sex.portal_value()));
    let age_value = age.map_or(ALL_CATEGORIES, |g| g.portal_value);
    fields.push(format!("XFaixa+et%E1ria={age_value}"));

    for name in FIELDS_AFTER_AGE {
        fields.push(format!("{name}={ALL_CATEGORIES}"));
    }

    fields.push(format!("nomedef={DEF_NAME}"));
    fields.push("grafico=".to_string());
    fields.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::age_group;

    #[test]
    fn year_is_pinned_as_inclusive_bound() {
        let payload = tabulation_payload(2023, Sex::All, None, None);
        assert!(payload.contains("PAno+do+diagn%F3stico=2023%7C2023%7C4"));
    }

    #[test]
    fn default_query_suppresses_every_filter() {
        let payload = tabulation_payload(2021, Sex::All, None, None);
        assert!(payload.contains("XSexo=TODAS_AS_CATEGORIAS__"));
        assert!(payload.contains("XFaixa+et%E1ria=TODAS_AS_CATEGORIAS__"));
        assert!(payload.contains("XDiagn%F3stico+Detalhado=TODAS_AS_CATEGORIAS__"));
        assert!(payload.starts_with("Linha=Regi%E3o+-+resid%EAncia"));
        assert!(payload.ends_with("grafico="));
    }

    #[test]
    fn sex_filter_substitutes_portal_value() {
        let payload = tabulation_payload(2021, Sex::Male, None, None);
        assert!(payload.contains("XSexo=Masculino%7CM%7C1"));
        let payload = tabulation_payload(2021, Sex::Female, None, None);
        assert!(payload.contains("XSexo=Feminino%7CF%7C1"));
    }

    #[test]
    fn age_bracket_substitutes_portal_value() {
        let bracket = age_group("25 a 29 anos").unwrap();
        let payload = tabulation_payload(2021, Sex::Female, Some(bracket), None);
        assert!(payload.contains("XFaixa+et%E1ria=25+a+29+anos%7C025-029%7C3"));
    }

    #[test]
    fn detailed_cid_substitutes_both_slots() {
        let cid = crate::filters::Cid::parse("C50").unwrap();
        let payload = tabulation_payload(2021, Sex::All, None, Some(cid));
        assert!(payload.contains("XDiagn%F3stico+Detalhado=C50%7CC50%7C3"));
        assert!(payload.contains("XDiagn%F3stico=TODAS_AS_CATEGORIAS__"));
    }
}

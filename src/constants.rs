pub const DEFAULT_TABULATION_URL: &str =
    "http://tabnet.datasus.gov.br/cgi/webtabx.exe?PAINEL_ONCO/PAINEL_ONCOLOGIABR.def";
pub const DEFAULT_SESSION_URL: &str =
    "http://tabnet.datasus.gov.br/cgi/dhdat.exe?PAINEL_ONCO/PAINEL_ONCOLOGIABR.def";

/// `nomedef` form field value, percent-encoded the way the portal expects it.
pub const DEF_NAME: &str = "PAINEL_ONCO%2FPAINEL_ONCOLOGIABR.def";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

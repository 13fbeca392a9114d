//! Extraction of tabulated counts from the portal's response pages.
//!
//! The portal embeds results in a `data.addRows([...])` JavaScript call
//! whose rows look like `["1 Região Norte", {v: 1234, f: "1.234"}]`. The
//! layout is undocumented and can change without notice, so a body that
//! matches neither the table nor the "Nenhum registro" marker is treated as
//! a schema change and fails loudly.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::filters::Region;

/// Marker the portal prints when a filter combination has no records.
pub const NO_RECORDS_MARKER: &str = "Nenhum registro";

static ADDROWS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)data\.addRows\(\s*\[(.*?)\]\s*\);").expect("addRows regex"));

// Accepts both the accented and plain spellings of "Região"; the portal has
// served both depending on the page encoding.
static REGION_ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[\s*['"]\s*(\d+)\s+Regi(?:ão|ao)\s+[^\]]+?['"]\s*,\s*\{v:\s*([\d.]+)"#)
        .expect("region row regex")
});

/// Inner text of the first `data.addRows([...])` call, if present.
pub fn extract_addrows(body: &str) -> Option<&str> {
    ADDROWS_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Per-region counts parsed out of an addRows block.
pub fn region_counts(block: &str) -> BTreeMap<Region, u64> {
    let mut counts = BTreeMap::new();
    for caps in REGION_ROW_RE.captures_iter(block) {
        let code = caps[1].parse::<u8>().ok();
        let value = caps[2].parse::<f64>().ok();
        match (code.and_then(Region::from_portal_code), value) {
            (Some(region), Some(value)) => {
                counts.insert(region, value.round() as u64);
            }
            _ => {
                tracing::warn!(row = %&caps[0], "skipping unrecognized region row");
            }
        }
    }
    counts
}

/// Full body-to-counts path for one response, distinguishing "no data for
/// this filter" from "the page no longer looks like a result table".
pub fn parse_region_body(body: &str, filter: &str) -> Result<BTreeMap<Region, u64>> {
    if body.contains(NO_RECORDS_MARKER) {
        return Err(Error::NoData {
            filter: filter.to_string(),
        });
    }

    let block = extract_addrows(body).ok_or_else(|| Error::PortalFormatChanged {
        filter: filter.to_string(),
        snippet: snippet_for_log(body),
    })?;

    let counts = region_counts(block);
    if counts.is_empty() {
        return Err(Error::PortalFormatChanged {
            filter: filter.to_string(),
            snippet: snippet_for_log(block),
        });
    }
    Ok(counts)
}

/// First ~300 characters of a body, for error messages.
pub fn snippet_for_log(text: &str) -> String {
    let trimmed = text.trim();
    let max_len = 300usize;
    if trimmed.chars().count() <= max_len {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(max_len).collect();
        format!("{cut}...")
    }
}

/// Locale-formatted twin of a count, pt-BR style ("12.345").
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let offset = digits.len() % 3;
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (idx + 3 - offset) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Inverse of [`format_count`].
pub fn parse_formatted(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(|c| *c != '.').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

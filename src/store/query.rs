use url::{Url, form_urlencoded};

use super::StoreResult;
use crate::core::{Inputs, SplitMode};

/// Decoded `key=value` pairs of a URL query, in order. Lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self {
            pairs: form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    pub fn from_url(url: &str) -> StoreResult<Self> {
        let url = Url::parse(url)?;
        Ok(Self::parse(url.query().unwrap_or("")))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Reads a numeric parameter. Absent, blank, and non-finite values yield `fallback`.
pub fn read_numeric_param(params: &QueryParams, key: &str, fallback: f64) -> f64 {
    let Some(raw) = params.get(key) else {
        return fallback;
    };
    let normalized = raw.trim();
    if normalized.is_empty() {
        return fallback;
    }
    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => fallback,
    }
}

/// Overlays query parameters onto `base`, the inputs restored from local state.
pub fn parse_inputs_from_query(params: &QueryParams, base: &Inputs) -> Inputs {
    let number = |key: &str, fallback: f64| read_numeric_param(params, key, fallback);
    let advanced = match params.get("advanced") {
        Some(raw) if !raw.is_empty() => raw == "1",
        _ => base.advanced,
    };
    let mode = params
        .get("mode")
        .and_then(SplitMode::parse)
        .unwrap_or(base.mode);

    Inputs {
        partner_a_name: params
            .get("nameA")
            .map_or_else(|| base.partner_a_name.clone(), str::to_string),
        partner_b_name: params
            .get("nameB")
            .map_or_else(|| base.partner_b_name.clone(), str::to_string),
        a1: number("a1", base.a1),
        a2: number("a2", base.a2),
        b2: number("b2", base.b2),
        tr_pct: number("trPct", base.tr_pct),
        b: number("b", base.b),
        m: number("m", base.m),
        advanced,
        eligible: number("E", base.eligible),
        bias_pts: number("biasPts", base.bias_pts),
        mode,
    }
}

/// Builds a link that reproduces `inputs` when opened. Any query or fragment already on
/// `base_url` is replaced.
pub fn inputs_to_shareable_url(inputs: &Inputs, base_url: &str) -> StoreResult<String> {
    let mut url = Url::parse(base_url)?;
    url.set_fragment(None);
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("nameA", &inputs.partner_a_name)
        .append_pair("nameB", &inputs.partner_b_name)
        .append_pair("a1", &inputs.a1.to_string())
        .append_pair("a2", &inputs.a2.to_string())
        .append_pair("b2", &inputs.b2.to_string())
        .append_pair("trPct", &inputs.tr_pct.to_string())
        .append_pair("b", &inputs.b.to_string())
        .append_pair("m", &inputs.m.to_string())
        .append_pair("advanced", if inputs.advanced { "1" } else { "0" })
        .append_pair("E", &inputs.eligible.to_string())
        .append_pair("biasPts", &inputs.bias_pts.to_string())
        .append_pair("mode", inputs.mode.as_str());
    Ok(url.into())
}

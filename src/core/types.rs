use serde::{Deserialize, Serialize};

/// Fairness policy used to split the shared budget.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Each partner covers the pot in proportion to income plus used vouchers.
    #[default]
    Proportional,
    /// Cash deposits are chosen so both partners keep the same leftover income.
    EqualLeftover,
}

impl SplitMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SplitMode::Proportional => "proportional",
            SplitMode::EqualLeftover => "equal_leftover",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "proportional" => Some(SplitMode::Proportional),
            "equal_leftover" => Some(SplitMode::EqualLeftover),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fr,
}

impl Locale {
    pub fn parse(raw: &str) -> Option<Self> {
        let lang = raw.trim().to_ascii_lowercase();
        if lang.starts_with("fr") {
            Some(Locale::Fr)
        } else if lang.starts_with("en") {
            Some(Locale::En)
        } else {
            None
        }
    }
}

/// Raw calculator inputs, as supplied by the input source.
///
/// Numeric fields are not trusted: the engine coerces non-finite values before use.
/// Missing fields deserialize to the application defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Inputs {
    pub partner_a_name: String,
    pub partner_b_name: String,
    /// Net monthly income of partner A.
    pub a1: f64,
    /// Gross monthly vouchers of partner A.
    pub a2: f64,
    /// Gross monthly vouchers of partner B.
    pub b2: f64,
    /// Share of vouchers actually spent, in percent.
    pub tr_pct: f64,
    /// Net monthly income of partner B.
    pub b: f64,
    /// Shared budget that must be paid in cash.
    pub m: f64,
    pub advanced: bool,
    /// Voucher-eligible monthly expenses, only read when `advanced` is set.
    #[serde(rename = "E")]
    pub eligible: f64,
    pub bias_pts: f64,
    pub mode: SplitMode,
}

impl Default for Inputs {
    fn default() -> Self {
        Self {
            partner_a_name: String::new(),
            partner_b_name: String::new(),
            a1: 2000.0,
            a2: 175.0,
            b2: 0.0,
            tr_pct: 100.0,
            b: 2000.0,
            m: 1500.0,
            advanced: false,
            eligible: 600.0,
            bias_pts: 0.0,
            mode: SplitMode::Proportional,
        }
    }
}

/// Itemized split produced by [`calculate`](super::calculate).
///
/// Monetary fields are rounded to cents; share fields are fractions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub mode: SplitMode,
    pub partner_a_name: String,
    pub partner_b_name: String,
    #[serde(rename = "effectiveTRA")]
    pub effective_tr_a: f64,
    #[serde(rename = "effectiveTRB")]
    pub effective_tr_b: f64,
    #[serde(rename = "effectiveTR")]
    pub effective_tr: f64,
    #[serde(rename = "usedTRA")]
    pub used_tr_a: f64,
    #[serde(rename = "usedTRB")]
    pub used_tr_b: f64,
    #[serde(rename = "V")]
    pub used_tr: f64,
    pub pot_total: f64,
    pub cash_needed: f64,
    pub bias_pts: f64,
    pub share_a_raw: f64,
    pub share_b_raw: f64,
    pub share_a_biased: f64,
    pub share_b_biased: f64,
    pub contrib_eq_a: f64,
    pub contrib_eq_b: f64,
    pub deposit_a: f64,
    pub deposit_b: f64,
    pub leftover_a: f64,
    pub leftover_b: f64,
    pub warnings: Vec<String>,
    pub steps: Vec<String>,
}

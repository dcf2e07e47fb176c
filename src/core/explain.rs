use super::numeric::{money, percent};
use super::types::Locale;

pub(crate) fn placeholder_name(locale: Locale, partner_b: bool) -> String {
    match (locale, partner_b) {
        (Locale::En, false) => "Partner A".to_string(),
        (Locale::En, true) => "Partner B".to_string(),
        (Locale::Fr, false) => "Partenaire A".to_string(),
        (Locale::Fr, true) => "Partenaire B".to_string(),
    }
}

fn eur(value: f64) -> String {
    format!("{} €", money(value))
}

/// Renders warnings and derivation lines for one calculation.
pub(crate) struct Explainer<'a> {
    pub locale: Locale,
    pub name_a: &'a str,
    pub name_b: &'a str,
}

impl Explainer<'_> {
    pub fn zero_weight_warning(&self) -> String {
        match self.locale {
            Locale::En => {
                "Combined weighted income is zero: shares fall back to 50/50.".to_string()
            }
            Locale::Fr => {
                "Somme des revenus pondérés nulle : parts fixées à 50/50 par sécurité.".to_string()
            }
        }
    }

    pub fn unused_vouchers_warning(&self, unused: f64) -> String {
        match self.locale {
            Locale::En => format!(
                "Vouchers not fully used: {} left unspent (eligible expenses below vouchers).",
                eur(unused)
            ),
            Locale::Fr => format!(
                "TR non utilisés intégralement : {} non consommés (E < TR).",
                eur(unused)
            ),
        }
    }

    pub fn voucher_clamp_warning(&self, name: &str) -> String {
        match self.locale {
            Locale::En => format!(
                "{name}'s deposit is floored at 0 (their share is covered by meal vouchers)."
            ),
            Locale::Fr => format!(
                "Le dépôt de {name} est borné à 0 (sa part est couverte par les tickets resto)."
            ),
        }
    }

    pub fn leftover_clamp_warning(&self, name: &str, other: &str) -> String {
        match self.locale {
            Locale::En => format!(
                "{name}'s deposit is floored at 0: the income gap exceeds the cash needed, so {other} covers all of it and leftovers stay unequal."
            ),
            Locale::Fr => format!(
                "Le dépôt de {name} est borné à 0 : l'écart de revenus dépasse le cash à déposer, {other} couvre tout et les restes à vivre ne sont plus égaux."
            ),
        }
    }

    pub fn effective_vouchers(&self, a: f64, b: f64, total: f64) -> String {
        let (a_name, b_name) = (self.name_a, self.name_b);
        match self.locale {
            Locale::En => format!(
                "Effective vouchers: {a_name} {}, {b_name} {} (total {})",
                eur(a),
                eur(b),
                eur(total)
            ),
            Locale::Fr => format!(
                "TR effectifs : {a_name} {}, {b_name} {} (total {})",
                eur(a),
                eur(b),
                eur(total)
            ),
        }
    }

    pub fn used_vouchers(&self, capped: bool, a: f64, b: f64, total: f64) -> String {
        let (a_name, b_name) = (self.name_a, self.name_b);
        let label = match (self.locale, capped) {
            (Locale::En, true) => "Used vouchers (after cap E)",
            (Locale::En, false) => "Used vouchers",
            (Locale::Fr, true) => "TR utilisés (après plafond E)",
            (Locale::Fr, false) => "TR utilisés",
        };
        format!(
            "{label}: {a_name} {}, {b_name} {} (total {})",
            eur(a),
            eur(b),
            eur(total)
        )
    }

    pub fn pot(&self, advanced: bool, m: f64, addend: f64, total: f64) -> String {
        let label = match self.locale {
            Locale::En => "Total pot",
            Locale::Fr => "Pot total",
        };
        let formula = if advanced { "m + E" } else { "m + V" };
        format!(
            "{label} = {formula} = {} + {} = {}",
            money(m),
            money(addend),
            eur(total)
        )
    }

    pub fn cash(&self, advanced: bool, m: f64, shortfall: f64, cash: f64) -> String {
        let label = match self.locale {
            Locale::En => "Cash needed",
            Locale::Fr => "Cash à déposer",
        };
        if advanced {
            format!(
                "{label} = m + max(0, E - V) = {} + {} = {}",
                money(m),
                money(shortfall),
                eur(cash)
            )
        } else {
            format!("{label} = m = {}", eur(cash))
        }
    }

    pub fn raw_shares(&self, share_a: f64) -> String {
        let label = match self.locale {
            Locale::En => "Shares (before bias)",
            Locale::Fr => "Parts (avant biais)",
        };
        format!(
            "{label}: {}={} / {}={}",
            self.name_a,
            percent(share_a),
            self.name_b,
            percent(1.0 - share_a)
        )
    }

    pub fn bias(&self, bias_pts: f64, share_a: f64, share_b: f64) -> String {
        let sign = if bias_pts >= 0.0 { "+" } else { "" };
        let effect = if bias_pts == 0.0 {
            match self.locale {
                Locale::En => "neutral".to_string(),
                Locale::Fr => "neutre".to_string(),
            }
        } else {
            let favoured = if bias_pts > 0.0 {
                self.name_b
            } else {
                self.name_a
            };
            match self.locale {
                Locale::En => format!("favours {favoured}"),
                Locale::Fr => format!("favorise {favoured}"),
            }
        };
        let label = match self.locale {
            Locale::En => "Bias",
            Locale::Fr => "Biais",
        };
        format!(
            "{label} {sign}{bias_pts:.1} pts ({effect}) => {}={} / {}={}",
            self.name_a,
            percent(share_a),
            self.name_b,
            percent(share_b)
        )
    }

    pub fn equivalent_contributions(&self, a: f64, b: f64) -> String {
        let label = match self.locale {
            Locale::En => "Equivalent contribution",
            Locale::Fr => "Contribution équivalente",
        };
        format!(
            "{label}: {}={}, {}={}",
            self.name_a,
            eur(a),
            self.name_b,
            eur(b)
        )
    }

    pub fn deposits(&self, a: f64, b: f64) -> String {
        let (label, sum_label) = match self.locale {
            Locale::En => ("Cash deposits", "cash total"),
            Locale::Fr => ("Dépôts cash", "somme cash"),
        };
        format!(
            "{label}: {}={}, {}={} ({sum_label}={})",
            self.name_a,
            eur(a),
            self.name_b,
            eur(b),
            eur(a + b)
        )
    }

    pub fn leftover_target(&self, cash: f64, income_a: f64, income_b: f64, deposit_a: f64) -> String {
        let label = match self.locale {
            Locale::En => "Equal leftover",
            Locale::Fr => "Reste à vivre égal",
        };
        format!(
            "{label}: {} deposit = (cash + ({} - {})) / 2 = ({} + ({} - {})) / 2 = {}",
            self.name_a,
            self.name_a,
            self.name_b,
            money(cash),
            money(income_a),
            money(income_b),
            eur(deposit_a)
        )
    }

    pub fn leftovers(&self, a: f64, b: f64) -> String {
        let label = match self.locale {
            Locale::En => "Leftover after deposit",
            Locale::Fr => "Reste après dépôt",
        };
        format!(
            "{label}: {}={}, {}={}",
            self.name_a,
            eur(a),
            self.name_b,
            eur(b)
        )
    }

    pub fn resulting_shares(&self, share_a: f64, share_b: f64) -> String {
        let label = match self.locale {
            Locale::En => "Resulting shares of the pot",
            Locale::Fr => "Parts résultantes du pot",
        };
        format!(
            "{label}: {}={} / {}={}",
            self.name_a,
            percent(share_a),
            self.name_b,
            percent(share_b)
        )
    }
}

use tracing::debug;

use super::explain::{Explainer, placeholder_name};
use super::numeric::{clamp, finite_or, round2};
use super::types::{Allocation, Inputs, Locale, SplitMode};

const MAX_BIAS_PTS: f64 = 50.0;
// Raw deposits above this are float noise, not a voucher surplus.
const CLAMP_EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Normalized {
    name_a: String,
    name_b: String,
    income_a: f64,
    income_b: f64,
    voucher_a: f64,
    voucher_b: f64,
    spent_fraction: f64,
    m: f64,
    advanced: bool,
    eligible: f64,
    bias_pts: f64,
    mode: SplitMode,
}

#[derive(Debug, Clone, Copy)]
struct VoucherUsage {
    effective_a: f64,
    effective_b: f64,
    used_a: f64,
    used_b: f64,
}

impl VoucherUsage {
    fn effective_total(self) -> f64 {
        self.effective_a + self.effective_b
    }

    fn used_total(self) -> f64 {
        self.used_a + self.used_b
    }
}

#[derive(Debug, Clone, Copy)]
struct Pot {
    total: f64,
    cash_needed: f64,
    eligible_shortfall: f64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Partner {
    A,
    B,
}

/// Unrounded phase-4 outcome shared by both fairness policies.
#[derive(Debug, Clone, Copy)]
struct Resolution {
    bias_pts: f64,
    share_a_raw: f64,
    share_a_biased: f64,
    deposit_a: f64,
    zero_weight: bool,
    clamped: Option<Partner>,
    leftover_target_deposit: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Reconciled {
    deposit_a: f64,
    deposit_b: f64,
    cash_needed: f64,
}

/// Splits the shared budget using English labels and placeholders.
pub fn calculate(inputs: &Inputs) -> Allocation {
    calculate_with_locale(inputs, Locale::En)
}

/// Splits the shared budget. Total over its input: every degenerate case resolves to numbers
/// plus a warning.
pub fn calculate_with_locale(inputs: &Inputs, locale: Locale) -> Allocation {
    let n = normalize(inputs, locale);
    let vouchers = resolve_vouchers(&n);
    let pot = aggregate_pot(&n, vouchers);

    let resolution = match n.mode {
        SplitMode::Proportional => resolve_proportional(&n, vouchers, pot),
        SplitMode::EqualLeftover => resolve_equal_leftover(&n, pot),
    };
    let reconciled = reconcile(resolution.deposit_a, pot.cash_needed);

    let (share_a_raw, share_a_biased, contrib_eq_a, contrib_eq_b) = match n.mode {
        SplitMode::Proportional => {
            let contrib_eq_a = pot.total * resolution.share_a_biased;
            (
                resolution.share_a_raw,
                resolution.share_a_biased,
                contrib_eq_a,
                pot.total - contrib_eq_a,
            )
        }
        SplitMode::EqualLeftover => {
            let contrib_eq_a = reconciled.deposit_a + vouchers.used_a;
            let contrib_eq_b = reconciled.deposit_b + vouchers.used_b;
            let share = pot_share(contrib_eq_a, pot.total);
            (share, share, contrib_eq_a, contrib_eq_b)
        }
    };
    let leftover_a = n.income_a - reconciled.deposit_a;
    let leftover_b = n.income_b - reconciled.deposit_b;

    let explainer = Explainer {
        locale,
        name_a: &n.name_a,
        name_b: &n.name_b,
    };

    let mut warnings = Vec::new();
    if resolution.zero_weight {
        warnings.push(explainer.zero_weight_warning());
    }
    if n.advanced && vouchers.effective_total() > n.eligible {
        warnings.push(explainer.unused_vouchers_warning(vouchers.effective_total() - n.eligible));
    }
    match (n.mode, resolution.clamped) {
        (_, None) => {}
        (SplitMode::Proportional, Some(Partner::A)) => {
            warnings.push(explainer.voucher_clamp_warning(&n.name_a));
        }
        (SplitMode::Proportional, Some(Partner::B)) => {
            warnings.push(explainer.voucher_clamp_warning(&n.name_b));
        }
        (SplitMode::EqualLeftover, Some(Partner::A)) => {
            warnings.push(explainer.leftover_clamp_warning(&n.name_a, &n.name_b));
        }
        (SplitMode::EqualLeftover, Some(Partner::B)) => {
            warnings.push(explainer.leftover_clamp_warning(&n.name_b, &n.name_a));
        }
    }

    let mut steps = vec![
        explainer.effective_vouchers(
            vouchers.effective_a,
            vouchers.effective_b,
            vouchers.effective_total(),
        ),
        explainer.used_vouchers(
            n.advanced,
            vouchers.used_a,
            vouchers.used_b,
            vouchers.used_total(),
        ),
        explainer.pot(
            n.advanced,
            n.m,
            if n.advanced {
                n.eligible
            } else {
                vouchers.used_total()
            },
            pot.total,
        ),
        explainer.cash(
            n.advanced,
            n.m,
            pot.eligible_shortfall,
            reconciled.cash_needed,
        ),
    ];
    match n.mode {
        SplitMode::Proportional => {
            steps.push(explainer.raw_shares(share_a_raw));
            steps.push(explainer.bias(
                resolution.bias_pts,
                share_a_biased,
                1.0 - share_a_biased,
            ));
            steps.push(explainer.equivalent_contributions(contrib_eq_a, contrib_eq_b));
            steps.push(explainer.deposits(reconciled.deposit_a, reconciled.deposit_b));
        }
        SplitMode::EqualLeftover => {
            steps.push(explainer.leftover_target(
                reconciled.cash_needed,
                n.income_a,
                n.income_b,
                resolution.leftover_target_deposit.unwrap_or(reconciled.deposit_a),
            ));
            steps.push(explainer.deposits(reconciled.deposit_a, reconciled.deposit_b));
            steps.push(explainer.leftovers(leftover_a, leftover_b));
            steps.push(explainer.equivalent_contributions(contrib_eq_a, contrib_eq_b));
            steps.push(explainer.resulting_shares(share_a_biased, 1.0 - share_a_biased));
        }
    }

    debug!(
        mode = n.mode.as_str(),
        pot_total = pot.total,
        cash_needed = reconciled.cash_needed,
        deposit_a = reconciled.deposit_a,
        deposit_b = reconciled.deposit_b,
        warnings = warnings.len(),
        "allocation computed"
    );

    Allocation {
        mode: n.mode,
        partner_a_name: n.name_a.clone(),
        partner_b_name: n.name_b.clone(),
        effective_tr_a: round2(vouchers.effective_a),
        effective_tr_b: round2(vouchers.effective_b),
        effective_tr: round2(vouchers.effective_total()),
        used_tr_a: round2(vouchers.used_a),
        used_tr_b: round2(vouchers.used_b),
        used_tr: round2(vouchers.used_total()),
        pot_total: round2(pot.total),
        cash_needed: reconciled.cash_needed,
        bias_pts: resolution.bias_pts,
        share_a_raw: round2(share_a_raw),
        share_b_raw: round2(1.0 - round2(share_a_raw)),
        share_a_biased: round2(share_a_biased),
        share_b_biased: round2(1.0 - round2(share_a_biased)),
        contrib_eq_a: round2(contrib_eq_a),
        contrib_eq_b: round2(contrib_eq_b),
        deposit_a: reconciled.deposit_a,
        deposit_b: reconciled.deposit_b,
        leftover_a: round2(leftover_a),
        leftover_b: round2(leftover_b),
        warnings,
        steps,
    }
}

fn normalize(inputs: &Inputs, locale: Locale) -> Normalized {
    let name = |raw: &str, partner_b: bool| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            placeholder_name(locale, partner_b)
        } else {
            trimmed.to_string()
        }
    };
    let bias_pts = match inputs.mode {
        SplitMode::Proportional => {
            clamp(finite_or(inputs.bias_pts, 0.0), -MAX_BIAS_PTS, MAX_BIAS_PTS)
        }
        SplitMode::EqualLeftover => 0.0,
    };

    Normalized {
        name_a: name(&inputs.partner_a_name, false),
        name_b: name(&inputs.partner_b_name, true),
        income_a: finite_or(inputs.a1, 0.0).max(0.0),
        income_b: finite_or(inputs.b, 0.0).max(0.0),
        voucher_a: finite_or(inputs.a2, 0.0).max(0.0),
        voucher_b: finite_or(inputs.b2, 0.0).max(0.0),
        spent_fraction: clamp(finite_or(inputs.tr_pct, 100.0), 0.0, 100.0) / 100.0,
        m: finite_or(inputs.m, 0.0).max(0.0),
        advanced: inputs.advanced,
        eligible: finite_or(inputs.eligible, 0.0).max(0.0),
        bias_pts,
        mode: inputs.mode,
    }
}

fn resolve_vouchers(n: &Normalized) -> VoucherUsage {
    let effective_a = n.voucher_a * n.spent_fraction;
    let effective_b = n.voucher_b * n.spent_fraction;
    let mut usage = VoucherUsage {
        effective_a,
        effective_b,
        used_a: effective_a,
        used_b: effective_b,
    };
    if !n.advanced {
        return usage;
    }

    let effective_total = usage.effective_total();
    let cap = effective_total.min(n.eligible);
    if cap <= 0.0 {
        usage.used_a = 0.0;
        usage.used_b = 0.0;
    } else if cap < effective_total {
        let ratio = cap / effective_total;
        usage.used_a = effective_a * ratio;
        usage.used_b = effective_b * ratio;
    }
    usage
}

fn aggregate_pot(n: &Normalized, vouchers: VoucherUsage) -> Pot {
    let used = vouchers.used_total();
    if n.advanced {
        let eligible_shortfall = (n.eligible - used).max(0.0);
        Pot {
            total: n.m + n.eligible,
            cash_needed: n.m + eligible_shortfall,
            eligible_shortfall,
        }
    } else {
        Pot {
            total: n.m + used,
            cash_needed: n.m,
            eligible_shortfall: 0.0,
        }
    }
}

fn resolve_proportional(n: &Normalized, vouchers: VoucherUsage, pot: Pot) -> Resolution {
    let weight_a = n.income_a + vouchers.used_a;
    let weight_b = n.income_b + vouchers.used_b;
    let denom = weight_a + weight_b;
    let zero_weight = denom <= 0.0;
    let share_a_raw = if zero_weight { 0.5 } else { weight_a / denom };
    let share_a_biased = clamp(share_a_raw + n.bias_pts / 100.0, 0.0, 1.0);

    let contrib_eq_a = pot.total * share_a_biased;
    let contrib_eq_b = pot.total - contrib_eq_a;
    let raw_a = contrib_eq_a - vouchers.used_a;
    let raw_b = contrib_eq_b - vouchers.used_b;

    // raw_a + raw_b is the cash need, never negative, so at most one side goes below zero and
    // the other absorbs it.
    let deposit_a = if raw_a < 0.0 {
        0.0
    } else if raw_b < 0.0 {
        raw_a + raw_b
    } else {
        raw_a
    };
    let clamped = if raw_a < -CLAMP_EPS {
        Some(Partner::A)
    } else if raw_b < -CLAMP_EPS {
        Some(Partner::B)
    } else {
        None
    };

    Resolution {
        bias_pts: n.bias_pts,
        share_a_raw,
        share_a_biased,
        deposit_a,
        zero_weight,
        clamped,
        leftover_target_deposit: None,
    }
}

/// Incomes enter as normalized by [`normalize`], so a negative net income counts as 0 here rather
/// than widening the gap the other partner has to cover.
fn resolve_equal_leftover(n: &Normalized, pot: Pot) -> Resolution {
    // Solved against the cent-rounded cash need so the leftovers stay equal after reconciliation.
    let cash_needed = round2(pot.cash_needed);
    let target = (cash_needed + (n.income_a - n.income_b)) / 2.0;
    let (deposit_a, clamped) = if target < 0.0 {
        (0.0, Some(Partner::A))
    } else if cash_needed - target < 0.0 {
        (cash_needed, Some(Partner::B))
    } else {
        (target, None)
    };

    // Shares are derived after rounding, once the final deposits are known.
    Resolution {
        bias_pts: 0.0,
        share_a_raw: 0.5,
        share_a_biased: 0.5,
        deposit_a,
        zero_weight: false,
        clamped,
        leftover_target_deposit: Some(target),
    }
}

fn pot_share(contribution: f64, pot_total: f64) -> f64 {
    if pot_total > 0.0 {
        clamp(contribution / pot_total, 0.0, 1.0)
    } else {
        0.5
    }
}

/// Rounds to cents while keeping `deposit_a + deposit_b == cash_needed` exact.
fn reconcile(deposit_a: f64, cash_needed: f64) -> Reconciled {
    let cash_needed = round2(cash_needed);
    let mut deposit_a = round2(deposit_a.max(0.0));
    let mut deposit_b = round2(cash_needed - deposit_a);

    // Rounding drift can leave B a cent below zero; A absorbs it.
    if deposit_b < 0.0 {
        deposit_b = 0.0;
        deposit_a = cash_needed;
    }

    Reconciled {
        deposit_a,
        deposit_b,
        cash_needed,
    }
}

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::StoreResult;
use super::kv::KeyValueStore;
use super::state::InputsRecord;
use crate::core::{Allocation, Inputs, Locale, calculate_with_locale};

pub const HISTORY_KEY: &str = "eqc_history_v2";
pub const LEGACY_HISTORY_KEY: &str = "eqc_history_v1";
pub const HISTORY_CAP: usize = 60;
pub const NOTE_MAX_CHARS: usize = 120;
/// Average Gregorian month, used by the period filter.
const DAYS_PER_MONTH: f64 = 30.4375;
const MS_PER_DAY: f64 = 86_400_000.0;

/// How far back [`HistoryStore::filter`] looks.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub enum HistoryPeriod {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "12m")]
    TwelveMonths,
}

impl HistoryPeriod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" | "all" => Some(HistoryPeriod::All),
            "3m" => Some(HistoryPeriod::ThreeMonths),
            "6m" => Some(HistoryPeriod::SixMonths),
            "12m" => Some(HistoryPeriod::TwelveMonths),
            _ => None,
        }
    }

    fn max_months(self) -> Option<f64> {
        match self {
            HistoryPeriod::All => None,
            HistoryPeriod::ThreeMonths => Some(3.0),
            HistoryPeriod::SixMonths => Some(6.0),
            HistoryPeriod::TwelveMonths => Some(12.0),
        }
    }
}

/// The part of an [`Allocation`] kept with each history entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    pub deposit_a: f64,
    pub deposit_b: f64,
    pub cash_needed: f64,
    #[serde(rename = "usedTR")]
    pub used_tr: f64,
    pub partner_a_name: String,
    pub partner_b_name: String,
}

impl HistorySnapshot {
    pub fn from_allocation(allocation: &Allocation) -> Self {
        Self {
            deposit_a: allocation.deposit_a,
            deposit_b: allocation.deposit_b,
            cash_needed: allocation.cash_needed,
            used_tr: allocation.used_tr,
            partner_a_name: allocation.partner_a_name.clone(),
            partner_b_name: allocation.partner_b_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    #[serde(rename = "dateISO")]
    pub date_iso: String,
    pub note: String,
    pub inputs: Inputs,
    pub result: HistorySnapshot,
}

/// Entries written before snapshots existed carry no `result`. Inputs go through the lenient
/// record so `null` numbers and missing fields fall back to the defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredItem {
    id: String,
    #[serde(rename = "dateISO")]
    date_iso: String,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    inputs: InputsRecord,
    #[serde(default)]
    result: Option<HistorySnapshot>,
}

/// Newest-first list of saved calculations, capped at [`HISTORY_CAP`] entries.
#[derive(Debug, Clone)]
pub struct HistoryStore<S> {
    store: S,
    locale: Locale,
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_locale(store, Locale::default())
    }

    /// `locale` picks the placeholder names used when upgrading legacy entries.
    pub fn with_locale(store: S, locale: Locale) -> Self {
        Self { store, locale }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads all entries, upgrading legacy storage on the way. Corrupt history reads as empty.
    pub fn list(&mut self) -> StoreResult<Vec<HistoryItem>> {
        let (raw, legacy) = match self.store.get(HISTORY_KEY)? {
            Some(raw) => (raw, false),
            None => match self.store.get(LEGACY_HISTORY_KEY)? {
                Some(raw) => (raw, true),
                None => return Ok(Vec::new()),
            },
        };

        let entries = match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "saved history is corrupt, starting empty");
                return Ok(Vec::new());
            }
        };

        let defaults = Inputs::default();
        let mut upgraded = 0_usize;
        let mut dropped = 0_usize;
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let stored = match serde_json::from_value::<StoredItem>(entry) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(error = %e, "dropping unreadable history entry");
                    dropped += 1;
                    continue;
                }
            };
            let inputs = stored.inputs.merge_onto(&defaults);
            let result = match stored.result {
                Some(result) => result,
                None => {
                    upgraded += 1;
                    HistorySnapshot::from_allocation(&calculate_with_locale(&inputs, self.locale))
                }
            };
            items.push(HistoryItem {
                id: stored.id,
                date_iso: stored.date_iso,
                note: stored.note.unwrap_or_default(),
                inputs,
                result,
            });
        }

        if legacy || upgraded > 0 || dropped > 0 {
            self.save(&items)?;
            if legacy {
                self.store.remove(LEGACY_HISTORY_KEY)?;
            }
            info!(entries = items.len(), upgraded, dropped, legacy, "history migrated");
        }
        Ok(items)
    }

    /// Entries within `period` whose note or month label contains `term`, case-insensitively.
    pub fn filter(&mut self, term: &str, period: HistoryPeriod) -> StoreResult<Vec<HistoryItem>> {
        let items = self.list()?;
        Ok(filter_items(items, term, period, self.locale, Utc::now()))
    }

    /// Records `inputs` with a snapshot of their allocation; evicts the oldest entries past the cap.
    pub fn add(&mut self, inputs: &Inputs, note: &str) -> StoreResult<HistoryItem> {
        let allocation = calculate_with_locale(inputs, self.locale);
        let item = HistoryItem {
            id: Uuid::new_v4().to_string(),
            date_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            note: note.trim().chars().take(NOTE_MAX_CHARS).collect(),
            inputs: inputs.clone(),
            result: HistorySnapshot::from_allocation(&allocation),
        };

        let mut items = self.list()?;
        items.insert(0, item.clone());
        items.truncate(HISTORY_CAP);
        self.save(&items)?;
        info!(id = %item.id, entries = items.len(), "history entry added");
        Ok(item)
    }

    /// Returns whether an entry with `id` existed.
    pub fn delete(&mut self, id: &str) -> StoreResult<bool> {
        let mut items = self.list()?;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.save(&items)?;
        info!(id, "history entry deleted");
        Ok(true)
    }

    pub fn clear(&mut self) -> StoreResult<()> {
        self.save(&[])?;
        info!("history cleared");
        Ok(())
    }

    fn save(&mut self, items: &[HistoryItem]) -> StoreResult<()> {
        self.store.set(HISTORY_KEY, serde_json::to_string(items)?)
    }
}

/// Empty notes are searchable through this label, as they are displayed.
pub fn note_label(note: &str, locale: Locale) -> &str {
    if !note.is_empty() {
        return note;
    }
    match locale {
        Locale::En => "(no note)",
        Locale::Fr => "(sans note)",
    }
}

/// Parses a stored timestamp. Entries saved as a bare `YYYY-MM-DD` date count as midnight UTC.
fn parse_saved_at(date_iso: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(date_iso) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(date_iso, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}

/// Short month and year, e.g. `Oct 2024` or `oct. 2024`.
pub fn month_label(at: DateTime<Utc>, locale: Locale) -> String {
    const EN: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    const FR: [&str; 12] = [
        "janv.", "févr.", "mars", "avr.", "mai", "juin", "juil.", "août", "sept.", "oct.", "nov.",
        "déc.",
    ];
    let names = match locale {
        Locale::En => EN,
        Locale::Fr => FR,
    };
    format!("{} {}", names[at.month0() as usize], at.year())
}

fn filter_items(
    items: Vec<HistoryItem>,
    term: &str,
    period: HistoryPeriod,
    locale: Locale,
    now: DateTime<Utc>,
) -> Vec<HistoryItem> {
    let term = term.trim().to_lowercase();
    items
        .into_iter()
        .filter(|item| {
            let saved_at = parse_saved_at(&item.date_iso);
            if let Some(max_months) = period.max_months() {
                // Unparseable dates never fall inside a bounded period.
                let Some(saved_at) = saved_at else {
                    return false;
                };
                let elapsed_ms = (now - saved_at).num_milliseconds() as f64;
                let months = elapsed_ms / MS_PER_DAY / DAYS_PER_MONTH;
                if months > max_months {
                    return false;
                }
            }
            if term.is_empty() {
                return true;
            }
            let label = saved_at
                .map(|at| month_label(at, locale).to_lowercase())
                .unwrap_or_default();
            note_label(&item.note, locale).to_lowercase().contains(&term) || label.contains(&term)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SplitMode;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn sample_inputs() -> Inputs {
        Inputs {
            partner_a_name: "Alex".to_string(),
            partner_b_name: "Bailey".to_string(),
            a1: 3000.0,
            a2: 200.0,
            b2: 180.0,
            tr_pct: 80.0,
            b: 3200.0,
            m: 900.0,
            advanced: false,
            eligible: 0.0,
            bias_pts: 0.0,
            mode: SplitMode::Proportional,
        }
    }

    fn legacy_item(inputs: Inputs) -> serde_json::Value {
        json!({
            "id": "item-1",
            "dateISO": "2024-10-01",
            "note": "note",
            "inputs": inputs,
        })
    }

    #[test]
    fn empty_store_lists_nothing() {
        let mut history = HistoryStore::new(MemoryStore::new());
        assert!(history.list().expect("list").is_empty());
    }

    #[test]
    fn add_snapshots_allocation_and_trims_note() {
        let mut history = HistoryStore::new(MemoryStore::new());
        let note = format!("  {}  ", "x".repeat(200));
        let item = history.add(&sample_inputs(), &note).expect("add");

        let expected = calculate_with_locale(&sample_inputs(), Locale::En);
        assert_eq!(item.note.chars().count(), NOTE_MAX_CHARS);
        assert_eq!(item.result, HistorySnapshot::from_allocation(&expected));
        assert_eq!(item.result.partner_a_name, "Alex");
        assert!(Uuid::parse_str(&item.id).is_ok());
        assert!(item.date_iso.ends_with('Z'));

        let listed = history.list().expect("list");
        assert_eq!(listed, vec![item]);
    }

    #[test]
    fn add_keeps_newest_first_and_evicts_past_cap() {
        let mut history = HistoryStore::new(MemoryStore::new());
        let mut first_id = String::new();
        for i in 0..(HISTORY_CAP + 5) {
            let item = history.add(&sample_inputs(), &format!("entry {i}")).expect("add");
            if i == 0 {
                first_id = item.id;
            }
        }

        let items = history.list().expect("list");
        assert_eq!(items.len(), HISTORY_CAP);
        assert_eq!(items[0].note, format!("entry {}", HISTORY_CAP + 4));
        assert_eq!(items[HISTORY_CAP - 1].note, "entry 5");
        assert!(items.iter().all(|item| item.id != first_id));
    }

    #[test]
    fn delete_and_clear_remove_entries() {
        let mut history = HistoryStore::new(MemoryStore::new());
        let keep = history.add(&sample_inputs(), "keep").expect("add");
        let drop = history.add(&sample_inputs(), "drop").expect("add");

        assert!(history.delete(&drop.id).expect("delete"));
        assert!(!history.delete("missing").expect("delete"));
        assert_eq!(history.list().expect("list"), vec![keep]);

        history.clear().expect("clear");
        assert!(history.list().expect("list").is_empty());
    }

    #[test]
    fn current_entries_with_snapshots_load_untouched() {
        let snapshot = HistorySnapshot {
            deposit_a: 10.0,
            deposit_b: 20.0,
            cash_needed: 30.0,
            used_tr: 40.0,
            partner_a_name: "Alex".to_string(),
            partner_b_name: "Bailey".to_string(),
        };
        let mut stored = legacy_item(sample_inputs());
        stored["result"] = serde_json::to_value(&snapshot).expect("json");
        let mut store = MemoryStore::new();
        store
            .set(HISTORY_KEY, json!([stored]).to_string())
            .expect("set");

        let items = HistoryStore::new(store).list().expect("list");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].result, snapshot);
    }

    #[test]
    fn entries_without_snapshot_are_recomputed_with_custom_names() {
        let mut inputs = sample_inputs();
        inputs.partner_a_name = "  Alice  ".to_string();
        inputs.partner_b_name = "Bob".to_string();
        let mut store = MemoryStore::new();
        store
            .set(HISTORY_KEY, json!([legacy_item(inputs.clone())]).to_string())
            .expect("set");

        let mut history = HistoryStore::new(store);
        let items = history.list().expect("list");
        let expected = calculate_with_locale(&inputs, Locale::En);
        assert_eq!(items[0].result.partner_a_name, "Alice");
        assert_eq!(items[0].result.partner_b_name, "Bob");
        assert_eq!(items[0].result.deposit_a, expected.deposit_a);
        assert_eq!(items[0].result.used_tr, expected.used_tr);
    }

    #[test]
    fn legacy_key_is_migrated_with_placeholder_names() {
        let mut inputs = sample_inputs();
        inputs.partner_a_name = "   ".to_string();
        inputs.partner_b_name = String::new();
        let mut store = MemoryStore::new();
        store
            .set(LEGACY_HISTORY_KEY, json!([legacy_item(inputs)]).to_string())
            .expect("set");

        let mut history = HistoryStore::with_locale(store, Locale::Fr);
        let items = history.list().expect("list");
        assert_eq!(items[0].result.partner_a_name, "Partenaire A");
        assert_eq!(items[0].result.partner_b_name, "Partenaire B");
        assert!(history.store().get(LEGACY_HISTORY_KEY).expect("get").is_none());
        assert!(history.store().get(HISTORY_KEY).expect("get").is_some());
    }

    #[test]
    fn legacy_inputs_missing_newer_fields_use_defaults() {
        let raw = json!([{
            "id": "old",
            "dateISO": "2023-01-01T00:00:00.000Z",
            "note": "",
            "inputs": {"a1": 2300, "a2": 175, "trPct": 100, "b": 2000, "m": 1500,
                       "advanced": false, "E": 0, "biasPts": 0}
        }]);
        let mut store = MemoryStore::new();
        store.set(LEGACY_HISTORY_KEY, raw.to_string()).expect("set");

        let items = HistoryStore::new(store).list().expect("list");
        assert_eq!(items[0].inputs.mode, SplitMode::Proportional);
        assert_eq!(items[0].inputs.b2, 0.0);
        assert_eq!(items[0].result.cash_needed, 1500.0);
    }

    #[test]
    fn non_finite_inputs_do_not_wipe_earlier_entries() {
        let mut history = HistoryStore::new(MemoryStore::new());
        for i in 0..5 {
            history.add(&sample_inputs(), &format!("entry {i}")).expect("add");
        }
        let mut broken = sample_inputs();
        broken.a1 = f64::NAN;
        let saved = history.add(&broken, "nan").expect("add");
        assert_eq!(history.list().expect("list").len(), 6);

        history.add(&sample_inputs(), "after").expect("add");
        let items = history.list().expect("list");
        assert_eq!(items.len(), 7);

        let restored = items.iter().find(|item| item.id == saved.id).expect("nan entry kept");
        assert_eq!(restored.inputs.a1, Inputs::default().a1);
        assert_eq!(restored.inputs.b, sample_inputs().b);
        assert_eq!(restored.result, saved.result);
    }

    #[test]
    fn unreadable_entries_are_dropped_individually() {
        let raw = json!([
            {"id": 5, "dateISO": "2024-01-01"},
            legacy_item(sample_inputs()),
            {"id": "null-fields", "dateISO": "2024-02-01", "note": null,
             "inputs": {"a1": null, "b": 2500, "mode": null}},
        ]);
        let mut store = MemoryStore::new();
        store.set(HISTORY_KEY, raw.to_string()).expect("set");

        let mut history = HistoryStore::new(store);
        let items = history.list().expect("list");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "item-1");
        assert_eq!(items[1].note, "");
        assert_eq!(items[1].inputs.a1, Inputs::default().a1);
        assert_eq!(items[1].inputs.b, 2500.0);
        assert_eq!(history.list().expect("list").len(), 2);
    }

    fn dated_item(id: &str, date_iso: &str, note: &str) -> HistoryItem {
        let inputs = sample_inputs();
        HistoryItem {
            id: id.to_string(),
            date_iso: date_iso.to_string(),
            note: note.to_string(),
            result: HistorySnapshot::from_allocation(&calculate_with_locale(&inputs, Locale::En)),
            inputs,
        }
    }

    fn ids(items: &[HistoryItem]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-10-15T12:00:00.000Z")
            .expect("valid date")
            .with_timezone(&Utc)
    }

    fn filter_sample() -> Vec<HistoryItem> {
        vec![
            dated_item("recent", "2024-10-01T08:00:00.000Z", "Rent split"),
            dated_item("spring", "2024-05-10T08:00:00.000Z", ""),
            dated_item("last-year", "2023-09-01", "Holidays"),
            dated_item("garbled", "someday", "Rent again"),
        ]
    }

    #[test]
    fn filter_by_period_uses_average_month_length() {
        let now = fixed_now();
        let all = filter_items(filter_sample(), "", HistoryPeriod::All, Locale::En, now);
        assert_eq!(all.len(), 4);

        let three = filter_items(filter_sample(), "", HistoryPeriod::ThreeMonths, Locale::En, now);
        assert_eq!(ids(&three), vec!["recent"]);

        let six = filter_items(filter_sample(), "", HistoryPeriod::SixMonths, Locale::En, now);
        assert_eq!(ids(&six), vec!["recent", "spring"]);

        let twelve = filter_items(filter_sample(), "", HistoryPeriod::TwelveMonths, Locale::En, now);
        assert_eq!(ids(&twelve), vec!["recent", "spring"]);
    }

    #[test]
    fn period_boundary_is_inclusive() {
        // 3 * 30.4375 days before `now`.
        let now = fixed_now();
        let edge = now - chrono::Duration::milliseconds((3.0 * DAYS_PER_MONTH * MS_PER_DAY) as i64);
        let items = vec![dated_item(
            "edge",
            &edge.to_rfc3339_opts(SecondsFormat::Millis, true),
            "",
        )];
        let kept = filter_items(items, "", HistoryPeriod::ThreeMonths, Locale::En, now);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn search_matches_note_and_month_label_case_insensitively() {
        let now = fixed_now();
        let rent = filter_items(filter_sample(), "  RENT ", HistoryPeriod::All, Locale::En, now);
        assert_eq!(ids(&rent), vec!["recent", "garbled"]);

        let may = filter_items(filter_sample(), "may 2024", HistoryPeriod::All, Locale::En, now);
        assert_eq!(ids(&may), vec!["spring"]);

        let no_note = filter_items(filter_sample(), "(no note)", HistoryPeriod::All, Locale::En, now);
        assert_eq!(ids(&no_note), vec!["spring"]);

        let sans_note = filter_items(filter_sample(), "sans note", HistoryPeriod::All, Locale::Fr, now);
        assert_eq!(ids(&sans_note), vec!["spring"]);

        let sept = filter_items(filter_sample(), "sept. 2023", HistoryPeriod::All, Locale::Fr, now);
        assert_eq!(ids(&sept), vec!["last-year"]);
    }

    #[test]
    fn period_parse_accepts_known_values() {
        assert_eq!(HistoryPeriod::parse("3m"), Some(HistoryPeriod::ThreeMonths));
        assert_eq!(HistoryPeriod::parse(""), Some(HistoryPeriod::All));
        assert_eq!(HistoryPeriod::parse("12m"), Some(HistoryPeriod::TwelveMonths));
        assert_eq!(HistoryPeriod::parse("2y"), None);
    }

    #[test]
    fn store_filter_applies_to_saved_entries() {
        let mut history = HistoryStore::new(MemoryStore::new());
        history.add(&sample_inputs(), "groceries").expect("add");
        history.add(&sample_inputs(), "rent").expect("add");

        let found = history.filter("groc", HistoryPeriod::ThreeMonths).expect("filter");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].note, "groceries");
        assert_eq!(history.filter("", HistoryPeriod::All).expect("filter").len(), 2);
    }

    #[test]
    fn corrupt_history_reads_as_empty() {
        let mut store = MemoryStore::new();
        store.set(HISTORY_KEY, "[{".to_string()).expect("set");
        assert!(HistoryStore::new(store).list().expect("list").is_empty());
    }
}

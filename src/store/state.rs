use serde::{Deserialize, Serialize};
use tracing::warn;

use super::StoreResult;
use super::kv::KeyValueStore;
use crate::core::{Inputs, SplitMode};

pub const STATE_KEY: &str = "eqc_state_v1";

/// Where the calculator's current inputs live between sessions.
pub trait InputSource {
    /// Never fails: unreadable state falls back to defaults.
    fn load(&self) -> Inputs;
    fn save(&mut self, inputs: &Inputs) -> StoreResult<()>;
}

/// Persisted input shape. Every field is optional so older records, written before a field
/// existed, still load; absent fields keep the caller's defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InputsRecord {
    pub partner_a_name: Option<String>,
    pub partner_b_name: Option<String>,
    pub a1: Option<f64>,
    pub a2: Option<f64>,
    pub b2: Option<f64>,
    pub tr_pct: Option<f64>,
    pub b: Option<f64>,
    pub m: Option<f64>,
    pub advanced: Option<bool>,
    #[serde(rename = "E")]
    pub eligible: Option<f64>,
    pub bias_pts: Option<f64>,
    pub mode: Option<String>,
}

impl InputsRecord {
    pub fn merge_onto(self, defaults: &Inputs) -> Inputs {
        Inputs {
            partner_a_name: self
                .partner_a_name
                .unwrap_or_else(|| defaults.partner_a_name.clone()),
            partner_b_name: self
                .partner_b_name
                .unwrap_or_else(|| defaults.partner_b_name.clone()),
            a1: self.a1.unwrap_or(defaults.a1),
            a2: self.a2.unwrap_or(defaults.a2),
            b2: self.b2.unwrap_or(defaults.b2),
            tr_pct: self.tr_pct.unwrap_or(defaults.tr_pct),
            b: self.b.unwrap_or(defaults.b),
            m: self.m.unwrap_or(defaults.m),
            advanced: self.advanced.unwrap_or(defaults.advanced),
            eligible: self.eligible.unwrap_or(defaults.eligible),
            bias_pts: self.bias_pts.unwrap_or(defaults.bias_pts),
            mode: self
                .mode
                .as_deref()
                .and_then(SplitMode::parse)
                .unwrap_or(defaults.mode),
        }
    }
}

/// [`InputSource`] backed by a key-value store under [`STATE_KEY`].
#[derive(Debug, Clone)]
pub struct StoredInputSource<S> {
    store: S,
    defaults: Inputs,
}

impl<S: KeyValueStore> StoredInputSource<S> {
    pub fn new(store: S) -> Self {
        Self::with_defaults(store, Inputs::default())
    }

    pub fn with_defaults(store: S, defaults: Inputs) -> Self {
        Self { store, defaults }
    }
}

impl<S: KeyValueStore> InputSource for StoredInputSource<S> {
    fn load(&self) -> Inputs {
        let raw = match self.store.get(STATE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return self.defaults.clone(),
            Err(e) => {
                warn!(error = %e, "could not read saved inputs, using defaults");
                return self.defaults.clone();
            }
        };
        match serde_json::from_str::<InputsRecord>(&raw) {
            Ok(record) => record.merge_onto(&self.defaults),
            Err(e) => {
                warn!(error = %e, "saved inputs are corrupt, using defaults");
                self.defaults.clone()
            }
        }
    }

    fn save(&mut self, inputs: &Inputs) -> StoreResult<()> {
        self.store.set(STATE_KEY, serde_json::to_string(inputs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn custom_inputs() -> Inputs {
        Inputs {
            partner_a_name: "Alex".to_string(),
            partner_b_name: "Bailey".to_string(),
            a1: 3000.0,
            a2: 200.0,
            b2: 180.0,
            tr_pct: 80.0,
            b: 3200.0,
            m: 900.0,
            advanced: true,
            eligible: 450.0,
            bias_pts: -2.5,
            mode: SplitMode::EqualLeftover,
        }
    }

    #[test]
    fn load_without_saved_state_returns_defaults() {
        let source = StoredInputSource::new(MemoryStore::new());
        assert_eq!(source.load(), Inputs::default());
    }

    #[test]
    fn save_then_load_restores_every_field() {
        let mut source = StoredInputSource::new(MemoryStore::new());
        source.save(&custom_inputs()).expect("save");
        assert_eq!(source.load(), custom_inputs());
    }

    #[test]
    fn older_records_keep_defaults_for_missing_fields() {
        let mut store = MemoryStore::new();
        store
            .set(
                STATE_KEY,
                r#"{"a1":2300,"a2":175,"trPct":100,"b":2000,"m":1500,"advanced":false,"E":0,"biasPts":0}"#
                    .to_string(),
            )
            .expect("set");
        let defaults = custom_inputs();
        let loaded = StoredInputSource::with_defaults(store, defaults.clone()).load();

        assert_eq!(loaded.a1, 2300.0);
        assert_eq!(loaded.eligible, 0.0);
        assert_eq!(loaded.partner_a_name, defaults.partner_a_name);
        assert_eq!(loaded.b2, defaults.b2);
        assert_eq!(loaded.mode, defaults.mode);
    }

    #[test]
    fn null_and_unknown_mode_fall_back_to_defaults() {
        let mut store = MemoryStore::new();
        store
            .set(STATE_KEY, r#"{"a1":null,"mode":"sideways"}"#.to_string())
            .expect("set");
        let loaded = StoredInputSource::new(store).load();
        assert_eq!(loaded.a1, Inputs::default().a1);
        assert_eq!(loaded.mode, SplitMode::Proportional);
    }

    #[test]
    fn corrupt_state_loads_defaults() {
        let mut store = MemoryStore::new();
        store.set(STATE_KEY, "{oops".to_string()).expect("set");
        assert_eq!(StoredInputSource::new(store).load(), Inputs::default());
    }
}

//! The persisted mode record and its normalization.

use crate::config::ModeDefaults;
use crate::error::AmvError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Execution mode the user asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupType {
    #[default]
    Cpu,
    Gpu,
}

impl SetupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupType::Cpu => "cpu",
            SetupType::Gpu => "gpu",
        }
    }
}

impl fmt::Display for SetupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SetupType {
    type Err = AmvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(SetupType::Cpu),
            "gpu" => Ok(SetupType::Gpu),
            other => Err(AmvError::Validation {
                field: "setup_type".into(),
                message: format!("expected cpu or gpu, got {:?}", other),
            }),
        }
    }
}

/// Persisted user intent plus recent-file history.
///
/// Invariant after [`normalize`]: `setup_type == Gpu` implies `!force_cpu`
/// and `force_cpu` implies `setup_type == Cpu`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeRecord {
    pub recent_files: Vec<String>,
    pub max_recent: usize,
    pub force_cpu: bool,
    pub setup_type: SetupType,
}

impl Default for ModeRecord {
    fn default() -> Self {
        Self {
            recent_files: Vec::new(),
            max_recent: ModeDefaults::MAX_RECENT,
            force_cpu: false,
            setup_type: SetupType::Cpu,
        }
    }
}

impl ModeRecord {
    /// Record for an explicit mode choice, keeping the recent-file history.
    pub fn with_mode(&self, target: SetupType) -> Self {
        let mut next = self.clone();
        next.setup_type = target;
        next.force_cpu = target == SetupType::Cpu;
        next.normalized()
    }

    /// Re-run normalization on an in-memory record.
    pub fn normalized(&self) -> Self {
        match serde_json::to_value(self) {
            Ok(value) => normalize(&value),
            Err(_) => ModeRecord::default(),
        }
    }

    /// Put `path` at the front of the history. Returns true if anything moved.
    pub fn push_recent(&mut self, path: &str) -> bool {
        let path = path.trim();
        if path.is_empty() {
            return false;
        }
        let before = self.recent_files.clone();
        self.recent_files.retain(|p| p != path);
        self.recent_files.insert(0, path.to_string());
        self.recent_files.truncate(self.max_recent);
        self.recent_files != before
    }
}

/// Normalize an arbitrary stored value into a coherent record.
///
/// Unknown keys are dropped. A missing or malformed field falls back to its
/// default. Coherence between `setup_type` and `force_cpu` is enforced last,
/// and an explicit GPU choice wins over a stale force-CPU flag.
pub fn normalize(raw: &Value) -> ModeRecord {
    let defaults = ModeRecord::default();
    let Some(obj) = raw.as_object() else {
        return defaults;
    };

    let max_recent = obj
        .get("max_recent")
        .and_then(Value::as_i64)
        .map(|n| n.clamp(ModeDefaults::MAX_RECENT_MIN as i64, ModeDefaults::MAX_RECENT_MAX as i64) as usize)
        .unwrap_or(defaults.max_recent);

    let mut recent_files: Vec<String> = Vec::new();
    if let Some(items) = obj.get("recent_files").and_then(Value::as_array) {
        for item in items {
            let Some(s) = item.as_str() else { continue };
            let s = s.trim();
            if !s.is_empty() && !recent_files.iter().any(|p| p == s) {
                recent_files.push(s.to_string());
            }
        }
    }
    recent_files.truncate(max_recent);

    let setup_type = obj
        .get("setup_type")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<SetupType>().ok())
        .unwrap_or(defaults.setup_type);

    let mut force_cpu = obj
        .get("force_cpu")
        .and_then(Value::as_bool)
        .unwrap_or(defaults.force_cpu);

    if setup_type == SetupType::Gpu {
        force_cpu = false;
    }

    ModeRecord {
        recent_files,
        max_recent,
        force_cpu,
        setup_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_migrates_legacy_keys_and_coerces_mode_flags() {
        let raw = json!({
            "recent_files": ["a.wav", "a.wav", "", 123, "b.wav"],
            "max_recent": 2,
            "force_cpu": true,
            "setup_type": "gpu",
            "enabled": false,
            "fp16": false,
            "batch_size": 1
        });
        let record = normalize(&raw);
        assert_eq!(record.recent_files, vec!["a.wav", "b.wav"]);
        assert_eq!(record.max_recent, 2);
        assert_eq!(record.setup_type, SetupType::Gpu);
        assert!(!record.force_cpu);

        let value = serde_json::to_value(&record).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["force_cpu", "max_recent", "recent_files", "setup_type"]);
    }

    #[test]
    fn test_clamps_max_recent_and_caps_history() {
        let record = normalize(&json!({
            "recent_files": ["x.wav", "", "x.wav", "y.wav"],
            "max_recent": 0,
            "setup_type": "CPU"
        }));
        assert_eq!(record.max_recent, 1);
        assert_eq!(record.recent_files, vec!["x.wav"]);
        assert_eq!(record.setup_type, SetupType::Cpu);

        assert_eq!(normalize(&json!({"max_recent": 500})).max_recent, 50);
        assert_eq!(normalize(&json!({"max_recent": "7"})).max_recent, 10);
    }

    #[test]
    fn test_bad_setup_type_and_non_object_fall_back() {
        assert_eq!(normalize(&json!({"setup_type": "tpu"})).setup_type, SetupType::Cpu);
        assert_eq!(normalize(&json!([1, 2, 3])), ModeRecord::default());
        assert_eq!(normalize(&Value::Null), ModeRecord::default());
    }

    #[test]
    fn test_normalize_is_idempotent_and_coherent() {
        let inputs = [
            json!({}),
            json!({"force_cpu": true}),
            json!({"force_cpu": true, "setup_type": "Gpu", "recent_files": [" a ", "a", "b"]}),
            json!({"max_recent": -4, "recent_files": ["a", "b", "c"]}),
            json!({"max_recent": 3, "recent_files": [null, "z", {"k": 1}, "z "]}),
        ];
        for raw in inputs {
            let once = normalize(&raw);
            let twice = normalize(&serde_json::to_value(&once).unwrap());
            assert_eq!(once, twice, "not idempotent for {raw}");
            if once.setup_type == SetupType::Gpu {
                assert!(!once.force_cpu);
            }
            if once.force_cpu {
                assert_eq!(once.setup_type, SetupType::Cpu);
            }
        }
    }

    #[test]
    fn test_with_mode_sets_force_cpu() {
        let record = ModeRecord::default();
        let cpu = record.with_mode(SetupType::Cpu);
        assert!(cpu.force_cpu);
        let gpu = cpu.with_mode(SetupType::Gpu);
        assert!(!gpu.force_cpu);
        assert_eq!(gpu.setup_type, SetupType::Gpu);
    }

    #[test]
    fn test_push_recent_moves_to_front_and_caps() {
        let mut record = ModeRecord {
            max_recent: 2,
            ..ModeRecord::default()
        };
        assert!(record.push_recent("a.wav"));
        assert!(record.push_recent("b.wav"));
        assert!(record.push_recent("a.wav"));
        assert_eq!(record.recent_files, vec!["a.wav", "b.wav"]);
        assert!(record.push_recent("c.wav"));
        assert_eq!(record.recent_files, vec!["c.wav", "a.wav"]);
        assert!(!record.push_recent("c.wav"));
        assert!(!record.push_recent("   "));
    }
}

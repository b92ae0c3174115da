//! The capability map exchanged in `hello` (spec.md §3, §9).
//!
//! Capabilities are conceptually nested (`{"encoding": {"generic": true}}`)
//! but many peers — and this core's own negotiation helpers — are easiest
//! to write against a flat, dot-joined key space (`"encoding.generic"`).
//! [`Capabilities`] stores the flat form internally and exposes both views.

use crate::packet::Value;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Capabilities {
    flat: BTreeMap<String, Value>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.flat.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.flat.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.flat.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.flat.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        self.flat
            .get(key)
            .and_then(Value::as_list)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// All keys sharing a `prefix.` namespace, with the prefix stripped.
    pub fn sub_keys(&self, prefix: &str) -> Vec<(&str, &Value)> {
        let needle = format!("{prefix}.");
        self.flat
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(needle.as_str()).map(|rest| (rest, v)))
            .collect()
    }

    /// Builds the nested [`Value::Dict`] sent as the `hello` packet body.
    /// Every flat `a.b.c` key becomes a chain of nested dicts (spec.md §9:
    /// "on encode, always emit nested"), the mirror image of the flattening
    /// [`Self::from_dict`] does on decode.
    pub fn to_dict(&self) -> Value {
        let mut root: BTreeMap<Vec<u8>, Value> = BTreeMap::new();
        for (k, v) in &self.flat {
            let segments: Vec<&str> = k.split('.').collect();
            insert_nested(&mut root, &segments, v.clone());
        }
        Value::Dict(root)
    }

    /// Parses a received `hello` dict back into flat-keyed capabilities.
    /// Nested dicts are flattened with `.`-joined keys so that, e.g., a
    /// peer sending a nested `{"encoding": {"generic": true}}` and a peer
    /// sending the already-flat `"encoding.generic"` are both readable
    /// through the same [`Capabilities::get`] call.
    pub fn from_dict(v: &Value) -> Self {
        let mut caps = Capabilities::new();
        if let Some(dict) = v.as_dict() {
            for (k, v) in dict {
                let key = String::from_utf8_lossy(k).to_string();
                flatten_into(&key, v, &mut caps.flat);
            }
        }
        caps
    }
}

/// Inserts `value` at the nested path `segments`, creating intermediate
/// dicts as needed. The inverse of `flatten_into`.
fn insert_nested(map: &mut BTreeMap<Vec<u8>, Value>, segments: &[&str], value: Value) {
    let (head, rest) = segments.split_first().expect("capability key must have at least one segment");
    let key = head.as_bytes().to_vec();
    if rest.is_empty() {
        map.insert(key, value);
        return;
    }
    let entry = map.entry(key).or_insert_with(|| Value::Dict(BTreeMap::new()));
    if !matches!(entry, Value::Dict(_)) {
        *entry = Value::Dict(BTreeMap::new());
    }
    if let Value::Dict(sub) = entry {
        insert_nested(sub, rest, value);
    }
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    if let Value::Dict(d) = value {
        for (k, v) in d {
            let sub_key = format!("{prefix}.{}", String::from_utf8_lossy(k));
            flatten_into(&sub_key, v, out);
        }
    } else {
        out.insert(prefix.to_string(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_set_and_get_round_trip() {
        let mut caps = Capabilities::new();
        caps.set("version", "6.0");
        caps.set("rencode", true);
        assert_eq!(caps.get_str("version"), Some("6.0"));
        assert!(caps.get_bool("rencode"));
    }

    #[test]
    fn nested_dict_flattens_on_parse() {
        let mut inner = BTreeMap::new();
        inner.insert(b"generic".to_vec(), Value::Bool(true));
        let mut outer = BTreeMap::new();
        outer.insert(b"encoding".to_vec(), Value::Dict(inner));
        let caps = Capabilities::from_dict(&Value::Dict(outer));
        assert_eq!(caps.get("encoding.generic"), Some(&Value::Bool(true)));
    }

    #[test]
    fn to_dict_emits_nested_not_dotted_keys() {
        let mut caps = Capabilities::new();
        caps.set("encryption.cipher", "AES");
        caps.set("encryption.mode", "CBC");
        caps.set("uuid", "abc");

        let dict = caps.to_dict();
        let root = dict.as_dict().unwrap();
        // no literal dotted key at the top level
        assert!(!root.contains_key(b"encryption.cipher".as_slice()));
        assert_eq!(root.get(b"uuid".as_slice()), Some(&Value::Str("abc".to_string())));

        let encryption = root.get(b"encryption".as_slice()).unwrap().as_dict().unwrap();
        assert_eq!(encryption.get(b"cipher".as_slice()), Some(&Value::Str("AES".to_string())));
        assert_eq!(encryption.get(b"mode".as_slice()), Some(&Value::Str("CBC".to_string())));
    }

    #[test]
    fn to_dict_and_from_dict_round_trip_through_nesting() {
        let mut caps = Capabilities::new();
        caps.set("batch.always", true);
        caps.set("batch.delay", 10i64);
        let round_tripped = Capabilities::from_dict(&caps.to_dict());
        assert_eq!(round_tripped.get("batch.always"), Some(&Value::Bool(true)));
        assert_eq!(round_tripped.get("batch.delay"), Some(&Value::Int(10)));
    }

    #[test]
    fn sub_keys_strips_prefix() {
        let mut caps = Capabilities::new();
        caps.set("batch.always", true);
        caps.set("batch.delay", 10i64);
        caps.set("other", "x");
        let mut subs = caps.sub_keys("batch");
        subs.sort_by_key(|(k, _)| k.to_string());
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].0, "always");
    }
}

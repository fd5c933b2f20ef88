//! Freezing and thawing containers.
//!
//! A frozen container carries a format tag and every entry with its real
//! key: the key object itself for identity entries, the scalar for scalar
//! entries. Identities and tokens are never written; thawing re-inserts
//! every entry through `set`, which derives fresh ones in the new process.

use crate::coordinator::DuplicationCoordinator;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::map::DualKeyMap;
use crate::nest::WrapValue;
use crate::reentrancy::WalkGuard;
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{self, Serialize, Serializer};
use tracing::debug;

pub const FORMAT_NAME: &str = "dualkey-hashmap";
pub const FORMAT_VERSION: u32 = 1;

/// `"<name>/<version>"`, the only tag `thaw` accepts.
pub fn format_tag() -> String {
    format!("{FORMAT_NAME}/{FORMAT_VERSION}")
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Frozen<O, V> {
    pub format: String,
    pub entries: Vec<(Key<O>, V)>,
}

impl<O, V> Frozen<O, V> {
    pub fn into_parts(self) -> (String, Vec<(Key<O>, V)>) {
        (self.format, self.entries)
    }
}

impl<O, V, W> DualKeyMap<O, V, W>
where
    O: 'static,
    V: 'static,
    W: WrapValue<O, V>,
{
    pub fn freeze(&self) -> Frozen<O, V>
    where
        V: Clone,
    {
        Frozen {
            format: format_tag(),
            entries: self.iter().collect(),
        }
    }

    /// Rebuild an unregistered container from frozen data.
    pub fn thaw(frozen: Frozen<O, V>) -> Result<Self> {
        let entries = check_format(frozen)?;
        Ok(Self::from_pairs(entries))
    }

    /// Rebuild a container registered with `coordinator`.
    pub fn thaw_in(coordinator: &DuplicationCoordinator, frozen: Frozen<O, V>) -> Result<Self> {
        let entries = check_format(frozen)?;
        Ok(Self::registered_from_pairs(coordinator, entries))
    }

    pub fn to_json(&self) -> Result<String>
    where
        O: Serialize,
        V: Serialize + Clone,
    {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json<'de>(json: &'de str) -> Result<Self>
    where
        O: Deserialize<'de>,
        V: Deserialize<'de>,
    {
        let frozen: Frozen<O, V> = serde_json::from_str(json)?;
        Self::thaw(frozen)
    }
}

fn check_format<O, V>(frozen: Frozen<O, V>) -> Result<Vec<(Key<O>, V)>> {
    let (format, entries) = frozen.into_parts();
    let expected = format_tag();
    if format != expected {
        debug!(%expected, found = %format, "refusing to thaw foreign format");
        return Err(Error::VersionMismatch {
            expected,
            found: format,
        });
    }
    Ok(entries)
}

impl<O, V, W> Serialize for DualKeyMap<O, V, W>
where
    O: Serialize + 'static,
    V: Serialize + Clone + 'static,
    W: WrapValue<O, V>,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let Some(_walk) = WalkGuard::enter(self.address()) else {
            return Err(ser::Error::custom("cyclic container"));
        };
        self.freeze().serialize(serializer)
    }
}

impl<'de, O, V, W> Deserialize<'de> for DualKeyMap<O, V, W>
where
    O: Deserialize<'de> + 'static,
    V: Deserialize<'de> + 'static,
    W: WrapValue<O, V>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let frozen = Frozen::<O, V>::deserialize(deserializer)?;
        Self::thaw(frozen).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn tag_has_name_and_version() {
        assert_eq!(format_tag(), "dualkey-hashmap/1");
    }

    #[test]
    fn freeze_carries_key_objects_not_tokens() {
        let m: DualKeyMap<String, i32> = DualKeyMap::new();
        let k = Rc::new("obj".to_string());
        m.set(k.clone(), 1);
        let frozen = m.freeze();
        assert_eq!(frozen.format, format_tag());
        match &frozen.entries[..] {
            [(Key::Object(o), 1)] => assert!(Rc::ptr_eq(o, &k)),
            other => panic!("unexpected entries: {other:?}"),
        }
        let json = serde_json::to_string(&frozen).unwrap();
        assert_eq!(json, r#"{"format":"dualkey-hashmap/1","entries":[[{"Object":"obj"},1]]}"#);
    }
}

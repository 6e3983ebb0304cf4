//! Storage traits
//!
//! The session holder only needs string-valued entries keyed by name. Keeping
//! that behind a trait lets the holder run against SQLite, memory, or a
//! failing store in tests.

use crate::error::Result;

/// String key-value storage with local-storage semantics
pub trait KeyValueStore {
    /// Read an entry, `None` when the key is absent
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite an entry
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove an entry; removing an absent key is not an error
    fn remove_item(&self, key: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        (**self).remove_item(key)
    }
}

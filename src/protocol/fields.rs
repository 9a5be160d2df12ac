//! Ordered field map shared by messages and commands.

/// Ordered `key=value` map.
///
/// Keys are case-sensitive and unique. Iteration follows insertion order;
/// inserting an existing key replaces its value without moving it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<(String, String)>,
}

impl Fields {
    /// Create an empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, returning the previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Get the value of a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Check if a field is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Fields
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (key, value) in iter {
            fields.insert(key, value);
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let fields: Fields = [("Zeta", "1"), ("Alpha", "2"), ("Mid", "3")]
            .into_iter()
            .collect();

        let keys: Vec<_> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_reinsert_replaces_in_place() {
        let mut fields = Fields::new();
        fields.insert("A", "1");
        fields.insert("B", "2");

        assert_eq!(fields.insert("A", "3"), Some("1".to_string()));
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.iter().next(), Some(("A", "3")));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let mut fields = Fields::new();
        fields.insert("datalength", "1");
        fields.insert("DataLength", "2");

        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("DataLength"), Some("2"));
        assert_eq!(fields.get("DATALENGTH"), None);
    }

    #[test]
    fn test_remove() {
        let mut fields: Fields = [("A", "1"), ("B", "2")].into_iter().collect();

        assert_eq!(fields.remove("A"), Some("1".to_string()));
        assert_eq!(fields.remove("A"), None);
        assert!(!fields.contains_key("A"));
        assert_eq!(fields.len(), 1);
    }
}

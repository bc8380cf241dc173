/// Ordered header multi-map.
///
/// Keys keep the spelling and position of their first insertion and are
/// matched ASCII case-insensitively. Inserting a key that already exists
/// appends the value to that key instead of replacing it; an identical value
/// already present for the key is not appended twice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderBag {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderBag {
    /// Creates an empty header bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` under `name`, accumulating with earlier values.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(index) => {
                let values = &mut self.entries[index].1;
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Returns all values recorded for `name`.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.position(name)
            .map(|index| self.entries[index].1.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates keys with their values in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Flattens the bag into `"Key: Value"` lines in first-seen key order.
    ///
    /// Multiple values for one key are joined with `,` into a single line.
    pub fn to_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(name, values)| format!("{}: {}", name, values.join(",")))
            .collect()
    }

    /// Parses a `"Key: Value"` line back into its name and value.
    pub fn split_line(line: &str) -> Option<(&str, &str)> {
        let (name, value) = line.split_once(':')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some((name, value.trim()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderBag
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (name, value) in iter {
            bag.insert(name, value);
        }
        bag
    }
}

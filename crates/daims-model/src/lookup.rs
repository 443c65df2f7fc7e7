use std::collections::HashMap;

/// Set of codes with trim + case-insensitive membership, remembering the
/// first-seen original spelling.
#[derive(Debug, Clone, Default)]
pub struct CaseInsensitiveSet {
    map: HashMap<String, String>,
}

impl CaseInsensitiveSet {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = HashMap::new();
        for code in codes {
            let code = code.as_ref();
            let key = code.trim().to_ascii_uppercase();
            map.entry(key).or_insert_with(|| code.to_string());
        }
        Self { map }
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.map
            .get(&code.trim().to_ascii_uppercase())
            .map(|value| value.as_str())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.map.contains_key(&code.trim().to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Map keyed by trim + case-insensitive code.
#[derive(Debug, Clone)]
pub struct CaseInsensitiveMap<V> {
    map: HashMap<String, V>,
}

impl<V> Default for CaseInsensitiveMap<V> {
    fn default() -> Self {
        Self { map: HashMap::new() }
    }
}

impl<V> CaseInsensitiveMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: &str, value: V) -> Option<V> {
        self.map.insert(code.trim().to_ascii_uppercase(), value)
    }

    pub fn get(&self, code: &str) -> Option<&V> {
        self.map.get(&code.trim().to_ascii_uppercase())
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut V> {
        self.map.get_mut(&code.trim().to_ascii_uppercase())
    }

    pub fn entry_or_default(&mut self, code: &str) -> &mut V
    where
        V: Default,
    {
        self.map.entry(code.trim().to_ascii_uppercase()).or_default()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.map.contains_key(&code.trim().to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.map.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }
}

//! Path-prefix component map.
//!
//! Facts are grouped into named components by the file they were extracted
//! from. The longest matching prefix wins; a prefix matches a path when it is
//! equal to it or is one of its leading directories.

use eventlens_core::facts::DomainFact;

/// Ordered path-prefix to component-name list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentMap {
    entries: Vec<(String, String)>,
}

fn normalize_prefix(prefix: &str) -> String {
    let prefix = prefix.replace('\\', "/");
    let prefix = prefix.trim_start_matches("./");
    prefix.trim_end_matches('/').to_string()
}

impl ComponentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `prefix` to `name`, replacing an earlier mapping of the same prefix.
    pub fn insert(&mut self, prefix: &str, name: &str) {
        let prefix = normalize_prefix(prefix);
        match self.entries.iter_mut().find(|(p, _)| *p == prefix) {
            Some(entry) => entry.1 = name.to_string(),
            None => self.entries.push((prefix, name.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Component owning `path`, if any.
    pub fn component_for_path(&self, path: &str) -> Option<&str> {
        let path = path.trim_start_matches("./");
        self.entries
            .iter()
            .filter(|(prefix, _)| {
                prefix.is_empty()
                    || path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, name)| name.as_str())
    }

    /// Component of a fact, by the file it was extracted from.
    pub fn component_of(&self, fact: &DomainFact) -> Option<String> {
        let origin = fact.origin()?;
        self.component_for_path(&origin.file).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventlens_core::facts::FactOrigin;
    use eventlens_core::types::Span;

    fn map() -> ComponentMap {
        let mut map = ComponentMap::new();
        map.insert("src/", "App");
        map.insert("./src/Billing", "Billing");
        map.insert("src/Billing/Invoice", "Invoicing");
        map
    }

    #[test]
    fn longest_prefix_wins() {
        let map = map();
        assert_eq!(map.component_for_path("src/Billing/Invoice/Send.php"), Some("Invoicing"));
        assert_eq!(map.component_for_path("src/Billing/Pay.php"), Some("Billing"));
        assert_eq!(map.component_for_path("src/Kernel.php"), Some("App"));
        assert_eq!(map.component_for_path("tests/KernelTest.php"), None);
    }

    #[test]
    fn prefixes_match_whole_directories() {
        let map = map();
        assert_eq!(map.component_for_path("src/BillingLegacy/Old.php"), Some("App"));
        assert_eq!(map.component_for_path("srcs/Thing.php"), None);
    }

    #[test]
    fn reinserting_a_prefix_renames_it() {
        let mut map = map();
        map.insert("src/Billing/", "Payments");
        assert_eq!(map.len(), 3);
        assert_eq!(map.component_for_path("src/Billing/Pay.php"), Some("Payments"));
    }

    #[test]
    fn facts_without_origin_have_no_component() {
        let map = map();
        let fact = DomainFact::use_case("App\\PlaceOrder");
        assert_eq!(map.component_of(&fact), None);
        let fact = fact.with_origin(FactOrigin {
            file: "src/Billing/PlaceOrder.php".to_string(),
            span: Span::new(0, 10, 3),
        });
        assert_eq!(map.component_of(&fact).as_deref(), Some("Billing"));
    }
}

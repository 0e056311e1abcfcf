//! The class registry.

use ahash::AHashMap;

use crate::cdef::class::CdefClass;

/// Maps class names to loaded classes. One per evaluator; shared by all
/// frames and all live objects of the registered classes.
#[derive(Debug)]
pub struct CdefManager {
    classes: AHashMap<String, CdefClass>,
}

impl Default for CdefManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CdefManager {
    /// Creates a registry seeded with the root `handle` class and the
    /// reflection class singletons.
    #[must_use]
    pub fn new() -> Self {
        let mut manager = Self {
            classes: AHashMap::new(),
        };
        manager.register_class(CdefClass::root_handle());
        for name in ["meta.class", "meta.property", "meta.method", "meta.package"] {
            let class = CdefClass::new(name, Vec::new());
            class.set_meta(true);
            class.set_sealed(true);
            manager.register_class(class);
        }
        manager
    }

    /// Registers (or redefines) a class under its own name. Existing objects
    /// keep the class handle they were constructed with.
    pub fn register_class(&mut self, class: CdefClass) {
        self.classes.insert(class.name(), class);
    }

    #[must_use]
    pub fn find_class(&self, name: &str) -> Option<CdefClass> {
        self.classes.get(name).cloned()
    }

    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// All registered classes whose name lives in `package` (dotted-prefix
    /// match), sorted by name for stable reflection output.
    #[must_use]
    pub fn classes_in_package(&self, package: &str) -> Vec<CdefClass> {
        let prefix = format!("{package}.");
        let mut found: Vec<CdefClass> = self
            .classes
            .iter()
            .filter(|(name, _)| {
                name.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('.'))
            })
            .map(|(_, class)| class.clone())
            .collect();
        found.sort_by_key(CdefClass::name);
        found
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn seeded_with_root_handle() {
        let manager = CdefManager::new();
        let handle = manager.find_class("handle").unwrap();
        assert!(handle.is_handle());
    }

    #[test]
    fn seeded_with_reflection_singletons() {
        let manager = CdefManager::new();
        for name in ["meta.class", "meta.property", "meta.method", "meta.package"] {
            let class = manager.find_class(name).unwrap();
            assert!(class.is_meta());
            assert!(class.is_sealed());
        }
        let names: Vec<String> = manager
            .classes_in_package("meta")
            .iter()
            .map(CdefClass::name)
            .collect();
        assert_eq!(names, ["meta.class", "meta.method", "meta.package", "meta.property"]);
    }

    #[test]
    fn package_lookup_matches_direct_children_only() {
        let mut manager = CdefManager::new();
        manager.register_class(CdefClass::new("pkg.A", Vec::new()));
        manager.register_class(CdefClass::new("pkg.sub.B", Vec::new()));
        manager.register_class(CdefClass::new("C", Vec::new()));

        let names: Vec<String> = manager
            .classes_in_package("pkg")
            .iter()
            .map(CdefClass::name)
            .collect();
        assert_eq!(names, ["pkg.A"]);
    }
}

/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Class-name → factory registry used when assembling an application.

use std::collections::BTreeMap;
use std::fmt;

use super::builtin;
use super::Module;

type Factory = Box<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// Maps the `class` field of a module declaration to a constructor.
#[derive(Default)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, Factory>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("classes", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the modules in [`builtin`].
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        builtin::register_all(&mut r);
        r
    }

    /// Registers `factory` under `class`, replacing any previous entry.
    pub fn register<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.factories.insert(class.into(), Box::new(factory));
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    pub fn create(&self, class: &str) -> Option<Box<dyn Module>> {
        self.factories.get(class).map(|f| f())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let r = ModuleRegistry::with_builtins();
        for class in ["Constant", "Adder", "Copy", "Gain", "Integrator", "Counter", "ScheduledGain"] {
            assert!(r.contains(class), "missing {class}");
        }
        assert!(r.create("NoSuchClass").is_none());
    }

    #[test]
    fn register_replaces_existing_class() {
        let mut r = ModuleRegistry::new();
        r.register("Gain", builtin::boxed::<builtin::Constant>);
        assert!(r.create("Gain").is_some());
        assert_eq!(r.classes().collect::<Vec<_>>(), vec!["Gain"]);
    }
}

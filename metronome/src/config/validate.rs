/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structural checks on an [`ApplicationConfig`].
//!
//! These need no module instances and no store, so they run before anything
//! is allocated.  Checks that depend on resolved bindings (signal existence,
//! types, element counts) happen later, in module setup.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::ApplicationConfig;
use crate::error::ConfigurationError;

/// Returns the first structural problem found in `config`.
///
/// # Errors
/// Any of the structural [`ConfigurationError`] variants: missing or duplicate
/// States, plans and modules; zero periods; references to undeclared modules;
/// a module scheduled twice in one State; two producers of one signal in one
/// State; a persistent signal whose owner is not a declared module.
pub fn validate(config: &ApplicationConfig) -> Result<(), ConfigurationError> {
    if config.states.is_empty() {
        return Err(ConfigurationError::NoStates);
    }

    let mut modules = BTreeMap::new();
    for m in &config.modules {
        if modules.insert(m.name.as_str(), m).is_some() {
            return Err(ConfigurationError::DuplicateModule(m.name.clone()));
        }
    }

    for decl in &config.signals {
        if let Some(owner) = decl.owner() {
            if !modules.contains_key(owner) {
                return Err(ConfigurationError::UnknownOwner {
                    signal: decl.path.clone(),
                    owner: owner.to_string(),
                });
            }
        }
    }

    let mut state_names = BTreeSet::new();
    for state in &config.states {
        if !state_names.insert(state.name.as_str()) {
            return Err(ConfigurationError::DuplicateState(state.name.clone()));
        }
    }
    if !state_names.contains(config.initial_state.as_str()) {
        return Err(ConfigurationError::UnknownInitialState(
            config.initial_state.clone(),
        ));
    }

    for state in &config.states {
        if state.plans.is_empty() {
            return Err(ConfigurationError::EmptyState(state.name.clone()));
        }

        let mut plan_names = BTreeSet::new();
        let mut scheduled = BTreeSet::new();
        // signal path → producing module
        let mut producers: BTreeMap<&str, &str> = BTreeMap::new();

        for plan in &state.plans {
            let at = || (state.name.clone(), plan.name.clone());
            if !plan_names.insert(plan.name.as_str()) {
                let (state, plan) = at();
                return Err(ConfigurationError::DuplicatePlan { state, plan });
            }
            if plan.period_us == 0 {
                let (state, plan) = at();
                return Err(ConfigurationError::InvalidPeriod { state, plan });
            }
            if plan.modules.is_empty() {
                let (state, plan) = at();
                return Err(ConfigurationError::EmptyPlan { state, plan });
            }

            for name in &plan.modules {
                let Some(module) = modules.get(name.as_str()) else {
                    return Err(ConfigurationError::UnknownModule {
                        state: state.name.clone(),
                        plan: plan.name.clone(),
                        module: name.clone(),
                    });
                };
                if !scheduled.insert(name.as_str()) {
                    return Err(ConfigurationError::ModuleScheduledTwice {
                        state: state.name.clone(),
                        module: name.clone(),
                    });
                }
                for out in &module.outputs {
                    if let Some(first) = producers.insert(out.signal.as_str(), name.as_str()) {
                        return Err(ConfigurationError::MultipleProducers {
                            state: state.name.clone(),
                            signal: out.signal.clone(),
                            first: first.to_string(),
                            second: name.clone(),
                        });
                    }
                }
            }
        }

        debug!(
            state = %state.name,
            plans = state.plans.len(),
            modules = scheduled.len(),
            "✓ state checked"
        );
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlanConfig, StateConfig};
    use crate::module::ModuleConfig;
    use crate::signal::{SignalDecl, SignalType};

    fn two_modules() -> ApplicationConfig {
        ApplicationConfig::new("T", "Run")
            .signal(SignalDecl::scalar("A", SignalType::UInt32))
            .signal(SignalDecl::scalar("B", SignalType::UInt32))
            .module(ModuleConfig::new("M1", "Counter").output("A"))
            .module(ModuleConfig::new("M2", "Copy").input("A").output("B"))
    }

    fn run(plans: Vec<PlanConfig>) -> ApplicationConfig {
        let mut state = StateConfig::new("Run");
        state.plans = plans;
        two_modules().state(state)
    }

    fn plan(name: &str, modules: &[&str]) -> PlanConfig {
        PlanConfig::new(name, 1_000).modules(modules.iter().copied())
    }

    #[test]
    fn well_formed_config_passes() {
        let config = run(vec![plan("P1", &["M1"]), plan("P2", &["M2"])]);
        assert_eq!(validate(&config), Ok(()));
    }

    // ── States and plans ──────────────────────────────────────────────────────

    #[test]
    fn no_states() {
        assert_eq!(validate(&two_modules()), Err(ConfigurationError::NoStates));
    }

    #[test]
    fn unknown_initial_state() {
        let mut config = run(vec![plan("P", &["M1"])]);
        config.initial_state = "Nope".into();
        assert_eq!(
            validate(&config),
            Err(ConfigurationError::UnknownInitialState("Nope".into()))
        );
    }

    #[test]
    fn duplicate_state() {
        let config = run(vec![plan("P", &["M1"])])
            .state(StateConfig::new("Run").plan(plan("P", &["M1"])));
        assert_eq!(
            validate(&config),
            Err(ConfigurationError::DuplicateState("Run".into()))
        );
    }

    #[test]
    fn empty_state_and_empty_plan() {
        assert_eq!(
            validate(&run(vec![])),
            Err(ConfigurationError::EmptyState("Run".into()))
        );
        assert!(matches!(
            validate(&run(vec![plan("P", &[])])),
            Err(ConfigurationError::EmptyPlan { .. })
        ));
    }

    #[test]
    fn duplicate_plan_and_zero_period() {
        assert!(matches!(
            validate(&run(vec![plan("P", &["M1"]), plan("P", &["M2"])])),
            Err(ConfigurationError::DuplicatePlan { .. })
        ));
        assert!(matches!(
            validate(&run(vec![PlanConfig::new("P", 0).modules(["M1"])])),
            Err(ConfigurationError::InvalidPeriod { .. })
        ));
    }

    // ── Modules ───────────────────────────────────────────────────────────────

    #[test]
    fn unknown_module_reference() {
        assert_eq!(
            validate(&run(vec![plan("P", &["M1", "Ghost"])])),
            Err(ConfigurationError::UnknownModule {
                state: "Run".into(),
                plan: "P".into(),
                module: "Ghost".into(),
            })
        );
    }

    #[test]
    fn module_scheduled_twice_across_plans() {
        assert_eq!(
            validate(&run(vec![plan("P1", &["M1"]), plan("P2", &["M2", "M1"])])),
            Err(ConfigurationError::ModuleScheduledTwice {
                state: "Run".into(),
                module: "M1".into(),
            })
        );
    }

    #[test]
    fn duplicate_module_declaration() {
        let config = run(vec![plan("P", &["M1"])]).module(ModuleConfig::new("M1", "Constant"));
        assert_eq!(
            validate(&config),
            Err(ConfigurationError::DuplicateModule("M1".into()))
        );
    }

    #[test]
    fn two_producers_in_one_state() {
        let config = two_modules()
            .module(ModuleConfig::new("M3", "Constant").output("A"))
            .state(StateConfig::new("Run").plan(plan("P", &["M1", "M3"])));
        assert_eq!(
            validate(&config),
            Err(ConfigurationError::MultipleProducers {
                state: "Run".into(),
                signal: "A".into(),
                first: "M1".into(),
                second: "M3".into(),
            })
        );
    }

    #[test]
    fn producers_may_differ_between_states() {
        let config = two_modules()
            .module(ModuleConfig::new("M3", "Constant").output("A"))
            .state(StateConfig::new("Run").plan(plan("P", &["M1"])))
            .state(StateConfig::new("Alt").plan(plan("P", &["M3"])));
        assert_eq!(validate(&config), Ok(()));
    }

    #[test]
    fn persistent_owner_must_be_declared() {
        let config = run(vec![plan("P", &["M1"])])
            .signal(SignalDecl::scalar("Acc", SignalType::Float64).persistent("Nobody"));
        assert!(matches!(
            validate(&config),
            Err(ConfigurationError::UnknownOwner { .. })
        ));
    }
}

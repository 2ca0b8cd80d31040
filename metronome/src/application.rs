/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Application assembly.
//!
//! [`Application::build`] turns an [`ApplicationConfig`] into a ready-to-run
//! set of objects, in this order:
//!
//! 1. structural checks ([`config::validate`](crate::config::validate));
//! 2. signal store allocation (plus timing signals when enabled);
//! 3. module instantiation, `initialise` and `setup` (bindings resolved);
//! 4. States: per-plan entries with input views, producer sets, cycle frames;
//! 5. transition reset tables for every State pair;
//! 6. entry into the initial State.
//!
//! Any failure aborts the build with a [`StartupError`]; no cycle runs until
//! every step succeeded.
//!
//! # Timing signals
//!
//! With `timing_signals` enabled the store additionally holds (all `uint32`):
//!
//! | Path | Content |
//! |------|---------|
//! | `Timings.CurrentState` | index of the active State |
//! | `Timings.<State>.<Plan>_CycleTime` | µs between the last two activations of the plan |
//! | `Timings.<Module>_ExecTime` | µs spent in the module's last `execute` |

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{validate, ApplicationConfig, StateConfig};
use crate::error::{ConfigurationError, StartupError};
use crate::frame::CycleFrame;
use crate::module::{lock, ModuleInstance, ModuleRegistry, StateChange};
use crate::plan::{PlanEntry, ThreadPlan};
use crate::scheduler::{
    transition, Diagnostics, ExecutionPolicy, Scheduler, SchedulerError, SchedulerHandle,
    TransitionError, TransitionOutcome,
};
use crate::signal::{SignalDecl, SignalHandle, SignalId, SignalStore, SignalType, Value, View};
use crate::scheduler::transition::RequestQueue;
use crate::state::{transition_resets, State};

// ── Timing signal names ───────────────────────────────────────────────────────

pub const CURRENT_STATE_SIGNAL: &str = "Timings.CurrentState";

pub fn cycle_time_signal(state: &str, plan: &str) -> String {
    format!("Timings.{state}.{plan}_CycleTime")
}

pub fn exec_time_signal(module: &str) -> String {
    format!("Timings.{module}_ExecTime")
}

fn timing_declarations(config: &ApplicationConfig) -> Vec<SignalDecl> {
    let mut decls = vec![SignalDecl::scalar(CURRENT_STATE_SIGNAL, SignalType::UInt32)];
    for state in &config.states {
        for plan in &state.plans {
            decls.push(SignalDecl::scalar(
                cycle_time_signal(&state.name, &plan.name),
                SignalType::UInt32,
            ));
        }
    }
    for module in &config.modules {
        decls.push(SignalDecl::scalar(exec_time_signal(&module.name), SignalType::UInt32));
    }
    decls
}

// ── Runtime ───────────────────────────────────────────────────────────────────

/// Everything the scheduler needs, shared between the application, the
/// scheduler controller, its workers and every [`SchedulerHandle`].
pub(crate) struct Runtime {
    pub(crate) name: String,
    pub(crate) store: Arc<SignalStore>,
    pub(crate) modules: Vec<Mutex<ModuleInstance>>,
    pub(crate) states: Vec<State>,
    /// `resets[from][to]`: signals restored to default on that transition.
    pub(crate) resets: Vec<Vec<Vec<SignalId>>>,
    pub(crate) policy: ExecutionPolicy,
    pub(crate) diagnostics: Arc<Diagnostics>,
    pub(crate) current_state_signal: Option<SignalHandle>,

    /// Index of the active State.
    pub(crate) active: AtomicUsize,
    /// Number of completed cycles; also the index of the next cycle.
    pub(crate) cycle: AtomicU64,
    /// Cycle index at which the active State was entered.
    pub(crate) entered_at: AtomicU64,
    pub(crate) requests: Mutex<RequestQueue>,
    pub(crate) scheduler_claimed: AtomicBool,
    pub(crate) stop_requested: AtomicBool,
    pub(crate) stopped: AtomicBool,
}

impl Runtime {
    pub(crate) fn state_index(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|s| s.name == name)
    }

    pub(crate) fn active_state(&self) -> &State {
        let active = self.active.load(Ordering::Acquire);
        // `active` only ever holds indices produced by `state_index`.
        &self.states[active.min(self.states.len() - 1)]
    }
}

// ── Application ───────────────────────────────────────────────────────────────

/// An assembled application.
pub struct Application {
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.runtime.name)
            .field("states", &self.state_names())
            .field("current_state", &self.current_state())
            .finish_non_exhaustive()
    }
}

impl Application {
    /// Validates `config` and assembles the application.
    ///
    /// # Errors
    /// [`StartupError::Configuration`] for structural problems, unknown module
    /// classes or invalid parameters; [`StartupError::Binding`] when a module's
    /// signals cannot be resolved.
    pub fn build(config: ApplicationConfig, registry: &ModuleRegistry) -> Result<Self, StartupError> {
        validate(&config)?;

        let mut decls = config.signals.clone();
        if config.timing_signals {
            decls.extend(timing_declarations(&config));
        }
        let store = Arc::new(SignalStore::new(decls)?);

        // ── Modules ───────────────────────────────────────────────────────────
        let mut modules = Vec::with_capacity(config.modules.len());
        let mut module_index = HashMap::with_capacity(config.modules.len());
        for mc in &config.modules {
            let logic = registry.create(&mc.class).ok_or_else(|| {
                ConfigurationError::UnknownModuleClass {
                    module: mc.name.clone(),
                    class: mc.class.clone(),
                }
            })?;
            let mut instance = ModuleInstance::new(&mc.name, &mc.class, logic);
            instance.initialise(mc)?;
            instance.setup(&store)?;
            if config.timing_signals {
                if let Ok(h) = store.handle(&exec_time_signal(&mc.name)) {
                    instance.set_exec_time_signal(h);
                }
            }
            module_index.insert(mc.name.clone(), modules.len());
            modules.push(instance);
        }

        // ── States ────────────────────────────────────────────────────────────
        let states = config
            .states
            .iter()
            .map(|sc| build_state(sc, &config, &modules, &module_index, &store))
            .collect::<Result<Vec<_>, _>>()?;

        let initial = states
            .iter()
            .position(|s| s.name == config.initial_state)
            .ok_or_else(|| ConfigurationError::UnknownInitialState(config.initial_state.clone()))?;

        let resets = states
            .iter()
            .map(|from| {
                states
                    .iter()
                    .map(|to| transition_resets(from, to, &store))
                    .collect()
            })
            .collect();

        let current_state_signal = if config.timing_signals {
            store.handle(CURRENT_STATE_SIGNAL).ok()
        } else {
            None
        };
        if let Some(h) = current_state_signal {
            let _ = store.overwrite_at(h, &[Value::UInt32(initial as u32)]);
        }

        let change = StateChange {
            from: None,
            to: &states[initial].name,
        };
        for m in states[initial].module_indices() {
            modules[m].prepare_next_state(&change);
        }

        info!(
            application = %config.name,
            signals = store.len(),
            modules = modules.len(),
            states = states.len(),
            initial_state = %config.initial_state,
            "✓ application assembled"
        );

        let runtime = Runtime {
            name: config.name,
            store,
            modules: modules.into_iter().map(Mutex::new).collect(),
            states,
            resets,
            policy: config.policy,
            diagnostics: Arc::new(Diagnostics::new(config.event_capacity)),
            current_state_signal,
            active: AtomicUsize::new(initial),
            cycle: AtomicU64::new(0),
            entered_at: AtomicU64::new(0),
            requests: Mutex::new(RequestQueue::default()),
            scheduler_claimed: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        };

        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    pub fn name(&self) -> &str {
        &self.runtime.name
    }

    pub fn store(&self) -> &Arc<SignalStore> {
        &self.runtime.store
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.runtime.diagnostics
    }

    pub fn states(&self) -> &[State] {
        &self.runtime.states
    }

    pub fn state_names(&self) -> Vec<&str> {
        self.runtime.states.iter().map(|s| s.name()).collect()
    }

    pub fn current_state(&self) -> &str {
        self.runtime.active_state().name()
    }

    /// Number of cycles completed so far.
    pub fn cycle(&self) -> u64 {
        self.runtime.cycle.load(Ordering::Acquire)
    }

    /// Queues a State change; it takes effect at the next cycle boundary.
    ///
    /// Requesting the active State with nothing else queued is a no-op that
    /// returns [`TransitionOutcome::AlreadyActive`].
    pub fn request_state_change(&self, state: &str) -> Result<TransitionOutcome, TransitionError> {
        transition::request(&self.runtime, state)
    }

    /// Handle usable from other threads.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(Arc::clone(&self.runtime))
    }

    /// Creates the application's scheduler (`Idle → Running`).  Only one
    /// scheduler can ever exist per application.
    pub fn scheduler(&self, clock: Arc<dyn Clock>) -> Result<Scheduler, SchedulerError> {
        Scheduler::new(Arc::clone(&self.runtime), clock)
    }

    /// Terminates every module.  The scheduler must have been shut down.
    pub fn shutdown(self) -> Result<(), SchedulerError> {
        let rt = &self.runtime;
        if rt.scheduler_claimed.load(Ordering::Acquire) && !rt.stopped.load(Ordering::Acquire) {
            return Err(SchedulerError::StillRunning);
        }
        for m in &rt.modules {
            lock(m).terminate();
        }
        info!(application = %rt.name, cycles = self.cycle(), "application shut down");
        Ok(())
    }
}

// ── State assembly ────────────────────────────────────────────────────────────

/// Where a signal is written inside one State: (plan index, position).
type Producers = BTreeMap<SignalId, (usize, usize)>;

fn build_state(
    sc: &StateConfig,
    config: &ApplicationConfig,
    modules: &[ModuleInstance],
    module_index: &HashMap<String, usize>,
    store: &SignalStore,
) -> Result<State, ConfigurationError> {
    let periods: Vec<(&str, u64)> = sc
        .plans
        .iter()
        .map(|p| (p.name.as_str(), p.period_us))
        .collect();
    let frame = CycleFrame::compute(&periods, config.hyperperiod_limit_us).map_err(|source| {
        ConfigurationError::Frame {
            state: sc.name.clone(),
            source,
        }
    })?;

    let lookup = |state: &str, plan: &str, name: &str| {
        module_index
            .get(name)
            .copied()
            .ok_or_else(|| ConfigurationError::UnknownModule {
                state: state.to_string(),
                plan: plan.to_string(),
                module: name.to_string(),
            })
    };

    // Producers first: input views depend on them.
    let mut producers = Producers::new();
    for (p, pc) in sc.plans.iter().enumerate() {
        for (pos, name) in pc.modules.iter().enumerate() {
            let m = lookup(&sc.name, &pc.name, name)?;
            for out in modules[m].bindings().outputs() {
                let Some(h) = out.handle() else { continue };
                if let Some(&(fp, fpos)) = producers.get(&h.id()) {
                    return Err(ConfigurationError::MultipleProducers {
                        state: sc.name.clone(),
                        signal: out.path().to_string(),
                        first: sc.plans[fp].modules[fpos].clone(),
                        second: name.clone(),
                    });
                }
                producers.insert(h.id(), (p, pos));
            }
        }
    }

    let mut plans = Vec::with_capacity(sc.plans.len());
    for (p, pc) in sc.plans.iter().enumerate() {
        let mut entries = Vec::with_capacity(pc.modules.len());
        for (pos, name) in pc.modules.iter().enumerate() {
            let m = lookup(&sc.name, &pc.name, name)?;
            let input_views = modules[m]
                .bindings()
                .inputs()
                .iter()
                .map(|b| match b.handle().and_then(|h| producers.get(&h.id())) {
                    Some(&(pp, ppos)) if pp == p && ppos < pos => View::Current,
                    _ => View::Previous,
                })
                .collect();
            entries.push(PlanEntry {
                module: m,
                input_views,
            });
        }

        let cycle_time = if config.timing_signals {
            store.handle(&cycle_time_signal(&sc.name, &pc.name)).ok()
        } else {
            None
        };

        debug!(
            state = %sc.name,
            plan = %pc.name,
            period_us = pc.period_us,
            modules = entries.len(),
            "thread plan"
        );
        plans.push(ThreadPlan {
            name: pc.name.clone(),
            period_us: pc.period_us,
            affinity: pc.affinity,
            entries,
            cycle_time,
        });
    }

    Ok(State {
        name: sc.name.clone(),
        plans,
        frame,
        produced: producers.into_keys().collect(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

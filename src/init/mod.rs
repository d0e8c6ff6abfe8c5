//! Immediate and deferred instantiation from config subtrees.
//!
//! A subtree carrying the reserved `_target_` key names a registered
//! callable; its sibling fields become the call's named arguments. Nested
//! target subtrees (in map values and list elements) are constructed
//! depth-first, children before parents.
//!
//! [`Instantiator::now`] resolves, constructs, and calls immediately.
//! [`Instantiator::later`] resolves and prepares eagerly but performs no
//! construction until the returned [`Deferred`] is first invoked; the
//! prepared arguments are then kept, so a second invocation re-calls the
//! target with the same argument objects rather than rebuilding them.

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::target::{ArgValue, Args, Object, Target, TargetRegistry};
use crate::tree::{join_path, ConfigMap, ConfigValue, TARGET_KEY};

/// Instantiation engine over a target registry.
///
/// The advisory toggle is engine state, not a process global: an engine
/// built with `advise_untyped(false)` stays quiet about untyped
/// instantiation without affecting any other engine.
#[derive(Debug, Clone)]
pub struct Instantiator {
    registry: Arc<TargetRegistry>,
    advise_untyped: bool,
}

impl Instantiator {
    pub fn new(registry: TargetRegistry) -> Self {
        Self::with_shared_registry(Arc::new(registry))
    }

    pub fn with_shared_registry(registry: Arc<TargetRegistry>) -> Self {
        Instantiator {
            registry,
            advise_untyped: true,
        }
    }

    /// Controls the advisory emitted when instantiation is requested
    /// without an expected type. On by default.
    pub fn advise_untyped(mut self, on: bool) -> Self {
        self.advise_untyped = on;
        self
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Resolves the node's target, constructs nested children depth-first,
    /// calls the target, and checks the produced object is a `T`.
    pub fn now<T: Send + Sync + 'static>(&self, node: &ConfigMap) -> Result<Arc<T>> {
        let plan = self.plan(node, "", &mut Vec::new())?;
        let name = plan.target.display_name().to_string();
        run_plan(&plan)?
            .downcast::<T>()
            .map_err(|_| Error::TypeContract {
                target: name,
                expected: type_name::<T>(),
            })
    }

    /// Like [`Instantiator::now`] without the type contract check; emits a
    /// non-fatal advisory unless suppressed.
    pub fn now_untyped(&self, node: &ConfigMap) -> Result<Object> {
        self.advise();
        let plan = self.plan(node, "", &mut Vec::new())?;
        run_plan(&plan)
    }

    /// Resolves and prepares eagerly, constructs nothing: the returned
    /// deferred performs the construction and call on its first invocation.
    /// Resolution and preparation failures also surface there.
    pub fn later<T: Send + Sync + 'static>(&self, node: &ConfigMap) -> Deferred<T> {
        match self.plan(node, "", &mut Vec::new()) {
            Ok(plan) => Deferred::pending(plan),
            Err(e) => Deferred::failed(e),
        }
    }

    /// Untyped variant of [`Instantiator::later`]; invoke the result with
    /// [`Deferred::call_untyped`]. Emits the advisory unless suppressed.
    pub fn later_untyped(&self, node: &ConfigMap) -> Deferred<()> {
        self.advise();
        match self.plan(node, "", &mut Vec::new()) {
            Ok(plan) => Deferred::pending(plan),
            Err(e) => Deferred::failed(e),
        }
    }

    fn advise(&self) {
        if self.advise_untyped {
            tracing::warn!(
                "instantiating without an expected type; the produced object is unchecked"
            );
        }
    }

    fn plan(
        &self,
        node: &ConfigMap,
        path: &str,
        ancestors: &mut Vec<*const ConfigMap>,
    ) -> Result<Plan> {
        let ptr = node as *const ConfigMap;
        if ancestors.contains(&ptr) {
            return Err(Error::SelfReferentialTarget {
                path: node_label(path),
            });
        }
        let target_path = node.target_path().ok_or_else(|| Error::NoTarget {
            path: node_label(path),
        })?;
        let target = self.registry.resolve(target_path)?;
        ancestors.push(ptr);
        let mut args = Vec::new();
        for (key, value) in node.iter() {
            if key == TARGET_KEY {
                continue;
            }
            args.push((
                key.clone(),
                self.plan_arg(value, &join_path(path, key), ancestors)?,
            ));
        }
        ancestors.pop();
        Ok(Plan { target, args })
    }

    fn plan_arg(
        &self,
        value: &ConfigValue,
        path: &str,
        ancestors: &mut Vec<*const ConfigMap>,
    ) -> Result<ArgPlan> {
        match value {
            ConfigValue::Missing => Err(Error::MissingRequired {
                paths: vec![path.to_string()],
            }),
            ConfigValue::Map(m) if m.target_path().is_some() => {
                Ok(ArgPlan::Child(Box::new(self.plan(m, path, ancestors)?)))
            }
            ConfigValue::Map(m) => {
                let missing: Vec<String> = m
                    .missing_paths()
                    .into_iter()
                    .map(|p| join_path(path, &p))
                    .collect();
                if !missing.is_empty() {
                    return Err(Error::MissingRequired { paths: missing });
                }
                Ok(ArgPlan::Value(value.clone()))
            }
            ConfigValue::List(items) => {
                let plans = items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.plan_arg(v, &join_path(path, &i.to_string()), ancestors))
                    .collect::<Result<Vec<_>>>()?;
                if plans.iter().any(|p| !matches!(p, ArgPlan::Value(_))) {
                    Ok(ArgPlan::List(plans))
                } else {
                    let values = plans
                        .into_iter()
                        .filter_map(|p| match p {
                            ArgPlan::Value(v) => Some(v),
                            _ => None,
                        })
                        .collect();
                    Ok(ArgPlan::Value(ConfigValue::List(values)))
                }
            }
            other => Ok(ArgPlan::Value(other.clone())),
        }
    }
}

fn node_label(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

/// A resolved target with its arguments planned but not yet constructed.
#[derive(Debug, Clone)]
struct Plan {
    target: Target,
    args: Vec<(String, ArgPlan)>,
}

#[derive(Debug, Clone)]
enum ArgPlan {
    Value(ConfigValue),
    Child(Box<Plan>),
    List(Vec<ArgPlan>),
}

fn run_plan(plan: &Plan) -> Result<Object> {
    let args = realize(plan)?;
    plan.target.call(args)
}

fn realize(plan: &Plan) -> Result<Args> {
    let mut args = Args::new();
    for (name, arg) in &plan.args {
        args.insert(name.clone(), realize_arg(arg)?);
    }
    Ok(args)
}

fn realize_arg(plan: &ArgPlan) -> Result<ArgValue> {
    match plan {
        ArgPlan::Value(v) => Ok(ArgValue::Value(v.clone())),
        ArgPlan::Child(child) => {
            tracing::trace!(path = child.target.display_name(), "constructing nested target");
            let args = realize(child)?;
            Ok(ArgValue::Object(child.target.call(args)?))
        }
        ArgPlan::List(items) => items
            .iter()
            .map(realize_arg)
            .collect::<Result<Vec<_>>>()
            .map(ArgValue::List),
    }
}

/// A zero-argument deferred invocation: the resolved target and its
/// prepared arguments, with an optional return-type annotation `T`.
pub struct Deferred<T> {
    state: DeferredState,
    _marker: PhantomData<fn() -> T>,
}

enum DeferredState {
    Pending {
        plan: Plan,
        realized: Mutex<Option<Args>>,
    },
    Failed(Error),
    NoOp,
}

impl<T> Deferred<T> {
    fn pending(plan: Plan) -> Self {
        Deferred {
            state: DeferredState::Pending {
                plan,
                realized: Mutex::new(None),
            },
            _marker: PhantomData,
        }
    }

    fn failed(error: Error) -> Self {
        Deferred {
            state: DeferredState::Failed(error),
            _marker: PhantomData,
        }
    }

    /// Invokes the target without a type check. The first invocation
    /// constructs nested children; later ones reuse them.
    pub fn call_untyped(&self) -> Result<Object> {
        match &self.state {
            DeferredState::Pending { plan, realized } => {
                let args = {
                    let mut guard = realized.lock().unwrap_or_else(|e| e.into_inner());
                    match guard.as_ref() {
                        Some(args) => args.clone(),
                        None => {
                            let args = realize(plan)?;
                            *guard = Some(args.clone());
                            args
                        }
                    }
                };
                plan.target.call(args)
            }
            DeferredState::Failed(e) => Err(e.clone()),
            DeferredState::NoOp => Ok(Arc::new(()) as Object),
        }
    }

    fn target_name(&self) -> &str {
        match &self.state {
            DeferredState::Pending { plan, .. } => plan.target.display_name(),
            _ => "<deferred>",
        }
    }
}

impl<T: Send + Sync + 'static> Deferred<T> {
    /// Invokes the target and checks the produced object is a `T`.
    pub fn call(&self) -> Result<Arc<T>> {
        let name = self.target_name().to_string();
        self.call_untyped()?
            .downcast::<T>()
            .map_err(|_| Error::TypeContract {
                target: name,
                expected: type_name::<T>(),
            })
    }
}

impl Deferred<()> {
    /// A deferred that does nothing when invoked; stands in for a real
    /// invocation when a print-only CLI flag suppresses the run.
    pub fn no_op() -> Self {
        Deferred {
            state: DeferredState::NoOp,
            _marker: PhantomData,
        }
    }
}

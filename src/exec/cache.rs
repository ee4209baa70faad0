//! Plan cache
//!
//! Plans keyed by (profile, source type, destination type). A plan is built
//! at most once per key even under concurrent lookups; every caller gets
//! the same shared instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::plan::MappingPlan;
use crate::types::TypeDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanKey {
    pub profile: String,
    pub source: String,
    pub destination: String,
}

impl PlanKey {
    pub fn new(profile: impl Into<String>, source: &TypeDescriptor, destination: &TypeDescriptor) -> Self {
        Self {
            profile: profile.into(),
            source: source.to_string(),
            destination: destination.to_string(),
        }
    }

    pub fn for_plan(plan: &MappingPlan) -> Self {
        let decl = &plan.declaration;
        Self::new(decl.profile.clone(), &decl.source.ty, &decl.destination)
    }
}

#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<PlanKey, Arc<MappingPlan>>>,
    /// Serializes builds so a key is never built twice.
    building: Mutex<()>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PlanKey) -> Option<Arc<MappingPlan>> {
        self.plans
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn insert(&self, plan: MappingPlan) -> Arc<MappingPlan> {
        let key = PlanKey::for_plan(&plan);
        let plan = Arc::new(plan);
        self.plans
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Arc::clone(&plan));
        plan
    }

    /// Cached plan for `key`, building it with `build` on first use. A
    /// failed build caches nothing.
    pub fn get_or_build<E, F>(&self, key: &PlanKey, build: F) -> Result<Arc<MappingPlan>, E>
    where
        F: FnOnce() -> Result<MappingPlan, E>,
    {
        if let Some(plan) = self.get(key) {
            return Ok(plan);
        }
        let _guard = self.building.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(plan) = self.get(key) {
            return Ok(plan);
        }
        debug!(profile = %key.profile, source = %key.source, destination = %key.destination, "building plan");
        let plan = Arc::new(build()?);
        self.plans
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), Arc::clone(&plan));
        Ok(plan)
    }

    pub fn len(&self) -> usize {
        self.plans.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.plans.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::declaration::{DeclarationInput, MapperUnit, DEFAULT_PROFILE};
    use crate::error::PlanError;
    use crate::plan::PlanBuilder;
    use crate::rules::MappingBuilder;
    use crate::types::{MethodDescriptor, PrimitiveKind, TypeRegistry, TypeShape};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (TypeRegistry, MapperUnit) {
        let mut r = TypeRegistry::with_builtins();
        let int = TypeDescriptor::primitive(PrimitiveKind::Int32);
        r.register(TypeShape::class("Demo.A").property("Id", int.clone()));
        r.register(TypeShape::class("Demo.B").property("Id", int));
        let unit = MapperUnit::new("Demo.Mapper").declare(DeclarationInput::new(
            MethodDescriptor::new("Map")
                .param("a", TypeDescriptor::reference("Demo.A"))
                .returning(TypeDescriptor::reference("Demo.B")),
            MappingBuilder::new().build(),
        ));
        (r, unit)
    }

    fn key() -> PlanKey {
        PlanKey::new(
            DEFAULT_PROFILE,
            &TypeDescriptor::reference("Demo.A"),
            &TypeDescriptor::reference("Demo.B"),
        )
    }

    #[test]
    fn concurrent_lookups_build_once() {
        let (r, unit) = setup();
        let config = CompilerConfig::default();
        let cache = PlanCache::new();
        let builds = AtomicUsize::new(0);

        let plans: Vec<Arc<MappingPlan>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        cache
                            .get_or_build(&key(), || {
                                builds.fetch_add(1, Ordering::SeqCst);
                                PlanBuilder::new(&r, &config).build(&unit, 0)
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert!(plans.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn failed_build_is_not_cached() {
        let (r, unit) = setup();
        let cache = PlanCache::new();
        let missing = || PlanError::UnknownMember {
            path: "Nope".into(),
            ty: "Demo.B".into(),
        };
        let err = cache
            .get_or_build(&key(), || Err::<MappingPlan, _>(missing()))
            .unwrap_err();
        assert_eq!(err, missing());
        assert!(cache.is_empty());

        let plan = PlanBuilder::new(&r, &CompilerConfig::default())
            .build(&unit, 0)
            .unwrap();
        assert_eq!(PlanKey::for_plan(&plan), key());
        cache.insert(plan);
        assert!(cache.get(&key()).is_some());
    }
}

//! Context Provider Registry - provider 등록 및 조회
//!
//! 시작 시 한 번 구성해서 `Arc`로 엔진에 주입합니다.
//! 같은 종류에 여러 provider가 있으면 `execution_order` 오름차순으로 실행되고,
//! 순서가 같으면 등록 순서를 따릅니다.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use warden_foundation::EntityKind;

use super::builtin;
use super::traits::ContextProvider;

/// One registration of a provider for an entity kind.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub provider: Arc<dyn ContextProvider>,
    pub execution_order: i32,
    sequence: usize,
}

impl RegisteredProvider {
    pub fn name(&self) -> &str {
        self.provider.name()
    }
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("name", &self.provider.name())
            .field("execution_order", &self.execution_order)
            .finish()
    }
}

/// 엔티티 종류별 Context Provider 레지스트리
///
/// ## 사용법
/// ```ignore
/// // 빈 레지스트리
/// let registry = ContextProviderRegistry::new();
///
/// // Builtin provider 포함
/// let registry = ContextProviderRegistry::with_builtins();
///
/// for registered in registry.providers_for(EntityKind::Task) {
///     registered.provider.get_privileges(&ctx, &task, &mut acc)?;
/// }
/// ```
#[derive(Default)]
pub struct ContextProviderRegistry {
    providers: HashMap<EntityKind, Vec<RegisteredProvider>>,
    registrations: usize,
}

impl ContextProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builtin provider 포함 레지스트리
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// provider 등록
    pub fn register(
        &mut self,
        kinds: &[EntityKind],
        provider: Arc<dyn ContextProvider>,
        execution_order: i32,
    ) {
        for kind in kinds {
            let registered = RegisteredProvider {
                provider: provider.clone(),
                execution_order,
                sequence: self.registrations,
            };
            self.registrations += 1;

            let entries = self.providers.entry(*kind).or_default();
            entries.push(registered);
            entries.sort_by_key(|entry| (entry.execution_order, entry.sequence));

            debug!(
                "Registered context provider {} for {} (order {})",
                provider.name(),
                kind,
                execution_order
            );
        }
    }

    /// `kind`에 대한 provider (실행 순서대로)
    pub fn providers_for(&self, kind: EntityKind) -> &[RegisteredProvider] {
        self.providers
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// provider가 등록된 엔티티 종류
    pub fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> = self.providers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// 전체 등록 수 (종류별 등록을 각각 셈)
    pub fn len(&self) -> usize {
        self.providers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextFilter;
    use crate::engine::{PrivilegeMap, ResolveContext};
    use warden_foundation::{Entity, Result, Tier, User};

    struct Named(&'static str);

    impl ContextProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn get_privileges(
            &self,
            _ctx: &ResolveContext<'_>,
            _target: &Entity,
            _acc: &mut PrivilegeMap,
        ) -> Result<()> {
            Ok(())
        }

        fn visible_filter(
            &self,
            _ctx: &ResolveContext<'_>,
            _user: &User,
            _field: Tier,
        ) -> Result<Option<ContextFilter>> {
            Ok(None)
        }
    }

    fn names(registry: &ContextProviderRegistry, kind: EntityKind) -> Vec<String> {
        registry
            .providers_for(kind)
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    #[test]
    fn test_providers_sorted_by_execution_order() {
        let mut registry = ContextProviderRegistry::new();
        registry.register(&[EntityKind::Task], Arc::new(Named("late")), 50);
        registry.register(&[EntityKind::Task], Arc::new(Named("early")), 10);
        registry.register(&[EntityKind::Task], Arc::new(Named("tie")), 50);

        assert_eq!(names(&registry, EntityKind::Task), vec!["early", "late", "tie"]);
        assert!(registry.providers_for(EntityKind::Meeting).is_empty());
    }

    #[test]
    fn test_register_many_kinds() {
        let mut registry = ContextProviderRegistry::new();
        registry.register(&[EntityKind::Note, EntityKind::Picture], Arc::new(Named("x")), 0);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.kinds(), vec![EntityKind::Note, EntityKind::Picture]);
    }

    #[test]
    fn test_builtins() {
        let registry = ContextProviderRegistry::with_builtins();
        assert!(!registry.is_empty());

        assert_eq!(names(&registry, EntityKind::Note), vec!["labbook_element"]);
        assert_eq!(names(&registry, EntityKind::Task), vec!["kanban_task"]);
        assert_eq!(
            names(&registry, EntityKind::File),
            vec!["labbook_element", "directory_file"]
        );
        assert_eq!(names(&registry, EntityKind::Directory), vec!["directory"]);
        assert_eq!(names(&registry, EntityKind::KanbanColumn), vec!["kanban_column"]);
        assert!(registry.providers_for(EntityKind::Drive).is_empty());
    }
}

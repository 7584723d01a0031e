//! Backend registration and dependency-ordered execution.

use anvil_cache::{GraphStoreFactory, SymbolGraphStore};
use anvil_common::BackendId;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::backend::{Backend, ProcessingBackend, TranslatingBackend};

/// Errors raised while registering backends.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two descriptors share one backend id.
    #[error("backend `{0}` registered twice")]
    DuplicateBackend(BackendId),

    /// A descriptor consumes the intermediate output of an unknown backend.
    #[error("backend `{backend}` consumes unknown backend `{consumes}`")]
    UnknownConsumedBackend {
        /// The consuming backend.
        backend: BackendId,
        /// The unresolved producer name.
        consumes: BackendId,
    },

    /// The produces/consumes relationships form a cycle, so no execution
    /// order exists.
    #[error("backend ordering cycle involving `{0}`")]
    OrderingCycle(BackendId),

    /// More than one backend accepts the same file.
    #[error("file `{path}` is claimed by both `{first}` and `{second}`")]
    AmbiguousFileType {
        /// The contested file path.
        path: std::path::PathBuf,
        /// The backend that accepted the file first.
        first: BackendId,
        /// The other backend that also accepted it.
        second: BackendId,
    },
}

/// The two backend flavors a descriptor can carry.
#[derive(Clone)]
pub enum RegisteredBackend {
    /// A translating backend driven by the file monitor.
    Translating(Arc<dyn TranslatingBackend>),
    /// An item-processing backend driven by validity fingerprints.
    Processing(Arc<dyn ProcessingBackend>),
}

impl RegisteredBackend {
    /// The common [`Backend`] view of either flavor.
    pub fn as_backend(&self) -> &dyn Backend {
        match self {
            RegisteredBackend::Translating(backend) => backend.as_ref(),
            RegisteredBackend::Processing(backend) => backend.as_ref(),
        }
    }
}

/// One entry of the registration table.
#[derive(Clone)]
pub struct BackendDescriptor {
    /// The backend implementation.
    pub backend: RegisteredBackend,
    /// Whether this backend produces an intermediate output directory that
    /// downstream backends consume as additional sources.
    pub intermediate_output: bool,
    /// The backend whose intermediate output this one consumes; forces this
    /// backend to run after the producer.
    pub consumes: Option<BackendId>,
    /// Factory for this backend's dependency graph store.
    pub store_factory: GraphStoreFactory,
}

impl BackendDescriptor {
    /// A plain translating backend with the default graph store.
    pub fn translating(backend: Arc<dyn TranslatingBackend>) -> Self {
        Self {
            backend: RegisteredBackend::Translating(backend),
            intermediate_output: false,
            consumes: None,
            store_factory: SymbolGraphStore::factory,
        }
    }

    /// A plain item-processing backend with the default graph store.
    pub fn processing(backend: Arc<dyn ProcessingBackend>) -> Self {
        Self {
            backend: RegisteredBackend::Processing(backend),
            intermediate_output: false,
            consumes: None,
            store_factory: SymbolGraphStore::factory,
        }
    }

    /// Marks this backend as producing an intermediate output directory.
    pub fn with_intermediate_output(mut self) -> Self {
        self.intermediate_output = true;
        self
    }

    /// Declares which backend's intermediate output this backend consumes.
    pub fn consuming(mut self, producer: BackendId) -> Self {
        self.consumes = Some(producer);
        self
    }

    /// The backend's id.
    pub fn id(&self) -> &BackendId {
        self.backend.as_backend().id()
    }
}

/// The load-time-built table of registered backends.
///
/// Execution order is a total order derived from the declared
/// produces/consumes edges between backends; it is resolved once when the
/// registry is sealed, not per build. The driver iterates the table, it
/// never subclasses it.
pub struct BackendRegistry {
    descriptors: Vec<BackendDescriptor>,
    /// Indices into `descriptors` in execution order.
    order: Vec<usize>,
}

impl BackendRegistry {
    /// Builds and seals a registry from a descriptor list.
    ///
    /// Fails on duplicate ids, unresolved `consumes` declarations, and
    /// ordering cycles.
    pub fn build(descriptors: Vec<BackendDescriptor>) -> Result<Self, RegistryError> {
        let mut by_id: HashMap<BackendId, usize> = HashMap::new();
        for (index, descriptor) in descriptors.iter().enumerate() {
            if by_id.insert(descriptor.id().clone(), index).is_some() {
                return Err(RegistryError::DuplicateBackend(descriptor.id().clone()));
            }
        }

        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..descriptors.len()).map(|i| graph.add_node(i)).collect();
        for (index, descriptor) in descriptors.iter().enumerate() {
            if let Some(consumes) = &descriptor.consumes {
                let Some(&producer) = by_id.get(consumes) else {
                    return Err(RegistryError::UnknownConsumedBackend {
                        backend: descriptor.id().clone(),
                        consumes: consumes.clone(),
                    });
                };
                graph.add_edge(nodes[producer], nodes[index], ());
            }
        }

        let sorted = toposort(&graph, None).map_err(|cycle| {
            let index = graph[cycle.node_id()];
            RegistryError::OrderingCycle(descriptors[index].id().clone())
        })?;
        let order: Vec<usize> = sorted.into_iter().map(|node| graph[node]).collect();

        Ok(Self { descriptors, order })
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if no backends are registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Iterates descriptors in execution order.
    pub fn in_order(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.order.iter().map(move |&index| &self.descriptors[index])
    }

    /// Looks up a descriptor by backend id.
    pub fn get(&self, id: &BackendId) -> Option<&BackendDescriptor> {
        self.descriptors.iter().find(|d| d.id() == id)
    }

    /// Classifies a source file to the backend that compiles it.
    ///
    /// Returns `Ok(None)` for files no backend accepts. Two backends
    /// accepting the same file is a configuration error, never resolved
    /// silently.
    pub fn classify(&self, path: &Path) -> Result<Option<&BackendDescriptor>, RegistryError> {
        let mut found: Option<&BackendDescriptor> = None;
        for descriptor in self.in_order() {
            if descriptor.backend.as_backend().is_compilable_file(path) {
                if let Some(first) = found {
                    return Err(RegistryError::AmbiguousFileType {
                        path: path.to_path_buf(),
                        first: first.id().clone(),
                        second: descriptor.id().clone(),
                    });
                }
                found = Some(descriptor);
            }
        }
        Ok(found)
    }

    /// The store factory list the composite cache opens from, in execution
    /// order.
    pub fn store_factories(&self) -> Vec<(BackendId, GraphStoreFactory)> {
        self.in_order()
            .map(|d| (d.id().clone(), d.store_factory))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendRun, TranslationOutcome};
    use std::path::PathBuf;

    struct StubBackend {
        id: BackendId,
        extension: &'static str,
    }

    impl StubBackend {
        fn descriptor(name: &'static str, extension: &'static str) -> BackendDescriptor {
            BackendDescriptor::translating(Arc::new(StubBackend {
                id: BackendId::new(name),
                extension,
            }))
        }
    }

    impl Backend for StubBackend {
        fn id(&self) -> &BackendId {
            &self.id
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn is_compilable_file(&self, path: &Path) -> bool {
            path.extension().and_then(|e| e.to_str()) == Some(self.extension)
        }
    }

    impl TranslatingBackend for StubBackend {
        fn translate(&self, _run: &BackendRun<'_>, _files: &[PathBuf]) -> TranslationOutcome {
            TranslationOutcome::empty()
        }
    }

    #[test]
    fn registration_order_without_edges() {
        let registry = BackendRegistry::build(vec![
            StubBackend::descriptor("a", "a"),
            StubBackend::descriptor("b", "b"),
        ])
        .unwrap();
        let order: Vec<String> = registry.in_order().map(|d| d.id().to_string()).collect();
        assert_eq!(order, ["a", "b"]);
    }

    #[test]
    fn consumer_runs_after_producer() {
        // `late` is registered first but consumes `gen`, so `gen` must come
        // first in execution order.
        let registry = BackendRegistry::build(vec![
            StubBackend::descriptor("late", "l").consuming(BackendId::new("gen")),
            StubBackend::descriptor("gen", "g").with_intermediate_output(),
        ])
        .unwrap();
        let order: Vec<String> = registry.in_order().map(|d| d.id().to_string()).collect();
        assert_eq!(order, ["gen", "late"]);
    }

    #[test]
    fn duplicate_backend_rejected() {
        let result = BackendRegistry::build(vec![
            StubBackend::descriptor("a", "a"),
            StubBackend::descriptor("a", "b"),
        ]);
        assert!(matches!(result, Err(RegistryError::DuplicateBackend(_))));
    }

    #[test]
    fn unknown_consumed_backend_rejected() {
        let result = BackendRegistry::build(vec![
            StubBackend::descriptor("late", "l").consuming(BackendId::new("missing")),
        ]);
        assert!(matches!(
            result,
            Err(RegistryError::UnknownConsumedBackend { .. })
        ));
    }

    #[test]
    fn ordering_cycle_rejected() {
        let result = BackendRegistry::build(vec![
            StubBackend::descriptor("a", "a").consuming(BackendId::new("b")),
            StubBackend::descriptor("b", "b").consuming(BackendId::new("a")),
        ]);
        assert!(matches!(result, Err(RegistryError::OrderingCycle(_))));
    }

    #[test]
    fn classify_unique_match() {
        let registry = BackendRegistry::build(vec![
            StubBackend::descriptor("a", "a"),
            StubBackend::descriptor("b", "b"),
        ])
        .unwrap();

        let found = registry.classify(Path::new("x.a")).unwrap().unwrap();
        assert_eq!(found.id(), &BackendId::new("a"));
        assert!(registry.classify(Path::new("x.other")).unwrap().is_none());

        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
        assert!(registry.get(&BackendId::new("b")).is_some());
        assert!(registry.get(&BackendId::new("missing")).is_none());
    }

    #[test]
    fn classify_tie_is_error() {
        let registry = BackendRegistry::build(vec![
            StubBackend::descriptor("a", "same"),
            StubBackend::descriptor("b", "same"),
        ])
        .unwrap();
        assert!(matches!(
            registry.classify(Path::new("x.same")),
            Err(RegistryError::AmbiguousFileType { .. })
        ));
    }

    #[test]
    fn store_factories_follow_execution_order() {
        let registry = BackendRegistry::build(vec![
            StubBackend::descriptor("late", "l").consuming(BackendId::new("gen")),
            StubBackend::descriptor("gen", "g"),
        ])
        .unwrap();
        let names: Vec<String> = registry
            .store_factories()
            .into_iter()
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(names, ["gen", "late"]);
    }
}

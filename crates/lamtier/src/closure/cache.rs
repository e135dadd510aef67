//! Arity → closure template cache.
//!
//! Templates for arities `1..=PREBUILT_ARITY` exist from the start; larger
//! arities are synthesized on first request and kept for the life of the
//! process. Lookups of published templates never block on synthesis.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use rustc_hash::FxHashMap;

use super::storage::{FixedSlots, NoSlots, SlotStorage, SpilledSlots};
use crate::value::Value;

/// Largest arity served by a pre-built template.
pub const PREBUILT_ARITY: usize = 16;

type SlotFactory = fn(usize, Vec<Value>) -> Box<dyn SlotStorage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateOrigin {
    Empty,
    Prebuilt,
    Synthesized,
}

/// The untyped layout of a closure record of one arity.
pub struct ClosureTemplate {
    arity: usize,
    origin: TemplateOrigin,
    factory: SlotFactory,
}

impl ClosureTemplate {
    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    #[inline]
    pub fn origin(&self) -> TemplateOrigin {
        self.origin
    }

    pub(crate) fn allocate(&self, values: Vec<Value>) -> Box<dyn SlotStorage> {
        (self.factory)(self.arity, values)
    }

    fn synthesize(arity: usize) -> Self {
        Self {
            arity,
            origin: TemplateOrigin::Synthesized,
            factory: |arity, values| Box::new(SpilledSlots::from_values(arity, values)),
        }
    }
}

impl fmt::Debug for ClosureTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureTemplate")
            .field("arity", &self.arity)
            .field("origin", &self.origin)
            .finish()
    }
}

fn fixed<const N: usize>(_arity: usize, values: Vec<Value>) -> Box<dyn SlotStorage> {
    Box::new(FixedSlots::<N>::from_values(values))
}

fn empty(_arity: usize, _values: Vec<Value>) -> Box<dyn SlotStorage> {
    Box::new(NoSlots)
}

macro_rules! prebuilt_templates {
    ($($n:literal),* $(,)?) => {
        vec![
            Arc::new(ClosureTemplate {
                arity: 0,
                origin: TemplateOrigin::Empty,
                factory: empty,
            }),
            $(
                Arc::new(ClosureTemplate {
                    arity: $n,
                    origin: TemplateOrigin::Prebuilt,
                    factory: fixed::<$n>,
                }),
            )*
        ]
    };
}

pub struct ClosureTypeCache {
    prebuilt: Vec<Arc<ClosureTemplate>>,
    synthesized: RwLock<FxHashMap<usize, Arc<ClosureTemplate>>>,
    synthesis_count: AtomicUsize,
}

static GLOBAL: LazyLock<ClosureTypeCache> = LazyLock::new(ClosureTypeCache::new);

impl Default for ClosureTypeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ClosureTypeCache {
    pub fn new() -> Self {
        Self {
            prebuilt: prebuilt_templates![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16],
            synthesized: RwLock::new(FxHashMap::default()),
            synthesis_count: AtomicUsize::new(0),
        }
    }

    /// The process-wide cache.
    pub fn global() -> &'static ClosureTypeCache {
        &GLOBAL
    }

    pub fn template(&self, arity: usize) -> Arc<ClosureTemplate> {
        if let Some(template) = self.prebuilt.get(arity) {
            return Arc::clone(template);
        }

        if let Some(template) = self
            .synthesized
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&arity)
        {
            return Arc::clone(template);
        }

        let mut synthesized = self.synthesized.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have won the race while we waited for the lock.
        if let Some(template) = synthesized.get(&arity) {
            return Arc::clone(template);
        }

        let template = Arc::new(ClosureTemplate::synthesize(arity));
        self.synthesis_count.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(arity, "synthesized closure template");
        synthesized.insert(arity, Arc::clone(&template));
        template
    }

    /// Number of templates synthesized so far by this cache.
    pub fn synthesis_count(&self) -> usize {
        self.synthesis_count.load(Ordering::Relaxed)
    }

    pub fn is_synthesized(&self, arity: usize) -> bool {
        self.synthesized
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&arity)
    }
}

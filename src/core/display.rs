//! Single-evaluation display caching shared by every passage kind.
//!
//! `display()` always re-runs the producer and overwrites the cache.
//! `last_display_result()` and `has_display_cache()` only ever look at the
//! cache, so inspecting a passage never repeats the producer's side effects.

use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use crate::core::entity::EntityError;
use crate::core::store::StoreError;

#[derive(Debug, Error)]
pub enum PassageError {
    #[error("passage '{passage}' failed to produce content: {message}")]
    Producer { passage: String, message: String },
    #[error("entity error: {0}")]
    Entity(#[from] EntityError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("passage '{0}' is already registered")]
    DuplicateId(String),
    #[error("passage not found: {0}")]
    NotFound(String),
}

/// The most recent artifact of one passage.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayCache<T> {
    last: Option<T>,
}

impl<T> Default for DisplayCache<T> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<T> DisplayCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the cache, returning the stored artifact.
    pub fn store(&mut self, artifact: T) -> &T {
        self.last.insert(artifact)
    }

    pub fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }

    pub fn is_cached(&self) -> bool {
        self.last.is_some()
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}

/// The display contract. Implementors supply the producer and the cache
/// slot; the provided methods are the same for every passage kind.
pub trait Displayable {
    type Output;

    /// Run the underlying producer once. Prefer [`display`](Self::display),
    /// which also refreshes the cache.
    fn produce(&mut self) -> Result<Self::Output, PassageError>;

    fn display_cache(&self) -> &DisplayCache<Self::Output>;

    fn display_cache_mut(&mut self) -> &mut DisplayCache<Self::Output>;

    /// Recompute the artifact and cache it. On error the previous cache
    /// entry is kept.
    fn display(&mut self) -> Result<&Self::Output, PassageError> {
        let artifact = self.produce()?;
        Ok(self.display_cache_mut().store(artifact))
    }

    fn last_display_result(&self) -> Option<&Self::Output> {
        self.display_cache().last()
    }

    fn has_display_cache(&self) -> bool {
        self.display_cache().is_cached()
    }

    fn clear_display_cache(&mut self) {
        self.display_cache_mut().clear();
    }
}

/// A producer the renderer forces when it chooses to.
pub struct Deferred<T> {
    producer: Rc<dyn Fn() -> T>,
}

impl<T> Deferred<T> {
    pub fn new(producer: impl Fn() -> T + 'static) -> Self {
        Self {
            producer: Rc::new(producer),
        }
    }

    pub fn from_rc(producer: Rc<dyn Fn() -> T>) -> Self {
        Self { producer }
    }

    /// Invoke the producer.
    pub fn force(&self) -> T {
        (self.producer)()
    }

    pub fn ptr_eq(&self, other: &Deferred<T>) -> bool {
        Rc::ptr_eq(&self.producer, &other.producer)
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Rc::clone(&self.producer),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// Cached content: either already resolved, or a deferred producer.
#[derive(Debug, Clone)]
pub enum Renderable<T> {
    Resolved(T),
    Deferred(Deferred<T>),
}

impl<T: Clone> Renderable<T> {
    /// The content, invoking a deferred producer if needed.
    pub fn force(&self) -> T {
        match self {
            Renderable::Resolved(value) => value.clone(),
            Renderable::Deferred(deferred) => deferred.force(),
        }
    }
}

impl<T> Renderable<T> {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Renderable::Deferred(_))
    }

    pub fn as_resolved(&self) -> Option<&T> {
        match self {
            Renderable::Resolved(value) => Some(value),
            Renderable::Deferred(_) => None,
        }
    }
}

/// A field that is either fixed or computed at display time.
pub enum Dynamic<T> {
    Fixed(T),
    Computed(Box<dyn Fn() -> T>),
}

impl<T: Clone> Dynamic<T> {
    pub fn computed(f: impl Fn() -> T + 'static) -> Self {
        Dynamic::Computed(Box::new(f))
    }

    /// Evaluate now. Called once per display by the owning passage.
    pub fn resolve(&self) -> T {
        match self {
            Dynamic::Fixed(value) => value.clone(),
            Dynamic::Computed(f) => f(),
        }
    }
}

impl<T> From<T> for Dynamic<T> {
    fn from(value: T) -> Self {
        Dynamic::Fixed(value)
    }
}

impl From<&str> for Dynamic<String> {
    fn from(value: &str) -> Self {
        Dynamic::Fixed(value.to_string())
    }
}

impl<T: fmt::Debug> fmt::Debug for Dynamic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dynamic::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Dynamic::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

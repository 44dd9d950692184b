//! Narrative State: reactive game state for narrative engines.
//!
//! A JSON document addressed by path queries ([`PathStore`]), entities whose
//! nested data is reached through identity-stable proxies
//! ([`ReactiveEntity`]), and passages that cache what they last displayed
//! ([`Displayable`]). Save slots sit on top through [`SaveManager`].

pub mod core;
pub mod schema;

pub use crate::core::context::{ContextError, GameContext, GameContextBuilder};
pub use crate::core::display::{Deferred, DisplayCache, Displayable, Dynamic, PassageError, Renderable};
pub use crate::core::entity::{EntityError, ReactiveEntity};
pub use crate::core::passage::{MapPassage, Passage, PassageRegistry, StoryPassage, WidgetPassage};
pub use crate::core::path::{JsonPath, PathError};
pub use crate::core::persistence::{JsonFileBackend, MemoryBackend, PersistenceError, SaveBackend, SaveManager};
pub use crate::core::reactive::{Field, Proxy};
pub use crate::core::store::{PathStore, SharedStore, StoreError};
pub use crate::schema::value::Special;

//! Reactive entities: an id plus a bag of variables, persisted on demand.
//!
//! Variables read like plain fields. Nested objects and arrays come back as
//! cached [`Proxy`](crate::core::reactive::Proxy) handles, so
//! `entity.stats.str += 1` becomes a read of `stats`, then an update on the
//! returned proxy. Nothing reaches the store until [`ReactiveEntity::save`]
//! is called.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use thiserror::Error;
use tracing::debug;

use crate::core::path::JsonPath;
use crate::core::reactive::{Cursor, Field, Key, Node, Slot, Tracker};
use crate::core::store::{SharedStore, StoreError};
use crate::schema::value::Special;

/// Names owned by the entity itself rather than its variable bag.
pub const RESERVED_MEMBERS: [&str; 4] = ["id", "variables", "save", "load"];

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("'{0}' is an entity member and cannot be used as a variable")]
    ReservedMember(String),
    #[error("key '{key}' cannot address an {container}")]
    KeyKind {
        key: String,
        container: &'static str,
    },
    #[error("index {index} is too far past the end of an array of length {len}")]
    IndexTooFar { index: usize, len: usize },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("value could not be converted: {0}")]
    Json(#[from] serde_json::Error),
    #[error("the state store is borrowed elsewhere")]
    StoreBusy,
}

/// A game object whose variables are exposed as mutable fields.
pub struct ReactiveEntity {
    id: String,
    store: SharedStore,
    root: RefCell<Rc<Node>>,
    tracker: Rc<Tracker>,
    weak: Weak<Tracker>,
    saved_revision: Cell<u64>,
}

impl ReactiveEntity {
    /// Create an entity with an empty variable bag.
    pub fn new(id: &str, store: SharedStore) -> Self {
        Self::with_variables(id, store, Map::new())
    }

    pub fn with_variables(id: &str, store: SharedStore, variables: Map<String, Value>) -> Self {
        let tracker = Rc::new(Tracker::default());
        let weak = Rc::downgrade(&tracker);
        Self {
            id: id.to_string(),
            store,
            root: RefCell::new(Node::object(variables)),
            tracker,
            weak,
            saved_revision: Cell::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path under which [`save`](Self::save) writes the bag.
    pub fn store_path(&self) -> JsonPath {
        JsonPath::root().key(self.id.as_str())
    }

    fn with_cursor<R>(&self, f: impl FnOnce(&Cursor<'_>) -> R) -> R {
        let root = Rc::clone(&self.root.borrow());
        f(&Cursor {
            node: &root,
            tracker: &self.weak,
        })
    }

    fn ensure_variable(name: &str) -> Result<(), EntityError> {
        if RESERVED_MEMBERS.contains(&name) {
            return Err(EntityError::ReservedMember(name.to_string()));
        }
        Ok(())
    }

    /// Read a field. `id` and `variables` resolve to the entity members.
    pub fn get(&self, name: &str) -> Option<Field> {
        match name {
            "id" => Some(Field::Value(Value::String(self.id.clone()))),
            "variables" => Some(Field::Value(Value::Object(self.variables()))),
            "save" | "load" => None,
            _ => self.with_cursor(|c| c.get(&Key::from(name))),
        }
    }

    /// Read a field and deserialize it.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let field = self.get(name)?;
        serde_json::from_value(field.to_json()).ok()
    }

    pub fn has(&self, name: &str) -> bool {
        !RESERVED_MEMBERS.contains(&name) && self.with_cursor(|c| c.get(&Key::from(name))).is_some()
    }

    /// Store a value, evicting the cached proxy of whatever it replaces.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), EntityError> {
        Self::ensure_variable(name)?;
        let slot = Slot::from_json(value.into());
        self.with_cursor(|c| c.put(Key::from(name), slot))
    }

    pub fn set_special(&self, name: &str, special: Special) -> Result<(), EntityError> {
        Self::ensure_variable(name)?;
        self.with_cursor(|c| c.put(Key::from(name), Slot::Special(special)))
    }

    pub fn set_serialized<T: Serialize>(&self, name: &str, value: &T) -> Result<(), EntityError> {
        let value = serde_json::to_value(value)?;
        self.set(name, value)
    }

    /// Store a field read from elsewhere. Proxies are copied, not aliased.
    pub fn assign(&self, name: &str, field: Field) -> Result<(), EntityError> {
        Self::ensure_variable(name)?;
        self.with_cursor(|c| c.put(Key::from(name), field.into_slot()))
    }

    /// Read-modify-write, the equivalent of `entity.field += ...`.
    pub fn update<F>(&self, name: &str, f: F) -> Result<(), EntityError>
    where
        F: FnOnce(Option<Field>) -> Value,
    {
        Self::ensure_variable(name)?;
        let next = f(self.get(name));
        self.set(name, next)
    }

    pub fn remove(&self, name: &str) -> Result<Option<Value>, EntityError> {
        Self::ensure_variable(name)?;
        Ok(self.with_cursor(|c| c.remove(&Key::from(name))))
    }

    pub fn field_names(&self) -> Vec<String> {
        self.with_cursor(|c| c.keys())
    }

    /// Deep, proxy-free copy of the variable bag.
    pub fn variables(&self) -> Map<String, Value> {
        match self.root.borrow().to_json() {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// True if anything changed since the last save or load.
    pub fn is_dirty(&self) -> bool {
        self.tracker.revision() != self.saved_revision.get()
    }

    /// Number of live cached proxies.
    pub fn cached_proxies(&self) -> usize {
        self.tracker.cached()
    }

    /// Copy the variable bag into the store at [`store_path`](Self::store_path).
    pub fn save(&self) -> Result<(), EntityError> {
        let path = self.store_path();
        let bag = Value::Object(self.variables());
        self.store
            .try_borrow_mut()
            .map_err(|_| EntityError::StoreBusy)?
            .set_value_at(&path, bag, false)?;
        self.saved_revision.set(self.tracker.revision());
        debug!(entity = %self.id, "entity_saved");
        Ok(())
    }

    /// Replace the bag with the stored copy (empty if none) and drop every
    /// cached proxy.
    pub fn load(&self) -> Result<(), EntityError> {
        let path = self.store_path();
        let stored = {
            let store = self.store.try_borrow().map_err(|_| EntityError::StoreBusy)?;
            let found = store.get_value_at(&path).first().map(|v| (*v).clone());
            found
        };
        let found = stored.is_some();
        let bag = match stored {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        *self.root.borrow_mut() = Node::object(bag);
        self.tracker.clear();
        self.saved_revision.set(self.tracker.revision());
        debug!(entity = %self.id, found, "entity_loaded");
        Ok(())
    }
}

impl fmt::Debug for ReactiveEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEntity")
            .field("id", &self.id)
            .field("variables", &self.variables())
            .finish()
    }
}

/// Declare a typed view over a [`ReactiveEntity`].
///
/// Each `getter / setter: Type` pair maps to the variable named like the
/// getter:
///
/// ```
/// use narrative_state::reactive_fields;
/// use narrative_state::core::entity::ReactiveEntity;
/// use narrative_state::core::store::PathStore;
///
/// reactive_fields! {
///     pub struct Player {
///         hp / set_hp: i64,
///         name / set_name: String,
///     }
/// }
///
/// let player = Player::new(ReactiveEntity::new("player", PathStore::shared()));
/// player.set_hp(10).unwrap();
/// assert_eq!(player.hp(), Some(10));
/// ```
#[macro_export]
macro_rules! reactive_fields {
    ($vis:vis struct $name:ident { $($getter:ident / $setter:ident : $ty:ty),* $(,)? }) => {
        $vis struct $name {
            entity: $crate::core::entity::ReactiveEntity,
        }

        impl $name {
            $vis fn new(entity: $crate::core::entity::ReactiveEntity) -> Self {
                Self { entity }
            }

            $(
                $vis fn $getter(&self) -> Option<$ty> {
                    self.entity.get_as::<$ty>(stringify!($getter))
                }

                $vis fn $setter(
                    &self,
                    value: $ty,
                ) -> Result<(), $crate::core::entity::EntityError> {
                    self.entity.set_serialized(stringify!($getter), &value)
                }
            )*
        }

        impl std::ops::Deref for $name {
            type Target = $crate::core::entity::ReactiveEntity;

            fn deref(&self) -> &Self::Target {
                &self.entity
            }
        }
    };
}

//! Deep proxies over an entity's nested data.
//!
//! Nested objects and arrays live in shared nodes. A [`Proxy`] is a handle
//! onto one node; every write through it is visible to every other handle
//! on the same node. Each entity keeps a [`Tracker`] that caches exactly one
//! proxy per node (keyed by [`NodeId`]) and counts writes for dirty tracking.

use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use crate::core::entity::EntityError;
use crate::core::store::MAX_ARRAY_GAP;
use crate::schema::value::Special;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a nested container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Address of a member inside an object or array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    fn as_name(&self) -> String {
        match self {
            Key::Name(name) => name.clone(),
            Key::Index(index) => index.to_string(),
        }
    }

    fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Name(name) => name.parse().ok(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(index) => write!(f, "[{}]", index),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

pub(crate) enum Body {
    Object(BTreeMap<String, Slot>),
    Array(Vec<Slot>),
}

pub(crate) struct Node {
    id: NodeId,
    body: RefCell<Body>,
}

#[derive(Clone)]
pub(crate) enum Slot {
    Leaf(Value),
    Special(Special),
    Node(Rc<Node>),
}

impl Node {
    fn new(body: Body) -> Rc<Node> {
        Rc::new(Node {
            id: NodeId::next(),
            body: RefCell::new(body),
        })
    }

    pub(crate) fn object(map: Map<String, Value>) -> Rc<Node> {
        Node::new(Body::Object(
            map.into_iter()
                .map(|(k, v)| (k, Slot::from_json(v)))
                .collect(),
        ))
    }

    pub(crate) fn to_json(&self) -> Value {
        match &*self.body.borrow() {
            Body::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, slot)| (k.clone(), slot.to_json()))
                    .collect(),
            ),
            Body::Array(items) => Value::Array(items.iter().map(Slot::to_json).collect()),
        }
    }

    fn collect_ids(&self, out: &mut Vec<NodeId>) {
        out.push(self.id);
        let body = self.body.borrow();
        let children: Vec<&Slot> = match &*body {
            Body::Object(map) => map.values().collect(),
            Body::Array(items) => items.iter().collect(),
        };
        for child in children {
            if let Slot::Node(node) = child {
                node.collect_ids(out);
            }
        }
    }
}

impl Slot {
    /// Special tagged objects stay leaves; other containers become nodes.
    pub(crate) fn from_json(value: Value) -> Slot {
        if let Some(special) = Special::from_json(&value) {
            return Slot::Special(special);
        }
        match value {
            Value::Object(map) => Slot::Node(Node::object(map)),
            Value::Array(items) => Slot::Node(Node::new(Body::Array(
                items.into_iter().map(Slot::from_json).collect(),
            ))),
            leaf => Slot::Leaf(leaf),
        }
    }

    pub(crate) fn to_json(&self) -> Value {
        match self {
            Slot::Leaf(value) => value.clone(),
            Slot::Special(special) => special.to_json(),
            Slot::Node(node) => node.to_json(),
        }
    }
}

/// Per-entity proxy cache plus a write counter.
#[derive(Default)]
pub(crate) struct Tracker {
    cache: RefCell<FxHashMap<NodeId, Proxy>>,
    revision: Cell<u64>,
}

impl Tracker {
    pub(crate) fn revision(&self) -> u64 {
        self.revision.get()
    }

    pub(crate) fn touch(&self) {
        self.revision.set(self.revision.get() + 1);
    }

    pub(crate) fn cached(&self) -> usize {
        self.cache.borrow().len()
    }

    pub(crate) fn clear(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Drop the cached proxies of a replaced value and everything under it.
    fn evict(&self, old: &Slot) {
        if let Slot::Node(node) = old {
            let mut ids = Vec::new();
            node.collect_ids(&mut ids);
            let mut cache = self.cache.borrow_mut();
            for id in &ids {
                cache.remove(id);
            }
            trace!(root = node.id.0, evicted = ids.len(), "proxy_cache_evicted");
        }
    }
}

/// Cached proxy for `node`, minted on first access.
fn proxy_for(tracker: &Weak<Tracker>, node: &Rc<Node>) -> Proxy {
    let Some(strong) = tracker.upgrade() else {
        return Proxy::mint(node, tracker);
    };
    let mut cache = strong.cache.borrow_mut();
    let proxy = cache
        .entry(node.id)
        .or_insert_with(|| Proxy::mint(node, tracker))
        .clone();
    proxy
}

/// What a read hands back: a plain value, a special value, or a live proxy.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Value(Value),
    Special(Special),
    Proxy(Proxy),
}

impl Field {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_f64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_special(&self) -> Option<&Special> {
        match self {
            Field::Special(special) => Some(special),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Field::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn into_proxy(self) -> Option<Proxy> {
        match self {
            Field::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Plain JSON, with proxies dereferenced.
    pub fn to_json(&self) -> Value {
        match self {
            Field::Value(value) => value.clone(),
            Field::Special(special) => special.to_json(),
            Field::Proxy(proxy) => proxy.to_json(),
        }
    }

    pub(crate) fn into_slot(self) -> Slot {
        match self {
            Field::Value(value) => Slot::from_json(value),
            Field::Special(special) => Slot::Special(special),
            // Aliasing a node across fields is unsupported: store a copy.
            Field::Proxy(proxy) => Slot::from_json(proxy.to_json()),
        }
    }
}

/// Shared read/write logic for entity roots and proxies.
pub(crate) struct Cursor<'a> {
    pub(crate) node: &'a Rc<Node>,
    pub(crate) tracker: &'a Weak<Tracker>,
}

impl Cursor<'_> {
    pub(crate) fn get(&self, key: &Key) -> Option<Field> {
        let slot = {
            let body = self.node.body.borrow();
            match &*body {
                Body::Object(map) => map.get(&key.as_name()).cloned(),
                Body::Array(items) => key.as_index().and_then(|i| items.get(i).cloned()),
            }
        }?;
        Some(match slot {
            Slot::Leaf(value) => Field::Value(value),
            Slot::Special(special) => Field::Special(special),
            Slot::Node(node) => Field::Proxy(proxy_for(self.tracker, &node)),
        })
    }

    pub(crate) fn put(&self, key: Key, slot: Slot) -> Result<(), EntityError> {
        let old = {
            let mut body = self.node.body.borrow_mut();
            match &mut *body {
                Body::Object(map) => map.insert(key.as_name(), slot),
                Body::Array(items) => {
                    let index = key.as_index().ok_or_else(|| EntityError::KeyKind {
                        key: key.to_string(),
                        container: "array",
                    })?;
                    if index.saturating_sub(items.len()) > MAX_ARRAY_GAP {
                        return Err(EntityError::IndexTooFar {
                            index,
                            len: items.len(),
                        });
                    }
                    if items.len() <= index {
                        items.resize(index + 1, Slot::Leaf(Value::Null));
                        items[index] = slot;
                        None
                    } else {
                        Some(std::mem::replace(&mut items[index], slot))
                    }
                }
            }
        };
        self.written(old.as_ref());
        Ok(())
    }

    pub(crate) fn remove(&self, key: &Key) -> Option<Value> {
        let old = {
            let mut body = self.node.body.borrow_mut();
            match &mut *body {
                Body::Object(map) => map.remove(&key.as_name()),
                Body::Array(items) => match key.as_index() {
                    Some(i) if i < items.len() => Some(items.remove(i)),
                    _ => None,
                },
            }
        }?;
        self.written(Some(&old));
        Some(old.to_json())
    }

    pub(crate) fn push(&self, slot: Slot) -> Result<usize, EntityError> {
        let len = {
            let mut body = self.node.body.borrow_mut();
            match &mut *body {
                Body::Array(items) => {
                    items.push(slot);
                    items.len()
                }
                Body::Object(_) => {
                    return Err(EntityError::KeyKind {
                        key: "push".to_string(),
                        container: "object",
                    })
                }
            }
        };
        self.written(None);
        Ok(len)
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        match &*self.node.body.borrow() {
            Body::Object(map) => map.keys().cloned().collect(),
            Body::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match &*self.node.body.borrow() {
            Body::Object(map) => map.len(),
            Body::Array(items) => items.len(),
        }
    }

    fn written(&self, old: Option<&Slot>) {
        if let Some(tracker) = self.tracker.upgrade() {
            if let Some(old) = old {
                tracker.evict(old);
            }
            tracker.touch();
        }
    }
}

/// A live handle on a nested object or array of an entity.
///
/// Cloning a proxy yields the same proxy; [`Proxy::ptr_eq`] is the
/// referential equality consumers rely on.
#[derive(Clone)]
pub struct Proxy(Rc<ProxyInner>);

struct ProxyInner {
    node: Rc<Node>,
    tracker: Weak<Tracker>,
}

impl Proxy {
    fn mint(node: &Rc<Node>, tracker: &Weak<Tracker>) -> Proxy {
        trace!(node = node.id.0, "proxy_minted");
        Proxy(Rc::new(ProxyInner {
            node: Rc::clone(node),
            tracker: tracker.clone(),
        }))
    }

    fn cursor(&self) -> Cursor<'_> {
        Cursor {
            node: &self.0.node,
            tracker: &self.0.tracker,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.0.node.id
    }

    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_array(&self) -> bool {
        matches!(&*self.0.node.body.borrow(), Body::Array(_))
    }

    pub fn len(&self) -> usize {
        self.cursor().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Member names, or stringified indices for arrays.
    pub fn keys(&self) -> Vec<String> {
        self.cursor().keys()
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<Field> {
        self.cursor().get(&key.into())
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: impl Into<Key>) -> Option<T> {
        let field = self.get(key)?;
        serde_json::from_value(field.to_json()).ok()
    }

    /// Write a plain value. Writing past the end of an array pads it with nulls.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), EntityError> {
        self.cursor().put(key.into(), Slot::from_json(value.into()))
    }

    pub fn set_special(&self, key: impl Into<Key>, special: Special) -> Result<(), EntityError> {
        self.cursor().put(key.into(), Slot::Special(special))
    }

    pub fn assign(&self, key: impl Into<Key>, field: Field) -> Result<(), EntityError> {
        self.cursor().put(key.into(), field.into_slot())
    }

    /// Read-modify-write, the equivalent of `proxy[key] += ...`.
    pub fn update<F>(&self, key: impl Into<Key>, f: F) -> Result<(), EntityError>
    where
        F: FnOnce(Option<Field>) -> Value,
    {
        let key = key.into();
        let next = f(self.cursor().get(&key));
        self.cursor().put(key, Slot::from_json(next))
    }

    /// Remove a member. Array elements after it shift down.
    pub fn remove(&self, key: impl Into<Key>) -> Option<Value> {
        self.cursor().remove(&key.into())
    }

    /// Append to an array, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize, EntityError> {
        self.cursor().push(Slot::from_json(value.into()))
    }

    /// Deep, proxy-free copy of the node.
    pub fn to_json(&self) -> Value {
        self.0.node.to_json()
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("node", &self.0.node.id)
            .field("value", &self.to_json())
            .finish()
    }
}

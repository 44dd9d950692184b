//! Passage kinds (story screens, interactive maps, widgets) and their registry.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

use crate::core::display::{Deferred, DisplayCache, Displayable, Dynamic, PassageError, Renderable};
use crate::schema::content::{MapDisplay, ResolvedHotspot, StoryComponent};

pub type StoryProducer = Box<dyn FnMut() -> Result<Vec<StoryComponent>, PassageError>>;
pub type HotspotProducer = Box<dyn FnMut() -> Result<Vec<Hotspot>, PassageError>>;
pub type WidgetMarkup = Vec<StoryComponent>;

/// A story screen: its producer returns the components to render.
pub struct StoryPassage {
    id: String,
    title: Option<String>,
    tags: Vec<String>,
    producer: StoryProducer,
    cache: DisplayCache<Vec<StoryComponent>>,
}

impl StoryPassage {
    pub fn new<F>(id: &str, producer: F) -> Self
    where
        F: FnMut() -> Result<Vec<StoryComponent>, PassageError> + 'static,
    {
        Self {
            id: id.to_string(),
            title: None,
            tags: Vec::new(),
            producer: Box::new(producer),
            cache: DisplayCache::new(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl Displayable for StoryPassage {
    type Output = Vec<StoryComponent>;

    fn produce(&mut self) -> Result<Self::Output, PassageError> {
        (self.producer)()
    }

    fn display_cache(&self) -> &DisplayCache<Self::Output> {
        &self.cache
    }

    fn display_cache_mut(&mut self) -> &mut DisplayCache<Self::Output> {
        &mut self.cache
    }
}

/// A clickable region on an interactive map.
///
/// Label, image and disabled state may be computed; they are evaluated
/// once per display and only the results are cached.
#[derive(Debug)]
pub struct Hotspot {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub label: Option<Dynamic<String>>,
    pub image: Option<Dynamic<String>>,
    pub disabled: Dynamic<bool>,
    pub target: Option<String>,
}

impl Hotspot {
    pub fn new(id: &str, x: f32, y: f32) -> Self {
        Self {
            id: id.to_string(),
            x,
            y,
            label: None,
            image: None,
            disabled: Dynamic::Fixed(false),
            target: None,
        }
    }

    pub fn label(mut self, label: impl Into<Dynamic<String>>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn image(mut self, image: impl Into<Dynamic<String>>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn disabled(mut self, disabled: impl Into<Dynamic<bool>>) -> Self {
        self.disabled = disabled.into();
        self
    }

    /// Passage to navigate to when activated.
    pub fn target(mut self, passage_id: &str) -> Self {
        self.target = Some(passage_id.to_string());
        self
    }

    fn resolve(&self) -> ResolvedHotspot {
        ResolvedHotspot {
            id: self.id.clone(),
            x: self.x,
            y: self.y,
            label: self.label.as_ref().map(Dynamic::resolve),
            image: self.image.as_ref().map(Dynamic::resolve),
            disabled: self.disabled.resolve(),
            target: self.target.clone(),
        }
    }
}

/// An interactive map: an image plus a state-dependent set of hotspots.
pub struct MapPassage {
    id: String,
    image: Dynamic<String>,
    background: Option<Dynamic<String>>,
    hotspots: HotspotProducer,
    cache: DisplayCache<MapDisplay>,
}

impl MapPassage {
    pub fn new<F>(id: &str, image: impl Into<Dynamic<String>>, hotspots: F) -> Self
    where
        F: FnMut() -> Result<Vec<Hotspot>, PassageError> + 'static,
    {
        Self {
            id: id.to_string(),
            image: image.into(),
            background: None,
            hotspots: Box::new(hotspots),
            cache: DisplayCache::new(),
        }
    }

    pub fn with_background(mut self, background: impl Into<Dynamic<String>>) -> Self {
        self.background = Some(background.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Displayable for MapPassage {
    type Output = MapDisplay;

    fn produce(&mut self) -> Result<MapDisplay, PassageError> {
        let hotspots = (self.hotspots)()?;
        Ok(MapDisplay {
            image: self.image.resolve(),
            background: self.background.as_ref().map(Dynamic::resolve),
            hotspots: hotspots.iter().map(Hotspot::resolve).collect(),
        })
    }

    fn display_cache(&self) -> &DisplayCache<MapDisplay> {
        &self.cache
    }

    fn display_cache_mut(&mut self) -> &mut DisplayCache<MapDisplay> {
        &mut self.cache
    }
}

/// A reusable widget whose renderable unit is itself a function.
///
/// Displaying a widget never calls that function: the cache holds a
/// [`Renderable::Deferred`] and the renderer forces it inside its own
/// lifecycle.
pub struct WidgetPassage {
    id: String,
    render: Rc<dyn Fn() -> WidgetMarkup>,
    cache: DisplayCache<Renderable<WidgetMarkup>>,
}

impl WidgetPassage {
    pub fn new(id: &str, render: impl Fn() -> WidgetMarkup + 'static) -> Self {
        Self {
            id: id.to_string(),
            render: Rc::new(render),
            cache: DisplayCache::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Displayable for WidgetPassage {
    type Output = Renderable<WidgetMarkup>;

    fn produce(&mut self) -> Result<Self::Output, PassageError> {
        Ok(Renderable::Deferred(Deferred::from_rc(Rc::clone(&self.render))))
    }

    fn display_cache(&self) -> &DisplayCache<Self::Output> {
        &self.cache
    }

    fn display_cache_mut(&mut self) -> &mut DisplayCache<Self::Output> {
        &mut self.cache
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassageKind {
    Story,
    Map,
    Widget,
}

/// Any registered passage.
pub enum Passage {
    Story(StoryPassage),
    Map(MapPassage),
    Widget(WidgetPassage),
}

impl Passage {
    pub fn id(&self) -> &str {
        match self {
            Passage::Story(p) => p.id(),
            Passage::Map(p) => p.id(),
            Passage::Widget(p) => p.id(),
        }
    }

    pub fn kind(&self) -> PassageKind {
        match self {
            Passage::Story(_) => PassageKind::Story,
            Passage::Map(_) => PassageKind::Map,
            Passage::Widget(_) => PassageKind::Widget,
        }
    }

    pub fn has_display_cache(&self) -> bool {
        match self {
            Passage::Story(p) => p.has_display_cache(),
            Passage::Map(p) => p.has_display_cache(),
            Passage::Widget(p) => p.has_display_cache(),
        }
    }

    pub fn clear_display_cache(&mut self) {
        match self {
            Passage::Story(p) => p.clear_display_cache(),
            Passage::Map(p) => p.clear_display_cache(),
            Passage::Widget(p) => p.clear_display_cache(),
        }
    }
}

impl From<StoryPassage> for Passage {
    fn from(p: StoryPassage) -> Self {
        Passage::Story(p)
    }
}

impl From<MapPassage> for Passage {
    fn from(p: MapPassage) -> Self {
        Passage::Map(p)
    }
}

impl From<WidgetPassage> for Passage {
    fn from(p: WidgetPassage) -> Self {
        Passage::Widget(p)
    }
}

impl fmt::Debug for Passage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Passage")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("cached", &self.has_display_cache())
            .finish()
    }
}

/// All passages of a game, by id.
#[derive(Debug, Default)]
pub struct PassageRegistry {
    passages: HashMap<String, Passage>,
}

impl PassageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, passage: impl Into<Passage>) -> Result<(), PassageError> {
        let passage = passage.into();
        let id = passage.id().to_string();
        if self.passages.contains_key(&id) {
            return Err(PassageError::DuplicateId(id));
        }
        debug!(passage = %id, kind = ?passage.kind(), "passage_registered");
        self.passages.insert(id, passage);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Passage> {
        self.passages.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Passage> {
        self.passages.get_mut(id)
    }

    pub fn story_mut(&mut self, id: &str) -> Result<&mut StoryPassage, PassageError> {
        match self.passages.get_mut(id) {
            Some(Passage::Story(p)) => Ok(p),
            _ => Err(PassageError::NotFound(id.to_string())),
        }
    }

    pub fn map_mut(&mut self, id: &str) -> Result<&mut MapPassage, PassageError> {
        match self.passages.get_mut(id) {
            Some(Passage::Map(p)) => Ok(p),
            _ => Err(PassageError::NotFound(id.to_string())),
        }
    }

    pub fn widget_mut(&mut self, id: &str) -> Result<&mut WidgetPassage, PassageError> {
        match self.passages.get_mut(id) {
            Some(Passage::Widget(p)) => Ok(p),
            _ => Err(PassageError::NotFound(id.to_string())),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.passages.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.passages.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Forget every cached display, e.g. after a full game reset.
    /// Returns how many caches were populated.
    pub fn clear_display_caches(&mut self) -> usize {
        let mut cleared = 0;
        for passage in self.passages.values_mut() {
            if passage.has_display_cache() {
                cleared += 1;
            }
            passage.clear_display_cache();
        }
        debug!(cleared, "display_caches_cleared");
        cleared
    }
}

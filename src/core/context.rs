//! The game context: one store, its passages, its saves and its entities.

use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::config::{ConfigError, EngineConfig};
use crate::core::display::PassageError;
use crate::core::entity::{EntityError, ReactiveEntity};
use crate::core::passage::PassageRegistry;
use crate::core::persistence::{
    JsonFileBackend, MemoryBackend, PersistenceError, SaveBackend, SaveManager,
};
use crate::core::store::{PathStore, SharedStore};
use crate::schema::save::{SaveMeta, SaveRecord};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("entity error: {0}")]
    Entity(#[from] EntityError),
    #[error("passage error: {0}")]
    Passage(#[from] PassageError),
    #[error("the store is borrowed elsewhere")]
    StoreBusy,
}

/// Owns everything one running game needs.
///
/// Entities created with [`spawn_entity`](Self::spawn_entity) are tracked
/// weakly: they are saved before every snapshot and reloaded after every
/// load or reset, for as long as the caller keeps them alive.
#[derive(Debug)]
pub struct GameContext<B = Box<dyn SaveBackend>> {
    config: EngineConfig,
    store: SharedStore,
    passages: PassageRegistry,
    saves: SaveManager<B>,
    entities: Vec<Weak<ReactiveEntity>>,
}

/// Builder for [`GameContext`].
#[derive(Debug, Default)]
pub struct GameContextBuilder {
    config: Option<EngineConfig>,
    config_file: Option<PathBuf>,
    version: Option<String>,
    saves_dir: Option<PathBuf>,
}

impl GameContext {
    pub fn builder() -> GameContextBuilder {
        GameContextBuilder::default()
    }
}

impl<B: SaveBackend> GameContext<B> {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A handle to the shared store.
    pub fn store(&self) -> SharedStore {
        Rc::clone(&self.store)
    }

    pub fn passages(&self) -> &PassageRegistry {
        &self.passages
    }

    pub fn passages_mut(&mut self) -> &mut PassageRegistry {
        &mut self.passages
    }

    pub fn saves(&self) -> &SaveManager<B> {
        &self.saves
    }

    pub fn saves_mut(&mut self) -> &mut SaveManager<B> {
        &mut self.saves
    }

    /// An entity bound to this store, not tracked by the context.
    pub fn new_entity(&self, id: &str) -> ReactiveEntity {
        ReactiveEntity::new(id, self.store())
    }

    /// A tracked entity, initialized from whatever the store holds for it.
    pub fn spawn_entity(&mut self, id: &str) -> Result<Rc<ReactiveEntity>, ContextError> {
        let entity = Rc::new(self.new_entity(id));
        entity.load()?;
        self.entities.push(Rc::downgrade(&entity));
        debug!(entity = id, "entity_spawned");
        Ok(entity)
    }

    fn live_entities(&mut self) -> Vec<Rc<ReactiveEntity>> {
        self.entities.retain(|weak| weak.strong_count() > 0);
        self.entities.iter().filter_map(Weak::upgrade).collect()
    }

    fn save_entities(&mut self) -> Result<(), ContextError> {
        for entity in self.live_entities() {
            entity.save()?;
        }
        Ok(())
    }

    /// Reload tracked entities and drop every cached display.
    fn refresh(&mut self) -> Result<(), ContextError> {
        for entity in self.live_entities() {
            entity.load()?;
        }
        self.passages.clear_display_caches();
        Ok(())
    }

    /// Save tracked entities into the store, then snapshot it.
    pub fn save_game(&mut self, name: &str, meta: SaveMeta) -> Result<u64, ContextError> {
        self.save_entities()?;
        let store = self.store.try_borrow().map_err(|_| ContextError::StoreBusy)?;
        Ok(self.saves.save_game(&store, name, meta)?)
    }

    pub fn load_game(&mut self, name: &str) -> Result<SaveRecord, ContextError> {
        let record = {
            let mut store = self.store.try_borrow_mut().map_err(|_| ContextError::StoreBusy)?;
            self.saves.load_game(&mut store, name)?
        };
        self.refresh()?;
        Ok(record)
    }

    /// Record the current state as the starting point for [`new_game`](Self::new_game).
    pub fn capture_initial_state(&mut self) -> Result<u64, ContextError> {
        self.save_entities()?;
        let store = self.store.try_borrow().map_err(|_| ContextError::StoreBusy)?;
        Ok(self.saves.save_initial_state(&store)?)
    }

    /// Return to the captured initial state, or to an empty store if none
    /// was captured.
    pub fn new_game(&mut self) -> Result<(), ContextError> {
        {
            let mut store = self.store.try_borrow_mut().map_err(|_| ContextError::StoreBusy)?;
            if self.saves.has_initial_state()? {
                self.saves.restore_initial_state(&mut store)?;
            } else {
                store.reset();
            }
        }
        self.refresh()?;
        info!("new_game_started");
        Ok(())
    }

    /// Empty the store and clear every display cache.
    pub fn reset(&mut self) -> Result<(), ContextError> {
        self.store
            .try_borrow_mut()
            .map_err(|_| ContextError::StoreBusy)?
            .reset();
        self.refresh()?;
        info!("game_reset");
        Ok(())
    }
}

impl GameContextBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Read the config from a RON file at build time.
    pub fn config_file(mut self, path: &Path) -> Self {
        self.config_file = Some(path.to_path_buf());
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn saves_dir(mut self, dir: &Path) -> Self {
        self.saves_dir = Some(dir.to_path_buf());
        self
    }

    fn resolve_config(&mut self) -> Result<EngineConfig, ContextError> {
        let mut config = match (self.config.take(), self.config_file.take()) {
            (Some(config), _) => config,
            (None, Some(path)) => EngineConfig::load_from_ron(&path)?,
            (None, None) => EngineConfig::default(),
        };
        if let Some(version) = self.version.take() {
            config.game_version = version;
        }
        if let Some(dir) = self.saves_dir.take() {
            config.saves_dir = Some(dir);
        }
        Ok(config)
    }

    /// Build with an explicit backend; `saves_dir` is ignored.
    pub fn build_with_backend<B: SaveBackend>(
        mut self,
        backend: B,
    ) -> Result<GameContext<B>, ContextError> {
        let config = self.resolve_config()?;
        Ok(assemble(config, backend))
    }

    /// Build with a file backend when a saves directory is configured,
    /// otherwise in memory.
    pub fn build(mut self) -> Result<GameContext, ContextError> {
        let config = self.resolve_config()?;
        let backend: Box<dyn SaveBackend> = match &config.saves_dir {
            Some(dir) => Box::new(JsonFileBackend::open(dir)?),
            None => Box::new(MemoryBackend::new()),
        };
        Ok(assemble(config, backend))
    }
}

fn assemble<B: SaveBackend>(config: EngineConfig, backend: B) -> GameContext<B> {
    debug!(version = %config.game_version, "game_context_built");
    let saves = SaveManager::new(backend, &config.game_version);
    GameContext {
        config,
        store: PathStore::shared(),
        passages: PassageRegistry::default(),
        saves,
        entities: Vec::new(),
    }
}

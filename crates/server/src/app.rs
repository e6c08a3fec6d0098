//! Application use cases.
//!
//! [`Application`] is a cheap, cloneable handle. Sessions are reached only
//! through their strands; the directory sits behind an async mutex and the
//! player/token registries behind short-lived `RwLock`s that are never held
//! across an await.

use std::collections::HashMap;
use std::io;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
use std::time::Duration;

use fetchstate_sim::{
    DogId, Game, Map, MapId, PlayerId, PlayerRecord, RetiredDog, SessionId, World, WorldSettings,
};
use fetchstate_snapshot::{SnapshotError, WorldRecord, read_snapshot, validate, write_snapshot};
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::ServerConfig;
use crate::directory::{DirectoryEvent, SessionDirectory};
use crate::error::AppError;
use crate::players::{Player, PlayerRegistry, Token, TokenRegistry};
use crate::records::RecordStore;
use crate::session::{Command, SessionHandle, Strand};
use crate::ticker::Ticker;
use crate::view::{
    GameState, JoinResult, LostObjectView, MapInfo, MoveCommand, PlayerInfo, PlayerView,
};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    game: Game,
    config: ServerConfig,
    directory: AsyncMutex<SessionDirectory>,
    players: RwLock<PlayerRegistry>,
    tokens: RwLock<TokenRegistry>,
    records: Arc<dyn RecordStore>,
    events: mpsc::UnboundedSender<DirectoryEvent>,
    /// Manual tick time since the last autosave.
    since_save: Mutex<Duration>,
    save_ticker: Mutex<Option<Ticker>>,
}

#[derive(Clone)]
pub struct Application {
    inner: Arc<Inner>,
}

impl Application {
    /// Must be called from within a tokio runtime.
    pub fn new(
        game: Game,
        config: ServerConfig,
        records: Arc<dyn RecordStore>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let (events, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            game,
            config,
            directory: AsyncMutex::new(SessionDirectory::new()),
            players: RwLock::new(PlayerRegistry::new()),
            tokens: RwLock::new(TokenRegistry::new()),
            records,
            events,
            since_save: Mutex::new(Duration::ZERO),
            save_ticker: Mutex::new(None),
        });
        tokio::spawn(pump(Arc::downgrade(&inner), events_rx));

        let app = Self { inner };
        if let (Some(_), Some(period)) = (
            app.inner.config.tick_period,
            app.inner.config.save_state_period,
        ) {
            *lock(&app.inner.save_ticker) = Some(app.start_save_ticker(period));
        }
        Ok(app)
    }

    fn start_save_ticker(&self, period: Duration) -> Ticker {
        let weak = Arc::downgrade(&self.inner);
        Ticker::start(period, move |_| {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return false;
                };
                if let Err(err) = (Application { inner }).save_state().await {
                    warn!(error = %err, "periodic_save_failed");
                }
                true
            }
        })
    }

    pub fn game(&self) -> &Game {
        &self.inner.game
    }

    pub async fn session_count(&self) -> usize {
        self.inner.directory.lock().await.len()
    }

    // ------------------------------------------------------------------------
    // Maps and players
    // ------------------------------------------------------------------------

    pub fn list_maps(&self) -> Vec<MapInfo> {
        self.inner
            .game
            .maps()
            .iter()
            .map(|map| MapInfo {
                id: map.id().clone(),
                name: map.name().to_string(),
            })
            .collect()
    }

    pub fn find_map(&self, map_id: &MapId) -> Result<Arc<Map>, AppError> {
        self.inner
            .game
            .find_map(map_id)
            .cloned()
            .ok_or_else(|| AppError::UnknownMap(map_id.clone()))
    }

    /// Put a new dog called `name` on `map_id`, starting the map's session
    /// if none is live.
    pub async fn join(&self, map_id: &MapId, name: &str) -> Result<JoinResult, AppError> {
        if name.is_empty() {
            return Err(AppError::EmptyName);
        }
        let map = self.find_map(map_id)?;
        let inner = &self.inner;

        let mut directory = inner.directory.lock().await;
        let (session_id, created) = match directory.find_by_map(map_id) {
            Some(handle) => (handle.id(), false),
            None => {
                let session_id = directory.allocate_id();
                let world = World::new(session_id, map, inner.world_settings(session_id));
                directory
                    .insert(SessionHandle::spawn(world, inner.events.clone()))
                    .map_err(|handle| AppError::SessionConflict(handle.id()))?;
                info!(session_id, map_id = %map_id, "session_created");
                (session_id, true)
            }
        };
        let strand = directory
            .get(session_id)
            .map(|handle| handle.strand().clone())
            .ok_or(AppError::SessionClosed(session_id))?;

        let (dog_id, spawn) = strand
            .request(|reply| Command::AddDog {
                name: name.to_string(),
                randomize_spawn: inner.config.randomize_spawn_points,
                reply,
            })
            .await?;
        let player = write(&inner.players).add(session_id, dog_id, name);
        let token = write(&inner.tokens).issue(player.id);

        // Activities start only once the first player is bound.
        if created {
            if let Some(handle) = directory.get_mut(session_id) {
                handle.start_activities(inner.game.loot_generator().period, inner.config.tick_period);
            }
        }
        drop(directory);

        info!(
            player_id = player.id,
            session_id,
            dog_id,
            player_name = name,
            x = spawn.x,
            y = spawn.y,
            "player_joined"
        );
        Ok(JoinResult {
            token,
            player_id: player.id,
        })
    }

    fn player_for(&self, token: &str) -> Result<Player, AppError> {
        let token = Token::parse(token).ok_or(AppError::UnknownToken)?;
        let player_id = read(&self.inner.tokens)
            .resolve(&token)
            .ok_or(AppError::UnknownToken)?;
        read(&self.inner.players)
            .get(player_id)
            .cloned()
            .ok_or(AppError::UnknownToken)
    }

    async fn strand_of(&self, session_id: SessionId) -> Result<Strand, AppError> {
        self.inner
            .directory
            .lock()
            .await
            .get(session_id)
            .map(|handle| handle.strand().clone())
            .ok_or(AppError::SessionClosed(session_id))
    }

    pub async fn move_player(&self, token: &str, command: MoveCommand) -> Result<(), AppError> {
        let player = self.player_for(token)?;
        let strand = self.strand_of(player.session_id).await?;
        strand
            .request(|reply| Command::SetDirection {
                dog_id: player.dog_id,
                direction: command.direction(),
                reply,
            })
            .await??;
        Ok(())
    }

    /// Players sharing the caller's session, newest first.
    pub fn list_players(&self, token: &str) -> Result<Vec<PlayerInfo>, AppError> {
        let player = self.player_for(token)?;
        Ok(read(&self.inner.players)
            .in_session(player.session_id)
            .rev()
            .map(|p| PlayerInfo {
                id: p.id,
                name: p.name.clone(),
            })
            .collect())
    }

    pub async fn game_state(&self, token: &str) -> Result<GameState, AppError> {
        let player = self.player_for(token)?;
        let strand = self.strand_of(player.session_id).await?;
        let view = strand.request(|reply| Command::View { reply }).await?;

        let mut players: Vec<PlayerView> = {
            let registry = read(&self.inner.players);
            view.dogs
                .into_iter()
                .filter_map(|dog| {
                    let owner = registry.find_by_dog(player.session_id, dog.id)?;
                    Some(PlayerView {
                        player_id: owner.id,
                        position: dog.position,
                        speed: dog.speed,
                        direction: dog.direction,
                        bag: dog.bag,
                        score: dog.score,
                    })
                })
                .collect()
        };
        players.sort_by(|a, b| b.player_id.cmp(&a.player_id));

        let lost_objects = view
            .lost_objects
            .into_iter()
            .rev()
            .map(|obj| LostObjectView {
                id: obj.id,
                kind: obj.kind,
                position: obj.position,
            })
            .collect();

        Ok(GameState {
            players,
            lost_objects,
        })
    }

    pub fn records(
        &self,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<PlayerRecord>, AppError> {
        let max = self.inner.config.records_limit;
        let limit = limit.unwrap_or(max);
        if limit > max {
            return Err(AppError::BadRecordsLimit { limit, max });
        }
        Ok(self.inner.records.query(offset.unwrap_or(0), limit)?)
    }

    // ------------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------------

    /// Advance every session by `delta` and wait until all of them, and the
    /// events they raised, are done.
    pub async fn tick(&self, delta: Duration) -> Result<(), AppError> {
        let strands = self.inner.directory.lock().await.strands();

        let mut acks = Vec::with_capacity(strands.len());
        for strand in &strands {
            let (done, ack) = oneshot::channel();
            let command = Command::Tick {
                delta,
                done: Some(done),
            };
            if strand.send(command).is_ok() {
                acks.push(ack);
            }
        }
        for ack in acks {
            let _ = ack.await;
        }
        self.flush_events().await;

        if self.inner.config.tick_period.is_none() {
            self.autosave(delta).await;
        }
        Ok(())
    }

    async fn flush_events(&self) {
        let (done, flushed) = oneshot::channel();
        if self.inner.events.send(DirectoryEvent::Flush(done)).is_ok() {
            let _ = flushed.await;
        }
    }

    /// A failed save is logged and retried on the next tick; the ticks
    /// themselves have already been applied.
    async fn autosave(&self, delta: Duration) {
        let Some(period) = self.inner.config.save_state_period else {
            return;
        };
        let due = {
            let mut since = lock(&self.inner.since_save);
            *since += delta;
            *since >= period
        };
        if !due {
            return;
        }
        match self.save_state().await {
            Ok(_) => *lock(&self.inner.since_save) = Duration::ZERO,
            Err(err) => warn!(error = %err, "periodic_save_failed"),
        }
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Record every live session. Dogs retired but not yet reported are left
    /// out of their sessions.
    pub async fn capture(&self) -> Result<WorldRecord, AppError> {
        let directory = self.inner.directory.lock().await;
        let mut sessions = Vec::with_capacity(directory.len());
        for handle in directory.handles() {
            let bindings = self.inner.bindings(handle.id());
            let record = handle
                .strand()
                .request(|reply| Command::Capture { bindings, reply })
                .await?;
            sessions.push(record);
        }
        let next_player_id = read(&self.inner.players).next_id();
        Ok(WorldRecord {
            sessions,
            next_player_id,
            next_session_id: directory.next_session_id(),
        })
    }

    /// Write a snapshot to the configured state file. Returns `false` when
    /// no state file is configured.
    pub async fn save_state(&self) -> Result<bool, AppError> {
        let Some(path) = self.inner.config.state_file.clone() else {
            return Ok(false);
        };
        let record = self.capture().await?;
        if let Err(err) = write_snapshot(&path, &record) {
            warn!(path = %path.display(), error = %err, "state_save_failed");
            return Err(err.into());
        }
        info!(
            path = %path.display(),
            sessions = record.sessions.len(),
            "state_saved"
        );
        Ok(true)
    }

    /// Restore from the configured state file. Returns `false` when there
    /// is nothing to restore.
    pub async fn restore_state(&self) -> Result<bool, AppError> {
        let Some(path) = self.inner.config.state_file.clone() else {
            return Ok(false);
        };
        let record = match read_snapshot(&path) {
            Ok(record) => record,
            Err(SnapshotError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "state_file_absent");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };
        self.restore(record).await?;
        Ok(true)
    }

    /// Rebuild sessions and players from `record`.
    ///
    /// Everything is checked before the first session starts, so a failed
    /// restore leaves the application untouched.
    pub async fn restore(&self, record: WorldRecord) -> Result<(), AppError> {
        validate(&record)?;
        let inner = &self.inner;

        let mut directory = inner.directory.lock().await;
        if !directory.is_empty() || !read(&inner.players).is_empty() {
            return Err(AppError::AlreadyRunning);
        }

        let mut worlds = Vec::with_capacity(record.sessions.len());
        let mut bound = Vec::new();
        for session in &record.sessions {
            if session.players.is_empty() {
                debug!(session_id = session.session_id, "empty_session_skipped");
                continue;
            }
            let map = self.find_map(&session.map_id)?;
            let world = session.build_world(map, inner.world_settings(session.session_id))?;
            for entry in &session.players {
                let token = Token::parse(&entry.token).ok_or(AppError::UnknownToken)?;
                let player = Player {
                    id: entry.player_id,
                    session_id: session.session_id,
                    dog_id: entry.dog.id,
                    name: entry.dog.name.clone(),
                };
                bound.push((player, token));
            }
            worlds.push(world);
        }

        let player_count = bound.len();
        {
            let mut players = write(&inner.players);
            let mut tokens = write(&inner.tokens);
            for (player, token) in bound {
                let player_id = player.id;
                players.insert(player)?;
                tokens.insert(token, player_id)?;
            }
            players.reserve(record.next_player_id);
        }

        directory.reserve(record.next_session_id);
        let session_count = worlds.len();
        for world in worlds {
            let session_id = world.id();
            directory
                .insert(SessionHandle::spawn(world, inner.events.clone()))
                .map_err(|handle| AppError::SessionConflict(handle.id()))?;
            if let Some(handle) = directory.get_mut(session_id) {
                handle.start_activities(inner.game.loot_generator().period, inner.config.tick_period);
            }
        }

        info!(
            sessions = session_count,
            players = player_count,
            "state_restored"
        );
        Ok(())
    }

    /// Stop all timers, let in-flight work finish, then take the final
    /// snapshot.
    pub async fn shutdown(&self) -> Result<bool, AppError> {
        info!(reason = "shutdown_requested", "application_stopping");
        let save_ticker = lock(&self.inner.save_ticker).take();
        drop(save_ticker);

        let strands = {
            let mut directory = self.inner.directory.lock().await;
            for handle in directory.handles_mut() {
                handle.stop_activities();
            }
            directory.strands()
        };
        for strand in &strands {
            if strand.sync().await.is_err() {
                warn!(session_id = strand.session_id(), "session_strand_closed");
            }
        }
        self.flush_events().await;

        let saved = self.save_state().await?;
        info!(saved, "application_stopped");
        Ok(saved)
    }
}

impl Inner {
    fn world_settings(&self, session_id: SessionId) -> WorldSettings {
        let seed = match self.config.seed {
            Some(base) => base.wrapping_add(u64::from(session_id)),
            None => rand::random(),
        };
        WorldSettings::from_game(&self.game, seed)
    }

    fn bindings(&self, session_id: SessionId) -> HashMap<DogId, (PlayerId, String)> {
        let players = read(&self.players);
        let tokens = read(&self.tokens);
        players
            .in_session(session_id)
            .filter_map(|p| {
                tokens
                    .token_of(p.id)
                    .map(|token| (p.dog_id, (p.id, token.as_str().to_string())))
            })
            .collect()
    }

    fn finish_players(&self, session_id: SessionId, retired: Vec<RetiredDog>) {
        let mut records = Vec::with_capacity(retired.len());
        {
            let mut players = write(&self.players);
            let mut tokens = write(&self.tokens);
            for RetiredDog { dog_id, record } in retired {
                if let Some(player) = players.remove_by_dog(session_id, dog_id) {
                    tokens.remove_player(player.id);
                    info!(
                        player_id = player.id,
                        session_id,
                        dog_id,
                        score = record.score,
                        play_time_ms = record.play_time.as_millis() as u64,
                        "player_retired"
                    );
                }
                records.push(record);
            }
        }
        if let Err(err) = self.records.save(&records) {
            warn!(session_id, count = records.len(), error = %err, "record_store_save_failed");
        }
    }

    async fn drop_if_empty(&self, session_id: SessionId) {
        let mut directory = self.directory.lock().await;
        let Some(strand) = directory.get(session_id).map(|h| h.strand().clone()) else {
            return;
        };
        // A join may have landed between the event and now.
        match strand.request(|reply| Command::DogCount { reply }).await {
            Ok(0) | Err(_) => {
                directory.remove(session_id);
                info!(session_id, "session_removed");
            }
            Ok(dogs) => debug!(session_id, dogs, "session_repopulated"),
        }
    }
}

async fn pump(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<DirectoryEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match event {
            DirectoryEvent::PlayersFinished {
                session_id,
                retired,
            } => inner.finish_players(session_id, retired),
            DirectoryEvent::SessionEmptied { session_id } => inner.drop_if_empty(session_id).await,
            DirectoryEvent::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

//! Session execution contexts.
//!
//! Each live session owns its [`World`] inside a single tokio task (its
//! strand) that drains a command queue. Commands for one session are applied
//! strictly in arrival order; different sessions run in parallel on the
//! runtime's worker pool.

use std::collections::HashMap;
use std::time::Duration;

use fetchstate_sim::{
    Direction, DogId, DogState, LostObject, MapId, PlayerId, Point2D, SessionId, World, WorldError,
};
use fetchstate_snapshot::SessionRecord;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::directory::DirectoryEvent;
use crate::error::AppError;
use crate::ticker::Ticker;

/// Read-only copy of a session's actors, ascending ids.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub dogs: Vec<DogState>,
    pub lost_objects: Vec<LostObject>,
}

pub(crate) enum Command {
    AddDog {
        name: String,
        randomize_spawn: bool,
        reply: oneshot::Sender<(DogId, Point2D)>,
    },
    SetDirection {
        dog_id: DogId,
        direction: Option<Direction>,
        reply: oneshot::Sender<Result<(), WorldError>>,
    },
    Tick {
        delta: Duration,
        done: Option<oneshot::Sender<()>>,
    },
    GenerateLoot {
        delta: Duration,
    },
    View {
        reply: oneshot::Sender<SessionView>,
    },
    Capture {
        bindings: HashMap<DogId, (PlayerId, String)>,
        reply: oneshot::Sender<SessionRecord>,
    },
    DogCount {
        reply: oneshot::Sender<usize>,
    },
    Sync {
        reply: oneshot::Sender<()>,
    },
}

// ============================================================================
// Strand
// ============================================================================

/// Handle for submitting work to one session's task.
#[derive(Debug, Clone)]
pub struct Strand {
    session_id: SessionId,
    tx: mpsc::UnboundedSender<Command>,
}

impl Strand {
    /// Move `world` into a new task and return the handle feeding it.
    pub(crate) fn spawn(world: World, events: mpsc::UnboundedSender<DirectoryEvent>) -> Self {
        let session_id = world.id();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(world, rx, events));
        Self { session_id, tx }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub(crate) fn send(&self, command: Command) -> Result<(), AppError> {
        self.tx
            .send(command)
            .map_err(|_| AppError::SessionClosed(self.session_id))
    }

    /// Submit a command and wait for its reply.
    pub(crate) async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| AppError::SessionClosed(self.session_id))
    }

    /// Resolves once every command queued before it has been applied.
    pub(crate) async fn sync(&self) -> Result<(), AppError> {
        self.request(|reply| Command::Sync { reply }).await
    }
}

async fn run(
    mut world: World,
    mut rx: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<DirectoryEvent>,
) {
    let session_id = world.id();
    while let Some(command) = rx.recv().await {
        match command {
            Command::AddDog {
                name,
                randomize_spawn,
                reply,
            } => {
                let spawn = world.spawn_point(randomize_spawn);
                let dog_id = world.add_dog(name, spawn);
                let _ = reply.send((dog_id, spawn));
            }
            Command::SetDirection {
                dog_id,
                direction,
                reply,
            } => {
                let _ = reply.send(world.set_dog_direction(dog_id, direction));
            }
            Command::Tick { delta, done } => {
                let outcome = world.tick(delta);
                // Events go out before the ack so a flush after the ack sees them.
                if !outcome.retired.is_empty() {
                    let event = DirectoryEvent::PlayersFinished {
                        session_id,
                        retired: outcome.retired,
                    };
                    if events.send(event).is_err() {
                        warn!(session_id, "directory_events_closed");
                    }
                }
                if outcome.emptied {
                    let _ = events.send(DirectoryEvent::SessionEmptied { session_id });
                }
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Command::GenerateLoot { delta } => {
                let placed = world.generate_loot(delta);
                if placed > 0 {
                    debug!(session_id, placed, "loot_generated");
                }
            }
            Command::View { reply } => {
                let _ = reply.send(SessionView {
                    dogs: world.dogs().map(|dog| dog.state().clone()).collect(),
                    lost_objects: world.lost_objects().cloned().collect(),
                });
            }
            Command::Capture { bindings, reply } => {
                let record = SessionRecord::capture(&world, |dog_id| bindings.get(&dog_id).cloned());
                let _ = reply.send(record);
            }
            Command::DogCount { reply } => {
                let _ = reply.send(world.dog_count());
            }
            Command::Sync { reply } => {
                let _ = reply.send(());
            }
        }
    }
    debug!(session_id, "session_strand_closed");
}

// ============================================================================
// Session Handle
// ============================================================================

/// Directory entry for a live session: its strand and periodic activities.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    map_id: MapId,
    strand: Strand,
    tickers: Vec<Ticker>,
}

impl SessionHandle {
    pub(crate) fn spawn(world: World, events: mpsc::UnboundedSender<DirectoryEvent>) -> Self {
        let id = world.id();
        let map_id = world.map().id().clone();
        Self {
            id,
            map_id,
            strand: Strand::spawn(world, events),
            tickers: Vec::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn map_id(&self) -> &MapId {
        &self.map_id
    }

    pub fn strand(&self) -> &Strand {
        &self.strand
    }

    pub fn has_activities(&self) -> bool {
        !self.tickers.is_empty()
    }

    /// Start loot spawning and, with `tick_period`, autonomous state ticks.
    pub(crate) fn start_activities(&mut self, loot_period: Duration, tick_period: Option<Duration>) {
        if self.has_activities() {
            return;
        }
        if !loot_period.is_zero() {
            let strand = self.strand.clone();
            self.tickers.push(Ticker::start(loot_period, move |delta| {
                let alive = strand.send(Command::GenerateLoot { delta }).is_ok();
                async move { alive }
            }));
        }
        if let Some(period) = tick_period {
            let strand = self.strand.clone();
            self.tickers.push(Ticker::start(period, move |delta| {
                let alive = strand.send(Command::Tick { delta, done: None }).is_ok();
                async move { alive }
            }));
        }
    }

    pub(crate) fn stop_activities(&mut self) {
        self.tickers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fetchstate_sim::{LootGeneratorConfig, Map, Point, Road, WorldSettings};

    const SECOND: Duration = Duration::from_secs(1);

    fn world(retirement: Duration) -> World {
        let mut map = Map::new(MapId::new("town"), "Town");
        map.add_road(Road::horizontal(Point::new(0, 0), 10));
        World::new(
            3,
            Arc::new(map),
            WorldSettings {
                loot: LootGeneratorConfig {
                    period: SECOND,
                    probability: 0.0,
                },
                retirement_time: retirement,
                seed: 0,
            },
        )
    }

    async fn tick(strand: &Strand, delta: Duration) {
        let (done, rx) = oneshot::channel();
        strand.send(Command::Tick { delta, done: Some(done) }).unwrap();
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_apply_in_order() {
        let (events, _events_rx) = mpsc::unbounded_channel();
        let strand = Strand::spawn(world(Duration::from_secs(60)), events);

        let (dog_id, spawn) = strand
            .request(|reply| Command::AddDog {
                name: "Rex".into(),
                randomize_spawn: false,
                reply,
            })
            .await
            .unwrap();
        assert_eq!(dog_id, 0);
        assert_eq!(spawn, Point2D::new(0.0, 0.0));

        strand
            .request(|reply| Command::SetDirection {
                dog_id,
                direction: Some(Direction::East),
                reply,
            })
            .await
            .unwrap()
            .unwrap();
        tick(&strand, SECOND * 2).await;

        let view = strand.request(|reply| Command::View { reply }).await.unwrap();
        assert_eq!(view.dogs.len(), 1);
        assert_eq!(view.dogs[0].position, Point2D::new(2.0, 0.0));
    }

    #[tokio::test]
    async fn test_unknown_dog_reported() {
        let (events, _events_rx) = mpsc::unbounded_channel();
        let strand = Strand::spawn(world(Duration::from_secs(60)), events);
        let result = strand
            .request(|reply| Command::SetDirection {
                dog_id: 4,
                direction: None,
                reply,
            })
            .await
            .unwrap();
        assert_eq!(result, Err(WorldError::UnknownDog(4)));
    }

    #[tokio::test]
    async fn test_retirement_emits_events_before_ack() {
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let strand = Strand::spawn(world(SECOND), events);
        strand
            .request(|reply| Command::AddDog {
                name: "Rex".into(),
                randomize_spawn: false,
                reply,
            })
            .await
            .unwrap();

        tick(&strand, SECOND).await;

        match events_rx.try_recv().unwrap() {
            DirectoryEvent::PlayersFinished { session_id, retired } => {
                assert_eq!(session_id, 3);
                assert_eq!(retired.len(), 1);
                assert_eq!(retired[0].record.name, "Rex");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            events_rx.try_recv().unwrap(),
            DirectoryEvent::SessionEmptied { session_id: 3 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activities_start_once_and_stop() {
        let (events, _events_rx) = mpsc::unbounded_channel();
        let mut handle = SessionHandle::spawn(world(Duration::from_secs(60)), events);
        assert!(!handle.has_activities());

        handle.start_activities(SECOND, Some(SECOND / 10));
        assert_eq!(handle.tickers.len(), 2);
        handle.start_activities(SECOND, Some(SECOND / 10));
        assert_eq!(handle.tickers.len(), 2);

        handle.stop_activities();
        assert!(!handle.has_activities());
        handle.strand().sync().await.unwrap();
    }
}

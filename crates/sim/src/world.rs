//! Per-session simulation state and its tick.
//!
//! A [`World`] is one live instance of a map. It is not internally
//! synchronized; the server confines each world to a single task.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::collision::{Gatherer, Item, find_gather_events};
use crate::dog::{Direction, Dog, DogState, FoundObject, LostObject, PlayerRecord};
use crate::geom::{Point2D, lerp};
use crate::loot::LootGenerator;
use crate::model::{Game, LootGeneratorConfig, Map};
use crate::{DOG_GATHER_RADIUS, DogId, LOST_OBJECT_RADIUS, LostObjectId, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("dog {0} not found")]
    UnknownDog(DogId),
    #[error("dog {0} already exists")]
    DuplicateDog(DogId),
    #[error("lost object {0} already exists")]
    DuplicateLostObject(LostObjectId),
    #[error("dog {dog} carries {len} items, capacity is {capacity}")]
    BagOverflow {
        dog: DogId,
        len: usize,
        capacity: usize,
    },
    #[error("id {0} leaves no room for later ids")]
    IdSpaceExhausted(u32),
}

fn id_after(id: u32) -> Result<u32, WorldError> {
    id.checked_add(1).ok_or(WorldError::IdSpaceExhausted(id))
}

/// Game-wide tuning every world of a [`Game`] shares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldSettings {
    pub loot: LootGeneratorConfig,
    pub retirement_time: Duration,
    /// Seed of the world's spawn RNG.
    pub seed: u64,
}

impl WorldSettings {
    pub fn from_game(game: &Game, seed: u64) -> Self {
        Self {
            loot: game.loot_generator(),
            retirement_time: game.dog_retirement_time(),
            seed,
        }
    }
}

/// A dog removed for idling, with the result it earned.
#[derive(Debug, Clone, PartialEq)]
pub struct RetiredDog {
    pub dog_id: DogId,
    pub record: PlayerRecord,
}

/// What happened during one [`World::tick`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickOutcome {
    /// Retired dogs in ascending id order.
    pub retired: Vec<RetiredDog>,
    /// The world had dogs before this tick and has none after it.
    pub emptied: bool,
}

/// Gather target behind an item index.
#[derive(Debug, Clone, Copy)]
enum Target {
    Lost(LostObjectId),
    Office,
}

pub struct World {
    id: SessionId,
    map: Arc<Map>,
    dogs: BTreeMap<DogId, Dog>,
    lost_objects: BTreeMap<LostObjectId, LostObject>,
    next_dog_id: DogId,
    next_lost_object_id: LostObjectId,
    loot: LootGenerator,
    retirement_time: Duration,
    rng: ChaCha8Rng,
}

impl World {
    pub fn new(id: SessionId, map: Arc<Map>, settings: WorldSettings) -> Self {
        Self {
            id,
            map,
            dogs: BTreeMap::new(),
            lost_objects: BTreeMap::new(),
            next_dog_id: 0,
            next_lost_object_id: 0,
            loot: LootGenerator::new(settings.loot.period, settings.loot.probability),
            retirement_time: settings.retirement_time,
            rng: ChaCha8Rng::seed_from_u64(settings.seed),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn map(&self) -> &Arc<Map> {
        &self.map
    }

    /// Live dogs in ascending id order.
    pub fn dogs(&self) -> impl DoubleEndedIterator<Item = &Dog> {
        self.dogs.values()
    }

    pub fn dog(&self, id: DogId) -> Option<&Dog> {
        self.dogs.get(&id)
    }

    pub fn dog_count(&self) -> usize {
        self.dogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dogs.is_empty()
    }

    /// Live lost objects in ascending id order.
    pub fn lost_objects(&self) -> impl DoubleEndedIterator<Item = &LostObject> {
        self.lost_objects.values()
    }

    pub fn next_dog_id(&self) -> DogId {
        self.next_dog_id
    }

    pub fn next_lost_object_id(&self) -> LostObjectId {
        self.next_lost_object_id
    }

    // ------------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------------

    pub fn add_dog(&mut self, name: impl Into<String>, position: Point2D) -> DogId {
        let id = self.next_dog_id;
        self.next_dog_id += 1;
        self.dogs
            .insert(id, Dog::new(id, name, position, self.map.bag_capacity()));
        id
    }

    /// Re-insert a persisted dog, keeping its id. Lost-object ids are
    /// allocated past everything in its bag.
    pub fn restore_dog(&mut self, state: DogState) -> Result<(), WorldError> {
        if self.dogs.contains_key(&state.id) {
            return Err(WorldError::DuplicateDog(state.id));
        }
        if state.bag.len() > state.bag_capacity {
            return Err(WorldError::BagOverflow {
                dog: state.id,
                len: state.bag.len(),
                capacity: state.bag_capacity,
            });
        }
        let next_dog_id = id_after(state.id)?;
        let mut next_lost_object_id = self.next_lost_object_id;
        for item in &state.bag {
            next_lost_object_id = next_lost_object_id.max(id_after(item.id)?);
        }
        self.next_dog_id = self.next_dog_id.max(next_dog_id);
        self.next_lost_object_id = next_lost_object_id;
        self.dogs.insert(state.id, Dog::from_state(state));
        Ok(())
    }

    /// Place a lost object of loot type `kind`. Unknown types are worth 0.
    pub fn add_lost_object(&mut self, kind: usize, position: Point2D) -> LostObjectId {
        let id = self.next_lost_object_id;
        self.next_lost_object_id += 1;
        let value = self.map.loot_value(kind).unwrap_or(0);
        self.lost_objects.insert(
            id,
            LostObject {
                id,
                kind,
                position,
                value,
            },
        );
        id
    }

    pub fn restore_lost_object(&mut self, obj: LostObject) -> Result<(), WorldError> {
        if self.lost_objects.contains_key(&obj.id) {
            return Err(WorldError::DuplicateLostObject(obj.id));
        }
        self.next_lost_object_id = self.next_lost_object_id.max(id_after(obj.id)?);
        self.lost_objects.insert(obj.id, obj);
        Ok(())
    }

    /// Raise the id counters to at least the given values. Never lowers them.
    pub fn reserve_ids(&mut self, next_dog_id: DogId, next_lost_object_id: LostObjectId) {
        self.next_dog_id = self.next_dog_id.max(next_dog_id);
        self.next_lost_object_id = self.next_lost_object_id.max(next_lost_object_id);
    }

    /// Spawn point for a new dog: the first road's start, or a uniformly
    /// random road point when `randomize` is set.
    pub fn spawn_point(&mut self, randomize: bool) -> Point2D {
        if randomize {
            if let Some(point) = self.random_road_point() {
                return point;
            }
        }
        self.map.default_spawn().unwrap_or_default()
    }

    fn random_road_point(&mut self) -> Option<Point2D> {
        let roads = self.map.roads();
        if roads.is_empty() {
            return None;
        }
        let road = roads[self.rng.gen_range(0..roads.len())];
        let t: f64 = self.rng.r#gen();
        Some(lerp(road.start(), road.end(), t))
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    pub fn set_dog_direction(
        &mut self,
        dog_id: DogId,
        direction: Option<Direction>,
    ) -> Result<(), WorldError> {
        let speed = self.map.dog_speed();
        let dog = self
            .dogs
            .get_mut(&dog_id)
            .ok_or(WorldError::UnknownDog(dog_id))?;
        dog.set_direction(direction, speed);
        Ok(())
    }

    /// Spawn loot for `dt` of elapsed time. Returns the number placed.
    pub fn generate_loot(&mut self, dt: Duration) -> usize {
        let count = self
            .loot
            .generate(dt, self.lost_objects.len(), self.dogs.len());
        let kinds = self.map.loot_types().len();
        if count == 0 || kinds == 0 {
            return 0;
        }

        let mut placed = 0;
        for _ in 0..count {
            let kind = self.rng.gen_range(0..kinds);
            let Some(position) = self.random_road_point() else {
                break;
            };
            self.add_lost_object(kind, position);
            placed += 1;
        }
        placed
    }

    /// Advance the world by `dt`.
    ///
    /// Moves every dog, resolves pickups and dropoffs in the order they
    /// happen along each dog's path, then retires dogs idle for at least the
    /// retirement time.
    pub fn tick(&mut self, dt: Duration) -> TickOutcome {
        let had_dogs = !self.dogs.is_empty();

        let road_index = self.map.road_index();
        for dog in self.dogs.values_mut() {
            dog.advance(road_index, dt);
        }

        self.resolve_gathering();

        let idle: Vec<DogId> = self
            .dogs
            .values()
            .filter(|dog| dog.inactive_time() >= self.retirement_time)
            .map(Dog::id)
            .collect();

        let retired = idle
            .into_iter()
            .filter_map(|dog_id| self.dogs.remove(&dog_id))
            .map(|dog| RetiredDog {
                dog_id: dog.id(),
                record: dog.into_record(),
            })
            .collect();

        TickOutcome {
            retired,
            emptied: had_dogs && self.dogs.is_empty(),
        }
    }

    fn resolve_gathering(&mut self) {
        let mut targets = Vec::with_capacity(self.lost_objects.len() + self.map.offices().len());
        let mut items = Vec::with_capacity(targets.capacity());

        for obj in self.lost_objects.values() {
            targets.push(Target::Lost(obj.id));
            items.push(Item {
                position: obj.position,
                radius: LOST_OBJECT_RADIUS,
            });
        }
        for office in self.map.offices() {
            targets.push(Target::Office);
            items.push(Item {
                position: office.position(),
                radius: office.radius(),
            });
        }

        let dog_ids: Vec<DogId> = self.dogs.keys().copied().collect();
        let gatherers: Vec<Gatherer> = self
            .dogs
            .values()
            .map(|dog| {
                let (start, end) = dog.gather_segment();
                Gatherer {
                    start,
                    end,
                    radius: DOG_GATHER_RADIUS,
                }
            })
            .collect();

        for event in find_gather_events(&items, &gatherers) {
            let Some(dog) = self.dogs.get_mut(&dog_ids[event.gatherer_index]) else {
                continue;
            };
            match targets[event.item_index] {
                Target::Lost(id) => {
                    if dog.is_bag_full() {
                        continue;
                    }
                    // Already picked up by an earlier event.
                    if let Some(obj) = self.lost_objects.remove(&id) {
                        dog.put_to_bag(FoundObject::from(&obj));
                    }
                }
                Target::Office => {
                    dog.clear_bag();
                }
            }
        }
    }
}

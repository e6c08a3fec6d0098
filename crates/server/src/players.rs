//! Player identity: numeric ids bound to dogs, and the bearer tokens that
//! address them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use fetchstate_sim::{DogId, PlayerId, SessionId};
use fetchstate_snapshot::is_valid_token;
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("player {0} already registered")]
    DuplicatePlayer(PlayerId),
    #[error("dog {dog} of session {session} already has a player")]
    DuplicateDog { session: SessionId, dog: DogId },
    #[error("token already issued")]
    DuplicateToken,
    #[error("player {0} already has a token")]
    PlayerHasToken(PlayerId),
    #[error("player id {0} leaves no room for later ids")]
    IdSpaceExhausted(PlayerId),
}

// ============================================================================
// Token
// ============================================================================

/// Opaque bearer token: 128 random bits as 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    /// Accepts only well-formed tokens.
    pub fn parse(s: &str) -> Option<Self> {
        is_valid_token(s).then(|| Self(s.to_string()))
    }

    pub fn random(rng: &mut impl Rng) -> Self {
        let hi: u64 = rng.r#gen();
        let lo: u64 = rng.r#gen();
        Self(format!("{hi:016x}{lo:016x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token ↔ player bijection.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    by_token: HashMap<Token, PlayerId>,
    by_player: HashMap<PlayerId, Token>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for `player_id` from the thread CSPRNG.
    pub fn issue(&mut self, player_id: PlayerId) -> Token {
        self.issue_with(&mut rand::thread_rng(), player_id)
    }

    /// Issue from `rng`, drawing again on collision.
    pub fn issue_with(&mut self, rng: &mut impl Rng, player_id: PlayerId) -> Token {
        let token = loop {
            let candidate = Token::random(rng);
            if !self.by_token.contains_key(&candidate) {
                break candidate;
            }
        };
        if let Some(old) = self.by_player.insert(player_id, token.clone()) {
            self.by_token.remove(&old);
        }
        self.by_token.insert(token.clone(), player_id);
        token
    }

    /// Bind a known token, as when restoring a snapshot.
    pub fn insert(&mut self, token: Token, player_id: PlayerId) -> Result<(), RegistryError> {
        if self.by_token.contains_key(&token) {
            return Err(RegistryError::DuplicateToken);
        }
        if self.by_player.contains_key(&player_id) {
            return Err(RegistryError::PlayerHasToken(player_id));
        }
        self.by_player.insert(player_id, token.clone());
        self.by_token.insert(token, player_id);
        Ok(())
    }

    pub fn resolve(&self, token: &Token) -> Option<PlayerId> {
        self.by_token.get(token).copied()
    }

    pub fn token_of(&self, player_id: PlayerId) -> Option<&Token> {
        self.by_player.get(&player_id)
    }

    pub fn remove_player(&mut self, player_id: PlayerId) -> Option<Token> {
        let token = self.by_player.remove(&player_id)?;
        self.by_token.remove(&token);
        Some(token)
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

// ============================================================================
// Players
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub session_id: SessionId,
    pub dog_id: DogId,
    pub name: String,
}

/// All players across every session. Ids are global and never reused.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerId, Player>,
    by_dog: HashMap<(SessionId, DogId), PlayerId>,
    next_id: PlayerId,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, session_id: SessionId, dog_id: DogId, name: impl Into<String>) -> Player {
        let player = Player {
            id: self.next_id,
            session_id,
            dog_id,
            name: name.into(),
        };
        self.next_id += 1;
        self.by_dog.insert((session_id, dog_id), player.id);
        self.players.insert(player.id, player.clone());
        player
    }

    /// Register a player with a known id; later ids are allocated past it.
    pub fn insert(&mut self, player: Player) -> Result<(), RegistryError> {
        if self.players.contains_key(&player.id) {
            return Err(RegistryError::DuplicatePlayer(player.id));
        }
        let key = (player.session_id, player.dog_id);
        if self.by_dog.contains_key(&key) {
            return Err(RegistryError::DuplicateDog {
                session: key.0,
                dog: key.1,
            });
        }
        let next_id = player
            .id
            .checked_add(1)
            .ok_or(RegistryError::IdSpaceExhausted(player.id))?;
        self.next_id = self.next_id.max(next_id);
        self.by_dog.insert(key, player.id);
        self.players.insert(player.id, player);
        Ok(())
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn find_by_dog(&self, session_id: SessionId, dog_id: DogId) -> Option<&Player> {
        self.by_dog
            .get(&(session_id, dog_id))
            .and_then(|id| self.players.get(id))
    }

    pub fn remove_by_dog(&mut self, session_id: SessionId, dog_id: DogId) -> Option<Player> {
        let id = self.by_dog.remove(&(session_id, dog_id))?;
        self.players.remove(&id)
    }

    /// Players of `session_id`, ascending id.
    pub fn in_session(&self, session_id: SessionId) -> impl DoubleEndedIterator<Item = &Player> {
        self.players
            .values()
            .filter(move |p| p.session_id == session_id)
    }

    pub fn next_id(&self) -> PlayerId {
        self.next_id
    }

    pub fn reserve(&mut self, next_id: PlayerId) {
        self.next_id = self.next_id.max(next_id);
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

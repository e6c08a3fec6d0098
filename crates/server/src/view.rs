//! Request and response types of the application use cases.

use std::str::FromStr;

use fetchstate_sim::{Direction, FoundObject, LostObjectId, MapId, PlayerId, Point2D, Vec2D};

use crate::error::AppError;
use crate::players::Token;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinResult {
    pub token: Token,
    pub player_id: PlayerId,
}

/// Movement request as clients send it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveCommand {
    Left,
    Right,
    Up,
    Down,
    Stop,
}

impl MoveCommand {
    pub fn direction(self) -> Option<Direction> {
        match self {
            MoveCommand::Left => Some(Direction::West),
            MoveCommand::Right => Some(Direction::East),
            MoveCommand::Up => Some(Direction::North),
            MoveCommand::Down => Some(Direction::South),
            MoveCommand::Stop => None,
        }
    }
}

impl FromStr for MoveCommand {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" => Ok(MoveCommand::Left),
            "R" => Ok(MoveCommand::Right),
            "U" => Ok(MoveCommand::Up),
            "D" => Ok(MoveCommand::Down),
            "" => Ok(MoveCommand::Stop),
            other => Err(AppError::MalformedMove(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub position: Point2D,
    pub speed: Vec2D,
    pub direction: Direction,
    pub bag: Vec<FoundObject>,
    pub score: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LostObjectView {
    pub id: LostObjectId,
    pub kind: usize,
    pub position: Point2D,
}

/// State of the caller's session. Both lists are newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub players: Vec<PlayerView>,
    pub lost_objects: Vec<LostObjectView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapInfo {
    pub id: MapId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move_commands() {
        let parsed: Vec<MoveCommand> = ["L", "R", "U", "D", ""]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(
            parsed,
            vec![
                MoveCommand::Left,
                MoveCommand::Right,
                MoveCommand::Up,
                MoveCommand::Down,
                MoveCommand::Stop
            ]
        );
        assert_eq!(MoveCommand::Stop.direction(), None);
        assert_eq!(MoveCommand::Up.direction(), Some(Direction::North));
    }

    #[test]
    fn test_malformed_move_rejected() {
        for bad in ["X", "l", "LR", " "] {
            let err = bad.parse::<MoveCommand>().unwrap_err();
            assert!(matches!(err, AppError::MalformedMove(s) if s == bad));
        }
    }
}

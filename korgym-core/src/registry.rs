//! # Game Registry
//!
//! Static classification of KORGym games by reasoning category and
//! interaction type. The table is compiled in and indexed once on first use;
//! nothing here mutates at runtime.
//!
//! Unknown identifiers never fail a lookup. They classify as
//! [`Category::Unknown`] / [`InteractionType::Unknown`] so a session can
//! still be attempted against a game the table does not list yet.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Reasoning dimension a game exercises.
///
/// Variant order is the canonical lookup order used by [`category_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    MathLogic,
    ControlInteraction,
    Puzzle,
    SpatialGeometric,
    Strategic,
    Multimodal,
    Unknown,
}

impl Category {
    /// Every real category, in canonical order (excludes `Unknown`)
    pub const ALL: [Category; 6] = [
        Category::MathLogic,
        Category::ControlInteraction,
        Category::Puzzle,
        Category::SpatialGeometric,
        Category::Strategic,
        Category::Multimodal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::MathLogic => "math_logic",
            Category::ControlInteraction => "control_interaction",
            Category::Puzzle => "puzzle",
            Category::SpatialGeometric => "spatial_geometric",
            Category::Strategic => "strategic",
            Category::Multimodal => "multimodal",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = korgym_error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .chain(std::iter::once(Category::Unknown))
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                korgym_error::Error::invalid_argument(format!("unknown category '{}'", s))
                    .with_context("category", s)
            })
    }
}

/// Whether one answer settles the game or the agent plays round after round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Single,
    Multiple,
    Unknown,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::Single => "single",
            InteractionType::Multiple => "multiple",
            InteractionType::Unknown => "unknown",
        }
    }

    pub fn is_multi_turn(&self) -> bool {
        matches!(self, InteractionType::Multiple)
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionType {
    type Err = korgym_error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(InteractionType::Single),
            "multiple" => Ok(InteractionType::Multiple),
            "unknown" => Ok(InteractionType::Unknown),
            other => Err(korgym_error::Error::invalid_argument(format!(
                "unknown interaction type '{}'",
                other
            ))),
        }
    }
}

/// One row of the static game table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameDescriptor {
    pub id: &'static str,
    /// Non-empty, canonical order
    pub categories: &'static [Category],
    pub interaction: InteractionType,
}

impl GameDescriptor {
    /// Primary category (first in canonical order)
    pub fn category(&self) -> Category {
        self.categories.first().copied().unwrap_or(Category::Unknown)
    }

    pub fn is_multimodal(&self) -> bool {
        self.categories.contains(&Category::Multimodal)
    }
}

macro_rules! game {
    ($id:literal, [$($cat:ident),+], $interaction:ident) => {
        GameDescriptor {
            id: $id,
            categories: &[$(Category::$cat),+],
            interaction: InteractionType::$interaction,
        }
    };
}

static GAMES: &[GameDescriptor] = &[
    game!("1-DateCount", [MathLogic], Single),
    game!("2-GuessWord", [Puzzle], Single),
    game!("3-2048", [ControlInteraction], Multiple),
    game!("4-SudoKu", [MathLogic], Single),
    game!("5-light_out_game", [MathLogic], Single),
    game!("8-word_puzzle", [Puzzle], Single),
    game!("9-Jigsaw_puzzle", [SpatialGeometric, Multimodal], Single),
    game!("10-minigrid", [ControlInteraction], Multiple),
    game!("11-maze", [SpatialGeometric], Single),
    game!("12-sokoban", [SpatialGeometric], Single),
    game!("13-play_lines", [SpatialGeometric], Single),
    game!("15-emoji_connect", [SpatialGeometric], Single),
    game!("16-jiafa", [MathLogic], Single),
    game!("17-fill_game", [MathLogic], Single),
    game!("18-alien", [MathLogic], Single),
    game!("19-party_time", [MathLogic], Single),
    game!("20-city_path", [SpatialGeometric], Single),
    game!("21-Anagramania", [Puzzle], Single),
    game!("22-alphabetical_sorting", [Puzzle], Single),
    game!("23-puzzlegame", [Puzzle], Single),
    game!("24-snake", [ControlInteraction], Multiple),
    game!("25-Tetris", [ControlInteraction], Multiple),
    game!("26-TrustRovolution", [Strategic], Multiple),
    game!("27-NpointPlus", [Strategic], Multiple),
    game!("28-word_encryption", [Puzzle], Single),
    game!("29-Construction_Company", [MathLogic], Single),
    game!("30-Tower_of_Hanoi", [MathLogic], Single),
    game!("31-ball_arrange", [Puzzle], Multiple),
    game!("32-numeric_bricks", [MathLogic], Single),
    game!("33-wordle", [Puzzle], Multiple),
    game!("34-one_touch_drawing", [SpatialGeometric], Single),
    game!("35-pipe_game", [SpatialGeometric], Single),
    game!("36-CryptoWord", [Puzzle], Multiple),
    game!("37-SpiderSolitaire", [Strategic], Multiple),
    game!("38-minesweeper", [MathLogic], Multiple),
    game!("39-Nullify", [Strategic], Multiple),
    game!("40-CircleTheCat-Text", [Strategic], Multiple),
    game!("41-PVZ", [ControlInteraction, Strategic], Multiple),
    game!("42-diagram_coloring", [MathLogic], Single),
    game!("43-CircleTheCat-Multimodal", [Strategic, Multimodal], Multiple),
    game!("44-city", [Strategic], Multiple),
    game!("45-free_the_key", [SpatialGeometric], Single),
    game!("46-wordle_multimodal", [Puzzle, Multimodal], Multiple),
    game!("47-bubble_ball_sorting", [Puzzle, Multimodal], Single),
    game!("48-map_position_simulation_text", [SpatialGeometric], Single),
    game!("49-map_position_simulation_multimodal", [SpatialGeometric, Multimodal], Single),
    game!("50-SudoKu_MultiModal", [MathLogic, Multimodal], Single),
    game!("51-ball_arrange_multimodal", [Puzzle, Multimodal], Multiple),
];

static INDEX: Lazy<HashMap<&'static str, &'static GameDescriptor>> =
    Lazy::new(|| GAMES.iter().map(|g| (g.id, g)).collect());

/// All registered games, in table order
pub fn games() -> &'static [GameDescriptor] {
    GAMES
}

/// Games listing `category` among their categories
pub fn games_in(category: Category) -> impl Iterator<Item = &'static GameDescriptor> {
    GAMES.iter().filter(move |g| g.categories.contains(&category))
}

pub fn descriptor(game_id: &str) -> Option<&'static GameDescriptor> {
    INDEX.get(game_id).copied()
}

/// First matching category in canonical order, `Unknown` if unregistered
pub fn category_of(game_id: &str) -> Category {
    descriptor(game_id)
        .map(GameDescriptor::category)
        .unwrap_or(Category::Unknown)
}

/// Every category the game belongs to, `{Unknown}` if unregistered
pub fn all_categories_of(game_id: &str) -> BTreeSet<Category> {
    match descriptor(game_id) {
        Some(g) => g.categories.iter().copied().collect(),
        None => BTreeSet::from([Category::Unknown]),
    }
}

pub fn interaction_type_of(game_id: &str) -> InteractionType {
    descriptor(game_id)
        .map(|g| g.interaction)
        .unwrap_or(InteractionType::Unknown)
}

pub fn is_multimodal(game_id: &str) -> bool {
    all_categories_of(game_id).contains(&Category::Multimodal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_games_have_exactly_one_interaction_type() {
        for game in games() {
            let interaction = interaction_type_of(game.id);
            assert!(
                matches!(interaction, InteractionType::Single | InteractionType::Multiple),
                "{} has {:?}",
                game.id,
                interaction
            );
        }
    }

    #[test]
    fn test_table_ids_are_unique_and_categorised() {
        assert_eq!(INDEX.len(), GAMES.len());
        for game in games() {
            assert!(!game.categories.is_empty(), "{} has no category", game.id);
            assert!(!game.categories.contains(&Category::Unknown));
            let mut sorted = game.categories.to_vec();
            sorted.sort();
            assert_eq!(sorted, game.categories, "{} categories out of order", game.id);
        }
    }

    #[test]
    fn test_unknown_game() {
        assert_eq!(category_of("0-not_a_game"), Category::Unknown);
        assert_eq!(interaction_type_of("0-not_a_game"), InteractionType::Unknown);
        assert_eq!(
            all_categories_of("0-not_a_game"),
            BTreeSet::from([Category::Unknown])
        );
        assert!(!is_multimodal("0-not_a_game"));
        assert!(descriptor("0-not_a_game").is_none());
    }

    #[test]
    fn test_lookup_is_exact() {
        assert_eq!(category_of("3-2048"), Category::ControlInteraction);
        assert_eq!(category_of("3-2048 "), Category::Unknown);
        assert_eq!(category_of("4-sudoku"), Category::Unknown);
    }

    #[test]
    fn test_multi_category_games() {
        assert_eq!(category_of("9-Jigsaw_puzzle"), Category::SpatialGeometric);
        assert_eq!(
            all_categories_of("9-Jigsaw_puzzle"),
            BTreeSet::from([Category::SpatialGeometric, Category::Multimodal])
        );
        assert!(is_multimodal("9-Jigsaw_puzzle"));
        assert!(!is_multimodal("11-maze"));
    }

    #[test]
    fn test_interaction_types() {
        assert_eq!(interaction_type_of("4-SudoKu"), InteractionType::Single);
        assert_eq!(interaction_type_of("33-wordle"), InteractionType::Multiple);
        assert!(interaction_type_of("25-Tetris").is_multi_turn());
        assert!(!InteractionType::Unknown.is_multi_turn());
    }

    #[test]
    fn test_games_in_category() {
        let multimodal: Vec<_> = games_in(Category::Multimodal).map(|g| g.id).collect();
        assert!(multimodal.contains(&"50-SudoKu_MultiModal"));
        assert!(games_in(Category::Multimodal).all(|g| g.is_multimodal()));
        assert_eq!(games_in(Category::Unknown).count(), 0);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("spatial_geometric".parse::<Category>().unwrap(), Category::SpatialGeometric);
        assert_eq!("unknown".parse::<Category>().unwrap(), Category::Unknown);
        assert!("board_games".parse::<Category>().is_err());
        assert_eq!("multiple".parse::<InteractionType>().unwrap(), InteractionType::Multiple);
        assert!("many".parse::<InteractionType>().is_err());
    }

    #[test]
    fn test_serde_names_match_display() {
        for category in Category::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category));
        }
        assert_eq!(serde_json::to_string(&InteractionType::Single).unwrap(), "\"single\"");
    }
}

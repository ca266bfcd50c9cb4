use std::sync::Arc;

use crate::error::{EngineError, StoreError};
use crate::store::RowStore;
use crate::types::{Match, MatchKey, MatchStatus, Slot};

const MATCH_PREFIX: &str = "match/";

pub fn match_row_key(key: &MatchKey) -> String {
    format!("{MATCH_PREFIX}{}/{:04}", key.court, key.game_number)
}

/// Keyed store of matches. Cross-match rules live in the bracket module.
pub struct MatchRegistry {
    store: Arc<dyn RowStore>,
}

impl MatchRegistry {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        MatchRegistry { store }
    }

    pub fn get(&self, key: &MatchKey) -> Result<Option<Match>, StoreError> {
        let row_key = match_row_key(key);
        match self.store.get(&row_key)? {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|source| StoreError::Serde { key: row_key, source }),
            None => Ok(None),
        }
    }

    pub fn require(&self, key: &MatchKey) -> Result<Match, EngineError> {
        self.get(key)?.ok_or_else(|| EngineError::MatchNotFound {
            court: key.court.clone(),
            game_number: key.game_number,
        })
    }

    /// Returns the stored match, creating an empty standby entry on first reference.
    pub fn upsert(&self, key: &MatchKey) -> Result<Match, StoreError> {
        if let Some(existing) = self.get(key)? {
            return Ok(existing);
        }
        let created = Match::new(key);
        self.put(&created)?;
        Ok(created)
    }

    pub fn put(&self, game: &Match) -> Result<(), StoreError> {
        let row_key = match_row_key(&game.key());
        let row = serde_json::to_value(game)
            .map_err(|source| StoreError::Serde { key: row_key.clone(), source })?;
        self.store.put(&row_key, row)
    }

    pub fn set_status(&self, key: &MatchKey, status: MatchStatus) -> Result<Match, EngineError> {
        let mut game = self.require(key)?;
        game.status = status;
        self.put(&game)?;
        Ok(game)
    }

    pub fn set_team(&self, key: &MatchKey, slot: Slot, name: &str) -> Result<Match, EngineError> {
        let mut game = self.require(key)?;
        game.set_team(slot, name);
        self.put(&game)?;
        Ok(game)
    }

    /// Rejects `key` when its game number already belongs to another court.
    /// Checked before any match is created outside the bracket file.
    pub fn ensure_game_number_free(&self, key: &MatchKey) -> Result<(), EngineError> {
        match self.find_by_game_number(key.game_number)? {
            Some(existing) if existing.court != key.court => Err(EngineError::GameNumberTaken {
                court: existing.court,
                game_number: key.game_number,
            }),
            _ => Ok(()),
        }
    }

    /// Bracket edges address games by number alone, so numbers are unique per tournament.
    pub fn find_by_game_number(&self, game_number: u32) -> Result<Option<Match>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|game| game.game_number == game_number))
    }

    pub fn list(&self) -> Result<Vec<Match>, StoreError> {
        let mut games = Vec::new();
        for (row_key, row) in self.store.scan_prefix(MATCH_PREFIX)? {
            let game: Match = serde_json::from_value(row)
                .map_err(|source| StoreError::Serde { key: row_key, source })?;
            games.push(game);
        }
        games.sort_by(|a, b| {
            a.court
                .cmp(&b.court)
                .then(a.game_number.cmp(&b.game_number))
        });
        Ok(games)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRowStore;

    fn registry() -> MatchRegistry {
        MatchRegistry::new(Arc::new(MemoryRowStore::new()))
    }

    #[test]
    fn test_upsert_creates_standby_once() {
        let registry = registry();
        let key = MatchKey::new("A", 1);

        let created = registry.upsert(&key).unwrap();
        assert_eq!(created.status, MatchStatus::Standby);
        assert!(created.top_team.is_none());

        registry.set_team(&key, Slot::Top, "RedTeam").unwrap();
        let again = registry.upsert(&key).unwrap();
        assert_eq!(again.team(Slot::Top), Some("RedTeam"));
    }

    #[test]
    fn test_missing_match_is_reported() {
        let registry = registry();
        let err = registry
            .set_status(&MatchKey::new("C", 4), MatchStatus::Playing)
            .unwrap_err();
        assert!(matches!(err, EngineError::MatchNotFound { game_number: 4, .. }));
    }

    #[test]
    fn test_list_and_find_by_game_number() {
        let registry = registry();
        registry.upsert(&MatchKey::new("B", 10)).unwrap();
        registry.upsert(&MatchKey::new("A", 2)).unwrap();
        registry.upsert(&MatchKey::new("A", 1)).unwrap();

        let order: Vec<(String, u32)> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|game| (game.court, game.game_number))
            .collect();
        assert_eq!(
            order,
            vec![("A".into(), 1), ("A".into(), 2), ("B".into(), 10)]
        );

        let found = registry.find_by_game_number(10).unwrap().unwrap();
        assert_eq!(found.court, "B");
        assert!(registry.find_by_game_number(11).unwrap().is_none());
    }

    #[test]
    fn test_game_number_taken_on_other_court() {
        let registry = registry();
        registry.upsert(&MatchKey::new("B", 4)).unwrap();

        let err = registry
            .ensure_game_number_free(&MatchKey::new("A", 4))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::GameNumberTaken { ref court, game_number: 4 } if court == "B"
        ));
        registry.ensure_game_number_free(&MatchKey::new("B", 4)).unwrap();
        registry.ensure_game_number_free(&MatchKey::new("A", 5)).unwrap();
    }
}

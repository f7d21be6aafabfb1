use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    engine::GameModule,
    error::{HandleError, HandleResult},
    types::GameMetadata,
};

/// Catalog of registered game modules, keyed by game id.  Modules are
/// registered once at process start and never change afterwards.
#[derive(Default, Clone)]
pub struct GameRegistry {
    modules: HashMap<String, Arc<dyn GameModule>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn GameModule>) -> HandleResult<()> {
        let game_id = module.metadata().game_id;
        if self.modules.contains_key(&game_id) {
            return Err(HandleError::DuplicatedModule(game_id));
        }
        self.modules.insert(game_id, module);
        Ok(())
    }

    pub fn get(&self, game_id: &str) -> Option<Arc<dyn GameModule>> {
        self.modules.get(game_id).cloned()
    }

    pub fn has(&self, game_id: &str) -> bool {
        self.modules.contains_key(game_id)
    }

    pub fn list(&self) -> Vec<GameMetadata> {
        let mut metas: Vec<GameMetadata> = self.modules.values().map(|m| m.metadata()).collect();
        metas.sort_by(|a, b| a.game_id.cmp(&b.game_id));
        metas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::GameRng;
    use crate::types::{GameConfig, Outcome};
    use serde_json::{json, Value};

    struct Noop;

    impl GameModule for Noop {
        fn metadata(&self) -> GameMetadata {
            GameMetadata {
                game_id: "noop".into(),
                display_name: "Noop".into(),
                description: "does nothing".into(),
                min_players: 1,
                max_players: 1,
                move_timeout: Default::default(),
                ui: None,
            }
        }

        fn init(&self, _: &GameConfig, _: &[String], _: &str) -> crate::error::HandleResult<Value> {
            Ok(json!({}))
        }

        fn validate_action(&self, _: &Value, _: &str, _: &Value) -> bool {
            false
        }

        fn apply_action(
            &self,
            state: &Value,
            _: &str,
            _: &Value,
            _: &mut GameRng,
        ) -> crate::error::HandleResult<Value> {
            Ok(state.clone())
        }

        fn is_terminal(&self, _: &Value) -> bool {
            true
        }

        fn outcome(&self, _: &Value) -> Outcome {
            Outcome::draw("noop")
        }

        fn observation(&self, state: &Value, _: &str) -> Value {
            state.clone()
        }

        fn legal_actions(&self, _: &Value, _: &str) -> Vec<Value> {
            vec![]
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = GameRegistry::new();
        registry.register(Arc::new(Noop)).unwrap();
        assert!(registry.has("noop"));
        assert!(registry.get("noop").is_some());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = GameRegistry::new();
        registry.register(Arc::new(Noop)).unwrap();
        assert_eq!(
            registry.register(Arc::new(Noop)),
            Err(HandleError::DuplicatedModule("noop".into()))
        );
    }
}

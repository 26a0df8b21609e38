//! Door storage: an in-memory catalog keyed by door id, fronted by a TTL cache.
//! Doors beyond the catalog come from an optional generator, with local
//! scenario pools as the fallback.

mod cache;
mod catalog;
mod generator;

pub use cache::TtlCache;
pub use catalog::THEMES;
pub use generator::{AiServiceDoorGenerator, DoorGenerator, GenerationError, GenerationResult};

use chrono::Utc;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::types::{Door, DoorId, MAX_DIFFICULTY, MIN_DIFFICULTY};

fn cache_key(door_id: &str) -> String {
    format!("door:{}", door_id)
}

pub struct DoorStore {
    doors: RwLock<HashMap<DoorId, Door>>,
    cache: RwLock<TtlCache<Door>>,
    generator: Option<Arc<dyn DoorGenerator>>,
}

impl DoorStore {
    /// Create a store seeded with the built-in scenario for every theme and difficulty
    pub fn new(cache_ttl: Duration) -> Self {
        let mut doors = HashMap::new();
        for theme in THEMES {
            for difficulty in MIN_DIFFICULTY..=MAX_DIFFICULTY {
                let door = Door {
                    door_id: format!("door_{}_{}", theme, difficulty),
                    content: catalog::scenario(theme, difficulty).to_string(),
                    theme: theme.to_string(),
                    difficulty,
                    expected_solution_types: solution_types(),
                    created_at: Utc::now(),
                };
                doors.insert(door.door_id.clone(), door);
            }
        }

        Self {
            doors: RwLock::new(doors),
            cache: RwLock::new(TtlCache::new(cache_ttl)),
            generator: None,
        }
    }

    /// Ask `generator` for doors before falling back to the local pools
    pub fn with_generator(mut self, generator: Arc<dyn DoorGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Look a door up, serving from the cache when possible
    pub async fn get(&self, door_id: &str) -> Option<Door> {
        let key = cache_key(door_id);
        if let Some(door) = self.cache.write().await.get(&key) {
            tracing::trace!("Door cache hit: {}", key);
            return Some(door);
        }

        let door = self.doors.read().await.get(door_id).cloned()?;
        self.cache.write().await.insert(key, door.clone());
        Some(door)
    }

    pub async fn save(&self, door: Door) {
        self.cache
            .write()
            .await
            .insert(cache_key(&door.door_id), door.clone());
        self.doors.write().await.insert(door.door_id.clone(), door);
    }

    /// All doors of a theme, ordered by difficulty
    pub async fn get_by_theme(&self, theme: &str) -> Vec<Door> {
        let mut doors: Vec<Door> = self
            .doors
            .read()
            .await
            .values()
            .filter(|d| d.theme == theme)
            .cloned()
            .collect();
        doors.sort_by(|a, b| {
            a.difficulty
                .cmp(&b.difficulty)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        doors
    }

    /// Pick a door of the given theme and difficulty that is not in `seen`.
    ///
    /// Doors whose text was already seen are skipped too. Generates (and
    /// stores) a new door when nothing stored fits, asking the generator
    /// first and falling back to the local scenario pools.
    pub async fn select(&self, theme: &str, difficulty: u8, seen: &HashSet<DoorId>) -> Door {
        let difficulty = difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
        let seen_content = self.contents_of(seen).await;
        let candidate = self.get_by_theme(theme).await.into_iter().find(|d| {
            d.difficulty == difficulty
                && !seen.contains(&d.door_id)
                && !seen_content.contains(&d.content)
        });

        if let Some(door) = candidate {
            return self.get(&door.door_id).await.unwrap_or(door);
        }

        let door = match self.generate_remote(theme, difficulty, seen, &seen_content).await {
            Some(door) => door,
            None => generate_local(theme, difficulty, &seen_content),
        };
        tracing::debug!("Generated door {} for theme {}", door.door_id, theme);
        self.save(door.clone()).await;
        door
    }

    async fn contents_of(&self, ids: &HashSet<DoorId>) -> HashSet<String> {
        let doors = self.doors.read().await;
        ids.iter()
            .filter_map(|id| doors.get(id).map(|d| d.content.clone()))
            .collect()
    }

    async fn generate_remote(
        &self,
        theme: &str,
        difficulty: u8,
        seen: &HashSet<DoorId>,
        seen_content: &HashSet<String>,
    ) -> Option<Door> {
        let generator = self.generator.as_ref()?;
        match generator.generate(theme, difficulty).await {
            Ok(mut door) => {
                if seen.contains(&door.door_id) || seen_content.contains(&door.content) {
                    tracing::warn!(
                        "Generator {} repeated door {}, using local pool",
                        generator.name(),
                        door.door_id
                    );
                    return None;
                }
                door.theme = theme.to_string();
                door.difficulty = door.difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
                Some(door)
            }
            Err(e) => {
                tracing::warn!(
                    "Generator {} failed for theme {}: {}. Using local pool.",
                    generator.name(),
                    theme,
                    e
                );
                None
            }
        }
    }

    /// Drop expired cache entries
    pub async fn purge_cache(&self) -> usize {
        self.cache.write().await.purge_expired()
    }
}

fn solution_types() -> Vec<String> {
    catalog::SOLUTION_TYPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// The AI service generator when one is configured
pub fn build_door_generator(config: &AppConfig) -> GenerationResult<Option<Arc<dyn DoorGenerator>>> {
    match &config.ai_service_url {
        Some(url) => {
            let generator = AiServiceDoorGenerator::new(url.clone(), config.ai_timeout)?;
            tracing::info!("Generating doors with AI service at {}", url);
            Ok(Some(Arc::new(generator)))
        }
        None => Ok(None),
    }
}

/// A door whose text no player of the session has seen yet, if the pools allow it
fn generate_local(theme: &str, difficulty: u8, seen_content: &HashSet<String>) -> Door {
    let fresh = catalog::generated_scenarios(theme).find(|text| !seen_content.contains(*text));
    let content = match fresh {
        Some(text) => text.to_string(),
        None => {
            let pool: Vec<&str> = catalog::generated_scenarios(theme).collect();
            let mut rng = rand::rng();
            let base = pool[rng.random_range(0..pool.len())];
            let twist = catalog::TWISTS[rng.random_range(0..catalog::TWISTS.len())];
            format!("{} {}", base, twist)
        }
    };

    Door {
        door_id: format!("door_{}_{}_{}", ulid::Ulid::new(), theme, difficulty),
        content,
        theme: theme.to_string(),
        difficulty,
        expected_solution_types: solution_types(),
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DoorStore {
        DoorStore::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_seeded_catalog() {
        let store = store();
        for theme in THEMES {
            let doors = store.get_by_theme(theme).await;
            assert_eq!(doors.len(), 3);
            assert_eq!(doors[0].difficulty, 1);
            assert_eq!(doors[2].difficulty, 3);
        }
    }

    #[tokio::test]
    async fn test_select_exact_difficulty() {
        let store = store();
        let door = store.select("workplace", 2, &HashSet::new()).await;
        assert_eq!(door.theme, "workplace");
        assert_eq!(door.difficulty, 2);
        assert_eq!(door.door_id, "door_workplace_2");
    }

    #[tokio::test]
    async fn test_select_clamps_difficulty() {
        let store = store();
        let none = HashSet::new();
        assert_eq!(store.select("social", 0, &none).await.difficulty, 1);
        assert_eq!(store.select("social", 7, &none).await.difficulty, 3);
    }

    #[tokio::test]
    async fn test_unknown_theme_generates_and_stores() {
        let store = store();
        let door = store.select("pirates", 2, &HashSet::new()).await;
        assert_eq!(door.theme, "pirates");
        assert_eq!(door.difficulty, 2);

        // the generated door is reused on the next selection
        let again = store.select("pirates", 2, &HashSet::new()).await;
        assert_eq!(again.door_id, door.door_id);
        assert_eq!(store.get(&door.door_id).await, Some(door));
    }

    #[tokio::test]
    async fn test_seen_doors_are_skipped() {
        let store = store();
        let mut seen = HashSet::new();
        let first = store.select("general", 1, &seen).await;
        assert_eq!(first.door_id, "door_general_1");

        seen.insert(first.door_id.clone());
        let second = store.select("general", 1, &seen).await;
        assert_ne!(second.door_id, first.door_id);
        assert_ne!(second.content, first.content);
        assert_eq!(second.theme, "general");
        assert_eq!(second.difficulty, 1);

        seen.insert(second.door_id.clone());
        let third = store.select("general", 1, &seen).await;
        assert!(!seen.contains(&third.door_id));
        assert_ne!(third.content, second.content);
    }

    #[tokio::test]
    async fn test_generated_doors_do_not_repeat_text() {
        let store = store();
        let mut seen = HashSet::new();
        let mut contents = HashSet::new();
        // the catalog door plus every fallback text
        for _ in 0..9 {
            let door = store.select("social", 2, &seen).await;
            assert!(contents.insert(door.content.clone()), "repeated: {}", door.content);
            seen.insert(door.door_id);
        }

        // once the pools are exhausted a twist keeps the text fresh
        let door = store.select("social", 2, &seen).await;
        assert!(!contents.contains(&door.content));
    }

    #[tokio::test]
    async fn test_text_seen_under_another_id_is_skipped() {
        let store = store();
        let generated = store
            .select("technology", 3, &HashSet::from(["door_technology_3".to_string()]))
            .await;

        // a second session saw a different door carrying the same text
        let twin = Door {
            door_id: "door_twin".to_string(),
            ..generated.clone()
        };
        store.save(twin).await;
        let seen = HashSet::from(["door_technology_3".to_string(), "door_twin".to_string()]);
        let door = store.select("technology", 3, &seen).await;
        assert_ne!(door.door_id, generated.door_id);
        assert_ne!(door.content, generated.content);
    }

    struct ScriptedGenerator {
        content: Option<&'static str>,
    }

    #[async_trait::async_trait]
    impl DoorGenerator for ScriptedGenerator {
        async fn generate(&self, theme: &str, difficulty: u8) -> GenerationResult<Door> {
            let content = self.content.ok_or(GenerationError::Status(503))?;
            Ok(Door {
                door_id: format!("door_ai_{}", ulid::Ulid::new()),
                content: content.to_string(),
                theme: format!("{}-from-service", theme),
                difficulty: difficulty + 5,
                expected_solution_types: vec!["creative".to_string()],
                created_at: Utc::now(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_generator_is_asked_first() {
        let store = store().with_generator(Arc::new(ScriptedGenerator {
            content: Some("A pigeon has been promoted to your manager. How do you ask for a raise?"),
        }));
        let seen = HashSet::from(["door_workplace_1".to_string()]);
        let door = store.select("workplace", 1, &seen).await;

        assert!(door.door_id.starts_with("door_ai_"));
        assert!(door.content.contains("pigeon"));
        assert_eq!(door.theme, "workplace");
        assert_eq!(door.difficulty, MAX_DIFFICULTY);
        assert_eq!(store.get(&door.door_id).await, Some(door));
    }

    #[tokio::test]
    async fn test_failing_generator_falls_back_locally() {
        let store = store().with_generator(Arc::new(ScriptedGenerator { content: None }));
        let seen = HashSet::from(["door_workplace_1".to_string()]);
        let door = store.select("workplace", 1, &seen).await;

        assert!(!door.door_id.starts_with("door_ai_"));
        assert_eq!(door.theme, "workplace");
        assert_ne!(door.content, catalog::scenario("workplace", 1));
    }

    #[tokio::test]
    async fn test_repeated_generator_text_falls_back_locally() {
        let store = store().with_generator(Arc::new(ScriptedGenerator {
            content: Some(catalog::scenario("workplace", 1)),
        }));
        let seen = HashSet::from(["door_workplace_1".to_string()]);
        let door = store.select("workplace", 1, &seen).await;
        assert_ne!(door.content, catalog::scenario("workplace", 1));
    }

    #[tokio::test]
    async fn test_get_goes_through_cache() {
        let store = DoorStore::new(Duration::ZERO);
        // expired cache entries fall through to the catalog
        let door = store.get("door_general_1").await.unwrap();
        assert_eq!(door.difficulty, 1);
        assert!(store.get("missing").await.is_none());
    }
}

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::users::UserStore;
use crate::config::Config;
use crate::models::StoryModel;
use crate::storage::MediaStore;
use crate::stories::{SqliteStoryRepository, StoryLifecycle};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub users: UserStore,
    pub stories: Arc<StoryLifecycle>,
    pub model: Arc<dyn StoryModel>,
    pub media: MediaStore,
}

impl AppState {
    /// Wire the stores and the lifecycle controller around a pool and a model.
    pub fn new(db: DbPool, config: Config, model: Arc<dyn StoryModel>) -> Self {
        let users = UserStore::new(db.clone(), config.auth.bcrypt_cost);
        let media = MediaStore::new(config.uploads_path());
        let stories = StoryLifecycle::new(
            Arc::new(SqliteStoryRepository::new(db.clone())),
            Arc::new(users.clone()),
            model.clone(),
            media.clone(),
            config.uploads.max_images,
        );

        Self {
            db,
            config,
            users,
            stories: Arc::new(stories),
            model,
            media,
        }
    }
}

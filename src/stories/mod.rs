// Story lifecycle with clean architecture
//
// Structure:
// - domain.rs: Pure types and transitions (no I/O)
// - repository.rs: Database operations (isolated side effects)
// - service.rs: Orchestration over the model, media store and repository

pub mod domain;
pub mod repository;
pub mod service;

pub use domain::{Story, StoryId, StoryStage};
pub use repository::{SqliteStoryRepository, StoryRepository};
pub use service::{Narration, StoryError, StoryLifecycle};

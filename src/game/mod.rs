//! Game simulation modules

pub mod ai;
pub mod collision;
pub mod combat;
pub mod entity;
pub mod input;
pub mod movement;
pub mod snapshot;
pub mod spawner;
pub mod world;

pub use collision::CollisionIndex;
pub use spawner::EnemySpawner;
pub use world::{GameWorld, WorldCommand, WorldHandle};

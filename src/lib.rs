pub mod arena;
pub mod config;
pub mod game;
pub mod msg;
pub mod net;
pub mod persistence;
pub mod physics;
pub mod settlement;
pub mod systems;

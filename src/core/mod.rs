pub mod config;
pub mod context;
pub mod display;
pub mod entity;
pub mod passage;
pub mod path;
pub mod persistence;
pub mod reactive;
pub mod store;

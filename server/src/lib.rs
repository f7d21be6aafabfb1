pub mod auth;
pub mod component;
pub mod context;
pub mod error;
pub mod frame;
pub mod handle;
pub mod match_manager;
pub mod orchestrator;
pub mod room;
pub mod routes;
pub mod server;
pub mod service;
pub mod session;
pub mod sweeper;
pub mod view;

pub mod auth;
pub mod cli;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod handler;
pub mod http;
pub mod infra;
pub mod logging;
pub mod model;
pub mod push;
pub mod repository;
pub mod server;
pub mod service;

pub use config::ServerConfig;
pub use context::EventContext;
pub use dispatcher::{DispatchReport, EventDispatcher, EventDispatcherBuilder, TriggerPattern};
pub use error::{Result, ServerError};
pub use handler::{
    EventHandler, FriendRequestCreatedHandler, FriendRequestStatusHandler, HandlerOutcome,
    PingtrailInviteHandler, SkipReason,
};
pub use server::NotifyServer;

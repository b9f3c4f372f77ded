//! Terminal dashboard for local training runs: the message-driven
//! controller, its presentation state, and the workers that feed it.

pub mod animation;
pub mod app;
pub mod config;
pub mod filter;
pub mod focus;
pub mod keys;
pub mod layout;
pub mod live;
pub mod pager;
pub mod panels;
pub mod session;
pub mod text;
pub mod theme;
pub mod ui;

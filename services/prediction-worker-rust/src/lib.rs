//! Matchday prediction sales with daily purchase windows and a raffle.
//!
//! Leagues share one parameterized lifecycle: select fixtures for D+1,
//! generate predictions, open sales when the WIB window opens, close them,
//! draw the raffle and archive the cycle.

pub mod app;
pub mod archive;
pub mod config;
pub mod cycle;
pub mod error;
pub mod health;
pub mod league;
pub mod matchday;
pub mod prediction;
pub mod purchase;
pub mod raffle;
pub mod routes;
pub mod scheduler;
pub mod selection;
pub mod sports_api;
pub mod store;
pub mod window;
pub mod workers;

pub use app::{Clock, Services};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use league::League;
pub use routes::{router, AppState};
pub use scheduler::Scheduler;
pub use window::{Window, WindowStatus};

//! # warden
//!
//! Supervisor for a single long-running game server process.
//!
//! Spawns the server, drains its combined output into a bounded line buffer,
//! derives an `offline`/`booting`/`online` readiness state from that buffer,
//! scrapes tunnel connectivity from log lines, and forwards console commands
//! to the server's stdin.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use warden::{Supervisor, SupervisorConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sup = Supervisor::new(SupervisorConfig::new("minecraft_server"));
//!
//! if sup.launch().await {
//! 	sup.send("say hello").await;
//! }
//! println!("{}", sup.state().await);
//! sup.stop().await;
//! # }
//! ```

pub mod types;
pub mod output;
pub mod ram;
pub mod status;
pub mod supervisor;

pub use types::*;
pub use output::{LogBuffer, MAX_LOG_LINES, NO_OUTPUT_PLACEHOLDER};
pub use supervisor::{LaunchPlan, Supervisor, SupervisorConfig};

//! Console front end for running one persona simulation session.
//!
//! ## Settings
//!
//! `sim_console` reads its session setup from the JSON file named by
//! `SIM_CONSOLE_CONFIG_PATH`:
//!
//! ```json
//! {
//!   "base_url": "http://localhost:5000",
//!   "name": "Budget review",
//!   "scenario": {
//!     "id": 3,
//!     "name": "Budget cuts",
//!     "min_participants": 2,
//!     "max_participants": 4,
//!     "context": "The team must trim 10% from next quarter."
//!   },
//!   "personas": [1, 4, 7],
//!   "custom_context": "The CFO joins late.",
//!   "conversation_depth": "Long",
//!   "timeout_sec": 30
//! }
//! ```
//!
//! Contract notes:
//! - `name`, `scenario`, and `personas` are required; `personas` must not be empty.
//! - Scenario bounds must satisfy `1 <= min_participants <= max_participants`.
//!   A persona count outside the bounds is reported by the session itself.
//! - `conversation_depth` is one of `Short`, `Medium`, `Long`, `Extended`,
//!   `Longform`, `Marathon` (case-insensitive). Unknown labels fall back to
//!   `Medium` with a warning.
//! - `timeout_sec` is optional and must be > 0 when provided.
//! - `SIM_CONSOLE_BASE_URL` overrides `base_url`.
//! - Unknown JSON fields are rejected.
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `tracing`; `RUST_LOG` overrides the
//! default filter. Session updates are written to stdout, one line each.

pub mod render;
pub mod runtime;
pub mod settings;

pub use runtime::{RunOutcome, RuntimeMessage, SimulationRuntime};
pub use settings::{ConsoleSettings, SettingsError};

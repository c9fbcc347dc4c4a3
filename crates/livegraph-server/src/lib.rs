//! livegraph-server: exposes a [`livegraph`] tree to a remote editor.
//!
//! | Module | Role |
//! |---|---|
//! | [`config`] | Layered TOML/env/CLI configuration |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`protocol`] | Frame envelope and error tags |
//! | [`handlers`] | Operation table |
//! | [`session`] | Per-frame dispatch over the owned state |
//! | [`transport`] | TCP dial-out loop with reconnect backoff |
//!
//! ```
//! use livegraph_server::Session;
//!
//! let mut session = Session::new("demo", "demo", ".");
//! let out = session.handle_frame(r#"{"type":"request","operation":"sendModules"}"#);
//! assert_eq!(out.len(), 1);
//! ```

pub mod config;
pub mod handlers;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::{CliOverrides, ConfigError, ServerConfig};
pub use handlers::ModuleSpec;
pub use logging::init_tracing;
pub use protocol::{Inbound, Outbound, ProtocolError, SessionError};
pub use session::Session;
pub use transport::{Backoff, ConnectionState, TransportError};

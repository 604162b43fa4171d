//! Bridge routing and relay core.
//!
//! ## Module Structure
//!
//! - `links`: Bridge links and the immutable link table
//! - `manager`: Live link table ownership and hot swapping
//! - `transform`: Platform message transformation
//! - `sink`: Outbound platform seams
//! - `dispatcher`: Relay dispatcher and inbound event pump
//! - `supervisor`: Platform client tasks and restarts on settings changes

pub mod dispatcher;
pub mod links;
pub mod manager;
pub mod sink;
pub mod supervisor;
pub mod transform;

pub use dispatcher::{run_event_pump, RelayDispatcher};
pub use manager::LinkTableManager;
pub use sink::{DiscordSink, DownloadedFile, TelegramSink};
pub use supervisor::ClientSupervisor;

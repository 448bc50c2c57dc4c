pub mod context;
pub mod event_loop;
pub mod shutdown;
pub mod status;

pub use context::{DaemonContext, connect_registry, connect_runtime};
pub use event_loop::run;
pub use shutdown::{spawn_signal_listener, wait_for_shutdown_signal};
pub use status::{DaemonStatus, STATUS_FILE, StatusWriter, SupervisionState, read_status};

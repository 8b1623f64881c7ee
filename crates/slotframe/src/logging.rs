//! Logging facilities for slotframe.
//!
//! Slotframe instruments itself with the `tracing` crate. Hosts that want to
//! see logs install a subscriber of their choosing:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem, e.g.
/// `RUST_LOG=slotframe::render=trace`.
pub mod targets {
    /// Scheduler abstraction target.
    pub const SCHEDULER: &str = "slotframe::scheduler";
    /// Render/diff engine target.
    pub const RENDER: &str = "slotframe::render";
    /// Session lifecycle target.
    pub const SESSION: &str = "slotframe::session";
    /// Event dispatch and click routing target.
    pub const DISPATCH: &str = "slotframe::dispatch";
    /// Definition loading target.
    pub const DEFINITION: &str = "slotframe::definition";
}

mod guard;
mod overlay;
mod state;

pub use guard::{SessionTicket, UploadGuard};
pub use overlay::{evaluate_overlay, OverlayDecision};
pub use state::{estimate_remaining, UploadSession};

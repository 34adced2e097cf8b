//! Usage: Navigation capability the surrounding application implements.
//!
//! The session layer never renders anything; it only asks the host to move the user.

pub trait Navigator: Send + Sync {
    /// Route the user is currently looking at (e.g. `/conversations/42`).
    fn current_route(&self) -> String;

    /// Session is gone: show the login screen, optionally returning to `return_to` afterwards.
    fn redirect_to_login(&self, return_to: Option<String>);

    /// Idle nudge: back to the root screen, no return path.
    fn redirect_to_root(&self);
}

/// Host without navigation (headless tools, background jobs).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn current_route(&self) -> String {
        "/".to_string()
    }

    fn redirect_to_login(&self, return_to: Option<String>) {
        tracing::debug!(return_to = ?return_to, "redirect to login requested (no navigator)");
    }

    fn redirect_to_root(&self) {
        tracing::debug!("redirect to root requested (no navigator)");
    }
}

//! User interface rendering and input handling.
//!
//! - **renderer**: screen setup/teardown and positioned, colored text
//! - **keys**: crossterm key events to prompt keys
//! - **lock_screen**: the password box and countdown bar

pub mod keys;
pub mod lock_screen;
pub mod renderer;

pub use lock_screen::CrosstermLockScreen;
pub use renderer::Renderer;

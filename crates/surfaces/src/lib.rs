//! Surface implementations for NavPilot.
//!
//! - [`WebDriverSurface`] — web pages through a WebDriver endpoint
//! - [`ScriptSurface`] — desktop windows through a scripting shell

pub mod desktop;
pub mod web;

pub use desktop::{InstalledTool, QuoteStyle, ScriptSettings, ScriptSurface};
pub use web::{WebDriverSettings, WebDriverSurface};

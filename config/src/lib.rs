//! depprune settings
//!
//! One immutable [`Settings`] value describes where the overlays, the target
//! profile and its two mask files live. It is loaded once at startup and
//! threaded through every component by reference.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use depprune_config::ConfigLoader;
//!
//! let settings = ConfigLoader::new(None).load().unwrap();
//! println!("package.mask: {}", settings.package_mask_path().display());
//! ```
//!
//! # Settings File
//!
//! ```text
//! source_root = "/home/me/chromiumos/src/third_party"
//! overlays = ["chromiumos-overlay", "portage-stable"]
//! profile_dir = "chromiumos-overlay/profiles/target/chromeos"
//! mask_target = true
//! ```

pub mod error;
pub mod loader;
pub mod settings;

pub use error::{ConfigError, Result};
pub use loader::{env_vars, paths, ConfigLoader};
pub use settings::Settings;

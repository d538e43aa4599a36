//! Steer blocked domains to the local proxy with a PAC file.
//!
//! While a session runs, the system auto-proxy points at a generated PAC
//! script. Blocked hosts go to the intercepting proxy; everything else goes
//! direct. Stopping restores whatever the user had configured before.

pub mod error;
pub mod pac;
pub mod settings;
pub mod traffic;

pub use error::SteeringError;
pub use pac::{DIRECT, PacDocument, pac_url};
pub use settings::{
    AutoProxyState, GsettingsSettings, NetworkSettings, NetworkSetupSettings,
    parse_autoproxy_output, platform_settings,
};
pub use traffic::TrafficSteering;

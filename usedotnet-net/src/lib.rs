// usedotnet-net/src/lib.rs
pub mod http;
pub mod platform;
pub mod validation;

pub use http::{HttpClient, ReqwestHttpClient};
pub use platform::{
    Arch, FixedPlatformDetector, HostPlatformDetector, Os, Platform, PlatformDetector,
};
pub use usedotnet_common::error::{Result, UseDotNetError};
pub use validation::validate_url;

//! Host platform detection and the runtime identifiers (RIDs) it maps to.

use std::fmt;

use async_trait::async_trait;
use tracing::debug;
use usedotnet_common::error::{Result, UseDotNetError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Windows,
    Linux,
    MacOs,
}

impl Os {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "windows" | "win" => Some(Self::Windows),
            "linux" => Some(Self::Linux),
            "macos" | "osx" | "darwin" => Some(Self::MacOs),
            _ => None,
        }
    }

    /// RID prefix used by the release feed.
    pub fn rid_prefix(&self) -> &'static str {
        match self {
            Self::Windows => "win",
            Self::Linux => "linux",
            Self::MacOs => "osx",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rid_prefix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
    X86,
    Arm64,
    Arm,
}

impl Arch {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Some(Self::X64),
            "x86" | "i686" | "i386" => Some(Self::X86),
            "aarch64" | "arm64" => Some(Self::Arm64),
            "arm" | "armv7" => Some(Self::Arm),
            _ => None,
        }
    }

    pub fn rid_suffix(&self) -> &'static str {
        match self {
            Self::X64 => "x64",
            Self::X86 => "x86",
            Self::Arm64 => "arm64",
            Self::Arm => "arm",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rid_suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
    /// Linux hosts on musl libc prefer the `linux-musl-*` artifacts.
    pub musl: bool,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self {
            os,
            arch,
            musl: false,
        }
    }

    pub fn with_musl(mut self, musl: bool) -> Self {
        self.musl = musl && self.os == Os::Linux;
        self
    }

    /// The platform this binary was compiled for.
    pub fn current() -> Result<Self> {
        let os = Os::parse(std::env::consts::OS).ok_or_else(|| {
            UseDotNetError::GetMachinePlatformFailed(format!(
                "unsupported operating system '{}'",
                std::env::consts::OS
            ))
        })?;
        let arch = Arch::parse(std::env::consts::ARCH).ok_or_else(|| {
            UseDotNetError::GetMachinePlatformFailed(format!(
                "unsupported architecture '{}'",
                std::env::consts::ARCH
            ))
        })?;
        Ok(Self::new(os, arch).with_musl(cfg!(target_env = "musl")))
    }

    /// RIDs to look for, most specific first.
    pub fn rids(&self) -> Vec<String> {
        let generic = format!("{}-{}", self.os.rid_prefix(), self.arch.rid_suffix());
        if self.musl {
            vec![format!("linux-musl-{}", self.arch.rid_suffix()), generic]
        } else {
            vec![generic]
        }
    }

    /// Archive extension published for this OS.
    pub fn archive_extension(&self) -> &'static str {
        match self.os {
            Os::Windows => ".zip",
            Os::Linux | Os::MacOs => ".tar.gz",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.musl {
            write!(f, "{}-musl-{}", self.os, self.arch)
        } else {
            write!(f, "{}-{}", self.os, self.arch)
        }
    }
}

#[async_trait]
pub trait PlatformDetector: Send + Sync {
    async fn detect(&self) -> Result<Platform>;
}

/// Reports the compile-time target of the running binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPlatformDetector;

#[async_trait]
impl PlatformDetector for HostPlatformDetector {
    async fn detect(&self) -> Result<Platform> {
        let platform = Platform::current()?;
        debug!("Detected host platform {}", platform);
        Ok(platform)
    }
}

/// Always reports the same platform.
#[derive(Debug, Clone, Copy)]
pub struct FixedPlatformDetector(pub Platform);

#[async_trait]
impl PlatformDetector for FixedPlatformDetector {
    async fn detect(&self) -> Result<Platform> {
        Ok(self.0)
    }
}

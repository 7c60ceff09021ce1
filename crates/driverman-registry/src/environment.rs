//! The host drivers are installed on.

use tracing::debug;

use crate::entry::{Architecture, Bit, Platform};

/// Drivers that only ship a usable 32-bit build for older Windows releases.
const LEGACY_32BIT_DRIVERS: &[&str] = &["internetexplorerdriver"];

/// First Windows major release on which legacy drivers default to the host bit width.
#[cfg_attr(not(windows), allow(dead_code))]
const MODERN_WINDOWS_MAJOR: u32 = 10;

/// Facts about the host that drive catalog defaults.
pub trait HostEnvironment {
    fn platform(&self) -> Platform;

    fn bit(&self) -> Bit;

    fn architecture(&self) -> Architecture;

    /// Whether the host runs Windows 10 or newer. Always `false` elsewhere.
    fn is_modern_windows(&self) -> bool;

    /// Bit width to use for `name` when the request leaves it unset.
    fn default_bit(&self, name: &str) -> Bit {
        let legacy = LEGACY_32BIT_DRIVERS
            .iter()
            .any(|d| d.eq_ignore_ascii_case(name.trim()));

        if legacy && !(self.platform() == Platform::Windows && self.is_modern_windows()) {
            Bit::B32
        } else {
            self.bit()
        }
    }
}

/// The machine driverman is running on.
#[derive(Debug, Clone, Copy)]
pub struct SystemEnvironment {
    platform: Platform,
    bit: Bit,
    architecture: Architecture,
    modern_windows: bool,
}

impl SystemEnvironment {
    pub fn detect() -> Self {
        let env = Self {
            platform: platform_from_os(std::env::consts::OS),
            bit: bit_from_arch(std::env::consts::ARCH),
            architecture: architecture_from_arch(std::env::consts::ARCH),
            modern_windows: detect_modern_windows(),
        };
        debug!("detected host environment: {:?}", env);
        env
    }
}

impl HostEnvironment for SystemEnvironment {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn bit(&self) -> Bit {
        self.bit
    }

    fn architecture(&self) -> Architecture {
        self.architecture
    }

    fn is_modern_windows(&self) -> bool {
        self.modern_windows
    }
}

/// A fixed host description, for tests and command-line overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticEnvironment {
    pub platform: Platform,
    pub bit: Bit,
    pub architecture: Architecture,
    pub modern_windows: bool,
}

impl StaticEnvironment {
    pub fn new(platform: Platform, bit: Bit) -> Self {
        Self {
            platform,
            bit,
            architecture: Architecture::Unknown,
            modern_windows: platform == Platform::Windows,
        }
    }

    /// Copies the host description of another environment.
    pub fn from_host(host: &dyn HostEnvironment) -> Self {
        Self {
            platform: host.platform(),
            bit: host.bit(),
            architecture: host.architecture(),
            modern_windows: host.is_modern_windows(),
        }
    }
}

impl HostEnvironment for StaticEnvironment {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn bit(&self) -> Bit {
        self.bit
    }

    fn architecture(&self) -> Architecture {
        self.architecture
    }

    fn is_modern_windows(&self) -> bool {
        self.platform == Platform::Windows && self.modern_windows
    }
}

fn platform_from_os(os: &str) -> Platform {
    match os {
        "windows" => Platform::Windows,
        "macos" | "ios" => Platform::Mac,
        _ => Platform::Linux,
    }
}

fn bit_from_arch(arch: &str) -> Bit {
    match arch {
        "x86" | "arm" | "mips" | "powerpc" | "sparc" | "m68k" | "csky" | "hexagon" => Bit::B32,
        _ => Bit::B64,
    }
}

fn architecture_from_arch(arch: &str) -> Architecture {
    match arch {
        "x86" => Architecture::X86,
        "x86_64" => Architecture::Amd64,
        "aarch64" => Architecture::Arm64,
        _ => Architecture::Unknown,
    }
}

#[cfg(windows)]
fn detect_modern_windows() -> bool {
    std::process::Command::new("cmd")
        .args(["/C", "ver"])
        .output()
        .ok()
        .and_then(|out| parse_windows_major(&String::from_utf8_lossy(&out.stdout)))
        .is_some_and(|major| major >= MODERN_WINDOWS_MAJOR)
}

#[cfg(not(windows))]
fn detect_modern_windows() -> bool {
    false
}

/// Extracts the major version from `ver` output such as
/// `Microsoft Windows [Version 10.0.19045.3570]`.
#[cfg_attr(not(any(windows, test)), allow(dead_code))]
fn parse_windows_major(output: &str) -> Option<u32> {
    let start = output.find("Version ")? + "Version ".len();
    output[start..]
        .split(|c: char| !c.is_ascii_digit())
        .next()?
        .parse()
        .ok()
}

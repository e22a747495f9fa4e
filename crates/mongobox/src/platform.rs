//! Pure mappings from `(os, arch)` to executable names and mongod arguments.

use std::path::Path;

use crate::error::{Error, Result};

pub const LOOPBACK: &str = "127.0.0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Windows,
    MacOs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86,
    X86_64,
    Arm,
    Aarch64,
}

impl Arch {
    pub fn is_64bit(self) -> bool {
        matches!(self, Arch::X86_64 | Arch::Aarch64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn current() -> Result<Self> {
        Self::from_consts(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn from_consts(os: &str, arch: &str) -> Result<Self> {
        let unsupported = || Error::PlatformUnsupported {
            os: os.to_string(),
            arch: arch.to_string(),
        };
        let os_kind = match os {
            "linux" => Os::Linux,
            "windows" => Os::Windows,
            "macos" => Os::MacOs,
            _ => return Err(unsupported()),
        };
        let arch_kind = match arch {
            "x86" => Arch::X86,
            "x86_64" => Arch::X86_64,
            "arm" => Arch::Arm,
            "aarch64" => Arch::Aarch64,
            _ => return Err(unsupported()),
        };
        Ok(Self {
            os: os_kind,
            arch: arch_kind,
        })
    }

    pub fn exe_suffix(self) -> &'static str {
        match self.os {
            Os::Windows => ".exe",
            Os::Linux | Os::MacOs => "",
        }
    }

    /// Bundled binary name, `{os}.mongod_{major}_{arch}[.exe]`.
    pub fn bundled_name(self, major: u32) -> Result<String> {
        let os = match self.os {
            Os::Linux => "linux",
            Os::Windows => "win",
            Os::MacOs => "osx",
        };
        let arch = match (self.os, self.arch) {
            (Os::Linux, Arch::X86_64) => "x86-64",
            (Os::Linux, Arch::Aarch64) => "arm64",
            (Os::Windows, Arch::X86_64) => "x64",
            (Os::Windows, Arch::X86) => "x86",
            (Os::Windows, Arch::Aarch64) => "arm64",
            (Os::MacOs, Arch::X86_64) => "x64",
            (Os::MacOs, Arch::Aarch64) => "arm64",
            _ => {
                return Err(Error::PlatformUnsupported {
                    os: format!("{:?}", self.os).to_ascii_lowercase(),
                    arch: format!("{:?}", self.arch).to_ascii_lowercase(),
                });
            }
        };
        Ok(format!("{os}.mongod_{major}_{arch}{}", self.exe_suffix()))
    }

    /// File name of the copy placed into an instance workspace.
    pub fn staged_file_name(self, name: &str) -> String {
        format!("{name}{}", self.exe_suffix())
    }
}

/// mongod command line for an instance.
///
/// 32-bit hosts fall back to the mmapv1 engine with small files. A configured
/// log path enables journaling and file logging at `<log_path>.log`.
pub fn launch_args(arch: Arch, db_path: &Path, port: u16, log_path: Option<&Path>) -> Vec<String> {
    let mut args = vec!["--dbpath".to_string(), db_path.display().to_string()];
    if !arch.is_64bit() {
        args.push("--smallfiles".to_string());
    }
    args.push("--bind_ip".to_string());
    args.push(LOOPBACK.to_string());
    if !arch.is_64bit() {
        args.push("--storageEngine=mmapv1".to_string());
    }
    args.push("--port".to_string());
    args.push(port.to_string());

    if let Some(log_path) = log_path {
        args.push("--journal".to_string());
        args.push("--logpath".to_string());
        args.push(format!("{}.log", log_path.display()));
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_platforms() {
        let p = Platform::from_consts("linux", "x86_64").unwrap();
        assert_eq!(p.os, Os::Linux);
        assert_eq!(p.arch, Arch::X86_64);
    }

    #[test]
    fn rejects_unknown_platforms() {
        let err = Platform::from_consts("freebsd", "x86_64").unwrap_err();
        assert!(matches!(err, Error::PlatformUnsupported { .. }));
        let err = Platform::from_consts("linux", "riscv64").unwrap_err();
        assert!(err.to_string().contains("riscv64"));
    }

    #[test]
    fn bundled_names_follow_convention() {
        let linux = Platform::from_consts("linux", "x86_64").unwrap();
        assert_eq!(linux.bundled_name(6).unwrap(), "linux.mongod_6_x86-64");
        let win = Platform::from_consts("windows", "x86_64").unwrap();
        assert_eq!(win.bundled_name(5).unwrap(), "win.mongod_5_x64.exe");
        let mac = Platform::from_consts("macos", "aarch64").unwrap();
        assert_eq!(mac.bundled_name(6).unwrap(), "osx.mongod_6_arm64");
    }

    #[test]
    fn bundled_name_rejects_unbuilt_combinations() {
        let p = Platform::from_consts("linux", "arm").unwrap();
        assert!(matches!(
            p.bundled_name(6),
            Err(Error::PlatformUnsupported { .. })
        ));
    }

    #[test]
    fn staged_name_gets_exe_suffix_on_windows_only() {
        let win = Platform::from_consts("windows", "x86_64").unwrap();
        let linux = Platform::from_consts("linux", "x86_64").unwrap();
        assert_eq!(win.staged_file_name("abc1234"), "abc1234.exe");
        assert_eq!(linux.staged_file_name("abc1234"), "abc1234");
    }

    #[test]
    fn launch_args_64bit() {
        let args = launch_args(Arch::X86_64, Path::new("/w/db"), 40001, None);
        assert_eq!(
            args.join(" "),
            "--dbpath /w/db --bind_ip 127.0.0.1 --port 40001"
        );
    }

    #[test]
    fn launch_args_32bit_use_mmapv1() {
        let args = launch_args(Arch::X86, Path::new("/w/db"), 40001, None);
        assert_eq!(
            args.join(" "),
            "--dbpath /w/db --smallfiles --bind_ip 127.0.0.1 --storageEngine=mmapv1 --port 40001"
        );
    }

    #[test]
    fn launch_args_with_log_path() {
        let args = launch_args(
            Arch::Aarch64,
            Path::new("/w/db"),
            40001,
            Some(Path::new("/var/log/mongobox")),
        );
        assert_eq!(
            args.join(" "),
            "--dbpath /w/db --bind_ip 127.0.0.1 --port 40001 --journal --logpath /var/log/mongobox.log"
        );
    }
}

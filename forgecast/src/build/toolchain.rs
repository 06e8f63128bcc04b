//! Cross-C-toolchain discovery for the default native builder.
//!
//! When the target OS/arch differs from the host, a CGO-enabled native
//! build needs a C compiler that produces code for the target, not the
//! host. This module is the pure-function resolution procedure; nothing
//! here runs a build, it only decides which `cc`/`cxx` binaries (if any)
//! to put in the child environment.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;

use crate::errors::{ForgecastError, Result};

/// One resolved cross-compiler pair, or "no override needed" when
/// building natively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainResolution {
    /// Host and target match; don't touch `CC`/`CXX`.
    Native,
    /// Use these binaries (by name or absolute path) as `CC`/`CXX`.
    Cross { cc: String, cxx: Option<String> },
}

/// User-configurable overrides consulted before any built-in probing.
#[derive(Debug, Clone, Default)]
pub struct ToolchainConfig {
    /// Explicit `target_key -> compiler binary` overrides, checked first.
    pub cross_compilers: BTreeMap<String, String>,
    /// An explicit `CC` to use for every cross target that isn't covered
    /// by `cross_compilers`.
    pub cc: Option<String>,
    /// An explicit `CXX`, paired with `cc`.
    pub cxx: Option<String>,
}

/// Built-in `(os, arch) -> candidate prefixes` table, most to least
/// specific, checked in order; the first binary found on `PATH` wins.
/// Modeled on the common Linux cross-toolchain package naming scheme.
fn builtin_prefixes(target_os: &str, target_arch: &str) -> &'static [&'static str] {
    match (target_os, target_arch) {
        ("windows", "amd64") => &["x86_64-w64-mingw32-gcc"],
        ("windows", "386") => &["i686-w64-mingw32-gcc"],
        ("linux", "arm64") => &["aarch64-linux-gnu-gcc"],
        ("linux", "arm") => &["arm-linux-gnueabihf-gcc"],
        ("linux", "amd64") => &["x86_64-linux-gnu-gcc"],
        ("darwin", "amd64") => &["o64-clang", "x86_64-apple-darwin-clang"],
        ("darwin", "arm64") => &["oa64-clang", "aarch64-apple-darwin-clang"],
        _ => &[],
    }
}

/// A tool that can, given a target triple, drive some generic
/// cross-compiler front-end (step 5/6 of the resolution procedure). The
/// default implementation looks for `zig` on `PATH`, since `zig cc
/// --target=<triple>` is the closest thing to a true "universal" C
/// cross-compiler available as a single static binary.
pub trait UniversalCrossTool {
    /// The name of the front-end binary, for error messages.
    fn name(&self) -> &str;
    /// Whether the front-end binary is present on `PATH`.
    fn is_available(&self) -> bool;
    /// The target triple this front-end expects, e.g.
    /// `x86_64-windows-gnu` for zig.
    fn target_triple(&self, target_os: &str, target_arch: &str) -> Option<String>;
}

/// The default [`UniversalCrossTool`]: `zig cc`.
pub struct ZigCc;

impl UniversalCrossTool for ZigCc {
    fn name(&self) -> &str {
        "zig"
    }

    fn is_available(&self) -> bool {
        which::which("zig").is_ok()
    }

    fn target_triple(&self, target_os: &str, target_arch: &str) -> Option<String> {
        let arch = match target_arch {
            "amd64" => "x86_64",
            "arm64" => "aarch64",
            "386" => "x86",
            other => other,
        };
        let os = match target_os {
            "darwin" => "macos",
            other => other,
        };
        Some(format!("{arch}-{os}"))
    }
}

/// Resolve the `CC`/`CXX` pair to use for `target_key` (`"{os}_{arch}"`),
/// following the seven-step procedure: host match, explicit per-target
/// override, explicit global `cc`/`cxx`, built-in prefix table, a
/// generated universal-cross wrapper script, one best-effort install
/// attempt (left to the caller; this function only signals that a
/// wrapper couldn't be generated), and finally `ToolchainMissing`.
pub fn resolve(
    config: &ToolchainConfig,
    host_os: &str,
    host_arch: &str,
    target_os: &str,
    target_arch: &str,
    wrapper_dir: &Utf8PathBuf,
    universal: &dyn UniversalCrossTool,
) -> Result<ToolchainResolution> {
    let target_key = format!("{target_os}_{target_arch}");

    // 1. host == target: no override.
    if target_os == host_os && target_arch == host_arch {
        return Ok(ToolchainResolution::Native);
    }

    // 2. explicit per-target override.
    if let Some(binary) = config.cross_compilers.get(&target_key) {
        return if which::which(binary).is_ok() {
            Ok(ToolchainResolution::Cross { cc: binary.clone(), cxx: None })
        } else {
            Err(missing(&target_key, &format!("install the configured cross compiler {binary:?}")))
        };
    }

    // 3. explicit global cc/cxx.
    if let Some(cc) = &config.cc {
        return Ok(ToolchainResolution::Cross { cc: cc.clone(), cxx: config.cxx.clone() });
    }

    // 4. built-in prefix table.
    for candidate in builtin_prefixes(target_os, target_arch) {
        if which::which(candidate).is_ok() {
            return Ok(ToolchainResolution::Cross { cc: candidate.to_string(), cxx: None });
        }
    }

    // 5/6. universal cross fallback, generating a deterministic wrapper
    // script once per (target, tool) pair so repeated runs reuse it.
    if universal.is_available() {
        if let Some(triple) = universal.target_triple(target_os, target_arch) {
            let wrapper = generate_wrapper(wrapper_dir, universal.name(), &triple)?;
            return Ok(ToolchainResolution::Cross { cc: wrapper.to_string(), cxx: None });
        }
    }

    // 7. nothing worked.
    Err(missing(
        &target_key,
        &format!("install a cross compiler for {target_key} (e.g. a {target_os}/{target_arch} gcc, or zig)"),
    ))
}

fn missing(target_key: &str, remediation: &str) -> ForgecastError {
    ForgecastError::ToolchainMissing { target_key: target_key.to_owned(), remediation: remediation.to_owned() }
}

/// Write (if not already present) a tiny shell script in `wrapper_dir`
/// that invokes `zig cc --target=<triple>` with its own arguments
/// forwarded, so downstream code can treat it as a plain `cc` binary.
/// The filename is deterministic from `(tool, triple)` so concurrent or
/// repeated runs converge on the same file instead of racing to create
/// distinct ones.
fn generate_wrapper(wrapper_dir: &Utf8PathBuf, tool: &str, triple: &str) -> Result<Utf8PathBuf> {
    std::fs::create_dir_all(wrapper_dir).map_err(|e| ForgecastError::io(wrapper_dir.clone(), e))?;
    let filename = format!("forgecast-cross-{tool}-{}.sh", triple.replace(['/', ' '], "_"));
    let path = wrapper_dir.join(filename);
    if !path.exists() {
        let script = format!("#!/bin/sh\nexec {tool} cc --target={triple} \"$@\"\n");
        std::fs::write(&path, script).map_err(|e| ForgecastError::io(path.clone(), e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path).map_err(|e| ForgecastError::io(path.clone(), e))?.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).map_err(|e| ForgecastError::io(path.clone(), e))?;
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAvailable;
    impl UniversalCrossTool for AlwaysAvailable {
        fn name(&self) -> &str {
            "fake-universal-cc"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn target_triple(&self, target_os: &str, target_arch: &str) -> Option<String> {
            Some(format!("{target_arch}-{target_os}"))
        }
    }

    struct NeverAvailable;
    impl UniversalCrossTool for NeverAvailable {
        fn name(&self) -> &str {
            "absent-tool"
        }
        fn is_available(&self) -> bool {
            false
        }
        fn target_triple(&self, _: &str, _: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn host_matching_target_needs_no_override() {
        let config = ToolchainConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let wrapper_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let result = resolve(&config, "linux", "amd64", "linux", "amd64", &wrapper_dir, &NeverAvailable).unwrap();
        assert_eq!(result, ToolchainResolution::Native);
    }

    #[test]
    fn explicit_override_to_missing_binary_fails() {
        let mut config = ToolchainConfig::default();
        config.cross_compilers.insert("windows_amd64".into(), "definitely-not-a-real-binary".into());
        let dir = tempfile::tempdir().unwrap();
        let wrapper_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let result = resolve(&config, "linux", "amd64", "windows", "amd64", &wrapper_dir, &NeverAvailable);
        assert!(matches!(result, Err(ForgecastError::ToolchainMissing { .. })));
    }

    #[test]
    fn explicit_global_cc_is_used_when_no_per_target_override() {
        let config = ToolchainConfig { cc: Some("my-cc".into()), cxx: Some("my-cxx".into()), ..Default::default() };
        let dir = tempfile::tempdir().unwrap();
        let wrapper_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let result = resolve(&config, "linux", "amd64", "windows", "amd64", &wrapper_dir, &NeverAvailable).unwrap();
        assert_eq!(result, ToolchainResolution::Cross { cc: "my-cc".into(), cxx: Some("my-cxx".into()) });
    }

    #[test]
    fn falls_back_to_universal_cross_wrapper_and_reuses_it() {
        let config = ToolchainConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let wrapper_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let first = resolve(&config, "linux", "amd64", "freebsd", "riscv64", &wrapper_dir, &AlwaysAvailable).unwrap();
        let second = resolve(&config, "linux", "amd64", "freebsd", "riscv64", &wrapper_dir, &AlwaysAvailable).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn nothing_available_fails_with_toolchain_missing() {
        let config = ToolchainConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let wrapper_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let result = resolve(&config, "linux", "amd64", "plan9", "amd64", &wrapper_dir, &NeverAvailable);
        assert!(matches!(result, Err(ForgecastError::ToolchainMissing { target_key, .. }) if target_key == "plan9_amd64"));
    }
}

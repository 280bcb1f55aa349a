//! Shared utilities for E2E tests.

use std::path::PathBuf;

/// Get binary paths (permcheck, mock-controller)
/// Works with both regular and llvm-cov target directories
pub fn get_binary_paths() -> Result<(PathBuf, PathBuf), Box<dyn std::error::Error>> {
    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf();

    let bin_dir = if let Ok(llvm_cov_target) = std::env::var("CARGO_LLVM_COV_TARGET_DIR") {
        PathBuf::from(llvm_cov_target).join("debug")
    } else if let Ok(cargo_target) = std::env::var("CARGO_TARGET_DIR") {
        PathBuf::from(cargo_target).join("debug")
    } else {
        workspace_root.join("target").join("debug")
    };

    let permcheck_bin = bin_dir.join(if cfg!(windows) {
        "permcheck.exe"
    } else {
        "permcheck"
    });
    let controller_bin = bin_dir.join(if cfg!(windows) {
        "mock-controller.exe"
    } else {
        "mock-controller"
    });

    if !permcheck_bin.exists() || !controller_bin.exists() {
        return Err(format!(
            "Binaries not found. Please run 'cargo build --bins' first.\n  Expected: {}\n  Expected: {}",
            permcheck_bin.display(),
            controller_bin.display()
        )
        .into());
    }

    Ok((permcheck_bin, controller_bin))
}

/// Whether a process with `pid` still exists.
#[cfg(unix)]
#[allow(dead_code)]
pub fn process_exists(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Extract the registration token from `add-user` output.
#[allow(dead_code)]
pub fn parse_token(output: &str) -> Option<String> {
    permcheck_core::parse_registration_token(output)
}

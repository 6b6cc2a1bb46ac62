//! Helpers shared by the subprocess adapter tests

use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script named `name` into `dir` and return its path
pub fn fake_binary(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

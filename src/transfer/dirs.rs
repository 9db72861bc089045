use crate::ssh::remote::{split_remote, RemoteHost};
use anyhow::Result;
use log::debug;

/// Create every missing component of `path` and leave the remote working
/// directory there.
pub fn ensure_remote_dir<H: RemoteHost + ?Sized>(host: &H, path: &str) -> Result<()> {
    if path == "/" {
        return host.chdir("/");
    }
    if path.is_empty() {
        return Ok(());
    }
    if host.chdir(path).is_ok() {
        return Ok(());
    }

    let (parent, leaf) = split_remote(path.trim_end_matches('/'));
    ensure_remote_dir(host, parent)?;
    debug!("Creating remote directory {}", path);
    host.mkdir(leaf)?;
    host.chdir(leaf)
}

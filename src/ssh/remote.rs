use anyhow::Result;
use std::io::Write;

/// Everything the upload pipeline needs from the remote host.
///
/// Relative paths are resolved against the working directory set by
/// [`RemoteHost::chdir`].
pub trait RemoteHost {
    /// Run a shell command and return its whole standard output.
    fn exec(&self, command: &str) -> Result<String>;

    /// Change the remote working directory; fails if `path` is not a directory.
    fn chdir(&self, path: &str) -> Result<()>;

    fn mkdir(&self, path: &str) -> Result<()>;

    /// Create or truncate a remote file for writing.
    fn create(&self, path: &str) -> Result<Box<dyn Write + '_>>;

    fn remove(&self, path: &str) -> Result<()>;

    fn chmod(&self, path: &str, mode: u32) -> Result<()>;

    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()>;

    /// Tear down the connection.
    fn close(&self) -> Result<()>;
}

/// Join a remote directory and a name with a single separator.
pub fn join_remote(base: &str, name: &str) -> String {
    if base.is_empty() || name.starts_with('/') {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Split a remote path into its parent and last component.
pub fn split_remote(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => {
            let head = &path[..=idx];
            let trimmed = head.trim_end_matches('/');
            let parent = if trimmed.is_empty() { head } else { trimmed };
            (parent, &path[idx + 1..])
        }
        None => ("", path),
    }
}

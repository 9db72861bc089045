// SSH client wrapper: one authenticated session and its SFTP channel
use crate::config::ConnectionSettings;
use crate::ssh::remote::{join_remote, RemoteHost};
use crate::utils::error::TransferError;
use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use ssh2::{CheckResult, FileStat, KnownHostFileKind, Session, Sftp};
use std::cell::RefCell;
use std::io::prelude::*;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;

const DIR_MODE: i32 = 0o755;

pub struct SshClient {
    session: Session,
    sftp: Sftp,
    cwd: RefCell<Option<String>>,
}

impl SshClient {
    /// Connect and authenticate with `password`.
    ///
    /// A rejected password yields [`TransferError::AuthenticationFailed`]; any
    /// other failure is a plain transport error.
    pub fn connect(settings: &ConnectionSettings, password: &str) -> Result<Self> {
        let tcp = connect_tcp(settings)?;

        let mut session = Session::new().context("Failed to create SSH session")?;
        session.set_timeout(settings.timeout.as_millis().min(u32::MAX as u128) as u32);
        session.set_tcp_stream(tcp);
        session.handshake().context("SSH handshake failed")?;
        verify_host_key(&session, &settings.host, settings.port)?;

        if let Err(e) = session.userauth_password(&settings.user, password) {
            debug!("Password authentication rejected: {}", e);
            return Err(TransferError::AuthenticationFailed.into());
        }
        if !session.authenticated() {
            return Err(TransferError::AuthenticationFailed.into());
        }

        // the timeout only guards connection setup
        session.set_timeout(0);
        let sftp = session.sftp().context("Failed to create SFTP session")?;

        Ok(SshClient {
            session,
            sftp,
            cwd: RefCell::new(None),
        })
    }

    fn resolve(&self, path: &str) -> String {
        match self.cwd.borrow().as_deref() {
            Some(cwd) => join_remote(cwd, path),
            None => path.to_string(),
        }
    }

    fn setstat(&self, path: &str, stat: FileStat) -> Result<()> {
        let target = self.resolve(path);
        self.sftp
            .setstat(Path::new(&target), stat)
            .with_context(|| format!("Failed to change attributes of {}", target))
    }
}

fn connect_tcp(settings: &ConnectionSettings) -> Result<TcpStream> {
    let addrs = (settings.host.as_str(), settings.port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve {}:{}", settings.host, settings.port))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, settings.timeout) {
            Ok(tcp) => return Ok(tcp),
            Err(e) => {
                debug!("Connection to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    let context = format!("Failed to connect to {}:{}", settings.host, settings.port);
    match last_error {
        Some(e) => Err(anyhow::Error::from(e).context(context)),
        None => Err(anyhow!("No address found for {}", settings.host)),
    }
}

/// Check the server key against `~/.ssh/known_hosts`.
///
/// Unknown hosts are accepted for this session only; the file is never
/// written. A key that differs from a recorded one aborts the connection.
fn verify_host_key(session: &Session, host: &str, port: u16) -> Result<()> {
    let mut known_hosts = session.known_hosts().context("Failed to load known hosts")?;
    if let Some(home) = home::home_dir() {
        let path = home.join(".ssh").join("known_hosts");
        if let Err(e) = known_hosts.read_file(&path, KnownHostFileKind::OpenSSH) {
            debug!("Could not read {}: {}", path.display(), e);
        }
    }

    let (key, _) = session
        .host_key()
        .ok_or_else(|| anyhow!("Server {} sent no host key", host))?;
    host_key_verdict(host, known_hosts.check_port(host, port, key))
}

fn host_key_verdict(host: &str, check: CheckResult) -> Result<()> {
    match check {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => {
            info!("Host {} is not in known_hosts, accepting its key", host);
            Ok(())
        }
        CheckResult::Mismatch => Err(TransferError::HostKeyMismatch { host: host.to_string() }.into()),
        CheckResult::Failure => Err(anyhow!("Failed to check the host key of {}", host)),
    }
}

fn empty_stat() -> FileStat {
    FileStat {
        size: None,
        uid: None,
        gid: None,
        perm: None,
        atime: None,
        mtime: None,
    }
}

impl RemoteHost for SshClient {
    /// Run `command` through the remote shell and return its stdout.
    ///
    /// A non-zero exit status is a [`TransferError::CommandFailed`] carrying
    /// the command's stderr.
    fn exec(&self, command: &str) -> Result<String> {
        debug!("Running `{}`", command);
        let mut channel = self.session.channel_session()
            .context("Failed to open an exec channel")?;
        channel.exec(command)
            .with_context(|| format!("Failed to start `{}`", command))?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)
            .with_context(|| format!("Failed to read the output of `{}`", command))?;
        let mut stderr = String::new();
        if let Err(e) = channel.stderr().read_to_string(&mut stderr) {
            warn!("Failed to read stderr of `{}`: {}", command, e);
        }

        channel.wait_close()
            .with_context(|| format!("`{}` did not terminate cleanly", command))?;
        let status = channel.exit_status()
            .with_context(|| format!("No exit status for `{}`", command))?;

        let stderr = stderr.trim().to_string();
        if status != 0 {
            return Err(TransferError::CommandFailed {
                command: command.to_string(),
                status,
                stderr,
            }
            .into());
        }
        if !stderr.is_empty() {
            debug!("`{}` stderr: {}", command, stderr);
        }
        Ok(stdout)
    }

    fn chdir(&self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        let stat = self
            .sftp
            .stat(Path::new(&target))
            .with_context(|| format!("No such directory: {}", target))?;
        if !stat.is_dir() {
            return Err(TransferError::NotADirectory { path: target }.into());
        }
        let absolute = self
            .sftp
            .realpath(Path::new(&target))
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or(target);
        *self.cwd.borrow_mut() = Some(absolute);
        Ok(())
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        self.sftp
            .mkdir(Path::new(&target), DIR_MODE)
            .with_context(|| format!("Failed to create directory {}", target))
    }

    fn create(&self, path: &str) -> Result<Box<dyn Write + '_>> {
        let target = self.resolve(path);
        let file = self
            .sftp
            .create(Path::new(&target))
            .with_context(|| format!("Failed to create remote file {}", target))?;
        Ok(Box::new(file))
    }

    fn remove(&self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        self.sftp
            .unlink(Path::new(&target))
            .with_context(|| format!("Failed to remove {}", target))
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        self.setstat(
            path,
            FileStat {
                perm: Some(mode),
                ..empty_stat()
            },
        )
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        self.setstat(
            path,
            FileStat {
                uid: Some(uid),
                gid: Some(gid),
                ..empty_stat()
            },
        )
    }

    fn close(&self) -> Result<()> {
        self.session
            .disconnect(None, "Upload finished", None)
            .context("Failed to close SSH session")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_mismatch(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::HostKeyMismatch { .. })
        )
    }

    #[test]
    fn falls_through_to_a_listening_address() {
        // `localhost` may resolve to ::1 first; only 127.0.0.1 listens here
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let settings = ConnectionSettings {
            host: "localhost".to_string(),
            port: listener.local_addr().unwrap().port(),
            user: "alice".to_string(),
            password: None,
            timeout: std::time::Duration::from_secs(2),
        };

        let tcp = connect_tcp(&settings).unwrap();
        assert_eq!(tcp.peer_addr().unwrap(), listener.local_addr().unwrap());
    }

    #[test]
    fn known_and_new_hosts_are_accepted() {
        assert!(host_key_verdict("example.org", CheckResult::Match).is_ok());
        assert!(host_key_verdict("example.org", CheckResult::NotFound).is_ok());
    }

    #[test]
    fn changed_host_key_is_refused() {
        let err = host_key_verdict("example.org", CheckResult::Mismatch).unwrap_err();
        assert!(is_mismatch(&err));
        assert!(err.to_string().contains("example.org"));

        let err = host_key_verdict("example.org", CheckResult::Failure).unwrap_err();
        assert!(!is_mismatch(&err));
    }
}

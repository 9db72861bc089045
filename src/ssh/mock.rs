// In-memory remote host for tests
use super::remote::{join_remote, RemoteHost};
use crate::utils::error::TransferError;
use crate::utils::interrupt::Interrupt;
use anyhow::{bail, Result};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

#[derive(Default)]
pub struct MockState {
    pub cwd: String,
    pub dirs: BTreeSet<String>,
    pub files: BTreeMap<String, Vec<u8>>,
    pub modes: BTreeMap<String, u32>,
    pub owners: BTreeMap<String, (u32, u32)>,
    pub ids: BTreeMap<String, u32>,
    /// Canned stdout for exact commands.
    pub replies: BTreeMap<String, String>,
    /// Commands containing any of these exit with status 1.
    pub failing: Vec<String>,
    pub fail_remove: bool,
    pub commands: Vec<String>,
    pub mkdirs: Vec<String>,
    pub removed: Vec<String>,
    pub closed: usize,
}

#[derive(Default)]
pub struct MockHost {
    pub state: RefCell<MockState>,
    /// Raise the interrupt once this many bytes have been written.
    pub interrupt_after: Option<(usize, Interrupt)>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::with_dirs(&[])
    }

    pub fn with_dirs(dirs: &[&str]) -> Self {
        let host = MockHost::default();
        {
            let mut state = host.state.borrow_mut();
            state.cwd = "/".to_string();
            state.dirs.insert("/".to_string());
            for dir in dirs {
                state.dirs.insert(normalize(dir));
            }
            state.ids.insert("www-data".to_string(), 33);
            state.ids.insert("alice".to_string(), 1000);
        }
        host
    }

    fn resolve(&self, path: &str) -> String {
        let cwd = self.state.borrow().cwd.clone();
        normalize(&join_remote(&cwd, path))
    }

    fn parent_exists(&self, path: &str) -> bool {
        let parent = match path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
            None => return false,
        };
        self.state.borrow().dirs.contains(&parent)
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.borrow().files.get(path).cloned()
    }

    pub fn fail_commands_containing(&self, needle: &str) {
        self.state.borrow_mut().failing.push(needle.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }
}

fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    format!("/{}", parts.join("/"))
}

impl RemoteHost for MockHost {
    fn exec(&self, command: &str) -> Result<String> {
        let mut state = self.state.borrow_mut();
        state.commands.push(command.to_string());
        let failed = |stderr: String| TransferError::CommandFailed {
            command: command.to_string(),
            status: 1,
            stderr,
        };
        if state.failing.iter().any(|needle| command.contains(needle.as_str())) {
            return Err(failed("refused".to_string()).into());
        }
        if let Some(reply) = state.replies.get(command) {
            return Ok(reply.clone());
        }
        let words = shlex::split(command).unwrap_or_default();
        match words.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["id", "-g" | "-u", name] => match state.ids.get(*name) {
                Some(id) => Ok(format!("{}\n", id)),
                None => Err(failed(format!("id: '{}': no such user", name)).into()),
            },
            _ => Ok(String::new()),
        }
    }

    fn chdir(&self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        let mut state = self.state.borrow_mut();
        if !state.dirs.contains(&target) {
            bail!("No such file: {}", target);
        }
        state.cwd = target;
        Ok(())
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        if !self.parent_exists(&target) {
            bail!("No such file: {}", target);
        }
        let mut state = self.state.borrow_mut();
        if !state.dirs.insert(target.clone()) {
            bail!("Failure: {} exists", target);
        }
        state.mkdirs.push(target);
        Ok(())
    }

    fn create(&self, path: &str) -> Result<Box<dyn Write + '_>> {
        let target = self.resolve(path);
        if !self.parent_exists(&target) {
            bail!("No such file: {}", target);
        }
        self.state.borrow_mut().files.insert(target.clone(), Vec::new());
        Ok(Box::new(MockWriter {
            host: self,
            path: target,
            written: 0,
        }))
    }

    fn remove(&self, path: &str) -> Result<()> {
        let target = self.resolve(path);
        let mut state = self.state.borrow_mut();
        if state.fail_remove {
            bail!("Permission denied: {}", target);
        }
        if state.files.remove(&target).is_none() {
            bail!("No such file: {}", target);
        }
        state.removed.push(target);
        Ok(())
    }

    fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let target = self.resolve(path);
        self.state.borrow_mut().modes.insert(target, mode);
        Ok(())
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        let target = self.resolve(path);
        self.state.borrow_mut().owners.insert(target, (uid, gid));
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.state.borrow_mut().closed += 1;
        Ok(())
    }
}

struct MockWriter<'a> {
    host: &'a MockHost,
    path: String,
    written: usize,
}

impl Write for MockWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.host
            .state
            .borrow_mut()
            .files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        self.written += buf.len();
        if let Some((limit, interrupt)) = &self.host.interrupt_after {
            if self.written >= *limit {
                interrupt.request();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

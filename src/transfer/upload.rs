// Upload of a single file to the rule's destination
use crate::config::Rule;
use crate::ssh::remote::{join_remote, RemoteHost};
use crate::transfer::dirs::ensure_remote_dir;
use crate::transfer::naming;
use crate::transfer::progress::ProgressTracker;
use crate::utils::error::TransferError;
use crate::utils::interrupt::Interrupt;
use anyhow::{Context, Result};
use log::{info, warn};
use rand::Rng;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

const CHUNK_SIZE: usize = 32 * 1024;

pub struct Uploader<'a, H: RemoteHost + ?Sized> {
    host: &'a H,
    rule: &'a Rule,
    interrupt: &'a Interrupt,
    show_progress: bool,
}

impl<'a, H: RemoteHost + ?Sized> Uploader<'a, H> {
    pub fn new(host: &'a H, rule: &'a Rule, interrupt: &'a Interrupt) -> Self {
        Self {
            host,
            rule,
            interrupt,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Upload `local_path` and return the remote path it was written to.
    pub fn put_file(&self, local_path: &Path) -> Result<String> {
        self.put_file_with(local_path, &mut rand::thread_rng())
    }

    pub fn put_file_with<R: Rng + ?Sized>(&self, local_path: &Path, rng: &mut R) -> Result<String> {
        let filename = naming::remote_filename(self.rule, local_path, rng)?;
        let final_path = join_remote(&self.rule.file_path, &filename);
        ensure_remote_dir(self.host, &self.rule.file_path)?;

        info!("Uploading: {}...", local_path.display());
        let _deferral = self.interrupt.defer();
        match self.transfer(local_path, &final_path) {
            Ok(bytes) => {
                info!("Uploaded {} bytes to {}", bytes, final_path);
                Ok(final_path)
            }
            Err(e) if is_interrupted(&e) => {
                warn!("Aborted, cleaning remote file");
                if let Err(cleanup) = self.host.remove(&final_path) {
                    warn!("Partial upload {} left behind: {:#}", final_path, cleanup);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn transfer(&self, local_path: &Path, remote_path: &str) -> Result<u64> {
        let mut local_file = File::open(local_path)
            .with_context(|| format!("Failed to open local file: {}", local_path.display()))?;
        let total = local_file.metadata()?.len();
        let mut remote_file = self.host.create(remote_path)?;

        let show_progress = self.show_progress;
        let mut tracker: Option<ProgressTracker> = None;
        let result = copy_with_progress(&mut local_file, &mut remote_file, total, self.interrupt, |done, total| {
            if show_progress {
                tracker
                    .get_or_insert_with(|| ProgressTracker::new(total))
                    .update(done);
            }
        });

        if let Some(tracker) = &tracker {
            match result {
                Ok(_) => tracker.finish(),
                Err(_) => tracker.abandon(),
            }
        }
        result
    }
}

/// Copy `reader` into `writer` block by block, reporting `(done, total)`
/// after each block and stopping as soon as an interrupt is requested.
pub fn copy_with_progress<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    total: u64,
    interrupt: &Interrupt,
    mut on_progress: F,
) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: FnMut(u64, u64),
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut transferred = 0u64;

    loop {
        if interrupt.is_requested() {
            return Err(TransferError::Interrupted.into());
        }
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer
            .write_all(&buffer[..bytes_read])
            .context("Failed to write to remote file")?;
        transferred += bytes_read as u64;
        on_progress(transferred, total);
    }

    writer.flush().context("Failed to flush remote file")?;
    Ok(transferred)
}

pub fn is_interrupted(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<TransferError>(), Some(TransferError::Interrupted))
}

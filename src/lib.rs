// Library root: module tree and the per-batch upload loop
pub mod cli;
pub mod config;
pub mod logger;
pub mod ssh;
pub mod transfer;
pub mod utils;

use anyhow::{Context, Result};
use config::Rule;
use log::warn;
use ssh::RemoteHost;
use std::io::Write;
use std::path::PathBuf;
use transfer::{policy, Uploader};
use utils::interrupt::Interrupt;

/// Upload every file of the batch through `host`, then close it.
///
/// Each successful upload prints the rule's return prefix followed by the
/// remote file name on `out`, when the rule has one.
pub fn run<H: RemoteHost + ?Sized>(
    host: &H,
    rule: &Rule,
    files: &[PathBuf],
    interrupt: &Interrupt,
    show_progress: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let result = upload_all(host, rule, files, interrupt, show_progress, out);
    if let Err(e) = host.close() {
        warn!("{:#}", e);
    }
    result
}

fn upload_all<H: RemoteHost + ?Sized>(
    host: &H,
    rule: &Rule,
    files: &[PathBuf],
    interrupt: &Interrupt,
    show_progress: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let uploader = Uploader::new(host, rule, interrupt).with_progress(show_progress);

    for file in files {
        let local_path = std::path::absolute(file)
            .with_context(|| format!("Invalid path: {}", file.display()))?;

        let final_path = uploader.put_file(&local_path)?;
        policy::set_file_mode(host, &final_path, rule.file_perm)?;
        policy::set_file_owner(host, &final_path, &rule.file_user, &rule.file_group)?;
        if rule.file_ttl != "0" {
            policy::schedule_deletion(host, &final_path, &rule.del_bin, &rule.file_ttl)?;
        }

        if let Some(prefix) = &rule.file_return {
            let (_, name) = ssh::remote::split_remote(&final_path);
            writeln!(out, "{}{}", prefix, name)?;
            out.flush()?;
        }
    }
    Ok(())
}

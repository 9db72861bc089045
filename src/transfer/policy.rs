// Post-upload policy: mode, ownership, scheduled deletion
use crate::ssh::remote::RemoteHost;
use crate::utils::error::TransferError;
use anyhow::{anyhow, Result};
use log::{info, warn};
use std::borrow::Cow;
use std::fmt;

pub fn set_file_mode<H: RemoteHost + ?Sized>(host: &H, remote_path: &str, mode: u32) -> Result<()> {
    info!("Changing permissions to {:04o}", mode);
    host.chmod(remote_path, mode)
}

/// Resolve `user` and `group` with `id` on the remote host, then chown.
pub fn set_file_owner<H: RemoteHost + ?Sized>(host: &H, remote_path: &str, user: &str, group: &str) -> Result<()> {
    let gid = remote_id(host, "-g", group)?;
    let uid = remote_id(host, "-u", user)?;
    info!("Set file owner to {}:{}", uid, gid);
    host.chown(remote_path, uid, gid)
}

fn remote_id<H: RemoteHost + ?Sized>(host: &H, flag: &str, name: &str) -> Result<u32> {
    let command = format!("id {} {}", flag, quote(name)?);
    let output = host.exec(&command)?;
    output.trim().parse().map_err(|_| {
        TransferError::InvalidRemoteId {
            command,
            output: output.trim().to_string(),
        }
        .into()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
}

impl TtlUnit {
    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'm' => Some(TtlUnit::Minutes),
            'h' => Some(TtlUnit::Hours),
            'd' => Some(TtlUnit::Days),
            'w' => Some(TtlUnit::Weeks),
            'M' => Some(TtlUnit::Months),
            _ => None,
        }
    }

    /// Unit keyword understood by `at`.
    pub fn keyword(self) -> &'static str {
        match self {
            TtlUnit::Minutes => "minutes",
            TtlUnit::Hours => "hours",
            TtlUnit::Days => "days",
            TtlUnit::Weeks => "weeks",
            TtlUnit::Months => "months",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttl {
    pub amount: u64,
    pub unit: TtlUnit,
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit.keyword())
    }
}

/// Parse `<digits><unit>`, e.g. `10d` or `5h`.
pub fn parse_ttl(value: &str) -> Option<Ttl> {
    let value = value.trim();
    let unit_letter = value.chars().last()?;
    let digits = &value[..value.len() - unit_letter.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(Ttl {
        amount: digits.parse().ok()?,
        unit: TtlUnit::from_letter(unit_letter)?,
    })
}

fn quote(word: &str) -> Result<Cow<'_, str>> {
    shlex::try_quote(word).map_err(|e| anyhow!("Cannot pass {:?} to the remote shell: {}", word, e))
}

/// Shell command queueing `<del_bin> <remote_path>` with `at`.
///
/// The path is quoted for the shell that runs the job, and the whole job is
/// quoted again for the shell that queues it. `del_bin` may carry arguments
/// and is left as configured.
pub fn deletion_command(del_bin: &str, remote_path: &str, ttl: Ttl) -> Result<String> {
    let job = format!("{} {}", del_bin, quote(remote_path)?);
    Ok(format!("printf '%s\\n' {} | at now + {}", quote(&job)?, ttl))
}

/// Ask the remote `at` daemon to delete the file once `ttl` has elapsed.
/// Returns whether a deletion was scheduled; a malformed TTL only warns.
pub fn schedule_deletion<H: RemoteHost + ?Sized>(
    host: &H,
    remote_path: &str,
    del_bin: &str,
    ttl: &str,
) -> Result<bool> {
    let Some(ttl) = parse_ttl(ttl) else {
        warn!("Invalid time specified ({:?}), file will not be deleted", ttl);
        return Ok(false);
    };

    info!("Set file deletion to now + {}", ttl);
    match host.exec(&deletion_command(del_bin, remote_path, ttl)?) {
        Ok(_) => Ok(true),
        Err(e) if is_command_failure(&e) => {
            warn!("Failed to schedule deletion of {}: {:#}", remote_path, e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn is_command_failure(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TransferError>(),
        Some(TransferError::CommandFailed { .. })
    )
}

// Remote filename policy
use crate::config::{NamingPolicy, Rule};
use crate::utils::file::checksum_file;
use anyhow::{anyhow, Result};
use log::info;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::Path;

/// Name the file will get under the rule's base path.
pub fn remote_filename<R: Rng + ?Sized>(rule: &Rule, local_path: &Path, rng: &mut R) -> Result<String> {
    let filename = local_path
        .file_name()
        .ok_or_else(|| anyhow!("Cannot determine file name of {}", local_path.display()))?
        .to_string_lossy()
        .into_owned();

    let remote_name = match rule.naming {
        NamingPolicy::Random { length } => random_filename(&filename, length, rng),
        NamingPolicy::Checksum(algorithm) => {
            info!("Calculating file checksum ({})...", algorithm);
            let digest = checksum_file(local_path, algorithm)?;
            format!("{}_{}", digest, filename)
        }
        NamingPolicy::Literal => filename,
    };

    info!("Filename on the host will be: {}", remote_name);
    Ok(remote_name)
}

/// Random alphanumeric stem, keeping everything after the first dot of
/// `original` as the extension.
pub fn random_filename<R: Rng + ?Sized>(original: &str, length: usize, rng: &mut R) -> String {
    let stem: String = rng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();

    match original.split_once('.') {
        Some((_, extension)) => format!("{}.{}", stem, extension),
        None => stem,
    }
}

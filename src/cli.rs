// Command-line parsing
use crate::utils::file::ChecksumAlgorithm;
use clap::{ArgAction, Args, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shup")]
#[command(about = "Upload files to a remote host over SFTP following a named rule")]
#[command(version)]
pub struct Cli {
    /// Rule to follow: host, destination folder, naming and TTL of the file
    #[arg(short = 'u', long, value_name = "name", default_value = "default")]
    pub rule: String,

    /// Files to upload
    #[arg(value_name = "file", required = true)]
    pub files: Vec<PathBuf>,

    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Binary used on the remote host to delete the file once its TTL is reached
    #[arg(short = 'd', long = "delwith", value_name = "path")]
    pub del_bin: Option<String>,

    /// Time the file stays on the remote host before deletion (e.g. 30m, 12h, 7d), 0 to keep it
    #[arg(short = 't', long = "ttl", value_name = "time")]
    pub file_ttl: Option<String>,

    /// File permissions in octal mode
    #[arg(short = 'p', long = "permissions", value_name = "perms")]
    pub file_perm: Option<String>,

    /// Prefix printed before the remote file name
    #[arg(short = 'l', long = "file-return", value_name = "ret")]
    pub file_return: Option<String>,

    #[command(flatten)]
    pub naming: NamingArgs,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
pub struct NamingArgs {
    /// Randomize the filename
    #[arg(short = 'r', long)]
    pub randomize: bool,

    /// Prefix the filename with its checksum (rule's file_cksum, SHA1 otherwise)
    #[arg(short = 'c')]
    pub cksum: bool,

    /// Like -c but with the given algorithm
    #[arg(long = "cksum", value_name = "algorithm", value_enum)]
    pub file_cksum_arg: Option<ChecksumAlgorithm>,
}

impl Cli {
    /// Options given on the command line, as rule overrides.
    pub fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        let optional = [
            ("del_bin", &self.del_bin),
            ("file_ttl", &self.file_ttl),
            ("file_perm", &self.file_perm),
            ("file_return", &self.file_return),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                overrides.push((key, value.clone()));
            }
        }
        if self.naming.randomize {
            overrides.push(("randomize", "true".to_string()));
        }
        if self.naming.cksum {
            overrides.push(("cksum", "true".to_string()));
        }
        if let Some(algorithm) = self.naming.file_cksum_arg {
            overrides.push(("file_cksum_arg", algorithm.name().to_string()));
        }
        overrides
    }

    pub fn show_progress(&self) -> bool {
        self.verbose > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_only_carry_given_options() {
        let cli = Cli::parse_from(["shup", "-t", "2h", "-r", "a.txt", "b.txt"]);
        assert_eq!(cli.rule, "default");
        assert_eq!(cli.files.len(), 2);
        assert_eq!(
            cli.overrides(),
            vec![("file_ttl", "2h".to_string()), ("randomize", "true".to_string())]
        );
    }

    #[test]
    fn checksum_algorithm_flag() {
        let cli = Cli::parse_from(["shup", "-u", "img", "-vv", "--cksum", "sha256", "a"]);
        assert_eq!(cli.rule, "img");
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.overrides(), vec![("file_cksum_arg", "sha256".to_string())]);
    }

    #[test]
    fn naming_flags_are_exclusive() {
        assert!(Cli::try_parse_from(["shup", "-r", "-c", "a"]).is_err());
        assert!(Cli::try_parse_from(["shup", "-c", "--cksum", "md5", "a"]).is_err());
        assert!(Cli::try_parse_from(["shup", "--cksum", "crc32", "a"]).is_err());
        assert!(Cli::try_parse_from(["shup"]).is_err());
    }
}

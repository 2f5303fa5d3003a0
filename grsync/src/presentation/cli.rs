use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Rsync-like cold storage backup", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// SQLite ledger recording completed archives
    #[arg(long, env = "GRSYNC_DB", default_value = "glacier.db", global = true)]
    pub db: PathBuf,

    /// Vault that receives the archives
    #[arg(long, env = "GRSYNC_VAULT", global = true)]
    pub vault: Option<String>,

    /// Root directory of the local archive store (used when no region is given)
    #[arg(long, env = "GRSYNC_STORE", default_value = "grsync-store", global = true)]
    pub store: PathBuf,

    /// AWS region of the Glacier vault; selects Glacier instead of the local store
    #[arg(long, env = "GRSYNC_REGION", global = true)]
    pub region: Option<String>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Args)]
pub struct BackupArgs {
    /// File or directory to archive
    pub src: PathBuf,

    /// Compress before upload
    #[arg(long)]
    pub compress: bool,

    /// Codec used with --compress; only zstd is supported
    #[arg(long, default_value = "zstd", value_name = "NAME")]
    pub codec: String,

    /// zstd compression level
    #[arg(long, default_value_t = 3)]
    pub level: i32,

    /// Starting part size in bytes (power-of-two multiple of 1 MiB)
    #[arg(long, default_value_t = 1024 * 1024)]
    pub part_size: u64,

    /// Free text stored in every archive description
    #[arg(long)]
    pub desc: Option<String>,

    /// Encrypt before upload (and before compression)
    #[arg(long)]
    pub encrypt: bool,

    /// URL-safe base64 of a 32-byte key
    #[arg(long, env = "GRSYNC_ENCRYPTION_KEY", hide_env_values = true, conflicts_with = "encryption_key_file")]
    pub encryption_key: Option<String>,

    /// File whose contents are the base64 key
    #[arg(long)]
    pub encryption_key_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Archive new or changed files under SRC
    Backup(BackupArgs),

    /// List incomplete multipart uploads in the vault
    ListUploads {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Abort incomplete multipart uploads
    AbortUploads {
        /// Upload ids to abort
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        upload_ids: Vec<String>,

        /// Abort every incomplete upload in the vault
        #[arg(long)]
        all: bool,
    },

    /// Show ledger records for a file
    History {
        path: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Create the vault (in Glacier with --region, else in the local store)
    CreateVault,

    /// Write a new encryption key file, or check an existing one
    Keygen {
        path: PathBuf,

        /// Overwrite an existing key file
        #[arg(short, long, conflicts_with = "verify")]
        force: bool,

        /// Only check that PATH holds a valid key
        #[arg(long)]
        verify: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn backup_flags_parse() {
        let cli = Cli::try_parse_from([
            "grsync", "--vault", "photos", "backup", "/data", "--compress", "--encrypt",
            "--encryption-key-file", "key.txt", "--desc", "nightly",
        ])
        .unwrap();
        assert_eq!(cli.global.vault.as_deref(), Some("photos"));
        let Commands::Backup(args) = cli.command else {
            panic!("expected backup");
        };
        assert!(args.compress);
        assert_eq!(args.codec, "zstd");
        assert!(args.encrypt);
        assert_eq!(args.part_size, 1024 * 1024);
        assert_eq!(args.desc.as_deref(), Some("nightly"));
    }

    #[test]
    fn compress_flag_does_not_swallow_the_source() {
        let cli = Cli::try_parse_from(["grsync", "--vault", "v", "backup", "--compress", "/data"]).unwrap();
        let Commands::Backup(args) = cli.command else {
            panic!("expected backup");
        };
        assert!(args.compress);
        assert_eq!(args.src, PathBuf::from("/data"));

        let cli = Cli::try_parse_from(["grsync", "backup", "/data"]).unwrap();
        let Commands::Backup(args) = cli.command else {
            panic!("expected backup");
        };
        assert!(!args.compress);
    }

    #[test]
    fn region_is_global() {
        let cli = Cli::try_parse_from(["grsync", "list-uploads", "--region", "eu-west-1", "--vault", "v"]).unwrap();
        assert_eq!(cli.global.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn key_sources_are_exclusive() {
        let res = Cli::try_parse_from([
            "grsync", "backup", "/data", "--encryption-key", "abc", "--encryption-key-file", "k",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn abort_needs_ids_or_all() {
        assert!(Cli::try_parse_from(["grsync", "abort-uploads"]).is_err());
        assert!(Cli::try_parse_from(["grsync", "abort-uploads", "--all", "x"]).is_err());
        let cli = Cli::try_parse_from(["grsync", "abort-uploads", "a", "b"]).unwrap();
        match cli.command {
            Commands::AbortUploads { upload_ids, all } => {
                assert_eq!(upload_ids, ["a", "b"]);
                assert!(!all);
            }
            _ => panic!("expected abort-uploads"),
        }
    }

    #[test]
    fn keygen_force_and_verify_are_exclusive() {
        let cli = Cli::try_parse_from(["grsync", "keygen", "k.key", "-f"]).unwrap();
        assert!(matches!(cli.command, Commands::Keygen { force: true, verify: false, .. }));
        assert!(Cli::try_parse_from(["grsync", "keygen", "k.key", "--force", "--verify"]).is_err());
    }
}

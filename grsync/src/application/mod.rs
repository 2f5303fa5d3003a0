pub mod handlers;
pub mod keyfile;
pub mod progress;

use std::process::ExitCode;

use crate::presentation::cli::{Cli, Commands};
use grsync_core::error::Result;

pub fn run(cli: Cli) -> Result<ExitCode> {
    let Cli { global, command } = cli;
    match command {
        Commands::Backup(args) => handlers::handle_backup(&global, args),
        Commands::ListUploads { json } => handlers::handle_list_uploads(&global, json),
        Commands::AbortUploads { upload_ids, all } => {
            handlers::handle_abort_uploads(&global, upload_ids, all)
        }
        Commands::History { path, json } => handlers::handle_history(&global, path, json),
        Commands::CreateVault => handlers::handle_create_vault(&global),
        Commands::Keygen { path, force, verify } => handlers::handle_keygen(path, force, verify),
    }
}

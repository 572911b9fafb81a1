use clap::{Parser, Subcommand};

use std::io::{copy, stdout};
use std::path::PathBuf;
use std::process::exit;

use cpioscan::{CpioArchive, CpioArchiveHasher};

type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
struct CmdArgs {
    #[clap(subcommand)]
    commands: Commands
}

#[derive(Subcommand)]
enum Commands {
    /// Show format and size information for a cpio archive
    Info {
        /// Path to the cpio archive to inspect
        archive_path: PathBuf,
    },
    /// Calculate the SHA-256 sum of the file entries in a cpio archive
    /// or initrd image
    Hash {
        /// Path to the cpio archive or initrd image
        archive_path: PathBuf,
    },
    /// List the files in a cpio archive
    Ls {
        /// Path to the cpio archive to inspect
        archive_path: PathBuf,
    },
    /// Extract a single file from a cpio archive
    Cat {
        /// Path to the cpio archive
        archive_path: PathBuf,

        /// Path of the file to extract
        internal_path: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let args = CmdArgs::parse();
    match args.commands {
        Commands::Info { archive_path } => {
            let archive = CpioArchive::open(&archive_path)?;
            println!("Format: {}", archive.format());
            println!("Size: {} bytes", archive.size());
        },
        Commands::Hash { archive_path } => {
            let hasher = CpioArchiveHasher::new(&archive_path);
            hasher.hash_file_entries(&mut stdout())?;
        },
        Commands::Ls { archive_path } => {
            let archive = CpioArchive::open(&archive_path)?;
            for entry in archive.file_entries("") {
                println!(
                    "{} {:>4} {:>4} {:>8} {}",
                    entry.mode_str()?,
                    entry.user_identifier,
                    entry.group_identifier,
                    entry.data_size,
                    entry.path,
                );
            }
        },
        Commands::Cat { archive_path, internal_path } => {
            let mut archive = CpioArchive::open(&archive_path)?;

            let Some(entry) = archive.file_entry_by_path(&internal_path).cloned() else {
                eprintln!("No file found in archive for path: '{internal_path}'");
                exit(1);
            };

            let mut reader = archive.entry_reader(&entry);
            copy(&mut reader, &mut stdout())?;
        },
    }

    Ok(())
}

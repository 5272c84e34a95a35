use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "roomie",
    about = "Roommate matching and support bot with a line-oriented console transport",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "ROOMIE_CONFIG",
        default_value = "roomie.toml",
        help = "Path to the TOML bot configuration (profile limits, admins, runtime bounds)"
    )]
    pub config: PathBuf,

    #[arg(
        long,
        env = "ROOMIE_DATABASE",
        default_value = ".roomie/roomie.sqlite",
        help = "SQLite database holding profiles, likes and support requests"
    )]
    pub database: PathBuf,

    #[arg(
        long = "in-memory",
        env = "ROOMIE_IN_MEMORY",
        default_value_t = false,
        help = "Keep all records in memory instead of the SQLite database"
    )]
    pub in_memory: bool,
}

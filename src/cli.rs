use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "movie-catalog")]
#[command(author, version, about = "Movie catalog with Kinopoisk import")]
pub struct Cli {
    /// Directory containing config.toml
    #[arg(short, long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve,

    /// Import a film from a Kinopoisk URL
    Import {
        /// e.g. https://www.kinopoisk.ru/film/435/
        url: String,
    },

    /// Fill the database with demo movies, genres and actors
    Seed,

    /// Store the Kinopoisk API token in the settings table
    SetToken {
        /// Token value
        #[arg(required_unless_present = "clear", conflicts_with = "clear")]
        token: Option<String>,

        /// Remove the stored token
        #[arg(long)]
        clear: bool,
    },
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use feedline_client::{Backend, ClientConfig};
use feedline_shared::types::{PostId, UserId};

#[derive(Parser, Debug)]
#[command(name = "feedline", version, about = "Social feed client")]
pub struct Cli {
    /// Backend to run against: `local` or `hosted`
    #[arg(long, global = true)]
    pub backend: Option<Backend>,

    /// SQLite file for the local backend
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Account email; commands that act as a user sign in with it first
    #[arg(long, global = true, env = "FEEDLINE_EMAIL")]
    pub email: Option<String>,

    #[arg(long, global = true, env = "FEEDLINE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account
    Signup,
    /// Check credentials and print the signed-in user
    Login,
    /// Show the feed, newest first
    Feed,
    /// Like a post, or unlike it if already liked
    Like { post_id: PostId },
    /// Show a post's comments
    Thread { post_id: PostId },
    /// Comment on a post
    Comment { post_id: PostId, text: String },
    /// Publish a post
    Post {
        #[arg(default_value = "")]
        text: String,
        /// Image file to attach
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Delete one of your posts
    Delete { post_id: PostId },
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Print client events as they happen until interrupted
    Watch,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Show a profile and its posts (yours by default)
    Show { user_id: Option<UserId> },
    /// Edit your profile
    Edit(EditArgs),
}

#[derive(Args, Debug)]
pub struct EditArgs {
    #[arg(long)]
    pub full_name: Option<String>,
    #[arg(long)]
    pub bio: Option<String>,
    #[arg(long)]
    pub dark_mode: Option<bool>,
    /// New avatar image file
    #[arg(long)]
    pub avatar: Option<PathBuf>,
    /// New cover image file
    #[arg(long)]
    pub cover: Option<PathBuf>,
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(path) = &self.db_path {
            config.db_path = Some(path.clone());
        }
        config
    }
}

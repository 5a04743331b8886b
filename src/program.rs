use std::env;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Error};
use log::{info, warn};

use crate::archiver::{
    AppConfig, HttpFetcher, IngestPipeline, InstanceLock, Layout, LockError, RedditClient,
    Scheduler, Store, WebResolver,
};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Config file in the working directory.
const CONFIG_FILE: &str = "archiver.toml";

/// A program class that handles the command surface and wires the daemon
/// together for the default infinite-loop mode.
pub(crate) struct Program;

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new() -> Self {
        Self
    }

    /// Runs the archiver program.
    pub(crate) fn run(&self) -> Result<(), Error> {
        info!("{NAME} v{VERSION} starting");

        let config = AppConfig::load_or_create(Path::new(CONFIG_FILE))
            .context("failed to load configuration")?;
        let store = Store::open(Path::new(&config.paths.database_file))
            .context("failed to open the store")?;

        let args: Vec<String> = env::args().skip(1).collect();
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        match arg_refs.as_slice() {
            [] => self.run_loop(&config, &store),
            ["--help" | "-help" | "--h" | "-h" | "?"] => {
                print_help();
                Ok(())
            }
            ["--add" | "-add" | "--a" | "-a", user] => {
                let user = normalize_user(user);
                if store.is_user_registered(&user)? {
                    warn!("user already added: /u/{user}");
                } else {
                    store.add_user(&user, true)?;
                    info!("added new user: /u/{user}");
                }
                Ok(())
            }
            ["--exclude" | "-exclude" | "--x" | "-x", subreddit] => {
                store.add_excluded(subreddit)?;
                info!("excluded subreddit: \"{subreddit}\"");
                Ok(())
            }
            ["--include" | "-include" | "--i" | "-i", subreddit] => {
                store.remove_excluded(subreddit)?;
                info!("removed excluded subreddit: \"{subreddit}\"");
                Ok(())
            }
            ["--reddit" | "-r", username, secret] => {
                store.set_credentials("reddit", username, secret)?;
                info!("stored reddit credentials for \"{username}\"");
                Ok(())
            }
            ["--soundcloud" | "-sc", username, secret] => {
                store.set_credentials("soundcloud", username, secret)?;
                info!("stored soundcloud credentials for \"{username}\"");
                Ok(())
            }
            _ => {
                print_help();
                bail!("unrecognized arguments: {}", args.join(" "));
            }
        }
    }

    /// Default mode: acquire the instance lock, authenticate, and run the
    /// scheduler until the process is terminated.
    fn run_loop(&self, config: &AppConfig, store: &Store) -> Result<(), Error> {
        // Another instance is already polling this store: quit silently.
        let _lock = match InstanceLock::acquire(Path::new(&config.paths.lock_file)) {
            Ok(lock) => lock,
            Err(LockError::AlreadyRunning) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        // Missing credentials and a failed login are the only failures
        // fatal to the whole process.
        let (username, secret) = store
            .get_credentials("reddit")
            .context("reddit credentials are not set (use --reddit <user> <pass>)")?;
        let client = RedditClient::new(&config.http, config.fetch.page_size)?;
        client
            .login(&username, &secret)
            .context("reddit login failed")?;
        info!("logged in to reddit as \"{username}\"");

        let layout = Layout::new(&config.paths.content_root)?;
        let resolver = WebResolver::new(&config.http)?;
        let fetcher = HttpFetcher::new(&config.http)?;
        let pipeline =
            IngestPipeline::new(store, &client, &resolver, &fetcher, &layout, &config.fetch);
        let shutdown = Arc::new(AtomicBool::new(false));
        let scheduler = Scheduler::new(store, &client, pipeline, &config.discovery, shutdown);
        scheduler.run()?;
        Ok(())
    }
}

fn normalize_user(raw: &str) -> String {
    raw.trim().trim_start_matches("/u/").replace('/', "")
}

fn print_help() {
    println!(
        "{NAME} v{VERSION}

USAGE

<no arguments>
    Run in an infinite loop, polling tracked users for new posts and
    comments and archiving any media they link. Newly-found authors in
    the configured subreddits are added automatically.

--help, -h
    This message.

--add <user>, -a <user>
    Track a user.

--exclude <subreddit>, -x <subreddit>
    Ignore any media found in posts/comments to this subreddit.

--include <subreddit>, -i <subreddit>
    Stop ignoring a subreddit.

--reddit <username> <password>, -r
    Store or update reddit login credentials. Accounts configured to
    fetch 100 items per page make polling faster.

--soundcloud <username> <password>, -sc
    Store or update soundcloud API credentials."
    );
}

//! Round-robin scheduling loop for Reddit Archiver
//!
//! Visits the tracked users in a fixed cycle, injects newly-discovered
//! users as soon as they appear, and scans the configured subreddits' top
//! listings for unknown authors every time the cycle wraps. The loop runs
//! until the shutdown flag is set; the flag is only checked between polls,
//! so an in-flight poll always finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::archiver::download::Fetcher;
use crate::archiver::pipeline::IngestPipeline;
use crate::archiver::reddit::{ContentItem, ItemSource};
use crate::archiver::resolve::Resolver;
use crate::archiver::store::{Store, StoreResult};
use crate::archiver::config::Discovery;

const LAST_POLLED_USER: &str = "last_polled_user";

/// Pause when there is nothing to poll and discovery came up empty.
const IDLE_DELAY: Duration = Duration::from_secs(60);

/// Round-robin scheduler over the tracked user list.
pub struct Scheduler<'a, S, R, F> {
    store: &'a Store,
    source: &'a S,
    pipeline: IngestPipeline<'a, S, R, F>,
    discovery: &'a Discovery,
    shutdown: Arc<AtomicBool>,
}

impl<'a, S: ItemSource, R: Resolver, F: Fetcher> Scheduler<'a, S, R, F> {
    pub fn new(
        store: &'a Store,
        source: &'a S,
        pipeline: IngestPipeline<'a, S, R, F>,
        discovery: &'a Discovery,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            source,
            pipeline,
            discovery,
            shutdown,
        }
    }

    /// Run until the shutdown flag is set. A single user's failure is
    /// logged and never terminates the loop.
    pub fn run(&self) -> StoreResult<()> {
        let mut users = self.store.list_users(false)?;

        // The persisted cursor is a handle; re-resolve it to an index. If
        // the handle vanished from the list, restart at the top.
        let mut cursor = match self.store.get_config(LAST_POLLED_USER)? {
            Some(handle) => users.iter().position(|u| *u == handle).unwrap_or(0),
            None => 0,
        };
        info!("scheduler: starting with {} tracked user(s)", users.len());

        while !self.shutdown.load(Ordering::Relaxed) {
            // Pick up newly-registered users and poll them right away.
            let new_users = self.store.list_users(true).unwrap_or_else(|e| {
                error!("scheduler: cannot list new users: {e}");
                Vec::new()
            });
            for handle in new_users {
                if !users.contains(&handle) {
                    users.push(handle.clone());
                }
                if let Err(e) = self.pipeline.poll_user(&handle) {
                    error!("scheduler: poll of new user {handle} failed: {e}");
                }
            }

            if users.is_empty() {
                self.discover();
                let found_any = self
                    .store
                    .list_users(true)
                    .map(|list| !list.is_empty())
                    .unwrap_or(false);
                if !found_any {
                    thread::sleep(IDLE_DELAY);
                }
                continue;
            }

            cursor += 1;
            if cursor >= users.len() {
                cursor = 0;
                self.discover();
            }

            let handle = users[cursor].clone();
            match self.pipeline.poll_user(&handle) {
                Ok(()) => {
                    if let Err(e) = self.store.set_config(LAST_POLLED_USER, &handle) {
                        error!("scheduler: cannot persist cursor at {handle}: {e}");
                    }
                }
                Err(e) => error!("scheduler: poll_user {handle} failed: {e}"),
            }
        }

        info!("scheduler: shutdown requested, loop stopped");
        Ok(())
    }

    /// Scan the configured subreddits' top listings and register every
    /// distinct unknown author as new.
    fn discover(&self) {
        for subreddit in &self.discovery.subreddits {
            info!("scheduler: scanning top of r/{subreddit} for new authors");
            let items = match self.source.fetch_top(subreddit, &self.discovery.window) {
                Ok(items) => items,
                Err(e) => {
                    warn!("scheduler: discovery in r/{subreddit} failed: {e}");
                    continue;
                }
            };
            for item in items {
                let ContentItem::Post(post) = item else {
                    continue;
                };
                if post.author == "[deleted]" {
                    continue;
                }
                match self.store.is_user_registered(&post.author) {
                    Ok(true) => {}
                    Ok(false) => {
                        info!("scheduler: discovered new author /u/{}", post.author);
                        if let Err(e) = self.store.add_user(&post.author, true) {
                            warn!("scheduler: cannot register /u/{}: {e}", post.author);
                        }
                    }
                    Err(e) => warn!("scheduler: registration check failed: {e}"),
                }
            }
        }
    }
}

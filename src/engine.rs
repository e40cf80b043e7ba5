//! The Engine
//!
//! Owned state the event loop drives: one [`Store`], the [`Dispatcher`] and
//! the configuration they were built from. Protocol front-ends hand parsed
//! commands to [`Engine::execute`]; the loop calls
//! [`Housekeeping::housekeeping`] once per tick and the cron timer installed
//! by [`Engine::attach`] at `hz` times per second.

use std::time::Duration;
use tracing::debug;

use crate::commands::{Command, Dispatcher, Reply};
use crate::config::EngineConfig;
use crate::error::CommandResult;
use crate::event_loop::{EventId, EventLoop, Housekeeping};
use crate::storage::Store;

/// Time spent rehashing per cron run.
const CRON_REHASH_BUDGET: Duration = Duration::from_millis(1);

/// Seconds between keyspace statistics log lines.
const STATS_LOG_PERIOD_SECS: u64 = 5;

#[derive(Debug)]
pub struct Engine {
    store: Store,
    dispatcher: Dispatcher,
    config: EngineConfig,
    cron_runs: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: Store::new(0, &config),
            dispatcher: Dispatcher::new(),
            config,
            cron_runs: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Runs one command.
    pub fn execute(&mut self, command: &Command) -> CommandResult<Reply> {
        self.dispatcher.execute(&mut self.store, command)
    }

    /// Registers the hook called after every write that changed the
    /// keyspace, with the database id and the command.
    pub fn on_write(&mut self, hook: impl FnMut(usize, &Command) + 'static) {
        self.dispatcher.on_write(hook);
    }

    /// Installs the periodic cron timer on `event_loop`.
    pub fn attach(&self, event_loop: &mut EventLoop<Engine>) -> EventId {
        let interval = self.config.cron_interval();
        event_loop.schedule(
            interval,
            |_: &mut EventLoop<Engine>, engine: &mut Engine| {
                engine.cron();
                Ok(())
            },
            Some(interval),
        )
    }

    fn cron(&mut self) {
        self.cron_runs += 1;
        if self.store.is_rehashing() {
            self.store.rehash_for(CRON_REHASH_BUDGET);
        }

        let period = u64::from(self.config.hz) * STATS_LOG_PERIOD_SECS;
        if self.cron_runs % period.max(1) == 0 {
            let stats = self.store.stats();
            debug!(
                db = self.store.id(),
                keys = stats.keys,
                expires = stats.keys_with_expiry,
                capacity = stats.capacity,
                used_memory = stats.used_memory,
                rehashing = stats.rehashing,
                "Keyspace statistics"
            );
        }
    }
}

impl Housekeeping for Engine {
    fn housekeeping(&mut self) -> anyhow::Result<bool> {
        let rehashing = self
            .store
            .rehash_step(self.config.keyspace.rehash_step_buckets);
        let sweep = self.store.active_expire_step();
        Ok(rehashing || sweep.more)
    }
}

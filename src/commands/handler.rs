//! Command Dispatcher
//!
//! Looks commands up in the static [`COMMAND_TABLE`], enforces arity, runs
//! the handler against a [`Store`] and reports keyspace changes.
//!
//! ## Write Notification
//!
//! After a command flagged `write` runs, the dispatcher compares the store's
//! dirty counter with its value before the call. If it moved, the registered
//! `on_write` hook is invoked exactly once with the database id and the
//! command, so persistence or replication can log it. Reads, and writes
//! that turned out to be no-ops (`DEL` of a missing key), are not reported.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         Dispatcher                            │
//! │                                                               │
//! │  ┌──────────┐    ┌──────────┐    ┌──────────┐   ┌──────────┐  │
//! │  │  lookup  │───>│  arity   │───>│ handler  │──>│ on_write │  │
//! │  └──────────┘    └──────────┘    └──────────┘   └──────────┘  │
//! │                                        │                      │
//! │                                        ▼                      │
//! │                                      Store                    │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The dispatcher performs no I/O.

use std::collections::HashMap;
use tracing::trace;

use super::command::Command;
use super::reply::Reply;
use super::table::{CommandSpec, Ctx, DispatchStats, COMMAND_TABLE};
use crate::error::{CommandError, CommandResult};
use crate::storage::Store;

/// Hook invoked after a write command changed the keyspace.
pub type WriteHook = Box<dyn FnMut(usize, &Command)>;

pub struct Dispatcher {
    index: HashMap<&'static str, usize>,
    calls: Vec<u64>,
    stats: DispatchStats,
    on_write: Option<WriteHook>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.index.len())
            .field("stats", &self.stats)
            .field("on_write", &self.on_write.is_some())
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let index = COMMAND_TABLE
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name, i))
            .collect();
        Self {
            index,
            calls: vec![0; COMMAND_TABLE.len()],
            stats: DispatchStats::default(),
            on_write: None,
        }
    }

    /// Registers the write-notification hook, replacing any previous one.
    pub fn on_write(&mut self, hook: impl FnMut(usize, &Command) + 'static) {
        self.on_write = Some(Box::new(hook));
    }

    pub fn lookup(&self, name: &str) -> Option<&'static CommandSpec> {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => *self.index.get(name.to_ascii_lowercase().as_str())?,
        };
        COMMAND_TABLE.get(idx)
    }

    /// Executes one command against `store`.
    pub fn execute(&mut self, store: &mut Store, command: &Command) -> CommandResult<Reply> {
        let Some(&idx) = self.index.get(command.name()) else {
            self.stats.rejected_commands += 1;
            return Err(CommandError::Unknown(command.name().to_string()));
        };
        let spec = &COMMAND_TABLE[idx];
        if !spec.accepts(command.argc()) {
            self.stats.rejected_commands += 1;
            return Err(CommandError::WrongArity(spec.name.to_string()));
        }

        self.calls[idx] += 1;
        self.stats.total_commands += 1;
        let dirty_before = store.dirty();

        let result = {
            let mut ctx = Ctx {
                store: &mut *store,
                stats: &self.stats,
            };
            (spec.handler)(&mut ctx, command)
        };

        let changed = store.dirty() != dirty_before;
        if spec.is_write() && changed {
            self.stats.write_commands += 1;
            if let Some(hook) = self.on_write.as_mut() {
                hook(store.id(), command);
            }
        }
        if result.is_err() {
            self.stats.rejected_commands += 1;
        }

        trace!(
            command = spec.name,
            argc = command.argc(),
            changed,
            ok = result.is_ok(),
            "Executed command"
        );
        result
    }

    /// Names of every supported command.
    pub fn command_names(&self) -> impl Iterator<Item = &'static str> {
        COMMAND_TABLE.iter().map(|spec| spec.name)
    }

    /// Times `name` has been executed.
    pub fn calls(&self, name: &str) -> u64 {
        self.index
            .get(name.to_ascii_lowercase().as_str())
            .map_or(0, |&idx| self.calls[idx])
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::storage::{EvictionConfig, EvictionPolicy};
    use bytes::Bytes;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Harness {
        dispatcher: Dispatcher,
        store: Store,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dispatcher: Dispatcher::new(),
                store: Store::default(),
            }
        }

        fn run(&mut self, args: &[&str]) -> CommandResult<Reply> {
            self.dispatcher.execute(&mut self.store, &make_command(args))
        }
    }

    fn make_command(args: &[&str]) -> Command {
        Command::from_parts(
            args.iter()
                .map(|s| Bytes::from(s.to_string()))
                .collect(),
        )
        .unwrap()
    }

    fn bulk(s: &str) -> Reply {
        Reply::bulk(Bytes::from(s.to_string()))
    }

    #[test]
    fn test_ping() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["PING"]), Ok(Reply::pong()));
        assert_eq!(h.run(&["PING", "hello"]), Ok(bulk("hello")));
        assert_eq!(
            h.run(&["PING", "a", "b"]),
            Err(CommandError::WrongArity("ping".into()))
        );
    }

    #[test]
    fn test_set_get() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["SET", "key", "value"]), Ok(Reply::ok()));
        assert_eq!(h.run(&["GET", "key"]), Ok(bulk("value")));
        assert_eq!(h.run(&["get", "nonexistent"]), Ok(Reply::nil()));
    }

    #[test]
    fn test_unknown_command_and_arity() {
        let mut h = Harness::new();
        assert_eq!(
            h.run(&["UNKNOWN"]),
            Err(CommandError::Unknown("unknown".into()))
        );
        assert_eq!(
            h.run(&["GET"]),
            Err(CommandError::WrongArity("get".into()))
        );
        assert_eq!(
            h.run(&["GET", "a", "b"]),
            Err(CommandError::WrongArity("get".into()))
        );
        assert_eq!(h.dispatcher.stats().rejected_commands, 3);
        assert_eq!(h.dispatcher.stats().total_commands, 0);
    }

    #[test]
    fn test_del_exists() {
        let mut h = Harness::new();
        h.run(&["SET", "key1", "value1"]).unwrap();
        h.run(&["SET", "key2", "value2"]).unwrap();

        assert_eq!(h.run(&["EXISTS", "key1", "key1", "nope"]), Ok(Reply::integer(2)));
        assert_eq!(h.run(&["DEL", "key1", "key2", "key3"]), Ok(Reply::integer(2)));
        assert_eq!(h.run(&["EXISTS", "key1"]), Ok(Reply::integer(0)));
    }

    #[test]
    fn test_incr_decr() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["INCR", "counter"]), Ok(Reply::integer(1)));
        assert_eq!(h.run(&["INCR", "counter"]), Ok(Reply::integer(2)));
        assert_eq!(h.run(&["DECR", "counter"]), Ok(Reply::integer(1)));
        assert_eq!(h.run(&["INCRBY", "counter", "10"]), Ok(Reply::integer(11)));
        assert_eq!(h.run(&["DECRBY", "counter", "20"]), Ok(Reply::integer(-9)));

        h.run(&["SET", "text", "abc"]).unwrap();
        assert_eq!(h.run(&["INCR", "text"]), Err(CommandError::NotInteger));
        assert_eq!(
            h.run(&["INCRBY", "counter", "x"]),
            Err(CommandError::NotInteger)
        );

        // only the exact decimal form counts as an integer
        h.run(&["SET", "signed", "+5"]).unwrap();
        assert_eq!(h.run(&["INCR", "signed"]), Err(CommandError::NotInteger));
        h.run(&["SET", "padded", "007"]).unwrap();
        assert_eq!(h.run(&["INCR", "padded"]), Err(CommandError::NotInteger));
        assert_eq!(
            h.run(&["INCRBY", "counter", "+3"]),
            Err(CommandError::NotInteger)
        );
        assert_eq!(h.run(&["GET", "counter"]), Ok(bulk("-9")));

        h.run(&["SET", "big", &i64::MAX.to_string()]).unwrap();
        assert_eq!(h.run(&["INCR", "big"]), Err(CommandError::Overflow));
        assert_eq!(
            h.run(&["DECRBY", "counter", &i64::MIN.to_string()]),
            Err(CommandError::Overflow)
        );
    }

    #[test]
    fn test_incr_keeps_ttl() {
        let mut h = Harness::new();
        h.run(&["SET", "n", "1", "EX", "100"]).unwrap();
        h.run(&["INCR", "n"]).unwrap();
        let ttl = h.run(&["TTL", "n"]).unwrap().as_integer().unwrap();
        assert!(ttl > 90 && ttl <= 100);
    }

    #[test]
    fn test_mset_mget() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["MSET", "k1", "v1", "k2", "v2"]), Ok(Reply::ok()));
        h.run(&["RPUSH", "list", "x"]).unwrap();

        assert_eq!(
            h.run(&["MGET", "k1", "k2", "k3", "list"]),
            Ok(Reply::array(vec![
                bulk("v1"),
                bulk("v2"),
                Reply::nil(),
                Reply::nil(),
            ]))
        );
        assert_eq!(
            h.run(&["MSET", "k1", "v1", "k2"]),
            Err(CommandError::WrongArity("mset".into()))
        );
    }

    #[test]
    fn test_set_with_options() {
        let mut h = Harness::new();

        assert_eq!(h.run(&["SET", "key", "value", "NX"]), Ok(Reply::ok()));
        assert_eq!(h.run(&["SET", "key", "newvalue", "NX"]), Ok(Reply::nil()));
        assert_eq!(h.run(&["SET", "key", "newvalue", "XX"]), Ok(Reply::ok()));
        assert_eq!(h.run(&["SET", "other", "v", "XX"]), Ok(Reply::nil()));
        assert_eq!(h.run(&["GET", "key"]), Ok(bulk("newvalue")));

        assert_eq!(h.run(&["SET", "key", "third", "GET"]), Ok(bulk("newvalue")));
        assert_eq!(h.run(&["SET", "fresh", "v", "GET"]), Ok(Reply::nil()));

        assert_eq!(h.run(&["SET", "key", "v", "NX", "XX"]), Err(CommandError::Syntax));
        assert_eq!(h.run(&["SET", "key", "v", "EX", "1", "PX", "5"]), Err(CommandError::Syntax));
        assert_eq!(h.run(&["SET", "key", "v", "EX"]), Err(CommandError::Syntax));
        assert_eq!(
            h.run(&["SET", "key", "v", "EX", "0"]),
            Err(CommandError::InvalidExpire("set".into()))
        );
        assert_eq!(h.run(&["SET", "key", "v", "BOGUS"]), Err(CommandError::Syntax));
    }

    #[test]
    fn test_set_expiry_options() {
        let mut h = Harness::new();
        h.run(&["SET", "a", "v", "PX", "60000"]).unwrap();
        let pttl = h.run(&["PTTL", "a"]).unwrap().as_integer().unwrap();
        assert!(pttl > 59_000 && pttl <= 60_000);

        h.run(&["SET", "a", "w", "KEEPTTL"]).unwrap();
        assert!(h.run(&["PTTL", "a"]).unwrap().as_integer().unwrap() > 0);

        h.run(&["SET", "a", "x"]).unwrap();
        assert_eq!(h.run(&["TTL", "a"]), Ok(Reply::integer(-1)));

        let at = (crate::storage::now_ms() / 1000 + 100).to_string();
        h.run(&["SET", "b", "v", "EXAT", &at]).unwrap();
        let ttl = h.run(&["TTL", "b"]).unwrap().as_integer().unwrap();
        assert!(ttl > 90 && ttl <= 100);
    }

    #[test]
    fn test_setnx_setex_getset_getdel() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["SETNX", "k", "1"]), Ok(Reply::integer(1)));
        assert_eq!(h.run(&["SETNX", "k", "2"]), Ok(Reply::integer(0)));

        assert_eq!(h.run(&["SETEX", "s", "10", "v"]), Ok(Reply::ok()));
        assert_eq!(h.run(&["TTL", "s"]), Ok(Reply::integer(10)));
        assert_eq!(
            h.run(&["PSETEX", "s", "-5", "v"]),
            Err(CommandError::InvalidExpire("psetex".into()))
        );

        assert_eq!(h.run(&["GETSET", "k", "new"]), Ok(bulk("1")));
        assert_eq!(h.run(&["GETDEL", "k"]), Ok(bulk("new")));
        assert_eq!(h.run(&["GETDEL", "k"]), Ok(Reply::nil()));
    }

    #[test]
    fn test_append_strlen() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["APPEND", "key", "Hello"]), Ok(Reply::integer(5)));
        assert_eq!(h.run(&["APPEND", "key", " World"]), Ok(Reply::integer(11)));
        assert_eq!(h.run(&["GET", "key"]), Ok(bulk("Hello World")));
        assert_eq!(h.run(&["STRLEN", "key"]), Ok(Reply::integer(11)));
        assert_eq!(h.run(&["STRLEN", "nope"]), Ok(Reply::integer(0)));

        h.run(&["SET", "n", "12"]).unwrap();
        assert_eq!(h.run(&["APPEND", "n", "3"]), Ok(Reply::integer(3)));
        assert_eq!(h.run(&["INCR", "n"]), Ok(Reply::integer(124)));
    }

    #[test]
    fn test_wrong_type() {
        let mut h = Harness::new();
        h.run(&["LPUSH", "list", "a"]).unwrap();
        h.run(&["SET", "str", "a"]).unwrap();

        assert_eq!(h.run(&["GET", "list"]), Err(CommandError::WrongType));
        assert_eq!(h.run(&["APPEND", "list", "x"]), Err(CommandError::WrongType));
        assert_eq!(h.run(&["LPUSH", "str", "x"]), Err(CommandError::WrongType));
        assert_eq!(h.run(&["LLEN", "str"]), Err(CommandError::WrongType));
        assert_eq!(h.run(&["LPOP", "str"]), Err(CommandError::WrongType));
    }

    #[test]
    fn test_lists() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["RPUSH", "l", "a", "b"]), Ok(Reply::integer(2)));
        assert_eq!(h.run(&["LPUSH", "l", "y", "z"]), Ok(Reply::integer(4)));
        assert_eq!(
            h.run(&["LRANGE", "l", "0", "-1"]),
            Ok(Reply::bulk_array(
                ["z", "y", "a", "b"].map(Bytes::from)
            ))
        );
        assert_eq!(
            h.run(&["LRANGE", "l", "1", "2"]),
            Ok(Reply::bulk_array(["y", "a"].map(Bytes::from)))
        );
        assert_eq!(h.run(&["LRANGE", "l", "5", "10"]), Ok(Reply::array(vec![])));
        assert_eq!(h.run(&["LINDEX", "l", "-1"]), Ok(bulk("b")));
        assert_eq!(h.run(&["LINDEX", "l", "9"]), Ok(Reply::nil()));
        assert_eq!(h.run(&["LLEN", "l"]), Ok(Reply::integer(4)));

        assert_eq!(h.run(&["LPOP", "l"]), Ok(bulk("z")));
        assert_eq!(h.run(&["RPOP", "l"]), Ok(bulk("b")));
        assert_eq!(
            h.run(&["LPOP", "l", "5"]),
            Ok(Reply::bulk_array(["y", "a"].map(Bytes::from)))
        );
        assert_eq!(h.run(&["EXISTS", "l"]), Ok(Reply::integer(0)));
        assert_eq!(h.run(&["RPOP", "l"]), Ok(Reply::nil()));
        assert_eq!(h.store.memory().used(), 0);
    }

    #[test]
    fn test_expire_ttl_persist() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["TTL", "k"]), Ok(Reply::integer(-2)));
        assert_eq!(h.run(&["EXPIRE", "k", "10"]), Ok(Reply::integer(0)));

        h.run(&["SET", "k", "v"]).unwrap();
        assert_eq!(h.run(&["TTL", "k"]), Ok(Reply::integer(-1)));
        assert_eq!(h.run(&["EXPIRE", "k", "10"]), Ok(Reply::integer(1)));
        assert_eq!(h.run(&["TTL", "k"]), Ok(Reply::integer(10)));
        assert_eq!(h.run(&["PERSIST", "k"]), Ok(Reply::integer(1)));
        assert_eq!(h.run(&["PERSIST", "k"]), Ok(Reply::integer(0)));

        assert_eq!(h.run(&["PEXPIRE", "k", "-1"]), Ok(Reply::integer(1)));
        assert_eq!(h.run(&["EXISTS", "k"]), Ok(Reply::integer(0)));

        h.run(&["SET", "k", "v"]).unwrap();
        assert_eq!(h.run(&["EXPIREAT", "k", "1"]), Ok(Reply::integer(1)));
        assert_eq!(h.run(&["GET", "k"]), Ok(Reply::nil()));

        h.run(&["SET", "k", "v"]).unwrap();
        assert_eq!(
            h.run(&["EXPIRE", "k", &i64::MAX.to_string()]),
            Err(CommandError::InvalidExpire("expire".into()))
        );
    }

    #[test]
    fn test_key_expires_through_dispatcher() {
        let mut h = Harness::new();
        h.run(&["SET", "k", "v", "PX", "50"]).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(h.run(&["GET", "k"]), Ok(Reply::nil()));
        assert_eq!(h.run(&["DBSIZE"]), Ok(Reply::integer(0)));
    }

    #[test]
    fn test_type_keys_rename() {
        let mut h = Harness::new();
        h.run(&["SET", "user:1", "a"]).unwrap();
        h.run(&["SET", "user:2", "b"]).unwrap();
        h.run(&["RPUSH", "queue", "x"]).unwrap();

        assert_eq!(h.run(&["TYPE", "user:1"]), Ok(Reply::status("string")));
        assert_eq!(h.run(&["TYPE", "queue"]), Ok(Reply::status("list")));
        assert_eq!(h.run(&["TYPE", "none"]), Ok(Reply::status("none")));

        let Ok(Reply::Array(mut keys)) = h.run(&["KEYS", "user:*"]) else {
            panic!("expected array");
        };
        keys.sort_by(|a, b| a.as_bytes().cmp(&b.as_bytes()));
        assert_eq!(keys, vec![bulk("user:1"), bulk("user:2")]);

        assert_eq!(h.run(&["RENAME", "user:1", "user:3"]), Ok(Reply::ok()));
        assert_eq!(h.run(&["GET", "user:3"]), Ok(bulk("a")));
        assert_eq!(
            h.run(&["RENAME", "missing", "x"]),
            Err(CommandError::NoSuchKey)
        );
        assert_eq!(h.run(&["RENAMENX", "user:3", "user:2"]), Ok(Reply::integer(0)));
        assert_eq!(h.run(&["RENAMENX", "user:3", "user:9"]), Ok(Reply::integer(1)));
    }

    #[test]
    fn test_scan() {
        let mut h = Harness::new();
        for i in 0..50 {
            h.run(&["SET", &format!("k{}", i), "v"]).unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        let mut cursor = "0".to_string();
        loop {
            let Ok(Reply::Array(parts)) = h.run(&["SCAN", &cursor, "COUNT", "7"]) else {
                panic!("expected array");
            };
            let [Reply::Bulk(next), Reply::Array(keys)] = &parts[..] else {
                panic!("unexpected scan reply");
            };
            seen.extend(keys.iter().filter_map(|k| k.as_bytes()).map(|k| k.to_vec()));
            cursor = String::from_utf8(next.to_vec()).unwrap();
            if cursor == "0" {
                break;
            }
        }
        assert_eq!(seen.len(), 50);

        assert_eq!(h.run(&["SCAN", "abc"]), Err(CommandError::InvalidCursor));
        assert_eq!(h.run(&["SCAN", "0", "COUNT", "0"]), Err(CommandError::Syntax));
        assert_eq!(h.run(&["SCAN", "0", "MATCH"]), Err(CommandError::Syntax));

        // a huge COUNT finishes the whole table in one call
        let Ok(Reply::Array(parts)) = h.run(&["SCAN", "0", "COUNT", "9223372036854775807"]) else {
            panic!("expected array");
        };
        assert_eq!(parts[0], bulk("0"));
        let Reply::Array(keys) = &parts[1] else {
            panic!("expected key array");
        };
        assert_eq!(keys.len(), 50);
    }

    #[test]
    fn test_object() {
        let mut h = Harness::new();
        h.run(&["SET", "n", "123"]).unwrap();
        h.run(&["SET", "s", "hello"]).unwrap();
        h.run(&["SET", "l", &"x".repeat(64)]).unwrap();

        assert_eq!(h.run(&["OBJECT", "ENCODING", "n"]), Ok(bulk("int")));
        assert_eq!(h.run(&["OBJECT", "encoding", "s"]), Ok(bulk("embstr")));
        assert_eq!(h.run(&["OBJECT", "ENCODING", "l"]), Ok(bulk("raw")));
        assert_eq!(h.run(&["OBJECT", "ENCODING", "none"]), Ok(Reply::nil()));

        // n was written two accesses before s was read
        h.run(&["GET", "s"]).unwrap();
        let idle = h.run(&["OBJECT", "IDLETIME", "n"]).unwrap().as_integer().unwrap();
        assert!(idle >= 2);
        assert_eq!(
            h.run(&["OBJECT", "FREQ", "n"]),
            Err(CommandError::NotTracked("access frequency"))
        );
        assert_eq!(
            h.run(&["OBJECT", "NOPE", "n"]),
            Err(CommandError::UnknownSubcommand("NOPE".into()))
        );
    }

    #[test]
    fn test_object_freq_under_lfu() {
        let config = EngineConfig {
            memory: EvictionConfig {
                policy: EvictionPolicy::AllkeysLfu,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut h = Harness {
            dispatcher: Dispatcher::new(),
            store: Store::new(0, &config),
        };
        h.run(&["SET", "k", "v"]).unwrap();
        let freq = h.run(&["OBJECT", "FREQ", "k"]).unwrap().as_integer().unwrap();
        assert!(freq >= 5);
    }

    #[test]
    fn test_dbsize_flush() {
        let mut h = Harness::new();
        assert_eq!(h.run(&["DBSIZE"]), Ok(Reply::integer(0)));
        h.run(&["SET", "key1", "value1"]).unwrap();
        h.run(&["SET", "key2", "value2"]).unwrap();
        assert_eq!(h.run(&["DBSIZE"]), Ok(Reply::integer(2)));

        assert_eq!(h.run(&["FLUSHDB"]), Ok(Reply::ok()));
        assert_eq!(h.run(&["DBSIZE"]), Ok(Reply::integer(0)));
        assert_eq!(h.run(&["FLUSHALL", "ASYNC"]), Ok(Reply::ok()));
        assert_eq!(h.run(&["FLUSHALL", "LATER"]), Err(CommandError::Syntax));
    }

    #[test]
    fn test_server_introspection() {
        let mut h = Harness::new();
        h.run(&["SET", "k", "v", "EX", "100"]).unwrap();

        let info = h.run(&["INFO"]).unwrap();
        let text = String::from_utf8(info.as_bytes().unwrap().to_vec()).unwrap();
        for section in ["# Server", "# Memory", "# Stats", "# Keyspace"] {
            assert!(text.contains(section), "missing {}", section);
        }
        assert!(text.contains("db0:keys=1,expires=1"));
        assert!(text.contains("maxmemory_policy:noeviction"));

        let info = h.run(&["INFO", "memory"]).unwrap();
        let text = String::from_utf8(info.as_bytes().unwrap().to_vec()).unwrap();
        assert!(text.starts_with("# Memory"));
        assert!(!text.contains("# Stats"));

        let stats = h.run(&["DEBUG", "HTSTATS", "0"]).unwrap();
        let text = String::from_utf8(stats.as_bytes().unwrap().to_vec()).unwrap();
        assert!(text.contains("number of elements: 1"));

        let Ok(Reply::Array(time)) = h.run(&["TIME"]) else {
            panic!("expected array");
        };
        assert_eq!(time.len(), 2);
        assert_eq!(h.run(&["ECHO", "hi"]), Ok(bulk("hi")));
    }

    #[test]
    fn test_on_write_fires_once_per_change() {
        let mut h = Harness::new();
        let log: Rc<RefCell<Vec<(usize, String)>>> = Rc::default();
        let sink = Rc::clone(&log);
        h.dispatcher.on_write(move |db, cmd| {
            sink.borrow_mut().push((db, cmd.name().to_string()));
        });

        h.run(&["SET", "k", "v"]).unwrap();
        h.run(&["GET", "k"]).unwrap();
        h.run(&["DEL", "missing"]).unwrap();
        h.run(&["MSET", "a", "1", "b", "2"]).unwrap();
        h.run(&["INCR", "k"]).unwrap_err();
        h.run(&["PERSIST", "k"]).unwrap();
        h.run(&["DEL", "k"]).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                (0, "set".to_string()),
                (0, "mset".to_string()),
                (0, "del".to_string()),
            ]
        );
        assert_eq!(h.dispatcher.stats().write_commands, 3);
        assert_eq!(h.dispatcher.calls("SET"), 1);
        assert_eq!(h.dispatcher.calls("del"), 2);
    }

    #[test]
    fn test_oom_is_returned_inline() {
        let config = EngineConfig {
            memory: EvictionConfig {
                max_bytes: 300,
                policy: EvictionPolicy::NoEviction,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut h = Harness {
            dispatcher: Dispatcher::new(),
            store: Store::new(0, &config),
        };
        let log: Rc<RefCell<usize>> = Rc::default();
        let sink = Rc::clone(&log);
        h.dispatcher.on_write(move |_, _| *sink.borrow_mut() += 1);

        h.run(&["SET", "a", "1"]).unwrap();
        h.run(&["SET", "b", "1"]).unwrap();
        let err = h.run(&["SET", "c", &"x".repeat(200)]).unwrap_err();
        assert!(matches!(err, CommandError::OutOfMemory(_)));
        assert!(err.to_string().starts_with("OOM"));

        assert_eq!(*log.borrow(), 2);
        assert_eq!(h.run(&["GET", "a"]), Ok(bulk("1")));
        assert!(h.store.memory().used() <= 300);
    }

    #[test]
    fn test_lookup_and_names() {
        let d = Dispatcher::new();
        assert!(d.lookup("GET").is_some());
        assert!(d.lookup("set").unwrap().is_write());
        assert!(!d.lookup("get").unwrap().is_write());
        assert!(d.lookup("nope").is_none());
        assert!(d.command_names().any(|name| name == "lrange"));
    }
}

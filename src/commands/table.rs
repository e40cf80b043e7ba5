//! Command Table
//!
//! Static metadata for every supported command. Arity follows the Redis
//! convention: a positive value is the exact argument count including the
//! command name, a negative value `-n` means "at least n".

use std::time::Instant;

use super::command::Command;
use super::reply::Reply;
use super::{keys, list, server, string};
use crate::error::CommandResult;
use crate::storage::Store;

/// Counters the dispatcher keeps across commands.
#[derive(Debug, Clone)]
pub struct DispatchStats {
    pub started: Instant,
    pub total_commands: u64,
    pub write_commands: u64,
    pub rejected_commands: u64,
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            total_commands: 0,
            write_commands: 0,
            rejected_commands: 0,
        }
    }
}

/// What a handler gets to work with.
pub struct Ctx<'a> {
    pub store: &'a mut Store,
    pub stats: &'a DispatchStats,
}

pub type HandlerFn = fn(&mut Ctx<'_>, &Command) -> CommandResult<Reply>;

/// Command classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFlags(u8);

impl CommandFlags {
    /// May modify the keyspace.
    pub const WRITE: CommandFlags = CommandFlags(1);
    /// Never modifies the keyspace.
    pub const READONLY: CommandFlags = CommandFlags(1 << 1);
    /// Server/introspection command.
    pub const ADMIN: CommandFlags = CommandFlags(1 << 2);

    pub const fn union(self, other: CommandFlags) -> CommandFlags {
        CommandFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: CommandFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

pub struct CommandSpec {
    pub name: &'static str,
    pub arity: i32,
    pub flags: CommandFlags,
    pub handler: HandlerFn,
}

impl CommandSpec {
    /// Whether `argc` (name included) satisfies the arity contract.
    pub fn accepts(&self, argc: usize) -> bool {
        let argc = argc as i64;
        let arity = self.arity as i64;
        if arity >= 0 {
            argc == arity
        } else {
            argc >= -arity
        }
    }

    pub fn is_write(&self) -> bool {
        self.flags.contains(CommandFlags::WRITE)
    }
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("flags", &self.flags)
            .finish()
    }
}

const W: CommandFlags = CommandFlags::WRITE;
const R: CommandFlags = CommandFlags::READONLY;
const A: CommandFlags = CommandFlags::ADMIN;

macro_rules! cmd {
    ($name:literal, $arity:expr, $flags:expr, $handler:path) => {
        CommandSpec {
            name: $name,
            arity: $arity,
            flags: $flags,
            handler: $handler,
        }
    };
}

pub static COMMAND_TABLE: &[CommandSpec] = &[
    // strings
    cmd!("get", 2, R, string::get),
    cmd!("set", -3, W, string::set),
    cmd!("setnx", 3, W, string::setnx),
    cmd!("setex", 4, W, string::setex),
    cmd!("psetex", 4, W, string::psetex),
    cmd!("getset", 3, W, string::getset),
    cmd!("getdel", 2, W, string::getdel),
    cmd!("mget", -2, R, string::mget),
    cmd!("mset", -3, W, string::mset),
    cmd!("append", 3, W, string::append),
    cmd!("strlen", 2, R, string::strlen),
    cmd!("incr", 2, W, string::incr),
    cmd!("incrby", 3, W, string::incrby),
    cmd!("decr", 2, W, string::decr),
    cmd!("decrby", 3, W, string::decrby),
    // keys
    cmd!("del", -2, W, keys::del),
    cmd!("exists", -2, R, keys::exists),
    cmd!("expire", 3, W, keys::expire),
    cmd!("pexpire", 3, W, keys::pexpire),
    cmd!("expireat", 3, W, keys::expireat),
    cmd!("pexpireat", 3, W, keys::pexpireat),
    cmd!("ttl", 2, R, keys::ttl),
    cmd!("pttl", 2, R, keys::pttl),
    cmd!("persist", 2, W, keys::persist),
    cmd!("type", 2, R, keys::key_type),
    cmd!("keys", 2, R, keys::keys),
    cmd!("scan", -2, R, keys::scan),
    cmd!("rename", 3, W, keys::rename),
    cmd!("renamenx", 3, W, keys::renamenx),
    cmd!("object", -2, R, keys::object),
    // lists
    cmd!("lpush", -3, W, list::lpush),
    cmd!("rpush", -3, W, list::rpush),
    cmd!("lpop", -2, W, list::lpop),
    cmd!("rpop", -2, W, list::rpop),
    cmd!("llen", 2, R, list::llen),
    cmd!("lrange", 4, R, list::lrange),
    cmd!("lindex", 3, R, list::lindex),
    // server
    cmd!("ping", -1, R, server::ping),
    cmd!("echo", 2, R, server::echo),
    cmd!("dbsize", 1, R, server::dbsize),
    cmd!("flushdb", -1, W.union(A), server::flushdb),
    cmd!("flushall", -1, W.union(A), server::flushdb),
    cmd!("time", 1, R, server::time),
    cmd!("info", -1, R.union(A), server::info),
    cmd!("debug", -2, A, server::debug),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_arity_contract() {
        let spec = |arity| CommandSpec {
            name: "x",
            arity,
            flags: R,
            handler: server::ping,
        };
        assert!(spec(2).accepts(2));
        assert!(!spec(2).accepts(3));
        assert!(spec(-3).accepts(3));
        assert!(spec(-3).accepts(7));
        assert!(!spec(-3).accepts(2));
    }

    #[test]
    fn test_table_is_consistent() {
        let mut names = HashSet::new();
        for spec in COMMAND_TABLE {
            assert!(names.insert(spec.name), "duplicate {}", spec.name);
            assert_eq!(spec.name, spec.name.to_ascii_lowercase());
            assert_ne!(spec.arity, 0);
            assert!(
                spec.flags.contains(W) != spec.flags.contains(R) || spec.flags == A,
                "{} must be either write or readonly",
                spec.name
            );
        }
    }
}

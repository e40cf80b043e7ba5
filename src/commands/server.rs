//! Server Commands

use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::command::Command;
use super::reply::Reply;
use super::table::Ctx;
use crate::error::{CommandError, CommandResult};

/// PING [message]
pub(super) fn ping(_ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    match cmd.args() {
        [] => Ok(Reply::pong()),
        [message] => Ok(Reply::bulk(message.clone())),
        _ => Err(CommandError::WrongArity(cmd.name().to_string())),
    }
}

/// ECHO message
pub(super) fn echo(_ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    Ok(Reply::bulk(cmd.arg(0)?.clone()))
}

/// DBSIZE
pub(super) fn dbsize(ctx: &mut Ctx<'_>, _cmd: &Command) -> CommandResult<Reply> {
    Ok(Reply::integer(ctx.store.len() as i64))
}

/// FLUSHDB [ASYNC | SYNC] / FLUSHALL [ASYNC | SYNC]
pub(super) fn flushdb(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    match cmd.args().len() {
        0 => {}
        1 if matches!(cmd.keyword(0)?.as_str(), "ASYNC" | "SYNC") => {}
        _ => return Err(CommandError::Syntax),
    }
    ctx.store.flush();
    Ok(Reply::ok())
}

/// TIME
pub(super) fn time(_ctx: &mut Ctx<'_>, _cmd: &Command) -> CommandResult<Reply> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);

    Ok(Reply::bulk_array([
        Bytes::from(now.as_secs().to_string()),
        Bytes::from(now.subsec_micros().to_string()),
    ]))
}

const INFO_SECTIONS: [&str; 4] = ["server", "memory", "stats", "keyspace"];

/// INFO [section]
pub(super) fn info(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let wanted = match cmd.args().len() {
        0 => None,
        1 => Some(String::from_utf8_lossy(cmd.arg(0)?).to_ascii_lowercase()),
        _ => return Err(CommandError::Syntax),
    };
    let include = |section: &str| match wanted.as_deref() {
        None | Some("all") | Some("default") | Some("everything") => true,
        Some(name) => name == section,
    };

    let stats = ctx.store.stats();
    let mut out = String::new();

    for section in INFO_SECTIONS.iter().copied().filter(|s| include(*s)) {
        if !out.is_empty() {
            out.push_str("\r\n");
        }
        match section {
            "server" => {
                out.push_str(&format!(
                    "# Server\r\n\
                     flashkv_version:{}\r\n\
                     os:{}\r\n\
                     process_id:{}\r\n\
                     uptime_in_seconds:{}\r\n",
                    env!("CARGO_PKG_VERSION"),
                    std::env::consts::OS,
                    std::process::id(),
                    ctx.stats.started.elapsed().as_secs(),
                ));
            }
            "memory" => {
                out.push_str(&format!(
                    "# Memory\r\n\
                     used_memory:{}\r\n\
                     used_memory_human:{:.2}K\r\n\
                     maxmemory:{}\r\n\
                     maxmemory_policy:{}\r\n",
                    stats.used_memory,
                    stats.used_memory as f64 / 1024.0,
                    stats.max_memory,
                    stats.policy,
                ));
            }
            "stats" => {
                out.push_str(&format!(
                    "# Stats\r\n\
                     total_commands_processed:{}\r\n\
                     total_write_commands:{}\r\n\
                     rejected_commands:{}\r\n\
                     keyspace_hits:{}\r\n\
                     keyspace_misses:{}\r\n\
                     expired_keys:{}\r\n\
                     evicted_keys:{}\r\n\
                     evicted_bytes:{}\r\n\
                     oom_rejected_writes:{}\r\n\
                     rehashing:{}\r\n\
                     rehash_cycles:{}\r\n\
                     dirty:{}\r\n",
                    ctx.stats.total_commands,
                    ctx.stats.write_commands,
                    ctx.stats.rejected_commands,
                    stats.hits,
                    stats.misses,
                    stats.expired_keys,
                    stats.evicted_keys,
                    stats.evicted_bytes,
                    stats.rejected_writes,
                    stats.rehashing as u8,
                    stats.rehash_cycles,
                    stats.dirty,
                ));
            }
            _ => {
                out.push_str("# Keyspace\r\n");
                if stats.keys > 0 {
                    out.push_str(&format!(
                        "db{}:keys={},expires={}\r\n",
                        ctx.store.id(),
                        stats.keys,
                        stats.keys_with_expiry,
                    ));
                }
            }
        }
    }

    Ok(Reply::bulk(Bytes::from(out)))
}

/// DEBUG HTSTATS [dbid]
pub(super) fn debug(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let sub = cmd.keyword(0)?;
    match sub.as_str() {
        "HTSTATS" => {
            if cmd.args().len() > 2 {
                return Err(CommandError::Syntax);
            }
            let report = format!(
                "[Dictionary HT]\n{}[Expires HT]\nnumber of elements: {}\n",
                ctx.store.dict_stats(),
                ctx.store.expiry().len(),
            );
            Ok(Reply::bulk(Bytes::from(report)))
        }
        _ => Err(CommandError::UnknownSubcommand(sub)),
    }
}

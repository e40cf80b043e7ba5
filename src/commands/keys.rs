//! Keyspace Commands

use bytes::Bytes;

use super::command::Command;
use super::reply::Reply;
use super::string::deadline_from;
use super::table::Ctx;
use crate::error::{CommandError, CommandResult};
use crate::storage::{now_ms, GlobPattern, TtlResult};

/// DEL key [key ...]
pub(super) fn del(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let deleted = cmd
        .args()
        .iter()
        .filter(|key| ctx.store.delete(key))
        .count();
    Ok(Reply::integer(deleted as i64))
}

/// EXISTS key [key ...]
pub(super) fn exists(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let found = cmd
        .args()
        .iter()
        .filter(|key| ctx.store.exists(key))
        .count();
    Ok(Reply::integer(found as i64))
}

fn expire_generic(
    ctx: &mut Ctx<'_>,
    cmd: &Command,
    unit_ms: i64,
    absolute: bool,
) -> CommandResult<Reply> {
    let key = cmd.arg(0)?;
    let amount = cmd.int_arg(1)?;
    let deadline = deadline_from(amount, unit_ms, absolute, cmd.name())?;
    // deadlines before the epoch just mean "already expired"
    let deadline = deadline.max(0) as u64;
    Ok(Reply::from_bool(ctx.store.expire_at(key, deadline)))
}

/// EXPIRE key seconds
pub(super) fn expire(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    expire_generic(ctx, cmd, 1000, false)
}

/// PEXPIRE key milliseconds
pub(super) fn pexpire(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    expire_generic(ctx, cmd, 1, false)
}

/// EXPIREAT key unix-seconds
pub(super) fn expireat(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    expire_generic(ctx, cmd, 1000, true)
}

/// PEXPIREAT key unix-milliseconds
pub(super) fn pexpireat(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    expire_generic(ctx, cmd, 1, true)
}

fn ttl_reply(ttl: TtlResult, in_seconds: bool) -> Reply {
    match ttl {
        TtlResult::NotFound => Reply::integer(-2),
        TtlResult::NoExpiry => Reply::integer(-1),
        TtlResult::Remaining(ms) if in_seconds => Reply::integer(((ms + 500) / 1000) as i64),
        TtlResult::Remaining(ms) => Reply::integer(ms as i64),
    }
}

/// TTL key
pub(super) fn ttl(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    Ok(ttl_reply(ctx.store.ttl(cmd.arg(0)?), true))
}

/// PTTL key
pub(super) fn pttl(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    Ok(ttl_reply(ctx.store.ttl(cmd.arg(0)?), false))
}

/// PERSIST key
pub(super) fn persist(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    Ok(Reply::from_bool(ctx.store.persist(cmd.arg(0)?)))
}

/// TYPE key
pub(super) fn key_type(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let name = ctx
        .store
        .peek(cmd.arg(0)?)
        .map_or("none", |value| value.type_name());
    Ok(Reply::status(name))
}

/// KEYS pattern
pub(super) fn keys(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    Ok(Reply::bulk_array(ctx.store.keys(cmd.arg(0)?)))
}

/// SCAN cursor [MATCH pattern] [COUNT count]
pub(super) fn scan(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let cursor: usize = std::str::from_utf8(cmd.arg(0)?)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::InvalidCursor)?;

    let mut pattern = None;
    let mut count = 10usize;
    let mut i = 1;
    while i < cmd.args().len() {
        match cmd.keyword(i)?.as_str() {
            "MATCH" => {
                let raw = cmd.arg(i + 1).map_err(|_| CommandError::Syntax)?;
                pattern = Some(GlobPattern::new(raw));
            }
            "COUNT" => {
                cmd.arg(i + 1).map_err(|_| CommandError::Syntax)?;
                let n = cmd.int_arg(i + 1)?;
                if n < 1 {
                    return Err(CommandError::Syntax);
                }
                count = n as usize;
            }
            _ => return Err(CommandError::Syntax),
        }
        i += 2;
    }

    let (next, keys) = ctx.store.scan(cursor, count, pattern.as_ref());
    Ok(Reply::array(vec![
        Reply::bulk(Bytes::from(next.to_string())),
        Reply::bulk_array(keys),
    ]))
}

/// RENAME key newkey
pub(super) fn rename(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    if !ctx.store.rename(cmd.arg(0)?, cmd.arg(1)?.clone())? {
        return Err(CommandError::NoSuchKey);
    }
    Ok(Reply::ok())
}

/// RENAMENX key newkey
pub(super) fn renamenx(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let src = cmd.arg(0)?;
    let dst = cmd.arg(1)?;
    if !ctx.store.exists(src) {
        return Err(CommandError::NoSuchKey);
    }
    if ctx.store.exists(dst) {
        return Ok(Reply::from_bool(false));
    }
    ctx.store.rename(src, dst.clone())?;
    Ok(Reply::from_bool(true))
}

/// OBJECT ENCODING|FREQ|IDLETIME key
///
/// IDLETIME is reported in access-clock ticks (other keys touched since),
/// not seconds.
pub(super) fn object(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let sub = cmd.keyword(0)?;
    match sub.as_str() {
        "ENCODING" | "FREQ" | "IDLETIME" => {}
        _ => return Err(CommandError::UnknownSubcommand(sub)),
    }
    if cmd.argc() != 3 {
        return Err(CommandError::WrongArity(format!("object|{}", sub.to_lowercase())));
    }
    let key = cmd.arg(1)?;

    match sub.as_str() {
        "ENCODING" => Ok(ctx
            .store
            .peek(key)
            .map_or(Reply::nil(), |value| Reply::bulk(value.encoding()))),
        "FREQ" => {
            let Some(meta) = ctx.store.access_meta(key) else {
                return Ok(Reply::nil());
            };
            let freq = ctx
                .store
                .eviction()
                .frequency(meta, now_ms())
                .ok_or(CommandError::NotTracked("access frequency"))?;
            Ok(Reply::integer(freq as i64))
        }
        _ => {
            let Some(meta) = ctx.store.access_meta(key) else {
                return Ok(Reply::nil());
            };
            let idle = ctx
                .store
                .eviction()
                .idle_ticks(meta)
                .ok_or(CommandError::NotTracked("idle time"))?;
            Ok(Reply::integer(idle as i64))
        }
    }
}

//! String Commands

use bytes::{Bytes, BytesMut};

use super::command::Command;
use super::reply::Reply;
use super::table::Ctx;
use crate::error::{CommandError, CommandResult};
use crate::storage::{now_ms, Store, Value};

/// Current string value of `key`, or `WrongType` if it holds a list.
fn string_value(store: &mut Store, key: &[u8]) -> CommandResult<Option<Bytes>> {
    store.get(key).map(Value::string_bytes).transpose()
}

/// Converts a relative or absolute expiry argument into a unix-ms deadline.
pub(super) fn deadline_from(
    amount: i64,
    unit_ms: i64,
    absolute: bool,
    command: &str,
) -> CommandResult<i64> {
    let invalid = || CommandError::InvalidExpire(command.to_string());
    let ms = amount.checked_mul(unit_ms).ok_or_else(invalid)?;
    if absolute {
        Ok(ms)
    } else {
        ms.checked_add(now_ms() as i64).ok_or_else(invalid)
    }
}

/// GET key
pub(super) fn get(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    Ok(Reply::bulk_or_nil(string_value(ctx.store, cmd.arg(0)?)?))
}

/// SET key value [EX seconds | PX milliseconds | EXAT unix-seconds |
/// PXAT unix-milliseconds | KEEPTTL] [NX | XX] [GET]
pub(super) fn set(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let key = cmd.arg(0)?.clone();
    let value = cmd.arg(1)?.clone();

    let mut deadline: Option<i64> = None;
    let mut keep_ttl = false;
    let mut nx = false;
    let mut xx = false;
    let mut get = false;

    let mut i = 2;
    while i < cmd.args().len() {
        let opt = cmd.keyword(i)?;
        match opt.as_str() {
            "EX" | "PX" | "EXAT" | "PXAT" if deadline.is_none() && !keep_ttl => {
                i += 1;
                let amount = cmd.arg(i).map_err(|_| CommandError::Syntax)?;
                let amount = super::command::parse_int(amount)?;
                if amount <= 0 {
                    return Err(CommandError::InvalidExpire("set".into()));
                }
                let unit = if opt.starts_with("EX") { 1000 } else { 1 };
                deadline = Some(deadline_from(amount, unit, opt.ends_with("AT"), "set")?);
            }
            "KEEPTTL" if deadline.is_none() => keep_ttl = true,
            "NX" if !xx => nx = true,
            "XX" if !nx => xx = true,
            "GET" => get = true,
            _ => return Err(CommandError::Syntax),
        }
        i += 1;
    }

    let old = if get {
        string_value(ctx.store, &key)?
    } else {
        None
    };

    let exists = ctx.store.exists(&key);
    if (nx && exists) || (xx && !exists) {
        return Ok(if get { Reply::bulk_or_nil(old) } else { Reply::nil() });
    }

    let deadline = if keep_ttl {
        ctx.store.expires_at(&key)
    } else {
        deadline.map(|at| at.max(0) as u64)
    };
    ctx.store.set(key, Value::string(value), deadline)?;

    Ok(if get { Reply::bulk_or_nil(old) } else { Reply::ok() })
}

/// SETNX key value
pub(super) fn setnx(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let key = cmd.arg(0)?;
    if ctx.store.exists(key) {
        return Ok(Reply::from_bool(false));
    }
    ctx.store
        .set(key.clone(), Value::string(cmd.arg(1)?.clone()), None)?;
    Ok(Reply::from_bool(true))
}

fn set_with_ttl(ctx: &mut Ctx<'_>, cmd: &Command, unit_ms: i64) -> CommandResult<Reply> {
    let ttl = cmd.int_arg(1)?;
    if ttl <= 0 {
        return Err(CommandError::InvalidExpire(cmd.name().to_string()));
    }
    let deadline = deadline_from(ttl, unit_ms, false, cmd.name())?;
    ctx.store.set(
        cmd.arg(0)?.clone(),
        Value::string(cmd.arg(2)?.clone()),
        Some(deadline as u64),
    )?;
    Ok(Reply::ok())
}

/// SETEX key seconds value
pub(super) fn setex(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    set_with_ttl(ctx, cmd, 1000)
}

/// PSETEX key milliseconds value
pub(super) fn psetex(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    set_with_ttl(ctx, cmd, 1)
}

/// GETSET key value
pub(super) fn getset(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let key = cmd.arg(0)?;
    let old = string_value(ctx.store, key)?;
    ctx.store
        .set(key.clone(), Value::string(cmd.arg(1)?.clone()), None)?;
    Ok(Reply::bulk_or_nil(old))
}

/// GETDEL key
pub(super) fn getdel(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let key = cmd.arg(0)?;
    let old = string_value(ctx.store, key)?;
    if old.is_some() {
        ctx.store.delete(key);
    }
    Ok(Reply::bulk_or_nil(old))
}

/// MGET key [key ...]
pub(super) fn mget(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let values = cmd
        .args()
        .iter()
        .map(|key| Reply::bulk_or_nil(ctx.store.get(key).and_then(Value::to_bytes)))
        .collect();
    Ok(Reply::array(values))
}

/// MSET key value [key value ...]
pub(super) fn mset(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let args = cmd.args();
    if args.len() % 2 != 0 {
        return Err(CommandError::WrongArity(cmd.name().to_string()));
    }
    for pair in args.chunks_exact(2) {
        ctx.store
            .set(pair[0].clone(), Value::string(pair[1].clone()), None)?;
    }
    Ok(Reply::ok())
}

/// APPEND key value
pub(super) fn append(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let key = cmd.arg(0)?;
    let suffix = cmd.arg(1)?;

    let joined = match ctx.store.peek(key) {
        None => suffix.clone(),
        Some(value) => {
            let current = value.string_bytes()?;
            let mut buf = BytesMut::with_capacity(current.len() + suffix.len());
            buf.extend_from_slice(&current);
            buf.extend_from_slice(suffix);
            buf.freeze()
        }
    };
    let len = joined.len();
    ctx.store.overwrite(key.clone(), Value::string(joined))?;
    Ok(Reply::integer(len as i64))
}

/// STRLEN key
pub(super) fn strlen(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let len = match ctx.store.peek(cmd.arg(0)?) {
        Some(value) => value.string_len()?,
        None => 0,
    };
    Ok(Reply::integer(len as i64))
}

fn incr_by(ctx: &mut Ctx<'_>, key: &Bytes, delta: i64) -> CommandResult<Reply> {
    let current = match ctx.store.get(key) {
        Some(value) => value.as_int()?,
        None => 0,
    };
    let next = current.checked_add(delta).ok_or(CommandError::Overflow)?;
    ctx.store.overwrite(key.clone(), Value::from_int(next))?;
    Ok(Reply::integer(next))
}

/// INCR key
pub(super) fn incr(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    incr_by(ctx, cmd.arg(0)?, 1)
}

/// INCRBY key increment
pub(super) fn incrby(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    incr_by(ctx, cmd.arg(0)?, cmd.int_arg(1)?)
}

/// DECR key
pub(super) fn decr(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    incr_by(ctx, cmd.arg(0)?, -1)
}

/// DECRBY key decrement
pub(super) fn decrby(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let delta = cmd.int_arg(1)?.checked_neg().ok_or(CommandError::Overflow)?;
    incr_by(ctx, cmd.arg(0)?, delta)
}

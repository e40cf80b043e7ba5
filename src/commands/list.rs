//! List Commands

use std::collections::VecDeque;

use super::command::Command;
use super::reply::Reply;
use super::table::Ctx;
use crate::error::{CommandError, CommandResult};
use crate::storage::memory;
use crate::storage::Value;

#[derive(Clone, Copy, PartialEq, Eq)]
enum End {
    Head,
    Tail,
}

/// Resolves a possibly negative index against `len`.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

fn push(ctx: &mut Ctx<'_>, cmd: &Command, end: End) -> CommandResult<Reply> {
    let key = cmd.arg(0)?;
    let items = cmd.rest(1);

    let exists = match ctx.store.peek(key) {
        Some(value) => {
            value.as_list()?;
            true
        }
        None => false,
    };

    let push_all = |list: &mut VecDeque<_>| {
        for item in items {
            match end {
                End::Head => list.push_front(item.clone()),
                End::Tail => list.push_back(item.clone()),
            }
        }
        list.len()
    };

    if !exists {
        let mut list = VecDeque::with_capacity(items.len());
        let len = push_all(&mut list);
        ctx.store.set(key.clone(), Value::List(list), None)?;
        return Ok(Reply::integer(len as i64));
    }

    let growth = memory::list_push_size(items.iter().map(|item| &item[..]));
    let len = ctx
        .store
        .modify(key, growth, |value| value.as_list_mut().map(push_all).unwrap_or(0))?
        .unwrap_or(0);
    Ok(Reply::integer(len as i64))
}

fn pop(ctx: &mut Ctx<'_>, cmd: &Command, end: End) -> CommandResult<Reply> {
    if cmd.argc() > 3 {
        return Err(CommandError::WrongArity(cmd.name().to_string()));
    }
    let count = match cmd.args().len() {
        2 => {
            let n = cmd.int_arg(1)?;
            if n < 0 {
                return Err(CommandError::NotInteger);
            }
            Some(n as usize)
        }
        _ => None,
    };

    let key = cmd.arg(0)?;
    match ctx.store.peek(key) {
        Some(value) => {
            value.as_list()?;
        }
        None => return Ok(Reply::nil()),
    }
    if count == Some(0) {
        return Ok(Reply::array(Vec::new()));
    }

    let wanted = count.unwrap_or(1);
    let popped = ctx
        .store
        .modify(key, 0, |value| match value.as_list_mut() {
            Ok(list) => (0..wanted)
                .map_while(|_| match end {
                    End::Head => list.pop_front(),
                    End::Tail => list.pop_back(),
                })
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        })?
        .unwrap_or_default();

    Ok(match count {
        Some(_) => Reply::bulk_array(popped),
        None => Reply::bulk_or_nil(popped.into_iter().next()),
    })
}

/// LPUSH key value [value ...]
pub(super) fn lpush(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    push(ctx, cmd, End::Head)
}

/// RPUSH key value [value ...]
pub(super) fn rpush(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    push(ctx, cmd, End::Tail)
}

/// LPOP key [count]
pub(super) fn lpop(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    pop(ctx, cmd, End::Head)
}

/// RPOP key [count]
pub(super) fn rpop(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    pop(ctx, cmd, End::Tail)
}

/// LLEN key
pub(super) fn llen(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let len = match ctx.store.peek(cmd.arg(0)?) {
        Some(value) => value.as_list()?.len(),
        None => 0,
    };
    Ok(Reply::integer(len as i64))
}

/// LINDEX key index
pub(super) fn lindex(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let index = cmd.int_arg(1)?;
    let Some(value) = ctx.store.get(cmd.arg(0)?) else {
        return Ok(Reply::nil());
    };
    let list = value.as_list()?;
    Ok(Reply::bulk_or_nil(
        resolve_index(index, list.len()).and_then(|i| list.get(i).cloned()),
    ))
}

/// LRANGE key start stop
pub(super) fn lrange(ctx: &mut Ctx<'_>, cmd: &Command) -> CommandResult<Reply> {
    let start = cmd.int_arg(1)?;
    let stop = cmd.int_arg(2)?;
    let Some(value) = ctx.store.get(cmd.arg(0)?) else {
        return Ok(Reply::array(Vec::new()));
    };
    let list = value.as_list()?;

    let len = list.len() as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return Ok(Reply::array(Vec::new()));
    }

    let items = list
        .range(start as usize..=stop as usize)
        .cloned()
        .collect::<Vec<_>>();
    Ok(Reply::bulk_array(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(0, 3), Some(0));
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(-3, 3), Some(0));
        assert_eq!(resolve_index(-4, 3), None);
        assert_eq!(resolve_index(3, 3), None);
        assert_eq!(resolve_index(0, 0), None);
    }
}

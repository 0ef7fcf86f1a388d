use crate::{context::Context, db, proto::ec, proto::UserInfo};
use redis::Commands;

const USER_TOKEN: &str = "USERTOKEN:";
const USER_IP: &str = "USERIP:";
const USER_BASE_INFO: &str = "UBASEINFO:";
const NAME_INFO: &str = "NAME:";
const LOGIN_COUNT: &str = "LOGIN_COUNT";

fn get_string(ctx: &Context, key: &str) -> Option<String> {
    let conn = ctx.redis.get_connection();
    match conn {
        Ok(mut conn) => match conn.get::<_, Option<String>>(key) {
            Ok(v) => v,
            Err(e) => {
                log::error!("redis GET {} failed, {:?}", key, e);
                None
            }
        },
        Err(_) => {
            log::error!("connect redis failed");
            None
        }
    }
}

fn set_string(ctx: &Context, key: &str, value: &str) {
    let conn = ctx.redis.get_connection();
    match conn {
        Ok(mut conn) => {
            let r: redis::RedisResult<()> = conn.set(key, value);
            if let Err(e) = r {
                log::error!("redis SET {} failed, {:?}", key, e);
            }
        }
        Err(_) => log::error!("connect redis failed"),
    }
}

/// Success, TokenInvalid, or UidInvalid when the allocation service
/// never issued a token for this uid.
pub fn check_token(ctx: &Context, uid: u64, token: &str) -> u32 {
    match get_string(ctx, &format!("{}{}", USER_TOKEN, uid)) {
        Some(issued) if issued == token => ec::SUCCESS,
        Some(_) => ec::TOKEN_INVALID,
        None => ec::UID_INVALID,
    }
}

/// Read-through profile lookup. Redis errors surface as a miss and fall
/// back to the relational store; the caller maps a full miss to
/// `UidInvalid`.
pub fn get_user_by_uid(ctx: &Context, uid: u64) -> Option<UserInfo> {
    let key = format!("{}{}", USER_BASE_INFO, uid);
    if let Some(json) = get_string(ctx, &key) {
        match serde_json::from_str(&json) {
            Ok(user) => return Some(user),
            Err(e) => log::warn!("cached profile under {} is garbage, {:?}", key, e),
        }
    }
    let user = db::get_user_by_uid(ctx, uid)?;
    match serde_json::to_string(&user) {
        Ok(json) => set_string(ctx, &key, &json),
        Err(e) => log::error!("encoding profile of {} failed, {:?}", uid, e),
    }
    Some(user)
}

pub fn get_user_by_name(ctx: &Context, name: &str) -> Option<UserInfo> {
    let key = format!("{}{}", NAME_INFO, name);
    if let Some(json) = get_string(ctx, &key) {
        match serde_json::from_str(&json) {
            Ok(user) => return Some(user),
            Err(e) => log::warn!("cached profile under {} is garbage, {:?}", key, e),
        }
    }
    let user = db::get_user_by_name(ctx, name)?;
    match serde_json::to_string(&user) {
        Ok(json) => set_string(ctx, &key, &json),
        Err(e) => log::error!("encoding profile of {} failed, {:?}", name, e),
    }
    Some(user)
}

/// The node name owning `uid`'s session, if any.
pub fn presence_of(ctx: &Context, uid: u64) -> Option<String> {
    get_string(ctx, &format!("{}{}", USER_IP, uid))
}

pub fn publish_presence(ctx: &Context, uid: u64) {
    set_string(ctx, &format!("{}{}", USER_IP, uid), ctx.node_name());
}

/// Deletes the presence record only while it still names this node; a
/// relogin routed to another node keeps its fresher record.
pub fn revoke_presence(ctx: &Context, uid: u64) {
    if presence_of(ctx, uid).as_deref() != Some(ctx.node_name()) {
        return;
    }
    let conn = ctx.redis.get_connection();
    match conn {
        Ok(mut conn) => {
            let r: redis::RedisResult<()> = conn.del(format!("{}{}", USER_IP, uid));
            if let Err(e) = r {
                log::error!("redis DEL {}{} failed, {:?}", USER_IP, uid, e);
            }
        }
        Err(_) => log::error!("connect redis failed"),
    }
}

fn bump_login_count(ctx: &Context, delta: i64) {
    let conn = ctx.redis.get_connection();
    match conn {
        Ok(mut conn) => {
            let r: redis::RedisResult<i64> = conn.hincr(LOGIN_COUNT, ctx.node_name(), delta);
            match r {
                Ok(count) => log::debug!("{} now carries {} sessions", ctx.node_name(), count),
                Err(e) => log::error!("redis HINCRBY {} failed, {:?}", LOGIN_COUNT, e),
            }
        }
        Err(_) => log::error!("connect redis failed"),
    }
}

pub fn incr_login_count(ctx: &Context) {
    bump_login_count(ctx, 1);
}

pub fn decr_login_count(ctx: &Context) {
    bump_login_count(ctx, -1);
}

/// Startup: the allocation service weighs nodes by this field, so a
/// restarted node must not inherit a stale count.
pub fn reset_login_count(ctx: &Context) -> anyhow::Result<()> {
    let mut conn = ctx.redis.get_connection()?;
    let _: () = conn.hset(LOGIN_COUNT, ctx.node_name(), "0")?;
    Ok(())
}

/// Clean shutdown takes the node out of the allocation pool entirely.
pub fn remove_login_count(ctx: &Context) {
    let conn = ctx.redis.get_connection();
    match conn {
        Ok(mut conn) => {
            let r: redis::RedisResult<()> = conn.hdel(LOGIN_COUNT, ctx.node_name());
            if let Err(e) = r {
                log::error!("redis HDEL {} failed, {:?}", LOGIN_COUNT, e);
            }
        }
        Err(_) => log::error!("connect redis failed"),
    }
}

use crate::context::Context;
use crate::proto::{ApplyEntry, FriendEntry, UserInfo};
use mysql::{prelude::*, *};

/// Queries degrade on failure: readers return an empty result, writers
/// return false, and the caller maps that to a business error code.
pub fn get_user_by_uid(ctx: &Context, uid: u64) -> Option<UserInfo> {
    let sql = "SELECT f_uid,f_name,f_pwd,f_email,f_nick,f_desc,f_sex,f_icon FROM t_user WHERE f_uid=?";
    let conn = ctx.db.get_conn();
    if conn.is_err() {
        log::error!("retrieve mysql connection failed while get_user_by_uid");
        return None;
    }
    let mut conn = conn.unwrap();
    conn.exec_first(sql, (uid,))
        .map(|row| row.map(into_user))
        .unwrap_or_else(|e| {
            log::error!("querying user {} failed, {:?}", uid, e);
            None
        })
}

pub fn get_user_by_name(ctx: &Context, name: &str) -> Option<UserInfo> {
    let sql = "SELECT f_uid,f_name,f_pwd,f_email,f_nick,f_desc,f_sex,f_icon FROM t_user WHERE f_name=?";
    let conn = ctx.db.get_conn();
    if conn.is_err() {
        log::error!("retrieve mysql connection failed while get_user_by_name");
        return None;
    }
    let mut conn = conn.unwrap();
    conn.exec_first(sql, (name,))
        .map(|row| row.map(into_user))
        .unwrap_or_else(|e| {
            log::error!("querying user {} failed, {:?}", name, e);
            None
        })
}

fn into_user(
    (uid, name, pwd, email, nick, desc, sex, icon): (
        u64,
        String,
        String,
        String,
        String,
        String,
        u32,
        String,
    ),
) -> UserInfo {
    UserInfo {
        uid,
        name,
        pwd,
        email,
        nick,
        desc,
        sex,
        icon,
    }
}

/// Records a pending apply; re-applying is a no-op rather than an error.
pub fn add_friend_apply(ctx: &Context, from_uid: u64, to_uid: u64) -> bool {
    let sql = "INSERT IGNORE INTO t_friend_apply(f_from_uid,f_to_uid,f_status) VALUES(?,?,0)";
    let conn = ctx.db.get_conn();
    if conn.is_err() {
        log::error!("retrieve mysql connection failed while add_friend_apply");
        return false;
    }
    let mut conn = conn.unwrap();
    match conn.exec_drop(sql, (from_uid, to_uid)) {
        Ok(()) => true,
        Err(e) => {
            log::error!(
                "recording friend apply {} -> {} failed, {:?}",
                from_uid,
                to_uid,
                e
            );
            false
        }
    }
}

pub fn auth_friend_apply(ctx: &Context, from_uid: u64, to_uid: u64) -> bool {
    let sql = "UPDATE t_friend_apply SET f_status=1 WHERE f_from_uid=? AND f_to_uid=?";
    let conn = ctx.db.get_conn();
    if conn.is_err() {
        log::error!("retrieve mysql connection failed while auth_friend_apply");
        return false;
    }
    let mut conn = conn.unwrap();
    match conn.exec_drop(sql, (from_uid, to_uid)) {
        Ok(()) => true,
        Err(e) => {
            log::error!(
                "authorizing friend apply {} -> {} failed, {:?}",
                from_uid,
                to_uid,
                e
            );
            false
        }
    }
}

/// Both directions in one transaction; `back` is the authorizer's remark
/// for the applicant.
pub fn add_friend(ctx: &Context, self_uid: u64, friend_uid: u64, back: &str) -> bool {
    let sql = "INSERT IGNORE INTO t_friend(f_self_id,f_friend_id,f_back) VALUES(?,?,?)";
    let conn = ctx.db.get_conn();
    if conn.is_err() {
        log::error!("retrieve mysql connection failed while add_friend");
        return false;
    }
    let mut conn = conn.unwrap();
    let r = conn
        .start_transaction(TxOpts::default())
        .and_then(|mut tx| {
            tx.exec_drop(sql, (self_uid, friend_uid, back))?;
            tx.exec_drop(sql, (friend_uid, self_uid, ""))?;
            tx.commit()
        });
    match r {
        Ok(()) => true,
        Err(e) => {
            log::error!(
                "persisting friendship {} <-> {} failed, {:?}",
                self_uid,
                friend_uid,
                e
            );
            false
        }
    }
}

/// Pending applies addressed to `to_uid`, joined with the applicant's
/// profile, paged.
pub fn get_apply_list(ctx: &Context, to_uid: u64, offset: usize, limit: usize) -> Vec<ApplyEntry> {
    let sql = "SELECT a.f_from_uid,a.f_status,u.f_name,u.f_nick,u.f_sex,u.f_desc,u.f_icon \
               FROM t_friend_apply a JOIN t_user u ON a.f_from_uid=u.f_uid \
               WHERE a.f_to_uid=? ORDER BY a.f_from_uid LIMIT ?,?";
    let conn = ctx.db.get_conn();
    if conn.is_err() {
        log::error!("retrieve mysql connection failed while get_apply_list");
        return vec![];
    }
    let mut conn = conn.unwrap();
    conn.exec_map(
        sql,
        (to_uid, offset, limit),
        |(uid, status, name, nick, sex, desc, icon): (u64, u32, String, String, u32, String, String)| {
            ApplyEntry {
                name,
                uid,
                icon,
                nick,
                sex,
                desc,
                status,
            }
        },
    )
    .unwrap_or_else(|e| {
        log::error!("querying apply list of {} failed, {:?}", to_uid, e);
        vec![]
    })
}

pub fn get_friend_list(ctx: &Context, self_uid: u64) -> Vec<FriendEntry> {
    let sql = "SELECT u.f_uid,u.f_name,u.f_nick,u.f_sex,u.f_desc,u.f_icon,f.f_back \
               FROM t_friend f JOIN t_user u ON f.f_friend_id=u.f_uid \
               WHERE f.f_self_id=?";
    let conn = ctx.db.get_conn();
    if conn.is_err() {
        log::error!("retrieve mysql connection failed while get_friend_list");
        return vec![];
    }
    let mut conn = conn.unwrap();
    conn.exec_map(
        sql,
        (self_uid,),
        |(uid, name, nick, sex, desc, icon, back): (u64, String, String, u32, String, String, String)| {
            FriendEntry {
                name,
                uid,
                icon,
                nick,
                sex,
                desc,
                back,
            }
        },
    )
    .unwrap_or_else(|e| {
        log::error!("querying friend list of {} failed, {:?}", self_uid, e);
        vec![]
    })
}

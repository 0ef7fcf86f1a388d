use crate::{
    cache,
    context::Context,
    db,
    proto::*,
    router::{self, Notice},
    session::Session,
};
use std::sync::Arc;

pub type Handler = fn(&Arc<Context>, &Arc<Session>, u16, &[u8]);

const BASE: u16 = id::MSG_CHAT_LOGIN;
const SLOTS: usize = 16;

// dense table over 1005..=1020; response and notify ids stay empty
static HANDLERS: [Option<Handler>; SLOTS] = [
    Some(on_login),         // MSG_CHAT_LOGIN
    None,                   // MSG_CHAT_LOGIN_RSP
    Some(on_search_user),   // ID_SEARCH_USER_REQ
    None,                   // ID_SEARCH_USER_RSP
    Some(on_add_friend),    // ID_ADD_FRIEND_REQ
    None,                   // ID_ADD_FRIEND_RSP
    None,                   // ID_NOTIFY_ADD_FRIEND_REQ
    None,                   // 1012
    Some(on_auth_friend),   // ID_AUTH_FRIEND_REQ
    None,                   // ID_AUTH_FRIEND_RSP
    None,                   // ID_NOTIFY_AUTH_FRIEND_REQ
    None,                   // 1016
    Some(on_text_chat),     // ID_TEXT_CHAT_MSG_REQ
    None,                   // ID_TEXT_CHAT_MSG_RSP
    None,                   // ID_NOTIFY_TEXT_CHAT_MSG_REQ
    Some(on_session_evicted),
];

pub(crate) fn handler_for(msg_id: u16) -> Option<Handler> {
    msg_id
        .checked_sub(BASE)
        .and_then(|idx| HANDLERS.get(idx as usize).copied())
        .flatten()
}

/// Dispatcher entry point. An unknown id is logged and dropped; the
/// session stays open for forward compatibility.
pub fn route(ctx: &Arc<Context>, session: Arc<Session>, msg_id: u16, payload: Vec<u8>) {
    match handler_for(msg_id) {
        Some(handler) => handler(ctx, &session, msg_id, &payload),
        None => log::info!("msg id [{}] handler not found", msg_id),
    }
}

fn on_login(ctx: &Arc<Context>, session: &Arc<Session>, _msg_id: u16, payload: &[u8]) {
    let req: LoginReq = match serde_json::from_slice(payload) {
        Ok(req) => req,
        Err(e) => {
            log::warn!("session {}: bad login payload, {:?}", session.session_id(), e);
            session.send_json(id::MSG_CHAT_LOGIN_RSP, &ErrorRsp { error: ec::ERROR_JSON });
            return;
        }
    };
    // the identity is assigned exactly once per session
    if session.user_id() != 0 {
        log::warn!(
            "session {} attempted a second login as {}, closing",
            session.session_id(),
            req.uid
        );
        if ctx.registry.evict(session) {
            cleanup_evicted(ctx, session);
        }
        return;
    }
    let checked = cache::check_token(ctx, req.uid, &req.token);
    if checked != ec::SUCCESS {
        session.send_json(id::MSG_CHAT_LOGIN_RSP, &ErrorRsp { error: checked });
        return;
    }
    let user = match cache::get_user_by_uid(ctx, req.uid) {
        Some(user) => user,
        None => {
            session.send_json(id::MSG_CHAT_LOGIN_RSP, &ErrorRsp { error: ec::UID_INVALID });
            return;
        }
    };
    let apply_list = db::get_apply_list(ctx, req.uid, 0, 10);
    let friend_list = db::get_friend_list(ctx, req.uid);
    session.send_json(
        id::MSG_CHAT_LOGIN_RSP,
        &LoginRsp {
            error: ec::SUCCESS,
            user,
            apply_list,
            friend_list,
        },
    );

    session.bind_uid(req.uid);
    if let Some(displaced) = ctx.registry.bind_user(req.uid, session.clone()) {
        log::info!(
            "uid {} logged in again, kicking session {}",
            req.uid,
            displaced.session_id()
        );
        ctx.registry.evict(&displaced);
        cleanup_evicted(ctx, &displaced);
    }
    cache::publish_presence(ctx, req.uid);
    cache::incr_login_count(ctx);
    session.mark_counted();
}

fn on_search_user(ctx: &Arc<Context>, session: &Arc<Session>, _msg_id: u16, payload: &[u8]) {
    let req: SearchReq = match serde_json::from_slice(payload) {
        Ok(req) => req,
        Err(_) => {
            session.send_json(id::ID_SEARCH_USER_RSP, &ErrorRsp { error: ec::ERROR_JSON });
            return;
        }
    };
    let user = if is_pure_digit(&req.uid) {
        req.uid
            .parse::<u64>()
            .ok()
            .and_then(|uid| cache::get_user_by_uid(ctx, uid))
    } else {
        cache::get_user_by_name(ctx, &req.uid)
    };
    let error = if user.is_some() { ec::SUCCESS } else { ec::UID_INVALID };
    session.send_json(id::ID_SEARCH_USER_RSP, &ProfileRsp { error, user });
}

fn on_add_friend(ctx: &Arc<Context>, session: &Arc<Session>, _msg_id: u16, payload: &[u8]) {
    let req: AddFriendReq = match serde_json::from_slice(payload) {
        Ok(req) => req,
        Err(_) => {
            session.send_json(id::ID_ADD_FRIEND_RSP, &ErrorRsp { error: ec::ERROR_JSON });
            return;
        }
    };
    db::add_friend_apply(ctx, req.uid, req.touid);
    // the apply is recorded; delivery below is fire-and-forget
    session.send_json(id::ID_ADD_FRIEND_RSP, &ErrorRsp { error: ec::SUCCESS });

    let profile = cache::get_user_by_uid(ctx, req.uid);
    router::deliver(
        ctx,
        req.touid,
        Notice::AddFriend(NotifyAddFriendReq {
            applyuid: req.uid,
            touid: req.touid,
            name: req.applyname,
            desc: String::new(),
            icon: profile.as_ref().map(|u| u.icon.clone()),
            sex: profile.as_ref().map(|u| u.sex),
            nick: profile.as_ref().map(|u| u.nick.clone()),
        }),
    );
}

fn on_auth_friend(ctx: &Arc<Context>, session: &Arc<Session>, _msg_id: u16, payload: &[u8]) {
    let req: AuthFriendReq = match serde_json::from_slice(payload) {
        Ok(req) => req,
        Err(_) => {
            session.send_json(id::ID_AUTH_FRIEND_RSP, &ErrorRsp { error: ec::ERROR_JSON });
            return;
        }
    };
    db::auth_friend_apply(ctx, req.fromuid, req.touid);
    db::add_friend(ctx, req.fromuid, req.touid, &req.back);

    let rsp = match cache::get_user_by_uid(ctx, req.touid) {
        Some(peer) => AuthFriendRsp {
            error: ec::SUCCESS,
            uid: Some(req.touid),
            name: Some(peer.name),
            nick: Some(peer.nick),
            icon: Some(peer.icon),
            sex: Some(peer.sex),
        },
        None => AuthFriendRsp {
            error: ec::UID_INVALID,
            uid: None,
            name: None,
            nick: None,
            icon: None,
            sex: None,
        },
    };
    session.send_json(id::ID_AUTH_FRIEND_RSP, &rsp);

    router::deliver(
        ctx,
        req.touid,
        Notice::AuthFriend(NotifyAuthFriendReq {
            fromuid: req.fromuid,
            touid: req.touid,
        }),
    );
}

fn on_text_chat(ctx: &Arc<Context>, session: &Arc<Session>, _msg_id: u16, payload: &[u8]) {
    let req: TextChatReq = match serde_json::from_slice(payload) {
        Ok(req) => req,
        Err(_) => {
            session.send_json(id::ID_TEXT_CHAT_MSG_RSP, &ErrorRsp { error: ec::ERROR_JSON });
            return;
        }
    };
    // echo back for client-side confirmation
    session.send_json(
        id::ID_TEXT_CHAT_MSG_RSP,
        &TextChatRsp {
            error: ec::SUCCESS,
            text_array: req.text_array.clone(),
            fromuid: req.fromuid,
            touid: req.touid,
        },
    );
    router::deliver(
        ctx,
        req.touid,
        Notice::TextChat(NotifyTextChatReq {
            fromuid: req.fromuid,
            touid: req.touid,
            text_array: req.text_array,
        }),
    );
}

/// Posted by the session layer once per torn-down connection; runs on
/// the dispatcher so presence bookkeeping is serialized with logins. A
/// spoofed frame with this id lands on a live session and is ignored.
fn on_session_evicted(ctx: &Arc<Context>, session: &Arc<Session>, _msg_id: u16, _payload: &[u8]) {
    if !session.is_closed() {
        log::warn!(
            "session {} sent the eviction id while alive, ignoring",
            session.session_id()
        );
        return;
    }
    cleanup_evicted(ctx, session);
}

/// Safe to run more than once for the same session: the counted flag is
/// taken exactly once and the presence checks are conditional writes.
fn cleanup_evicted(ctx: &Arc<Context>, session: &Arc<Session>) {
    if session.take_counted() {
        cache::decr_login_count(ctx);
    }
    let uid = session.user_id();
    if uid != 0 && ctx.registry.lookup_user(uid).is_none() {
        cache::revoke_presence(ctx, uid);
    }
}

fn is_pure_digit(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    pub fn test_handler_table() {
        assert!(handler_for(id::MSG_CHAT_LOGIN).is_some());
        assert!(handler_for(id::ID_SEARCH_USER_REQ).is_some());
        assert!(handler_for(id::ID_ADD_FRIEND_REQ).is_some());
        assert!(handler_for(id::ID_AUTH_FRIEND_REQ).is_some());
        assert!(handler_for(id::ID_TEXT_CHAT_MSG_REQ).is_some());
        assert!(handler_for(id::SESSION_EVICTED).is_some());
        // responses and notifies are never dispatched
        assert!(handler_for(id::MSG_CHAT_LOGIN_RSP).is_none());
        assert!(handler_for(id::ID_NOTIFY_TEXT_CHAT_MSG_REQ).is_none());
        // outside the table entirely
        assert!(handler_for(0).is_none());
        assert!(handler_for(1004).is_none());
        assert!(handler_for(1021).is_none());
        assert!(handler_for(2048).is_none());
    }

    #[test]
    pub fn test_is_pure_digit() {
        assert!(is_pure_digit("7"));
        assert!(is_pure_digit("0042"));
        assert!(!is_pure_digit("alice"));
        assert!(!is_pure_digit("4 2"));
        assert!(!is_pure_digit(""));
    }
}

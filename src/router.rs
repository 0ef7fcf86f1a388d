use crate::{cache, context::Context, proto::*};
use std::sync::Arc;

pub enum Notice {
    AddFriend(NotifyAddFriendReq),
    AuthFriend(NotifyAuthFriendReq),
    TextChat(NotifyTextChatReq),
}

/// Fire-and-forget delivery: a local session's send queue, the RPC link
/// to the owning node, or nowhere. Nothing here reports back to the
/// originating client.
pub fn deliver(ctx: &Arc<Context>, touid: u64, notice: Notice) {
    // no presence record means offline under our model: drop silently
    let node = match cache::presence_of(ctx, touid) {
        Some(node) => node,
        None => return,
    };
    if node == ctx.node_name() {
        deliver_local(ctx, touid, notice);
        return;
    }
    let error = match &notice {
        Notice::AddFriend(req) => ctx.peers.notify_add_friend(&node, req),
        Notice::AuthFriend(req) => ctx.peers.notify_auth_friend(&node, req),
        Notice::TextChat(req) => ctx.peers.notify_text_chat(&node, req),
    };
    if error != ec::SUCCESS {
        log::error!(
            "forwarding notification for {} to {} failed with {}",
            touid,
            node,
            error
        );
    }
}

/// The registry may have lost the binding between the presence read and
/// this lookup; that race also drops silently.
fn deliver_local(ctx: &Arc<Context>, touid: u64, notice: Notice) {
    let target = match ctx.registry.lookup_user(touid) {
        Some(target) => target,
        None => return,
    };
    match notice {
        Notice::AddFriend(req) => {
            target.send_json(id::ID_NOTIFY_ADD_FRIEND_REQ, &add_friend_notice(&req));
        }
        Notice::AuthFriend(req) => {
            target.send_json(
                id::ID_NOTIFY_AUTH_FRIEND_REQ,
                &auth_friend_notice(ctx, req.fromuid, req.touid),
            );
        }
        Notice::TextChat(req) => {
            target.send_json(
                id::ID_NOTIFY_TEXT_CHAT_MSG_REQ,
                &TextChatRsp {
                    error: ec::SUCCESS,
                    text_array: req.text_array,
                    fromuid: req.fromuid,
                    touid: req.touid,
                },
            );
        }
    }
}

pub fn add_friend_notice(req: &NotifyAddFriendReq) -> AddFriendNotify {
    AddFriendNotify {
        error: ec::SUCCESS,
        applyuid: req.applyuid,
        name: req.name.clone(),
        desc: req.desc.clone(),
        icon: req.icon.clone(),
        sex: req.sex,
        nick: req.nick.clone(),
    }
}

/// The applicant's profile is resolved by the node owning the target
/// session, which is why the RPC payload carries only the two uids. A
/// missing profile degrades the notice, it does not suppress it.
pub fn auth_friend_notice(ctx: &Context, fromuid: u64, touid: u64) -> AuthFriendNotify {
    match cache::get_user_by_uid(ctx, fromuid) {
        Some(user) => AuthFriendNotify {
            error: ec::SUCCESS,
            fromuid,
            touid,
            name: Some(user.name),
            nick: Some(user.nick),
            icon: Some(user.icon),
            sex: Some(user.sex),
        },
        None => AuthFriendNotify {
            error: ec::UID_INVALID,
            fromuid,
            touid,
            name: None,
            nick: None,
            icon: None,
            sex: None,
        },
    }
}

use crate::{codec, context::Context, proto::*, router};
use serde::Serialize;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

/// Serves the three `Notify*` calls to peer nodes, each translating its
/// payload into a notification frame for the local target session. A
/// missing session still replies success; the caller never retries.
pub fn serve(ctx: Arc<Context>) -> anyhow::Result<thread::JoinHandle<()>> {
    let addr = ctx.cfg.server.rpc_bind_addr();
    let listener = TcpListener::bind(&addr)?;
    log::info!("rpc server listening on {}", addr);
    let handle = thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let ctx = ctx.clone();
                    thread::spawn(move || serve_peer(ctx, stream));
                }
                Err(e) => log::error!("accepting rpc connection failed, {:?}", e),
            }
        }
    });
    Ok(handle)
}

/// Peers hold their pooled connections open and issue one call at a
/// time on each, so a plain read-dispatch-write loop suffices.
fn serve_peer(ctx: Arc<Context>, mut stream: TcpStream) {
    let _ = stream.set_nodelay(true);
    loop {
        let mut head = [0_u8; codec::HEADER_LEN];
        if stream.read_exact(&mut head).is_err() {
            break;
        }
        let (method, len) = match codec::decode_header(head) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("rpc peer framing violation, {}", e);
                break;
            }
        };
        let mut body = vec![0_u8; len as usize];
        if stream.read_exact(&mut body).is_err() {
            break;
        }
        let reply = dispatch(&ctx, method, &body);
        if stream.write_all(&codec::encode(method, &reply)).is_err() {
            break;
        }
    }
}

fn dispatch(ctx: &Arc<Context>, method: u16, body: &[u8]) -> Vec<u8> {
    match method {
        id::RPC_NOTIFY_ADD_FRIEND => notify_add_friend(ctx, body),
        id::RPC_NOTIFY_AUTH_FRIEND => notify_auth_friend(ctx, body),
        id::RPC_NOTIFY_TEXT_CHAT_MSG => notify_text_chat(ctx, body),
        other => {
            log::warn!("unknown rpc method {}", other);
            encode_reply(&ErrorRsp {
                error: ec::RPC_FAILED,
            })
        }
    }
}

fn notify_add_friend(ctx: &Arc<Context>, body: &[u8]) -> Vec<u8> {
    let req: NotifyAddFriendReq = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            log::warn!("bad NotifyAddFriend payload, {:?}", e);
            return encode_reply(&ErrorRsp {
                error: ec::ERROR_JSON,
            });
        }
    };
    if let Some(target) = ctx.registry.lookup_user(req.touid) {
        target.send_json(id::ID_NOTIFY_ADD_FRIEND_REQ, &router::add_friend_notice(&req));
    }
    encode_reply(&NotifyAddFriendRsp {
        error: ec::SUCCESS,
        applyuid: req.applyuid,
        touid: req.touid,
    })
}

fn notify_auth_friend(ctx: &Arc<Context>, body: &[u8]) -> Vec<u8> {
    let req: NotifyAuthFriendReq = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            log::warn!("bad NotifyAuthFriend payload, {:?}", e);
            return encode_reply(&ErrorRsp {
                error: ec::ERROR_JSON,
            });
        }
    };
    if let Some(target) = ctx.registry.lookup_user(req.touid) {
        target.send_json(
            id::ID_NOTIFY_AUTH_FRIEND_REQ,
            &router::auth_friend_notice(ctx, req.fromuid, req.touid),
        );
    }
    encode_reply(&NotifyAuthFriendRsp {
        error: ec::SUCCESS,
        fromuid: req.fromuid,
        touid: req.touid,
    })
}

fn notify_text_chat(ctx: &Arc<Context>, body: &[u8]) -> Vec<u8> {
    let req: NotifyTextChatReq = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            log::warn!("bad NotifyTextChatMsg payload, {:?}", e);
            return encode_reply(&ErrorRsp {
                error: ec::ERROR_JSON,
            });
        }
    };
    if let Some(target) = ctx.registry.lookup_user(req.touid) {
        target.send_json(
            id::ID_NOTIFY_TEXT_CHAT_MSG_REQ,
            &TextChatRsp {
                error: ec::SUCCESS,
                text_array: req.text_array.clone(),
                fromuid: req.fromuid,
                touid: req.touid,
            },
        );
    }
    encode_reply(&NotifyTextChatRsp {
        error: ec::SUCCESS,
        fromuid: req.fromuid,
        touid: req.touid,
        text_array: req.text_array,
    })
}

fn encode_reply(rsp: &impl Serialize) -> Vec<u8> {
    serde_json::to_vec(rsp).unwrap_or_else(|e| {
        log::error!("encoding rpc reply failed, {:?}", e);
        br#"{"error":1002}"#.to_vec()
    })
}

use serde::{Deserialize, Serialize};

/// Message ids on the chat session. The values are part of the deployed
/// protocol and must stay identical on every node.
pub mod id {
    pub const MSG_CHAT_LOGIN: u16 = 1005;
    pub const MSG_CHAT_LOGIN_RSP: u16 = 1006;
    pub const ID_SEARCH_USER_REQ: u16 = 1007;
    pub const ID_SEARCH_USER_RSP: u16 = 1008;
    pub const ID_ADD_FRIEND_REQ: u16 = 1009;
    pub const ID_ADD_FRIEND_RSP: u16 = 1010;
    pub const ID_NOTIFY_ADD_FRIEND_REQ: u16 = 1011;
    pub const ID_AUTH_FRIEND_REQ: u16 = 1013;
    pub const ID_AUTH_FRIEND_RSP: u16 = 1014;
    pub const ID_NOTIFY_AUTH_FRIEND_REQ: u16 = 1015;
    pub const ID_TEXT_CHAT_MSG_REQ: u16 = 1017;
    pub const ID_TEXT_CHAT_MSG_RSP: u16 = 1018;
    pub const ID_NOTIFY_TEXT_CHAT_MSG_REQ: u16 = 1019;

    // never on the client wire: posted by the session layer when a
    // connection is torn down so presence cleanup runs on the dispatcher
    pub const SESSION_EVICTED: u16 = 1020;

    // peer RPC link
    pub const RPC_NOTIFY_ADD_FRIEND: u16 = 2001;
    pub const RPC_NOTIFY_AUTH_FRIEND: u16 = 2002;
    pub const RPC_NOTIFY_TEXT_CHAT_MSG: u16 = 2003;
}

/// Numeric error codes carried in the `error` field of every reply.
/// The gateway-only codes are listed to keep the space stable across
/// the three server roles.
pub mod ec {
    pub const SUCCESS: u32 = 0;
    pub const ERROR_JSON: u32 = 1001;
    pub const RPC_FAILED: u32 = 1002;
    pub const VARIFY_EXPIRED: u32 = 1003;
    pub const VARIFY_CODE_ERR: u32 = 1004;
    pub const USER_EXIST: u32 = 1005;
    pub const PASSWD_ERR: u32 = 1006;
    pub const EMAIL_NOT_MATCH: u32 = 1007;
    pub const PASSWD_UP_FAILED: u32 = 1008;
    pub const PASSWD_INVALID: u32 = 1009;
    pub const TOKEN_INVALID: u32 = 1010;
    pub const UID_INVALID: u32 = 1011;
}

/// Cached/persisted user profile, also the JSON encoding under
/// `UBASEINFO:<uid>` and `NAME:<name>`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub uid: u64,
    pub name: String,
    pub pwd: String,
    pub email: String,
    pub nick: String,
    pub desc: String,
    pub sex: u32,
    pub icon: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginReq {
    pub uid: u64,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginRsp {
    pub error: u32,
    #[serde(flatten)]
    pub user: UserInfo,
    pub apply_list: Vec<ApplyEntry>,
    pub friend_list: Vec<FriendEntry>,
}

/// A pending friend apply as shown to the applied-to user.
#[derive(Debug, Serialize, Clone)]
pub struct ApplyEntry {
    pub name: String,
    pub uid: u64,
    pub icon: String,
    pub nick: String,
    pub sex: u32,
    pub desc: String,
    pub status: u32,
}

#[derive(Debug, Serialize, Clone)]
pub struct FriendEntry {
    pub name: String,
    pub uid: u64,
    pub icon: String,
    pub nick: String,
    pub sex: u32,
    pub desc: String,
    pub back: String,
}

/// `uid` is a free-form search key: all digits means lookup by id,
/// anything else lookup by name.
#[derive(Debug, Deserialize)]
pub struct SearchReq {
    pub uid: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileRsp {
    pub error: u32,
    #[serde(flatten)]
    pub user: Option<UserInfo>,
}

#[derive(Debug, Serialize)]
pub struct ErrorRsp {
    pub error: u32,
}

#[derive(Debug, Deserialize)]
pub struct AddFriendReq {
    pub uid: u64,
    pub applyname: String,
    pub bakname: String,
    pub touid: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AddFriendNotify {
    pub error: u32,
    pub applyuid: u64,
    pub name: String,
    pub desc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthFriendReq {
    pub fromuid: u64,
    pub touid: u64,
    pub back: String,
}

#[derive(Debug, Serialize)]
pub struct AuthFriendRsp {
    pub error: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<u32>,
}

#[derive(Debug, Serialize, Clone)]
pub struct AuthFriendNotify {
    pub error: u32,
    pub fromuid: u64,
    pub touid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TextMsg {
    pub msgid: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct TextChatReq {
    pub fromuid: u64,
    pub touid: u64,
    pub text_array: Vec<TextMsg>,
}

/// Doubles as the sender echo (`ID_TEXT_CHAT_MSG_RSP`) and the receiver
/// notification (`ID_NOTIFY_TEXT_CHAT_MSG_REQ`).
#[derive(Debug, Serialize, Clone)]
pub struct TextChatRsp {
    pub error: u32,
    pub text_array: Vec<TextMsg>,
    pub fromuid: u64,
    pub touid: u64,
}

// ---- peer RPC payloads -------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyAddFriendReq {
    pub applyuid: u64,
    pub touid: u64,
    pub name: String,
    pub desc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotifyAddFriendRsp {
    pub error: u32,
    pub applyuid: u64,
    pub touid: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyAuthFriendReq {
    pub fromuid: u64,
    pub touid: u64,
}

#[derive(Debug, Serialize)]
pub struct NotifyAuthFriendRsp {
    pub error: u32,
    pub fromuid: u64,
    pub touid: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyTextChatReq {
    pub fromuid: u64,
    pub touid: u64,
    pub text_array: Vec<TextMsg>,
}

#[derive(Debug, Serialize)]
pub struct NotifyTextChatRsp {
    pub error: u32,
    pub fromuid: u64,
    pub touid: u64,
    pub text_array: Vec<TextMsg>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    pub fn test_deserialize_requests() {
        let login = serde_json::from_str::<LoginReq>(r#"{"uid":42,"token":"T"}"#).unwrap();
        assert_eq!((login.uid, login.token.as_str()), (42, "T"));

        let search = serde_json::from_str::<SearchReq>(r#"{"uid":"alice"}"#).unwrap();
        assert_eq!(search.uid, "alice");

        let chat = serde_json::from_str::<TextChatReq>(
            r#"{"fromuid":1,"touid":99,"text_array":[{"msgid":"m1","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(chat.text_array.len(), 1);
        assert_eq!(chat.text_array[0].content, "hi");

        assert!(serde_json::from_str::<LoginReq>(r#"{"uid":"not-a-number"}"#).is_err());
    }

    #[test]
    pub fn test_profile_rsp_flatten() {
        let hit = ProfileRsp {
            error: ec::SUCCESS,
            user: Some(UserInfo {
                uid: 7,
                name: "bob".into(),
                ..Default::default()
            }),
        };
        let v = serde_json::to_value(&hit).unwrap();
        assert_eq!(v["error"], 0);
        assert_eq!(v["uid"], 7);
        assert_eq!(v["name"], "bob");

        let miss = ProfileRsp {
            error: ec::UID_INVALID,
            user: None,
        };
        let v = serde_json::to_value(&miss).unwrap();
        assert_eq!(v["error"], 1011);
        assert!(v.get("uid").is_none());
    }

    #[test]
    pub fn test_notify_optional_fields() {
        let bare = AddFriendNotify {
            error: ec::SUCCESS,
            applyuid: 1,
            name: "carol".into(),
            desc: String::new(),
            icon: None,
            sex: None,
            nick: None,
        };
        let v = serde_json::to_value(&bare).unwrap();
        assert!(v.get("icon").is_none());
        assert_eq!(v["applyuid"], 1);
    }
}

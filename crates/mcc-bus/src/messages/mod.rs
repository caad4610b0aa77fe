// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bus message model.
//!
//! A [`Message`] is a [`Header`] plus a [`Body`]. Bodies form a closed sum type;
//! handlers implement [`MessageProcessor`], which has one `on_*` method per
//! kind with a logging default, and [`dispatch`] routes a message to it.

mod channel;
mod cmd;
mod device;
mod stats;
mod system;

pub use channel::{ChannelOperation, ChannelRequest, ChannelResponse, ChannelStateResponse};
pub use cmd::{
    Cmd, CmdCancel, CmdId, CmdIdGen, CmdState, CmdStatus, CmdSubscribeRequest,
    CmdSubscribeResponse, Value,
};
pub use device::{
    DeviceActionLog, DeviceActivateRequest, DeviceActivateResponse, DeviceConnectRequest,
    DeviceConnectResponse, DeviceDescriptionRequest, DeviceDescriptionResponse,
    DeviceDisconnectRequest, DeviceDisconnectResponse, DeviceFileLoadCancelRequest,
    DeviceFileLoadRequest, DeviceFileLoadResponse, DeviceListRequest, DeviceListResponse, DeviceStateResponse,
    DeviceUnRegistered, FileDirection, ProtocolForDeviceRequest, ProtocolForDeviceResponse,
    ProtocolId, TmParam, TmParamList,
};
pub use stats::{Stat, StatChannel, StatDevice};
pub use system::{
    Error, SystemComponentState, SystemComponentStateRequest, SystemState, SystemStateRequest,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::BlockingChannel;
use crate::names;

pub type MessageId = u64;

/// Inbound queue of an endpoint.
pub type MessageQueue = BlockingChannel<Message>;

/// Routing metadata of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub id: MessageId,
    pub sender: String,
    pub receiver: String,
    pub time: DateTime<Utc>,
    /// Id of the request this message answers.
    #[serde(default)]
    pub request_id: Option<MessageId>,
}

impl Header {
    pub fn new(
        id: MessageId,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        request_id: Option<MessageId>,
    ) -> Self {
        Self {
            id,
            sender: sender.into(),
            receiver: receiver.into(),
            time: Utc::now(),
            request_id,
        }
    }

    pub fn is_multicast(&self) -> bool {
        names::is_multicast(&self.receiver)
    }
}

/// A routed message. Moved from queue to queue, never shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: Header,
    pub body: Body,
}

impl Message {
    pub fn new(header: Header, body: impl Into<Body>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    /// Encode as bytes for transport outside the process.
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Header and typed body handed to a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub header: Header,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(header: Header, body: T) -> Self {
        Self { header, body }
    }
}

macro_rules! message_kinds {
    ($( $kind:ident => $handler:ident, $name:literal, $receiver:expr; )*) => {
        /// Payload of a [`Message`], one variant per kind.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub enum Body {
            $( $kind($kind), )*
        }

        impl Body {
            /// Static kind name, e.g. `Channel_Request`.
            pub fn kind(&self) -> &'static str {
                match self {
                    $( Body::$kind(_) => $name, )*
                }
            }

            /// Receiver used when the sender does not name one.
            pub fn default_receiver(&self) -> Option<&'static str> {
                match self {
                    $( Body::$kind(_) => $receiver, )*
                }
            }
        }

        $(
            impl From<$kind> for Body {
                fn from(v: $kind) -> Self {
                    Body::$kind(v)
                }
            }
        )*

        /// Per-kind message handlers. Unhandled kinds are logged and dropped.
        pub trait MessageProcessor {
            $(
                fn $handler(&mut self, header: Header, body: $kind) {
                    let _ = body;
                    log::debug!(
                        "{} from '{}' to '{}' not implemented",
                        $name,
                        header.sender,
                        header.receiver
                    );
                }
            )*
        }

        /// Hand `msg` to the matching handler of `processor`.
        pub fn dispatch<P: MessageProcessor + ?Sized>(processor: &mut P, msg: Message) {
            let Message { header, body } = msg;
            match body {
                $( Body::$kind(b) => processor.$handler(header, b), )*
            }
        }
    };
}

message_kinds! {
    Error => on_error, "Error", None;
    SystemState => on_system_state, "SystemState", Some(names::MULTICAST);
    SystemStateRequest => on_system_state_request, "SystemState_Request", Some(names::CORE_MANAGER);
    SystemComponentState => on_system_component_state, "SystemComponentState", Some(names::CORE_MANAGER);
    SystemComponentStateRequest => on_system_component_state_request, "SystemComponentState_Request", None;
    Cmd => on_cmd, "Cmd", Some(names::CORE_CMD);
    CmdCancel => on_cmd_cancel, "CmdCancel", None;
    CmdState => on_cmd_state, "CmdState", Some(names::CORE_CMD);
    CmdSubscribeRequest => on_cmd_subscribe_request, "CmdSubscribe_Request", Some(names::CORE_CMD);
    CmdSubscribeResponse => on_cmd_subscribe_response, "CmdSubscribe_Response", None;
    ChannelRequest => on_channel_request, "Channel_Request", None;
    ChannelResponse => on_channel_response, "Channel_Response", None;
    ChannelStateResponse => on_channel_state_response, "ChannelState_Response", None;
    DeviceActivateRequest => on_device_activate_request, "DeviceActivate_Request", None;
    DeviceActivateResponse => on_device_activate_response, "DeviceActivate_Response", None;
    DeviceConnectRequest => on_device_connect_request, "DeviceConnect_Request", None;
    DeviceConnectResponse => on_device_connect_response, "DeviceConnect_Response", None;
    DeviceDisconnectRequest => on_device_disconnect_request, "DeviceDisconnect_Request", None;
    DeviceDisconnectResponse => on_device_disconnect_response, "DeviceDisconnect_Response", None;
    DeviceActionLog => on_device_action_log, "DeviceActionLog", Some(names::CORE_DB);
    DeviceStateResponse => on_device_state_response, "DeviceState_Response", None;
    DeviceListRequest => on_device_list_request, "DeviceList_Request", Some(names::CORE_DB);
    DeviceListResponse => on_device_list_response, "DeviceList_Response", None;
    DeviceDescriptionRequest => on_device_description_request, "DeviceDescription_Request", Some(names::CORE_DB);
    DeviceDescriptionResponse => on_device_description_response, "DeviceDescription_Response", None;
    DeviceUnRegistered => on_device_unregistered, "DeviceUnRegistered", Some(names::MULTICAST);
    DeviceFileLoadRequest => on_device_file_load_request, "DeviceFileLoad_Request", None;
    DeviceFileLoadCancelRequest => on_device_file_load_cancel_request, "DeviceFileLoadCancel_Request", None;
    DeviceFileLoadResponse => on_device_file_load_response, "DeviceFileLoad_Response", None;
    ProtocolForDeviceRequest => on_protocol_for_device_request, "ProtocolForDevice_Request", Some(names::CORE_DB);
    ProtocolForDeviceResponse => on_protocol_for_device_response, "ProtocolForDevice_Response", None;
    TmParamList => on_tm_param_list, "TmParamList", Some(names::CORE_TM);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct OnlyCmd {
        cmds: Vec<String>,
    }

    impl MessageProcessor for OnlyCmd {
        fn on_cmd(&mut self, _header: Header, body: Cmd) {
            self.cmds.push(body.name());
        }
    }

    fn cmd() -> Cmd {
        Cmd {
            cmd_id: 1,
            device: "d1".into(),
            trait_: "Tm".into(),
            command: "readOnce".into(),
            params: vec![Value::UInt(3)],
        }
    }

    #[test]
    fn test_dispatch_routes_by_kind() {
        let mut p = OnlyCmd::default();
        dispatch(&mut p, Message::new(Header::new(1, "a", "b", None), cmd()));
        // Unhandled kind falls through to the logging default.
        dispatch(
            &mut p,
            Message::new(Header::new(2, "a", "b", None), Error::new("x")),
        );
        assert_eq!(p.cmds, vec!["d1.Tm.readOnce".to_string()]);
    }

    #[test]
    fn test_kind_names_and_receivers() {
        let b: Body = SystemStateRequest.into();
        assert_eq!(b.kind(), "SystemState_Request");
        assert_eq!(b.default_receiver(), Some(names::CORE_MANAGER));

        let b: Body = DeviceUnRegistered { device: "d".into() }.into();
        assert_eq!(b.default_receiver(), Some(names::MULTICAST));

        let b: Body = ChannelRequest::create("tcp:h:1", "internal:tcp:h:1").into();
        assert_eq!(b.kind(), "Channel_Request");
        assert_eq!(b.default_receiver(), None);
    }

    #[test]
    fn test_message_bytes_round_trip() {
        let msg = Message::new(Header::new(42, "mcc.ui", "mcc.encoder.internal", Some(7)), cmd());
        let bytes = msg.serialize().unwrap();
        let back = Message::deserialize(&bytes).unwrap();
        assert_eq!(back, msg);
        assert!(Message::deserialize(b"{not json").is_err());
    }
}

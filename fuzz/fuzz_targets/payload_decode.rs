//! Fuzz target for inbound payload decoding
//!
//! This fuzzer feeds arbitrary bodies through the subscription router on
//! both channels, and straight into the REST snapshot decoders, to find:
//! - Panics on odd JSON (numeric ids, huge numbers, odd timestamps)
//! - Inbox messages accepted although they do not involve the identity
//!
//! The fuzzer should NEVER panic. Malformed bodies must be rejected.

#![no_main]

use bytes::Bytes;
use chatty_core::{InboundEvent, SubscriptionRouter};
use chatty_proto::{
    Command, Frame,
    destinations::{INBOX_SUBSCRIPTION_ID, PRESENCE_SUBSCRIPTION_ID},
    payloads::{self, ChatMessagePayload, UserPayload},
};
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let router = SubscriptionRouter::new("alice");
    let received_at = Utc.timestamp_opt(1_704_067_200, 0).single().unwrap_or_default();

    for subscription in [INBOX_SUBSCRIPTION_ID, PRESENCE_SUBSCRIPTION_ID] {
        let frame = Frame::new(Command::Message)
            .with_header("subscription", subscription)
            .with_body(Bytes::copy_from_slice(data));

        if let Ok(InboundEvent::MessageReceived(message)) = router.decode(&frame, received_at) {
            assert!(message.involves("alice"), "router accepted a foreign message");
            assert_ne!(message.sender, message.recipient);
        }
    }

    let _ = payloads::from_json::<Vec<UserPayload>>(data);
    let _ = payloads::from_json::<Vec<ChatMessagePayload>>(data);
});

//! Container detection: ask the embedding frame for its network and give up
//! after a bounded wait.

use std::cell::RefCell;
use std::time::Duration;

use log::{info, warn};
use serde_json::{json, Value as JsonValue};

use crate::channel::Channel;
use crate::network::NetworkId;
use crate::traits::HostPage;
use crate::{runtime, Error};

pub const GET_NETWORK_ACTION: &str = "getNetwork";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbsentReason {
    NotEmbedded,
    OptedOut,
    Timeout,
    MalformedReply(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    Probing,
    Present(NetworkId),
    Absent(AbsentReason),
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Present(_) | HandshakeState::Absent(_))
    }

    pub fn network(&self) -> Option<&NetworkId> {
        match self {
            HandshakeState::Present(network) => Some(network),
            _ => None,
        }
    }
}

pub struct Handshake {
    channel: Channel,
    timeout: Duration,
    state: RefCell<HandshakeState>,
}

impl Handshake {
    pub fn new(channel: Channel, timeout: Duration) -> Self {
        Self {
            channel,
            timeout,
            state: RefCell::new(HandshakeState::Idle),
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn state(&self) -> HandshakeState {
        self.state.borrow().clone()
    }

    /// Probe the container. Runs once; later calls return the terminal state.
    pub async fn run(&self, page: &dyn HostPage) -> HandshakeState {
        if *self.state.borrow() != HandshakeState::Idle {
            return self.state();
        }
        if !page.is_embedded() {
            return self.finish(HandshakeState::Absent(AbsentReason::NotEmbedded));
        }
        if page.skip_container() {
            return self.finish(HandshakeState::Absent(AbsentReason::OptedOut));
        }
        *self.state.borrow_mut() = HandshakeState::Probing;

        let reply = self.channel.request(GET_NETWORK_ACTION, json!({}));
        let channel = self.channel.clone();
        let attempt = async move {
            page.structural_ready().await;
            channel.attach(page.container_transport()?, page.title())?;
            reply.await
        };

        let outcome = match runtime::timeout(self.timeout, attempt).await {
            None => {
                warn!("{}", Error::HandshakeTimeout);
                HandshakeState::Absent(AbsentReason::Timeout)
            }
            Some(Ok(JsonValue::String(declared))) => match NetworkId::parse(&declared) {
                Ok(network) => HandshakeState::Present(network),
                Err(err) => HandshakeState::Absent(AbsentReason::MalformedReply(err.to_string())),
            },
            Some(Ok(other)) => HandshakeState::Absent(AbsentReason::MalformedReply(format!(
                "network is not a string: {other}"
            ))),
            Some(Err(Error::Remote(message))) => {
                HandshakeState::Absent(AbsentReason::MalformedReply(message))
            }
            Some(Err(err)) => HandshakeState::Absent(AbsentReason::Failed(err.to_string())),
        };
        self.finish(outcome)
    }

    fn finish(&self, state: HandshakeState) -> HandshakeState {
        match &state {
            HandshakeState::Present(network) => info!("container present on {}", network),
            HandshakeState::Absent(reason) => info!("no container: {:?}", reason),
            _ => {}
        }
        *self.state.borrow_mut() = state.clone();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryTransport, MockPage};
    use crate::Error;

    fn answer(transport: &MemoryTransport, network: JsonValue) {
        transport.respond_with(move |envelope| match envelope.action.as_deref() {
            Some(GET_NETWORK_ACTION) => Some(Ok(network.clone())),
            _ => None,
        });
    }

    #[tokio::test]
    async fn test_top_level_page_is_absent_without_probing() {
        let transport = MemoryTransport::new();
        let handshake = Handshake::new(Channel::new("*"), Duration::from_secs(2));
        let state = handshake.run(&MockPage::top_level(transport.clone())).await;
        assert_eq!(state, HandshakeState::Absent(AbsentReason::NotEmbedded));
        assert!(transport.posted().is_empty());
        assert_eq!(handshake.channel().next_id(), 1);
    }

    #[tokio::test]
    async fn test_opt_out() {
        let transport = MemoryTransport::new();
        let handshake = Handshake::new(Channel::new("*"), Duration::from_secs(2));
        let page = MockPage::embedded(transport.clone()).opted_out();
        assert_eq!(
            handshake.run(&page).await,
            HandshakeState::Absent(AbsentReason::OptedOut)
        );
        assert!(transport.posted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aliases_are_normalized() {
        for (declared, expected) in [
            ("mainnet", NetworkId::Named("homestead".to_string())),
            ("testnet", NetworkId::Named("ropsten".to_string())),
            ("kovan", NetworkId::Named("kovan".to_string())),
        ] {
            let transport = MemoryTransport::new();
            answer(&transport, json!(declared));
            let handshake = Handshake::new(Channel::new("*"), Duration::from_secs(2));
            let state = handshake.run(&MockPage::embedded(transport.clone())).await;
            assert_eq!(state, HandshakeState::Present(expected));
            assert_eq!(transport.posted_actions(), vec!["ready", "getNetwork"]);
        }

        let transport = MemoryTransport::new();
        answer(&transport, json!("https://rpc.example.org"));
        let handshake = Handshake::new(Channel::new("*"), Duration::from_secs(2));
        let state = handshake.run(&MockPage::embedded(transport)).await;
        assert!(state.network().unwrap().is_custom());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_times_out() {
        let transport = MemoryTransport::new();
        let handshake = Handshake::new(Channel::new("*"), Duration::from_millis(2000));
        let started = tokio::time::Instant::now();
        let state = handshake.run(&MockPage::embedded(transport)).await;
        assert_eq!(state, HandshakeState::Absent(AbsentReason::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    async fn reply_after(delay: Duration) -> (HandshakeState, Duration) {
        let transport = MemoryTransport::new();
        let handshake = Handshake::new(Channel::new("*"), Duration::from_millis(2000));
        let page = MockPage::embedded(transport.clone());
        let started = tokio::time::Instant::now();
        let container = async {
            tokio::time::sleep(delay).await;
            // getNetwork is issued before attach, so it carries id 1
            transport.reply(1, json!("mainnet"));
        };
        let (state, ()) = tokio::join!(handshake.run(&page), container);
        (state, started.elapsed())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_inside_window_cancels_timer() {
        let (state, elapsed) = reply_after(Duration::from_millis(1999)).await;
        assert_eq!(state, HandshakeState::Present(NetworkId::Named("homestead".to_string())));
        assert!(elapsed < Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_after_window_is_absent() {
        let (state, elapsed) = reply_after(Duration::from_millis(2001)).await;
        assert_eq!(state, HandshakeState::Absent(AbsentReason::Timeout));
        assert!(elapsed >= Duration::from_millis(2001));
    }

    #[tokio::test(start_paused = true)]
    async fn test_structure_never_ready_times_out() {
        let transport = MemoryTransport::new();
        answer(&transport, json!("homestead"));
        let handshake = Handshake::new(Channel::new("*"), Duration::from_millis(2000));
        let state = handshake.run(&MockPage::embedded(transport.clone()).never_ready()).await;
        assert_eq!(state, HandshakeState::Absent(AbsentReason::Timeout));
        assert!(transport.posted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_replies_are_absent() {
        let transport = MemoryTransport::new();
        answer(&transport, json!(1));
        let handshake = Handshake::new(Channel::new("*"), Duration::from_secs(2));
        let state = handshake.run(&MockPage::embedded(transport)).await;
        assert!(matches!(state, HandshakeState::Absent(AbsentReason::MalformedReply(_))));

        let transport = MemoryTransport::new();
        transport.respond_with(|_| Some(Err(Error::Remote("busy".to_string()))));
        let handshake = Handshake::new(Channel::new("*"), Duration::from_secs(2));
        let state = handshake.run(&MockPage::embedded(transport)).await;
        assert_eq!(
            state,
            HandshakeState::Absent(AbsentReason::MalformedReply("busy".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_state_is_kept() {
        let transport = MemoryTransport::new();
        answer(&transport, json!("homestead"));
        let handshake = Handshake::new(Channel::new("*"), Duration::from_secs(2));
        let page = MockPage::embedded(transport.clone());
        let first = handshake.run(&page).await;
        let second = handshake.run(&page).await;
        assert_eq!(first, second);
        assert_eq!(transport.posted_actions().len(), 2);
    }
}

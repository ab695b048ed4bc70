//! Per-room connection state machine.
//!
//! `RoomLink` holds no I/O. Each handler takes one event, updates the
//! state, and returns the effects the manager has to carry out. Events
//! from the transport carry the generation they were issued under and are
//! ignored once the generation has moved on.

use std::time::Duration;

use roomchat_common::{ConnectionState, Message};

use crate::backoff::BackoffPolicy;
use crate::protocol::{ServerFrame, ABNORMAL_CLOSURE, NORMAL_CLOSURE};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    /// Start a transport connection tagged with `generation`.
    Open { generation: u64 },
    /// Write the auth frame on the open link.
    SendAuth,
    /// Start the timer for the auth reply of `generation`.
    ArmAuthDeadline { generation: u64 },
    /// Close the current link, if any, with `code`.
    Close { code: u16 },
    /// Hand the open link to the sender.
    Register,
    Unregister,
    ScheduleReconnect { generation: u64, delay: Duration },
    CancelReconnect,
    Deliver(Message),
    ReportAuthRejected { reason: String },
}

#[derive(Debug, Clone)]
pub(crate) struct RoomLink {
    state: ConnectionState,
    attempt: u32,
    generation: u64,
    policy: BackoffPolicy,
}

impl RoomLink {
    pub(crate) fn new(policy: BackoffPolicy) -> Self {
        Self::resume(policy, 0)
    }

    /// A disconnected machine whose next attempt is numbered after
    /// `generation`, so events from an earlier machine for the same room
    /// never match.
    pub(crate) fn resume(policy: BackoffPolicy, generation: u64) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            generation,
            policy,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// User intent. No-op while an attempt is underway or established.
    pub(crate) fn connect(&mut self) -> Vec<Effect> {
        if self.state.is_active() {
            return Vec::new();
        }
        if matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            self.attempt = 0;
        }
        self.begin_attempt()
    }

    pub(crate) fn on_reconnect_due(&mut self, generation: u64) -> Vec<Effect> {
        if !self.is_current(generation) || self.state != ConnectionState::Reconnecting {
            return Vec::new();
        }
        self.begin_attempt()
    }

    pub(crate) fn on_opened(&mut self, generation: u64, has_credential: bool) -> Vec<Effect> {
        if !self.is_current(generation) || self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        if has_credential {
            self.state = ConnectionState::Authenticating;
            vec![Effect::SendAuth, Effect::ArmAuthDeadline { generation }]
        } else {
            self.mark_connected()
        }
    }

    pub(crate) fn on_frame(&mut self, generation: u64, frame: ServerFrame) -> Vec<Effect> {
        if !self.is_current(generation) {
            return Vec::new();
        }
        match frame {
            ServerFrame::AuthAccepted if self.state == ConnectionState::Authenticating => {
                self.mark_connected()
            }
            ServerFrame::AuthAccepted => Vec::new(),
            ServerFrame::AuthRejected { reason } => {
                self.generation += 1;
                self.state = ConnectionState::Failed;
                vec![
                    Effect::CancelReconnect,
                    Effect::Close {
                        code: NORMAL_CLOSURE,
                    },
                    Effect::Unregister,
                    Effect::ReportAuthRejected { reason },
                ]
            }
            ServerFrame::Message(message) => vec![Effect::Deliver(message)],
        }
    }

    /// The transport closed, failed, or timed out (`code` is synthesized
    /// as abnormal for the latter two).
    pub(crate) fn on_closed(&mut self, generation: u64, code: u16) -> Vec<Effect> {
        if !self.is_current(generation) || !self.state.is_active() {
            return Vec::new();
        }

        let mut effects = vec![Effect::Unregister];
        if code == NORMAL_CLOSURE {
            self.state = ConnectionState::Disconnected;
        } else if self.policy.allows(self.attempt) {
            let delay = self.policy.delay_for_attempt(self.attempt);
            self.attempt += 1;
            self.state = ConnectionState::Reconnecting;
            effects.push(Effect::ScheduleReconnect {
                generation: self.generation,
                delay,
            });
        } else {
            self.state = ConnectionState::Failed;
        }
        effects
    }

    /// The server never answered the auth frame. Handled like an abnormal
    /// close of the link.
    pub(crate) fn on_auth_deadline(&mut self, generation: u64) -> Vec<Effect> {
        if !self.is_current(generation) || self.state != ConnectionState::Authenticating {
            return Vec::new();
        }
        let mut effects = vec![Effect::Close {
            code: NORMAL_CLOSURE,
        }];
        effects.extend(self.on_closed(generation, ABNORMAL_CLOSURE));
        effects
    }

    /// Idempotent.
    pub(crate) fn disconnect(&mut self) -> Vec<Effect> {
        self.generation += 1;
        self.state = ConnectionState::Disconnected;
        self.attempt = 0;
        vec![
            Effect::CancelReconnect,
            Effect::Close {
                code: NORMAL_CLOSURE,
            },
            Effect::Unregister,
        ]
    }

    fn begin_attempt(&mut self) -> Vec<Effect> {
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        vec![
            Effect::CancelReconnect,
            Effect::Close {
                code: NORMAL_CLOSURE,
            },
            Effect::Unregister,
            Effect::Open {
                generation: self.generation,
            },
        ]
    }

    fn mark_connected(&mut self) -> Vec<Effect> {
        self.state = ConnectionState::Connected;
        self.attempt = 0;
        vec![Effect::Register]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::message;

    fn scheduled_delay(effects: &[Effect]) -> Option<Duration> {
        effects.iter().find_map(|e| match e {
            Effect::ScheduleReconnect { delay, .. } => Some(*delay),
            _ => None,
        })
    }

    fn connected(has_credential: bool) -> RoomLink {
        let mut link = RoomLink::new(BackoffPolicy::default());
        link.connect();
        let generation = link.generation();
        link.on_opened(generation, has_credential);
        if has_credential {
            link.on_frame(generation, ServerFrame::AuthAccepted);
        }
        assert_eq!(link.state(), ConnectionState::Connected);
        link
    }

    #[test]
    fn connect_opens_new_generation() {
        let mut link = RoomLink::new(BackoffPolicy::default());
        let effects = link.connect();

        assert_eq!(link.state(), ConnectionState::Connecting);
        assert_eq!(effects.last(), Some(&Effect::Open { generation: 1 }));
    }

    #[test]
    fn open_with_credential_authenticates() {
        let mut link = RoomLink::new(BackoffPolicy::default());
        link.connect();

        assert_eq!(
            link.on_opened(1, true),
            vec![Effect::SendAuth, Effect::ArmAuthDeadline { generation: 1 }]
        );
        assert_eq!(link.state(), ConnectionState::Authenticating);

        assert_eq!(
            link.on_frame(1, ServerFrame::AuthAccepted),
            vec![Effect::Register]
        );
        assert_eq!(link.state(), ConnectionState::Connected);
    }

    #[test]
    fn open_without_credential_is_connected() {
        let mut link = RoomLink::new(BackoffPolicy::default());
        link.connect();

        assert_eq!(link.on_opened(1, false), vec![Effect::Register]);
        assert_eq!(link.state(), ConnectionState::Connected);
    }

    #[test]
    fn connect_is_noop_while_active() {
        let mut link = RoomLink::new(BackoffPolicy::default());
        link.connect();
        assert!(link.connect().is_empty());

        link.on_opened(1, true);
        assert!(link.connect().is_empty());

        link.on_frame(1, ServerFrame::AuthAccepted);
        assert!(link.connect().is_empty());
        assert_eq!(link.generation(), 1);
    }

    #[test]
    fn abnormal_close_schedules_first_backoff() {
        let mut link = connected(true);
        let generation = link.generation();

        let effects = link.on_closed(generation, ABNORMAL_CLOSURE);

        assert_eq!(link.state(), ConnectionState::Reconnecting);
        assert_eq!(scheduled_delay(&effects), Some(Duration::from_millis(1_000)));
        assert!(effects.contains(&Effect::Unregister));
        assert_eq!(link.attempt(), 1);
    }

    #[test]
    fn backoff_grows_then_fails() {
        let mut link = RoomLink::new(BackoffPolicy::default());
        link.connect();

        let mut delays = Vec::new();
        for _ in 0..5 {
            let generation = link.generation();
            let effects = link.on_closed(generation, ABNORMAL_CLOSURE);
            delays.push(scheduled_delay(&effects).unwrap().as_millis() as u64);
            assert_eq!(link.state(), ConnectionState::Reconnecting);

            let effects = link.on_reconnect_due(generation);
            assert!(matches!(effects.last(), Some(Effect::Open { .. })));
        }
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000]);

        let effects = link.on_closed(link.generation(), ABNORMAL_CLOSURE);
        assert_eq!(link.state(), ConnectionState::Failed);
        assert_eq!(scheduled_delay(&effects), None);
    }

    #[test]
    fn successful_auth_resets_attempts() {
        let mut link = connected(true);
        let generation = link.generation();
        link.on_closed(generation, ABNORMAL_CLOSURE);
        link.on_closed(generation, ABNORMAL_CLOSURE);
        link.on_reconnect_due(generation);

        let generation = link.generation();
        link.on_opened(generation, true);
        link.on_frame(generation, ServerFrame::AuthAccepted);
        assert_eq!(link.attempt(), 0);
    }

    #[test]
    fn clean_close_never_schedules() {
        let mut link = connected(true);
        let effects = link.on_closed(link.generation(), NORMAL_CLOSURE);

        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(effects, vec![Effect::Unregister]);
    }

    #[test]
    fn auth_error_fails_without_timer() {
        let mut link = RoomLink::new(BackoffPolicy::default());
        link.connect();
        link.on_opened(1, true);

        let effects = link.on_frame(
            1,
            ServerFrame::AuthRejected {
                reason: "invalid token".into(),
            },
        );

        assert_eq!(link.state(), ConnectionState::Failed);
        assert!(effects.contains(&Effect::Close {
            code: NORMAL_CLOSURE
        }));
        assert!(effects.contains(&Effect::ReportAuthRejected {
            reason: "invalid token".into()
        }));
        assert_eq!(scheduled_delay(&effects), None);

        // The trailing close of the rejected link is stale.
        assert!(link.on_closed(1, NORMAL_CLOSURE).is_empty());
        assert!(link.on_closed(1, ABNORMAL_CLOSURE).is_empty());
        assert_eq!(link.state(), ConnectionState::Failed);
    }

    #[test]
    fn manual_connect_after_failure_resets_attempts() {
        let mut link = RoomLink::new(BackoffPolicy::new(1_000, 30_000, 1));
        link.connect();
        link.on_closed(1, ABNORMAL_CLOSURE);
        link.on_reconnect_due(1);
        link.on_closed(2, ABNORMAL_CLOSURE);
        assert_eq!(link.state(), ConnectionState::Failed);

        let effects = link.connect();
        assert_eq!(link.state(), ConnectionState::Connecting);
        assert_eq!(link.attempt(), 0);
        assert!(matches!(effects.last(), Some(Effect::Open { generation: 3 })));
    }

    #[test]
    fn disconnect_invalidates_pending_reconnect() {
        let mut link = connected(true);
        let generation = link.generation();
        link.on_closed(generation, ABNORMAL_CLOSURE);

        let effects = link.disconnect();
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(effects.contains(&Effect::CancelReconnect));

        assert!(link.on_reconnect_due(generation).is_empty());
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut link = RoomLink::new(BackoffPolicy::default());
        let first = link.disconnect();
        let second = link.disconnect();
        assert_eq!(first, second);
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn stale_events_are_ignored() {
        let mut link = RoomLink::new(BackoffPolicy::default());
        link.connect();
        link.disconnect();
        link.connect();
        assert_eq!(link.generation(), 3);

        assert!(link.on_opened(1, true).is_empty());
        assert!(link
            .on_frame(1, ServerFrame::Message(message("m1", "r1", 0)))
            .is_empty());
        assert!(link.on_closed(1, ABNORMAL_CLOSURE).is_empty());
        assert_eq!(link.state(), ConnectionState::Connecting);
    }

    #[test]
    fn unanswered_auth_closes_and_backs_off() {
        let mut link = RoomLink::new(BackoffPolicy::default());
        link.connect();
        link.on_opened(1, true);

        let effects = link.on_auth_deadline(1);

        assert_eq!(link.state(), ConnectionState::Reconnecting);
        assert_eq!(
            effects.first(),
            Some(&Effect::Close {
                code: NORMAL_CLOSURE
            })
        );
        assert!(effects.contains(&Effect::Unregister));
        assert_eq!(scheduled_delay(&effects), Some(Duration::from_millis(1_000)));
        assert_eq!(link.attempt(), 1);

        // The reader's close of the dropped link no longer matters.
        assert!(link.on_closed(1, ABNORMAL_CLOSURE).is_empty());
    }

    #[test]
    fn auth_deadline_after_reply_is_ignored() {
        let mut link = connected(true);
        assert!(link.on_auth_deadline(link.generation()).is_empty());
        assert_eq!(link.state(), ConnectionState::Connected);

        let mut link = RoomLink::new(BackoffPolicy::default());
        link.connect();
        link.on_opened(1, true);
        link.disconnect();
        link.connect();
        link.on_opened(3, true);
        assert!(link.on_auth_deadline(1).is_empty());
        assert_eq!(link.state(), ConnectionState::Authenticating);
    }

    #[test]
    fn resumed_machine_ignores_previous_generations() {
        let mut old = RoomLink::new(BackoffPolicy::default());
        old.connect();
        let old_generation = old.generation();
        old.disconnect();

        let mut link = RoomLink::resume(BackoffPolicy::default(), old.generation());
        assert_eq!(link.state(), ConnectionState::Disconnected);
        let effects = link.connect();
        assert!(matches!(
            effects.last(),
            Some(Effect::Open { generation }) if *generation > old_generation
        ));

        assert!(link.on_opened(old_generation, false).is_empty());
        assert!(link.on_closed(old_generation, ABNORMAL_CLOSURE).is_empty());
        assert_eq!(link.state(), ConnectionState::Connecting);
    }

    #[test]
    fn message_frames_are_delivered() {
        let mut link = connected(false);
        let msg = message("m1", "r1", 0);
        let effects = link.on_frame(link.generation(), ServerFrame::Message(msg.clone()));
        assert_eq!(effects, vec![Effect::Deliver(msg)]);
    }

    #[test]
    fn late_auth_success_is_ignored_when_connected() {
        let mut link = connected(true);
        assert!(link
            .on_frame(link.generation(), ServerFrame::AuthAccepted)
            .is_empty());
    }
}

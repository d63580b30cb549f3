use chrono::{DateTime, Utc};
use pingwatch_model::{ConnectionState, ProbeFailure, ProbeResult, Target};
use pingwatch_probe::{parse_latency, ParseError};

/// What a completed probe means for connectivity.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Reachable(f64),
    Unreachable(ProbeFailure),
    /// The probe replied but its output carried no usable latency.
    Unparseable(ParseError),
}

impl ProbeOutcome {
    pub fn from_probe(result: &ProbeResult) -> Self {
        if !result.succeeded {
            let failure = result
                .failure
                .clone()
                .unwrap_or(ProbeFailure::NoReply { status: None });
            return ProbeOutcome::Unreachable(failure);
        }

        if let Some(latency) = result.latency_ms {
            return if latency.is_finite() && latency >= 0.0 {
                ProbeOutcome::Reachable(latency)
            } else {
                ProbeOutcome::Unparseable(ParseError::MalformedValue(latency.to_string()))
            };
        }

        match result.raw_output.as_deref() {
            Some(raw) => match parse_latency(raw) {
                Ok(latency) => ProbeOutcome::Reachable(latency),
                Err(err) => ProbeOutcome::Unparseable(err),
            },
            None => ProbeOutcome::Unparseable(ParseError::NoLatencyMarker),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl Transition {
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

pub fn next_state(_current: ConnectionState, success: bool) -> ConnectionState {
    // No hysteresis: every state follows the latest probe.
    if success {
        ConnectionState::Connected
    } else {
        ConnectionState::Disconnected
    }
}

/// Apply one probe outcome to a target.
///
/// Success records the latency and clears the failure streak. Any failure,
/// including an unparseable reply, keeps the previous latency and extends the
/// streak.
pub fn classify(
    target: &mut Target,
    outcome: &ProbeOutcome,
    observed_at: DateTime<Utc>,
) -> Transition {
    let from = target.state;

    match outcome {
        ProbeOutcome::Reachable(latency) => {
            target.last_latency_ms = Some(*latency);
            target.consecutive_failures = 0;
        }
        ProbeOutcome::Unreachable(_) | ProbeOutcome::Unparseable(_) => {
            target.consecutive_failures = target.consecutive_failures.saturating_add(1);
        }
    }

    target.state = next_state(from, outcome.is_success());
    target.last_observed_at = Some(observed_at);

    Transition {
        from,
        to: target.state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingwatch_model::TargetConfig;

    fn target() -> Target {
        Target::new(TargetConfig::from_address("a.example"))
    }

    #[test]
    fn unknown_to_connected_then_stale_on_timeout() {
        let mut target = target();
        let now = Utc::now();

        let outcome = ProbeOutcome::from_probe(&ProbeResult::replied(
            "64 bytes from x: icmp_seq=1 ttl=57 time=6.57 ms",
        ));
        let transition = classify(&mut target, &outcome, now);
        assert_eq!(transition.from, ConnectionState::Unknown);
        assert_eq!(target.state, ConnectionState::Connected);
        assert_eq!(target.last_latency_ms, Some(6.57));
        assert_eq!(target.consecutive_failures, 0);
        assert_eq!(target.last_observed_at, Some(now));

        let outcome = ProbeOutcome::from_probe(&ProbeResult::timed_out());
        let transition = classify(&mut target, &outcome, now);
        assert!(transition.is_change());
        assert_eq!(target.state, ConnectionState::Disconnected);
        assert_eq!(target.last_latency_ms, Some(6.57));
        assert_eq!(target.consecutive_failures, 1);
    }

    #[test]
    fn unknown_failure_goes_straight_to_disconnected() {
        let mut target = target();
        let outcome = ProbeOutcome::Unreachable(ProbeFailure::Timeout);
        classify(&mut target, &outcome, Utc::now());
        assert_eq!(target.state, ConnectionState::Disconnected);
        assert!(target.last_latency_ms.is_none());
        assert_eq!(target.consecutive_failures, 1);
    }

    #[test]
    fn failure_streak_grows_and_resets_on_success() {
        let mut target = target();
        let now = Utc::now();
        for _ in 0..3 {
            classify(&mut target, &ProbeOutcome::Unreachable(ProbeFailure::Timeout), now);
        }
        assert_eq!(target.consecutive_failures, 3);

        let transition = classify(&mut target, &ProbeOutcome::Reachable(12.0), now);
        assert_eq!(transition.from, ConnectionState::Disconnected);
        assert_eq!(transition.to, ConnectionState::Connected);
        assert_eq!(target.consecutive_failures, 0);
        assert_eq!(target.last_latency_ms, Some(12.0));
    }

    #[test]
    fn connected_success_updates_latency_without_change() {
        let mut target = target();
        let now = Utc::now();
        classify(&mut target, &ProbeOutcome::Reachable(5.0), now);
        let transition = classify(&mut target, &ProbeOutcome::Reachable(7.5), now);
        assert!(!transition.is_change());
        assert_eq!(target.last_latency_ms, Some(7.5));
    }

    #[test]
    fn unparseable_reply_counts_as_failure() {
        let mut target = target();
        let outcome = ProbeOutcome::from_probe(&ProbeResult::replied(
            "From 10.0.0.1 icmp_seq=1 Destination Host Unreachable",
        ));
        assert_eq!(outcome, ProbeOutcome::Unparseable(ParseError::NoLatencyMarker));

        classify(&mut target, &outcome, Utc::now());
        assert_eq!(target.state, ConnectionState::Disconnected);
        assert_eq!(target.consecutive_failures, 1);
    }

    #[test]
    fn runner_reported_latency_skips_parsing() {
        assert_eq!(
            ProbeOutcome::from_probe(&ProbeResult::measured(3.25)),
            ProbeOutcome::Reachable(3.25)
        );
        assert!(matches!(
            ProbeOutcome::from_probe(&ProbeResult::measured(-1.0)),
            ProbeOutcome::Unparseable(ParseError::MalformedValue(_))
        ));
    }

    #[test]
    fn every_state_follows_the_latest_probe() {
        for state in [
            ConnectionState::Unknown,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ] {
            assert_eq!(next_state(state, true), ConnectionState::Connected);
            assert_eq!(next_state(state, false), ConnectionState::Disconnected);
        }
    }
}

use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_BUILDS: Counter = Counter::new("plaincoder.client.builds");
pub(crate) static CLIENT_BUILD_ERRORS: Counter = Counter::new("plaincoder.client.build_errors");

pub(crate) static STREAM_OPEN_ERRORS: Counter = Counter::new("plaincoder.stream.open_errors");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("plaincoder.stream.errors");
pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("plaincoder.stream.fragments");
pub(crate) static STREAM_BYTES: Counter = Counter::new("plaincoder.stream.bytes");
pub(crate) static STREAM_TTFF: Moments = Moments::new("plaincoder.stream.ttff_seconds");

pub(crate) static CHAT_TURNS: Counter = Counter::new("plaincoder.chat.turns");
pub(crate) static CHAT_EMPTY_RESPONSES: Counter = Counter::new("plaincoder.chat.empty_responses");
pub(crate) static CHAT_INTERRUPTED_RESPONSES: Counter =
    Counter::new("plaincoder.chat.interrupted_responses");
pub(crate) static CHAT_TURN_DURATION: Moments =
    Moments::new("plaincoder.chat.turn_duration_seconds");
pub(crate) static COMMANDS_DISPATCHED: Counter = Counter::new("plaincoder.chat.commands");
pub(crate) static PROFILE_SWITCHES: Counter = Counter::new("plaincoder.chat.profile_switches");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_BUILDS);
    collector.register_counter(&CLIENT_BUILD_ERRORS);

    collector.register_counter(&STREAM_OPEN_ERRORS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFF);

    collector.register_counter(&CHAT_TURNS);
    collector.register_counter(&CHAT_EMPTY_RESPONSES);
    collector.register_counter(&CHAT_INTERRUPTED_RESPONSES);
    collector.register_moments(&CHAT_TURN_DURATION);
    collector.register_counter(&COMMANDS_DISPATCHED);
    collector.register_counter(&PROFILE_SWITCHES);
}

//! Core types shared across the relay.
//!
//! - [`Frame`] is one complete JPEG image as it moves from the extractor to the sinks
//! - [`ConnectionState`] and [`Transition`] describe device presence and its edges
//! - [`FrameRate`] caps how often a sink emits

mod connection_state;
mod frame;
mod frame_rate;

pub use connection_state::{ConnectionState, Transition};
pub use frame::{EOI, Frame, SOI};
pub use frame_rate::FrameRate;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn transitions_only_on_edges() {
        use ConnectionState::*;
        assert_eq!(Disconnected.transition_to(Connected), Some(Transition::Connected));
        assert_eq!(Connected.transition_to(Disconnected), Some(Transition::Disconnected));
        assert_eq!(Connected.transition_to(Connected), None);
        assert_eq!(Disconnected.transition_to(Disconnected), None);
        assert_eq!(ConnectionState::default(), Disconnected);
    }

    #[test]
    fn frame_rate_interval() {
        assert_eq!(FrameRate::new(0), None);
        assert_eq!(FrameRate::DEFAULT.fps(), 30);
        assert_eq!(FrameRate::new(4).unwrap().interval(), Duration::from_millis(250));
    }

    #[test]
    fn frame_delimiting() {
        assert!(Frame::from(vec![0xFF, 0xD8, 0x01, 0xFF, 0xD9]).is_delimited());
        assert!(!Frame::from(vec![0xFF, 0xD8, 0xFF, 0xD8]).is_delimited());
        assert!(!Frame::from(vec![0xFF, 0xD9]).is_delimited());
    }
}

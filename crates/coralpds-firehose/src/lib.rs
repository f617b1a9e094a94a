pub mod events;
pub mod hub;
pub mod sequencer;

pub use events::{COMMIT_EVENT_TYPE, CommitEvent};
pub use hub::{EventFrame, FirehoseHub, Subscription};
pub use sequencer::Sequencer;

//! Progress-streaming pipeline (spec §4.11): a [`state::StateTracker`]
//! driving zero or more [`stream::create_streaming_response`] consumers.

pub mod state;
pub mod stream;

pub use state::{new_tracker, PipelineState, StateTracker};
pub use stream::{create_streaming_response, standard_stage_table, StreamEvent, StreamerConfig};

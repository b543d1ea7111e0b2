// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Incremental client streaming
//
// Responsibilities:
// - Release only VALIDATED buffers; rolled-back buffers produce a single
//   error event
// - Track a send cursor per field so no byte is sent twice
// - Emit deltas in fixed-size pieces with optional pacing
// - Emit replace when corrected content does not extend what was sent
// - Send the marked fallback response when the pipeline cannot produce
//   one
// - Report stream failures without taking the connection down

mod controller;
mod types;

pub use controller::StreamingController;
pub use types::{
    ChannelSink, EventSink, FieldUpdate, SinkError, StreamError, StreamEvent, StreamingState,
    StreamingStats,
};

#[cfg(test)]
mod tests;

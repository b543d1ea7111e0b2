// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

pub mod breaker;
pub mod buffer;
pub mod config;
pub mod figure;
pub mod frame;
pub mod generation;
pub mod lang;
pub mod metadata;
pub mod pipeline;
pub mod response;
pub mod sandbox;
pub mod serialize;
pub mod server;
pub mod stream;
pub mod validate;

// ABOUTME: Small shared helpers that do not belong to a single domain module
// ABOUTME: Currently identifier generation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Random identifier generation
pub mod ids;

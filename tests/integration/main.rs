//! Integration tests for the dispatcher, run against in-memory transports.

mod dispatch_flow;
mod support;

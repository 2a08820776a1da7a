//! Integration tests: the engine driven end to end against an
//! in-memory broker.

mod mock_broker;
mod session_replay;

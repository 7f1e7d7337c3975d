//! End-to-end integration tests for the MQTT client facade and the device
//! agent. All tests live under `tests/`; this crate has no library code.

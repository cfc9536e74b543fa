//! Native speech recognition via an external helper process.
//!
//! Some platforms ship a system recognizer that is only reachable from
//! platform-native code. This backend runs such a helper as a child process
//! and reads a tiny line protocol from its stdout (`PARTIAL:`, `FINAL:`,
//! `ERROR:`). The helper owns the microphone for as long as it runs;
//! stopping the backend kills the process.

pub mod backend;
pub mod protocol;

pub use backend::{NativeCapture, NativeConfig};
pub use protocol::{parse_line, RecognizerLine};

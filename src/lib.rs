//! # Stream Logfile
//!
//! A writer for binary log files of timestamped data streams, aimed at
//! robotics and embedded data-logging pipelines:
//!
//! * **Low overhead**: samples are copied into a large in-memory buffer and
//!   reach the OS in big blocking writes
//! * **Self-describing**: every stream is declared with its name, type name and
//!   optionally the full type definition
//! * **Portable**: every multi-byte value is stored little-endian, whatever the
//!   host byte order
//! * **Closed encoding**: only a fixed set of value shapes can be written; any
//!   other type is rejected at compile time
//!
//! ## Main Components
//!
//! * `File`: buffered, append-only file sink
//! * `Logfile`: typed encoder, stream index allocation and block writers
//! * `StreamLogger`: per-stream sampling filter and sample buffer
//! * `LogReader`: sequential decoder for the written files
//! * `type_registry`: sources of type definitions for stream declarations
//!
//! ## Quick Start
//!
//! ```
//! use stream_logfile::{Logfile, StreamLogger, Time};
//! # let dir = tempfile::tempdir().unwrap();
//! # let path = dir.path().join("robot.log");
//!
//! let logfile = Logfile::create(&path).unwrap().shared();
//!
//! let mut odometry = StreamLogger::new("odometry", "Pose", logfile.clone());
//! odometry.register_stream().unwrap();
//! odometry.set_sampling(Time::from_microseconds(10_000));
//!
//! odometry.write_sample(Time::now(), &[0u8; 24]).unwrap();
//! logfile.lock().flush().unwrap();
//! ```

pub mod error;
pub mod file;
pub mod format;
pub mod log_reader;
pub mod logfile;
pub mod stream_logger;
pub mod time;
pub mod type_registry;

pub use error::{Error, Result};
pub use file::{File, DEFAULT_BUFFER_SIZE};
pub use format::{BlockHeader, BlockType, CommandType, SampleHeader, StreamType};
pub use log_reader::{Block, LogReader, Sample, StreamDeclaration};
pub use logfile::{write_prologue, Encode, Logfile, SharedLogfile};
pub use stream_logger::{PayloadWriter, StreamLogger};
pub use time::Time;
pub use type_registry::{GlobalRegistry, MemoryRegistry, TypeRegistry};

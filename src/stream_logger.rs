//! Per-stream sample logging.
//!
//! A [`StreamLogger`] owns the metadata of one stream, filters samples that
//! arrive faster than its sampling period and keeps a reusable payload
//! buffer. All writes go through a [`SharedLogfile`].

use parking_lot::MutexGuard;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::format::StreamType;
use crate::logfile::{Logfile, SharedLogfile};
use crate::time::Time;
use crate::type_registry::TypeRegistry;

/// Logger for the samples of a single stream.
///
/// Samples carry two stamps: the logical `timestamp` passed by the caller,
/// and the wall-clock time at which they were written.
///
/// # Sampling
///
/// With a non-zero period set by [`StreamLogger::set_sampling`], a sample is
/// accepted only if at least one period has elapsed since the last accepted
/// sample. Rejected samples write nothing and do not move the reference
/// point. The first sample is always accepted.
///
/// # Examples
///
/// ```
/// # use stream_logfile::{Logfile, StreamLogger, Time};
/// # let dir = tempfile::tempdir().unwrap();
/// let logfile = Logfile::create(dir.path().join("run.log")).unwrap().shared();
///
/// let mut imu = StreamLogger::new("imu", "Vector3d", logfile.clone());
/// imu.register_stream().unwrap();
/// imu.set_sampling(Time::from_microseconds(1_000_000));
///
/// assert!(imu.write_sample(Time::from_microseconds(0), &[1, 2, 3]).unwrap());
/// assert!(!imu.write_sample(Time::from_microseconds(500_000), &[4, 5, 6]).unwrap());
/// assert!(imu.write_sample(Time::from_microseconds(1_200_000), &[7, 8, 9]).unwrap());
/// ```
pub struct StreamLogger {
    name: String,
    type_name: String,
    type_def: String,
    stream_idx: Option<u32>,
    sampling: Time,
    last: Option<Time>,
    sample_buffer: Vec<u8>,
    file: SharedLogfile,
}

impl StreamLogger {
    /// Creates a logger for a stream without embedded type definition.
    ///
    /// Nothing is written until [`StreamLogger::register_stream`].
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, file: SharedLogfile) -> Self {
        Self::with_definition(name.into(), type_name.into(), String::new(), file)
    }

    /// Creates a logger whose declaration embeds the definition of
    /// `type_name` as provided by `registry`.
    ///
    /// An unknown type is declared with an empty definition.
    pub fn with_registry(
        name: impl Into<String>,
        type_name: impl Into<String>,
        registry: &dyn TypeRegistry,
        file: SharedLogfile,
    ) -> Self {
        let type_name = type_name.into();
        let type_def = registry.type_definition(&type_name).unwrap_or_default();
        Self::with_definition(name.into(), type_name, type_def, file)
    }

    fn with_definition(name: String, type_name: String, type_def: String, file: SharedLogfile) -> Self {
        Self {
            name,
            type_name,
            type_def,
            stream_idx: None,
            sampling: Time::default(),
            last: None,
            sample_buffer: Vec::new(),
            file,
        }
    }

    /// Declares the stream in the log file and returns its index.
    ///
    /// Index allocation and the declaration happen under one lock, so
    /// concurrent registrations never interleave.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyRegistered` on a second call, or any write error.
    pub fn register_stream(&mut self) -> Result<u32> {
        if self.stream_idx.is_some() {
            return Err(Error::AlreadyRegistered(self.name.clone()));
        }

        let mut file = self.file.lock();
        let idx = file.new_stream_index()?;
        file.write_stream_declaration(
            idx,
            StreamType::Data,
            &self.name,
            &self.type_name,
            &self.type_def,
        )?;
        drop(file);

        debug!(stream = %self.name, idx, "registered stream");
        self.stream_idx = Some(idx);
        Ok(idx)
    }

    /// Sets the minimum interval between accepted samples.
    ///
    /// A null period disables filtering.
    pub fn set_sampling(&mut self, period: Time) {
        self.sampling = period;
    }

    fn accepts(&self, timestamp: Time) -> bool {
        match self.last {
            Some(last) if !self.sampling.is_null() => timestamp - last >= self.sampling,
            _ => true,
        }
    }

    fn registered_index(&self) -> Result<u32> {
        self.stream_idx
            .ok_or_else(|| Error::StreamNotRegistered(self.name.clone()))
    }

    /// Starts a `size`-byte sample whose payload is supplied incrementally.
    ///
    /// Returns `None` if the sampling filter rejects `timestamp`. Otherwise
    /// the headers are written and the returned [`PayloadWriter`] holds the
    /// log file lock until the payload is complete.
    ///
    /// # Examples
    ///
    /// ```
    /// # use stream_logfile::{Logfile, StreamLogger, Time};
    /// # let dir = tempfile::tempdir().unwrap();
    /// # let logfile = Logfile::create(dir.path().join("run.log")).unwrap().shared();
    /// let mut scan = StreamLogger::new("scan", "LaserScan", logfile);
    /// scan.register_stream().unwrap();
    ///
    /// if let Some(mut payload) = scan.write_sample_header(Time::now(), 6).unwrap() {
    ///     payload.write(&[1, 2, 3]).unwrap();
    ///     payload.write(&[4, 5, 6]).unwrap();
    ///     payload.finish().unwrap();
    /// };
    /// ```
    pub fn write_sample_header(
        &mut self,
        timestamp: Time,
        size: usize,
    ) -> Result<Option<PayloadWriter<'_>>> {
        let idx = self.registered_index()?;
        if !self.accepts(timestamp) {
            trace!(stream = %self.name, %timestamp, "sample rejected by sampling filter");
            return Ok(None);
        }

        let mut file = self.file.lock();
        file.write_sample_header(idx, Time::now(), timestamp, size)?;
        self.last = Some(timestamp);
        Ok(Some(PayloadWriter {
            file,
            expected: size,
            written: 0,
        }))
    }

    /// Writes a complete sample.
    ///
    /// Returns `false` if the sampling filter rejected it.
    pub fn write_sample(&mut self, timestamp: Time, data: &[u8]) -> Result<bool> {
        let idx = self.registered_index()?;
        if !self.accepts(timestamp) {
            trace!(stream = %self.name, %timestamp, "sample rejected by sampling filter");
            return Ok(false);
        }

        self.file
            .lock()
            .write_sample(idx, Time::now(), timestamp, data)?;
        self.last = Some(timestamp);
        Ok(true)
    }

    /// Returns the reusable sample buffer, resized to at least `size` bytes.
    ///
    /// The buffer only grows; its content is whatever the previous sample
    /// left in it. Fill it and call [`StreamLogger::write_sample_buffer`].
    pub fn sample_buffer(&mut self, size: usize) -> &mut [u8] {
        if self.sample_buffer.len() < size {
            self.sample_buffer.resize(size, 0);
        }
        &mut self.sample_buffer[..size]
    }

    /// Writes the first `size` bytes of the sample buffer as a sample.
    ///
    /// # Errors
    ///
    /// `Error::PayloadSizeMismatch` if the buffer was never grown to `size`.
    pub fn write_sample_buffer(&mut self, timestamp: Time, size: usize) -> Result<bool> {
        let idx = self.registered_index()?;
        if !self.accepts(timestamp) {
            trace!(stream = %self.name, %timestamp, "sample rejected by sampling filter");
            return Ok(false);
        }

        let data = self
            .sample_buffer
            .get(..size)
            .ok_or(Error::PayloadSizeMismatch {
                expected: size,
                actual: self.sample_buffer.len(),
            })?;
        self.file
            .lock()
            .write_sample(idx, Time::now(), timestamp, data)?;
        self.last = Some(timestamp);
        Ok(true)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Type definition embedded in the declaration; empty if none.
    pub fn type_definition(&self) -> &str {
        &self.type_def
    }

    /// Index of the stream, once registered.
    pub fn stream_index(&self) -> Option<u32> {
        self.stream_idx
    }

    pub fn sampling(&self) -> Time {
        self.sampling
    }
}

/// Payload of a sample started with [`StreamLogger::write_sample_header`].
///
/// Holds the log file lock, so no other block can be written until it is
/// dropped. Exactly the announced number of bytes must be written; bytes
/// still missing at [`finish`](PayloadWriter::finish) or drop are written as
/// zeros so that the next block starts where the header said it would.
pub struct PayloadWriter<'a> {
    file: MutexGuard<'a, Logfile>,
    expected: usize,
    written: usize,
}

impl PayloadWriter<'_> {
    /// Appends payload bytes.
    ///
    /// # Errors
    ///
    /// `Error::PayloadSizeMismatch` if `data` would overrun the announced
    /// size; nothing is written in that case.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let total = self.written + data.len();
        if total > self.expected {
            return Err(Error::PayloadSizeMismatch {
                expected: self.expected,
                actual: total,
            });
        }
        self.file.write_raw(data)?;
        self.written = total;
        Ok(())
    }

    /// Bytes still owed to the block.
    pub fn remaining(&self) -> usize {
        self.expected - self.written
    }

    /// Checks that the whole payload was written and releases the lock.
    ///
    /// # Errors
    ///
    /// `Error::PayloadSizeMismatch` if bytes were missing. The block is
    /// zero-filled to its announced size before the error is returned.
    pub fn finish(mut self) -> Result<()> {
        if self.written != self.expected {
            let actual = self.written;
            self.pad()?;
            return Err(Error::PayloadSizeMismatch {
                expected: self.expected,
                actual,
            });
        }
        Ok(())
    }

    fn pad(&mut self) -> Result<()> {
        const ZEROS: [u8; 256] = [0; 256];
        while self.written < self.expected {
            let len = (self.expected - self.written).min(ZEROS.len());
            self.file.write_raw(&ZEROS[..len])?;
            self.written += len;
        }
        Ok(())
    }
}

impl Drop for PayloadWriter<'_> {
    fn drop(&mut self) {
        if self.written != self.expected {
            warn!(
                expected = self.expected,
                written = self.written,
                "sample payload left incomplete, padding with zeros"
            );
            if let Err(err) = self.pad() {
                error!(%err, "failed to pad incomplete sample payload");
            }
        }
    }
}

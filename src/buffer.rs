use std::{
    fmt,
    io::{self, Write},
    mem,
    sync::{Arc, OnceLock},
};

use parking_lot::{const_mutex, const_rwlock, Mutex, RwLock, RwLockWriteGuard};
use tracing_subscriber::fmt::{writer::BoxMakeWriter, MakeWriter};

use crate::config::Config;

/// Bytes a line may take before it has to be written out in pieces.
pub(crate) const SCRATCH_SIZE: usize = 16 * 1024;

pub(crate) const COMMA: &str = ", ";

// Held exclusively by a line that did not fit in its scratch space and
// shared by every other line for its single final write.
static OUTPUT_LOCK: RwLock<()> = const_rwlock(());

static POOL: Mutex<Vec<Vec<u8>>> = const_mutex(Vec::new());

/// A destination for log lines.
///
/// Any [`MakeWriter`] can be used; a fresh writer is made for every write.
#[derive(Clone)]
pub struct Output(Arc<BoxMakeWriter>);

impl Output {
    pub fn new<M>(make_writer: M) -> Self
    where
        M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        Output(Arc::new(BoxMakeWriter::new(make_writer)))
    }

    pub fn stdout() -> Self {
        static STDOUT: OnceLock<Output> = OnceLock::new();
        STDOUT.get_or_init(|| Output::new(io::stdout)).clone()
    }

    pub fn stderr() -> Self {
        static STDERR: OnceLock<Output> = OnceLock::new();
        STDERR.get_or_init(|| Output::new(io::stderr)).clone()
    }

    /// Whether both handles write to the same destination instance.
    pub fn ptr_eq(a: &Output, b: &Output) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.0.make_writer();
        writer.write_all(bytes)?;
        writer.flush()
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Output")
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}

/// An unshared scratch buffer holding one log line while it is composed.
pub(crate) struct Buffer {
    buf: Vec<u8>,
    out: Output,
    /// Written before the next value.
    pub(crate) delim: &'static str,
    locked: Option<RwLockWriteGuard<'static, ()>>,
    pub(crate) config: Arc<Config>,
}

impl Buffer {
    pub(crate) fn acquire(out: Output, config: Arc<Config>) -> Self {
        let buf = POOL
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(SCRATCH_SIZE));
        Buffer {
            buf,
            out,
            delim: "",
            locked: None,
            config,
        }
    }

    /// Whether this line outgrew its scratch space and holds the output lock.
    pub(crate) fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    pub(crate) fn write(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    pub(crate) fn write_bytes(&mut self, s: &[u8]) {
        if SCRATCH_SIZE < self.buf.len() + s.len() {
            self.lock();
        }
        if SCRATCH_SIZE < s.len() {
            self.emit(s);
        } else {
            self.buf.extend_from_slice(s);
        }
    }

    /// Makes sure the next `n` bytes fit in the scratch space.
    pub(crate) fn reserve(&mut self, n: usize) {
        if SCRATCH_SIZE < self.buf.len() + n {
            self.lock();
        }
    }

    // The line will not fit, so keep every other line out until it is done.
    fn lock(&mut self) {
        if self.locked.is_none() {
            self.locked = Some(OUTPUT_LOCK.write());
        }
        self.flush();
    }

    fn flush(&mut self) {
        if !self.buf.is_empty() {
            let buf = mem::take(&mut self.buf);
            self.emit(&buf);
            self.buf = buf;
            self.buf.clear();
        }
    }

    fn emit(&self, bytes: &[u8]) {
        if let Err(err) = self.out.write_all(bytes) {
            if self.config.log_internal_errors {
                eprintln!("[lager] Unable to write a log line to its output: {err}");
            }
        }
    }

    /// Writes whatever is left of the line and releases the output lock.
    pub(crate) fn release(mut self) {
        if self.locked.is_none() {
            let _shared = OUTPUT_LOCK.read();
            self.flush();
        } else {
            self.flush();
            self.locked = None;
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let mut buf = mem::take(&mut self.buf);
        if SCRATCH_SIZE <= buf.capacity() {
            buf.clear();
            POOL.lock().push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Buffer, Output, SCRATCH_SIZE};
    use crate::{config::Config, tests::MockMakeWriter};

    fn acquire(mock: &MockMakeWriter) -> Buffer {
        Buffer::acquire(Output::new(mock.clone()), Arc::new(Config::default()))
    }

    #[test]
    fn small_line_is_written_once_on_release() {
        let mock = MockMakeWriter::default();
        let mut buf = acquire(&mock);
        buf.write("[\"a\"");
        buf.write("]\n");
        assert!(mock.get_string().is_empty());
        assert!(!buf.is_locked());
        buf.release();
        assert_eq!("[\"a\"]\n", mock.get_string());
        assert_eq!(1, mock.writes());
    }

    #[test]
    fn overflow_takes_the_lock_and_flushes_early() {
        let mock = MockMakeWriter::default();
        let mut buf = acquire(&mock);
        let chunk = "x".repeat(SCRATCH_SIZE / 2 + 1);
        buf.write(&chunk);
        buf.write(&chunk);
        assert!(buf.is_locked());
        assert_eq!(chunk, mock.get_string());
        buf.release();
        assert_eq!(chunk.repeat(2), mock.get_string());
    }

    #[test]
    fn oversized_chunk_bypasses_scratch() {
        let mock = MockMakeWriter::default();
        let mut buf = acquire(&mock);
        let big = "y".repeat(SCRATCH_SIZE + 10);
        buf.write("<");
        buf.write(&big);
        buf.write(">");
        assert_eq!(format!("<{big}"), mock.get_string());
        buf.release();
        assert_eq!(format!("<{big}>"), mock.get_string());
        assert_eq!(3, mock.writes());
    }

    #[test]
    fn dropped_buffer_writes_nothing() {
        let mock = MockMakeWriter::default();
        let mut buf = acquire(&mock);
        buf.write("partial");
        drop(buf);
        assert!(mock.get_string().is_empty());
    }
}

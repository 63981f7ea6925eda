use std::{fmt, io, mem};

use crate::{logger::Lager, value::Value};

/// A bridge from `io::Write` to a [`Lager`].
///
/// Each complete line written is logged as one entry, without its trailing
/// newline. Lines are logged as bytes so invalid UTF-8 stays visible. A final
/// partial line is logged on [`flush`](io::Write::flush) or when the writer
/// is dropped.
pub struct LogWriter {
    lager: Lager,
    partial: Vec<u8>,
}

impl LogWriter {
    pub(crate) fn new(lager: Lager) -> Self {
        Self {
            lager,
            partial: Vec::new(),
        }
    }

    fn log(&self, line: &[u8]) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        self.lager.list(vec![Value::from(line)]);
    }

    fn log_partial(&mut self) {
        if !self.partial.is_empty() {
            let partial = mem::take(&mut self.partial);
            self.log(&partial);
        }
    }
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.lager.enabled() {
            return Ok(buf.len());
        }
        let mut rest = buf;
        while let Some(end) = rest.iter().position(|&c| c == b'\n') {
            if self.partial.is_empty() {
                self.log(&rest[..end]);
            } else {
                self.partial.extend_from_slice(&rest[..end]);
                let line = mem::take(&mut self.partial);
                self.log(&line);
            }
            rest = &rest[end + 1..];
        }
        self.partial.extend_from_slice(rest);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.log_partial();
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.log_partial();
    }
}

impl fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("LogWriter { .. }")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use crate::{
        buffer::Output,
        config::Config,
        globals::Globals,
        level::Severity,
        tests::{fixed_clock, parse_lines, MockMakeWriter},
    };

    #[test]
    fn each_line_is_logged() {
        let mock = MockMakeWriter::default();
        let mut config = Config::default();
        config
            .set_output(Some(Output::new(mock.clone())))
            .set_clock(fixed_clock);
        let globals = Globals::new(config);
        {
            let mut writer = globals.lager(Severity::Warn).log_writer();
            write!(writer, "first\r\nsec").unwrap();
            writer.write_all(b"ond\nbad \xFF\nleft").unwrap();
        }
        assert_eq!(
            parse_lines(&mock.get_string()),
            vec![
                json!(["2019-12-31 23:59:59.1234Z", "WARN", "first"]),
                json!(["2019-12-31 23:59:59.1234Z", "WARN", "second"]),
                json!(["2019-12-31 23:59:59.1234Z", "WARN", "bad «xFF»"]),
                json!(["2019-12-31 23:59:59.1234Z", "WARN", "left"]),
            ]
        );
    }

    #[test]
    fn disabled_writer_swallows_everything() {
        let mock = MockMakeWriter::default();
        let mut config = Config::default();
        config.set_levels("F").set_output(Some(Output::new(mock.clone())));
        let globals = Globals::new(config);
        let mut writer = globals.lager(Severity::Debug).log_writer();
        writer.write_all(b"nothing\n").unwrap();
        writer.flush().unwrap();
        assert!(mock.get_string().is_empty());
    }
}

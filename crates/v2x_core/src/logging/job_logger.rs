//! Per-job logger with file and callback output.
//!
//! Each upscaling job gets its own logger that:
//! - Writes to a dedicated, timestamped log file
//! - Forwards lines to a front-end callback (if provided)
//! - Filters progress lines in compact mode
//! - Keeps the last driver output lines for failure reports

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

/// Per-job logger with dual output (file + callback).
pub struct JobLogger {
    /// Job name, usually the input file name.
    job_name: String,
    log_path: PathBuf,
    file_writer: Mutex<Option<BufWriter<File>>>,
    callback: Option<LogCallback>,
    config: LogConfig,
    /// Most recent driver output lines.
    tail_buffer: Mutex<VecDeque<String>>,
    /// Last progress value logged (compact mode).
    last_progress: Mutex<Option<u32>>,
}

impl JobLogger {
    /// Create a logger writing `<log_dir>/<YYYYmmdd_HHMMSS>_<job_name>.log`.
    ///
    /// An existing file of the same name is appended to.
    pub fn new(
        job_name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let job_name = job_name.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let log_path = log_dir.join(format!("{}_{}.log", stamp, sanitize_filename(&job_name)));
        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

        tracing::debug!("Job log for '{}' at {}", job_name, log_path.display());

        Ok(Self {
            job_name,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            callback,
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
            last_progress: Mutex::new(None),
        })
    }

    pub fn builder(job_name: impl Into<String>, log_dir: impl Into<PathBuf>) -> JobLoggerBuilder {
        JobLoggerBuilder::new(job_name, log_dir)
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }

        let formatted = self.format_message(message);
        self.output(&formatted);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        let msg = MessagePrefix::Warning.format(message);
        self.log(LogLevel::Warn, &msg);
    }

    /// Log an error. Errors are mirrored to `tracing` as well.
    pub fn error(&self, message: &str) {
        tracing::error!(job = %self.job_name, "{}", message);
        let msg = MessagePrefix::Error.format(message);
        self.log(LogLevel::Error, &msg);
    }

    /// Log a driver invocation.
    pub fn command(&self, command: &str) {
        let msg = MessagePrefix::Command.format(command);
        self.log(LogLevel::Info, &msg);
    }

    pub fn phase(&self, phase_name: &str) {
        let msg = MessagePrefix::Phase.format(phase_name);
        self.log(LogLevel::Info, &msg);
    }

    pub fn success(&self, message: &str) {
        let msg = MessagePrefix::Success.format(message);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a progress percentage.
    ///
    /// In compact mode only the first value, each crossing of a
    /// `progress_step` boundary, and 100 are logged. Returns whether the
    /// line was written.
    pub fn progress(&self, percent: u32) -> bool {
        if self.config.compact {
            let step = self.config.progress_step.max(1);
            let mut last = self.last_progress.lock();
            if let Some(prev) = *last {
                let crossed = percent / step > prev / step;
                if !crossed && !(percent >= 100 && prev < 100) {
                    return false;
                }
            }
            *last = Some(percent);
        }

        self.log(LogLevel::Info, &format!("Progress: {}%", percent));
        true
    }

    /// Record one line of driver output.
    ///
    /// The line always goes to the tail buffer; outside compact mode it is
    /// also written out.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        {
            let mut buffer = self.tail_buffer.lock();
            if self.config.error_tail == 0 {
                buffer.clear();
            } else {
                while buffer.len() >= self.config.error_tail {
                    buffer.pop_front();
                }
                buffer.push_back(line.to_string());
            }
        }

        if self.config.compact {
            return;
        }

        let msg = if is_stderr {
            MessagePrefix::Driver.format(line)
        } else {
            line.to_string()
        };
        self.output(&self.format_message(&msg));
    }

    /// Write the tail buffer out under a header (typically after a failure).
    pub fn show_tail(&self, header: &str) {
        let lines = self.tail();
        if lines.is_empty() {
            return;
        }

        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in &lines {
            self.output(&self.format_message(line));
        }
    }

    /// Current tail buffer contents, oldest first.
    pub fn tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Flush and close the log file. Later messages only reach the callback.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }

        if let Some(ref callback) = self.callback {
            callback(formatted);
        }
    }
}

impl Drop for JobLogger {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for JobLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLogger")
            .field("job_name", &self.job_name)
            .field("log_path", &self.log_path)
            .finish_non_exhaustive()
    }
}

/// Replace characters that are not allowed in file names.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect()
}

/// Builder for [`JobLogger`].
pub struct JobLoggerBuilder {
    job_name: String,
    log_dir: PathBuf,
    config: LogConfig,
    callback: Option<LogCallback>,
}

impl JobLoggerBuilder {
    pub fn new(job_name: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_name: job_name.into(),
            log_dir: log_dir.into(),
            config: LogConfig::default(),
            callback: None,
        }
    }

    pub fn config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn compact(mut self, compact: bool) -> Self {
        self.config.compact = compact;
        self
    }

    pub fn callback(mut self, callback: Option<LogCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn build(self) -> std::io::Result<JobLogger> {
        JobLogger::new(self.job_name, self.log_dir, self.config, self.callback)
    }
}

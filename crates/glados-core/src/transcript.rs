//! Per-channel append-only transcript files.
//!
//! One file per active channel at `<dir>/<channel-name>/<YYYY-MM-DD>.log`,
//! one line per message: `[HH:MM:SS] <display-name>: <text>`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveTime};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::directory::Directories;

/// Transcript handle shared between the router and every [`Outbox`](crate::Outbox).
pub type SharedTranscript = Arc<Mutex<Transcript>>;

/// Open transcript files keyed by channel id.
#[derive(Debug, Default)]
pub struct Transcript {
    files: HashMap<String, File>,
}

impl Transcript {
    /// A transcript that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Opens (appending) one file per channel in `directories`.
    ///
    /// A channel whose file cannot be opened is logged and skipped.
    pub fn open(dir: &Path, directories: &Directories, date: NaiveDate) -> Self {
        let file_name = format!("{}.log", date.format("%Y-%m-%d"));
        let mut files = HashMap::new();

        for (id, name) in directories.channels() {
            let channel_dir = dir.join(name);
            let path = channel_dir.join(&file_name);
            let opened = fs::create_dir_all(&channel_dir)
                .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));
            match opened {
                Ok(file) => {
                    files.insert(id.to_string(), file);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to open channel transcript");
                }
            }
        }

        debug!(count = files.len(), dir = %dir.display(), "Channel transcripts opened");
        Self { files }
    }

    /// Wraps the transcript for sharing.
    pub fn shared(self) -> SharedTranscript {
        Arc::new(Mutex::new(self))
    }

    /// Formats a single transcript line (without the trailing newline).
    pub fn entry_line(time: NaiveTime, speaker: &str, text: &str) -> String {
        format!("[{}] {}: {}", time.format("%H:%M:%S"), speaker, text)
    }

    /// Appends a line to the channel's transcript. Unknown channels are ignored.
    pub fn record(&mut self, channel_id: &str, speaker: &str, text: &str) {
        let Some(file) = self.files.get_mut(channel_id) else {
            return;
        };
        let line = Self::entry_line(Local::now().time(), speaker, text);
        if let Err(e) = writeln!(file, "{line}").and_then(|_| file.flush()) {
            warn!(channel = %channel_id, error = %e, "Failed to write transcript line");
        }
    }

    /// Flushes and closes every file.
    pub fn close(&mut self) {
        for (_, mut file) in self.files.drain() {
            let _ = file.flush();
        }
    }

    /// Number of open files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file is open.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ChannelInfo;

    fn directories() -> Directories {
        let channels = vec![ChannelInfo {
            id: "C1".into(),
            name: "general".into(),
            is_archived: false,
            is_general: true,
        }];
        Directories::build("USELF", &[], &channels, "aperture-science", false)
    }

    #[test]
    fn test_entry_line_format() {
        let time = NaiveTime::from_hms_opt(9, 5, 7).unwrap();
        assert_eq!(
            Transcript::entry_line(time, "glados", "hello"),
            "[09:05:07] glados: hello"
        );
    }

    #[test]
    fn test_record_appends_to_channel_file() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut transcript = Transcript::open(dir.path(), &directories(), date);
        assert_eq!(transcript.len(), 1);

        transcript.record("C1", "chell", "first");
        transcript.record("C1", "glados", "second");
        transcript.record("CUNKNOWN", "nobody", "dropped");
        transcript.close();

        let content =
            std::fs::read_to_string(dir.path().join("general").join("2024-03-01.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] chell: first"));
        assert!(lines[1].ends_with("] glados: second"));
    }
}

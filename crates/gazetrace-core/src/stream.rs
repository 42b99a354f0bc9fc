//! Append-only CSV record stream for one session.
//!
//! The file is opened in append mode so rows written by an earlier session
//! for the same key survive. The header is written only when the file is
//! empty. [`RecordStream::data_start`] marks where this session's rows begin.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::sample::{Sample, csv_header};

pub struct RecordStream {
    path: PathBuf,
    writer: BufWriter<File>,
    data_start: u64,
    rows: u64,
}

impl RecordStream {
    /// Open (or create) the stream at `path`, creating parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        let len = file.metadata()?.len();

        let mut writer_prefix = String::new();
        if len == 0 {
            writer_prefix.push_str(&csv_header());
            writer_prefix.push('\n');
        } else if !ends_with_newline(&mut file, len)? {
            // A killed writer may have left a partial row.
            writer_prefix.push('\n');
        }

        let mut writer = BufWriter::new(file);
        writer.write_all(writer_prefix.as_bytes())?;
        writer.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            data_start: len + writer_prefix.len() as u64,
            rows: 0,
        })
    }

    /// Wrap an already open writable file; rows start at offset 0.
    #[cfg(test)]
    pub(crate) fn from_file(path: &Path, file: File) -> Self {
        Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            data_start: 0,
            rows: 0,
        }
    }

    /// Append one row and push it to the OS immediately.
    pub fn append(&mut self, sample: &Sample) -> io::Result<()> {
        writeln!(self.writer, "{}", sample.to_csv_row())?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and fsync. Consumes the stream.
    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the first row written by this stream.
    pub fn data_start(&self) -> u64 {
        self.data_start
    }

    /// Rows appended through this stream.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::tests::mock_probes;
    use crate::sample::{Assembler, CSV_COLUMNS};
    use std::sync::mpsc;

    fn one_sample() -> Sample {
        let (_tx, rx) = mpsc::channel();
        Assembler::start(mock_probes(0), rx).assemble()
    }

    #[test]
    fn new_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("m.csv");
        let mut stream = RecordStream::open(&path).unwrap();
        stream.append(&one_sample()).unwrap();
        assert_eq!(stream.rows(), 1);
        stream.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), CSV_COLUMNS.join(","));
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn reopen_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");

        let mut first = RecordStream::open(&path).unwrap();
        first.append(&one_sample()).unwrap();
        first.close().unwrap();
        let first_len = fs::metadata(&path).unwrap().len();

        let mut second = RecordStream::open(&path).unwrap();
        assert_eq!(second.data_start(), first_len);
        second.append(&one_sample()).unwrap();
        second.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("uptime_s").count(), 1);
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn partial_trailing_row_is_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        fs::write(&path, format!("{}\n1.0,0.5", csv_header())).unwrap();

        let mut stream = RecordStream::open(&path).unwrap();
        stream.append(&one_sample()).unwrap();
        stream.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1.0,0.5");
    }
}

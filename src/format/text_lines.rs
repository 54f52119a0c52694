//! Newline-delimited UTF-8 text

use super::{BoxedRecordReader, CheckpointedPosition, RecordReader, StreamFormat};
use crate::connector::file::FileSourceSplit;
use crate::error::{ConnectorError, ErrorCode, ErrorExt, Result};
use crate::fs::{FileSystem, ReadSeek};
use std::io::{BufRead, BufReader, Seek, SeekFrom};

/// One record per line, with `\n` or `\r\n` terminators stripped.
///
/// A split owns every line that starts inside its byte range, so a line
/// crossing a split boundary is read whole by the split it starts in and
/// skipped by the next one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLineFormat;

impl TextLineFormat {
    pub fn new() -> Self {
        Self
    }
}

impl StreamFormat for TextLineFormat {
    type Record = String;

    fn create_reader(
        &self,
        fs: &dyn FileSystem,
        split: &FileSourceSplit,
    ) -> Result<BoxedRecordReader<String>> {
        let mut reader = TextLineReader::open(fs, split)?;
        if split.offset > 0 {
            reader.align_to_line_start(split.offset)?;
        }
        Ok(Box::new(reader))
    }

    fn restore_reader(
        &self,
        fs: &dyn FileSystem,
        split: &FileSourceSplit,
        position: CheckpointedPosition,
    ) -> Result<BoxedRecordReader<String>> {
        let mut reader = TextLineReader::open(fs, split)?;
        reader.seek(position.offset)?;
        for _ in 0..position.records_after_offset {
            if reader.read_line()?.is_none() {
                break;
            }
        }
        Ok(Box::new(reader))
    }

    fn is_splittable(&self) -> bool {
        true
    }

    fn produced_type(&self) -> &'static str {
        "String"
    }
}

pub struct TextLineReader {
    split_id: String,
    input: BufReader<Box<dyn ReadSeek>>,
    /// Offset of the next unread line
    pos: u64,
    end: u64,
    last_position: Option<CheckpointedPosition>,
    buf: Vec<u8>,
}

impl TextLineReader {
    fn open(fs: &dyn FileSystem, split: &FileSourceSplit) -> Result<Self> {
        let input = fs.open(&split.path)?;
        Ok(Self {
            split_id: split.id.clone(),
            input: BufReader::new(input),
            pos: 0,
            end: split.end(),
            last_position: None,
            buf: Vec::new(),
        })
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.input
            .seek(SeekFrom::Start(offset))
            .to_fatal_read(&self.split_id, "seek failed")?;
        self.pos = offset;
        Ok(())
    }

    /// Skip the remainder of a line the previous split owns
    fn align_to_line_start(&mut self, offset: u64) -> Result<()> {
        self.seek(offset - 1)?;
        self.buf.clear();
        let skipped = self
            .input
            .read_until(b'\n', &mut self.buf)
            .to_fatal_read(&self.split_id, "read failed")?;
        self.pos += skipped as u64;
        Ok(())
    }

    /// Raw next line regardless of the split end
    fn read_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let n = self
            .input
            .read_until(b'\n', &mut self.buf)
            .to_fatal_read(&self.split_id, "read failed")?;
        if n == 0 {
            return Ok(None);
        }
        self.pos += n as u64;

        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        let line = String::from_utf8(std::mem::take(&mut self.buf)).map_err(|e| {
            ConnectorError::fatal_read_with_code(
                ErrorCode::READ_INVALID_ENCODING,
                format!("line ending at byte {} is not valid UTF-8", self.pos),
                Some(self.split_id.clone()),
            )
            .with_source(e)
        })?;
        Ok(Some(line))
    }
}

impl RecordReader for TextLineReader {
    type Record = String;
    type Position = CheckpointedPosition;

    fn read(&mut self) -> Result<Option<(String, CheckpointedPosition)>> {
        if self.pos >= self.end {
            return Ok(None);
        }
        match self.read_line()? {
            Some(line) => {
                let position = CheckpointedPosition::at_offset(self.pos);
                self.last_position = Some(position);
                Ok(Some((line, position)))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn checkpointed_position(&self) -> Option<CheckpointedPosition> {
        self.last_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{LocalFileSystem, Path};
    use tempfile::TempDir;

    fn fixture(contents: &str) -> (TempDir, Path, u64) {
        let dir = TempDir::new().unwrap();
        let native = dir.path().join("lines.txt");
        std::fs::write(&native, contents).unwrap();
        (dir, Path::from_native(&native).unwrap(), contents.len() as u64)
    }

    fn split(path: &Path, offset: u64, length: u64, size: u64) -> FileSourceSplit {
        FileSourceSplit::new(path.clone(), offset, length, size, 0)
    }

    fn drain(mut reader: BoxedRecordReader<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some((line, _)) = reader.read().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_reads_all_lines_of_whole_file() {
        let (_dir, path, size) = fixture("alpha\r\nbeta\ngamma");
        let fs = LocalFileSystem::new();
        let reader = TextLineFormat
            .create_reader(&fs, &split(&path, 0, size, size))
            .unwrap();
        assert_eq!(drain(reader), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_boundary_lines_belong_to_one_split() {
        // "one\n" = 0..4, "two\n" = 4..8, "three\n" = 8..14, "four\n" = 14..19
        let (_dir, path, size) = fixture("one\ntwo\nthree\nfour\n");
        let fs = LocalFileSystem::new();

        let mut all = Vec::new();
        for (offset, length) in [(0, 6), (6, 8), (14, 5)] {
            let reader = TextLineFormat
                .create_reader(&fs, &split(&path, offset, length, size))
                .unwrap();
            all.push(drain(reader));
        }

        assert_eq!(all[0], vec!["one", "two"]);
        assert_eq!(all[1], vec!["three"]);
        assert_eq!(all[2], vec!["four"]);
    }

    #[test]
    fn test_split_starting_at_line_start_keeps_that_line() {
        let (_dir, path, size) = fixture("one\ntwo\n");
        let fs = LocalFileSystem::new();
        let reader = TextLineFormat
            .create_reader(&fs, &split(&path, 4, 4, size))
            .unwrap();
        assert_eq!(drain(reader), vec!["two"]);
    }

    #[test]
    fn test_restore_resumes_after_position() {
        let (_dir, path, size) = fixture("a\nb\nc\nd\n");
        let fs = LocalFileSystem::new();
        let whole = split(&path, 0, size, size);

        let mut reader = TextLineFormat.create_reader(&fs, &whole).unwrap();
        reader.read().unwrap();
        let (_, position) = reader.read().unwrap().unwrap();
        assert_eq!(reader.checkpointed_position(), Some(position));

        let restored = TextLineFormat
            .restore_reader(&fs, &whole, position)
            .unwrap();
        assert_eq!(drain(restored), vec!["c", "d"]);

        let skipping = TextLineFormat
            .restore_reader(
                &fs,
                &whole,
                CheckpointedPosition {
                    offset: 0,
                    records_after_offset: 3,
                },
            )
            .unwrap();
        assert_eq!(drain(skipping), vec!["d"]);
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let dir = TempDir::new().unwrap();
        let native = dir.path().join("bad.txt");
        std::fs::write(&native, [0xff, 0xfe, b'\n']).unwrap();
        let path = Path::from_native(&native).unwrap();

        let fs = LocalFileSystem::new();
        let mut reader = TextLineFormat
            .create_reader(&fs, &split(&path, 0, 3, 3))
            .unwrap();
        let err = reader.read().unwrap_err();
        assert_eq!(err.code(), ErrorCode::READ_INVALID_ENCODING);
    }
}

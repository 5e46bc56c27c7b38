use crate::error::SwError;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};

pub fn get_buf_reader(file_path: &str) -> Result<BufReader<File>, SwError> {
    Ok(BufReader::new(File::open(file_path).map_err(|e| {
        SwError::ReadFile(file_path.to_owned(), e.to_string())
    })?))
}

pub fn get_file_lines(file_path: &str) -> Result<impl Iterator<Item = String>, SwError> {
    Ok(get_buf_reader(file_path)?.lines().filter_map(Result::ok))
}

pub fn read_file_to_bytes(file_path: &str) -> Result<Vec<u8>, SwError> {
    let mut bytes = Vec::new();
    get_buf_reader(file_path)?
        .read_to_end(&mut bytes)
        .map_err(|e| SwError::ReadFile(file_path.to_owned(), e.to_string()))?;
    Ok(bytes)
}

pub struct SwWriter {
    buf_writer: BufWriter<File>,
    file_path: String,
}

impl SwWriter {
    pub fn new(file_path: String) -> Result<Self, SwError> {
        let buf_writer = BufWriter::new(File::create(&file_path).map_err(|e| {
            SwError::CreateFile(file_path.clone(), e.to_string())
        })?);
        Ok(Self { buf_writer, file_path })
    }

    /// Opens `file_path` for appending, creating it first if needed. Used for
    /// the per-worker backup ledgers on the master, which grow across flushes.
    pub fn append(file_path: String) -> Result<Self, SwError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .map_err(|e| SwError::CreateFile(file_path.clone(), e.to_string()))?;
        Ok(Self { buf_writer: BufWriter::new(file), file_path })
    }

    #[inline]
    pub fn write_file_lines(
        &mut self,
        lines: impl Iterator<Item = String>,
    ) -> Result<(), SwError> {
        for line in lines {
            self.write_file_line(&line)?;
        }
        Ok(())
    }

    #[inline]
    pub fn write_file_line(&mut self, line: &str) -> Result<(), SwError> {
        self.buf_writer
            .write([line, "\n"].concat().as_bytes())
            .map_err(|e| SwError::WriteFile(self.file_path.clone(), e.to_string()))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SwError> {
        self.buf_writer
            .flush()
            .map_err(|e| SwError::WriteFile(self.file_path.clone(), e.to_string()))
    }

    pub fn into_buf_writer(self) -> BufWriter<File> {
        self.buf_writer
    }
}

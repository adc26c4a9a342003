//! Buffered file I/O, gzipped or plain by file extension.

use anyhow::Result;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Open a buffered reader; `.gz` files are decompressed transparently.
pub fn open_buf_reader(input_file: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(input_file)?;
    if input_file.extension().is_some_and(|e| e == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Open a buffered writer; `.gz` files are compressed transparently.
pub fn open_buf_writer(output_file: &Path) -> Result<Box<dyn Write>> {
    let file = File::create(output_file)?;
    if output_file.extension().is_some_and(|e| e == "gz") {
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        Ok(Box::new(BufWriter::new(encoder)))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Read every non-comment line into memory.
pub fn read_lines(input_file: &Path) -> Result<Vec<Box<str>>> {
    let buf = open_buf_reader(input_file)?;
    let mut lines = vec![];
    for x in buf.lines() {
        let line = x?;
        if line.starts_with('#') || line.starts_with('%') {
            continue;
        }
        lines.push(line.into_boxed_str());
    }
    Ok(lines)
}
